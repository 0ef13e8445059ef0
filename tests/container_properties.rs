//! Randomized property coverage for the container library, covering
//! invariants that fixed-iteration-count stress loops tend to miss.

use proptest::prelude::*;
use wmem::container::{Array, Map, Tree};
use wmem::{Strategy, WmemAllocator};

proptest! {
    #[test]
    fn array_round_trips_every_appended_value(values in proptest::collection::vec(any::<i32>(), 0..200)) {
        let a = WmemAllocator::force_new(Strategy::Simple);
        let mut arr: Array<i32> = Array::new(&a, 4);
        for v in &values {
            arr.append_one(*v);
        }
        prop_assert_eq!(arr.get_count(), values.len());
        for (i, v) in values.iter().enumerate() {
            prop_assert_eq!(arr.index(i), *v);
        }
        prop_assert_eq!(arr.try_index(values.len()), None);
    }

    #[test]
    fn map_reflects_last_write_per_key(
        ops in proptest::collection::vec((0i32..16, any::<i32>()), 0..300)
    ) {
        let a = WmemAllocator::force_new(Strategy::Simple);
        let map: Map<i32, i32> = Map::new(&a);
        let mut model = std::collections::HashMap::new();
        for (k, v) in ops {
            map.insert(k, v);
            model.insert(k, v);
        }
        prop_assert_eq!(map.size(), model.len());
        for (k, v) in &model {
            prop_assert_eq!(map.lookup(k), Some(*v));
        }
    }

    #[test]
    fn tree_inorder_traversal_is_always_ascending(
        keys in proptest::collection::vec(-500i32..500, 0..300)
    ) {
        let a = WmemAllocator::force_new(Strategy::Simple);
        let tree: Tree<i32, ()> = Tree::new(&a);
        for k in &keys {
            tree.insert(*k, ());
        }
        let mut seen = Vec::new();
        tree.foreach(|k, _| {
            seen.push(*k);
            false
        });
        let mut sorted_unique: Vec<i32> = keys.clone();
        sorted_unique.sort_unstable();
        sorted_unique.dedup();
        prop_assert_eq!(seen, sorted_unique);
    }

    #[test]
    fn tree_lookup_le_never_exceeds_query(
        keys in proptest::collection::vec(0i32..1000, 1..100),
        query in 0i32..1000,
    ) {
        let a = WmemAllocator::force_new(Strategy::Simple);
        let tree: Tree<i32, i32> = Tree::new(&a);
        for k in &keys {
            tree.insert(*k, *k);
        }
        if let Some(found) = tree.lookup_le(&query) {
            prop_assert!(found <= query);
            prop_assert!(keys.iter().all(|k| *k > query || *k <= found));
        } else {
            prop_assert!(keys.iter().all(|k| *k > query));
        }
    }
}
