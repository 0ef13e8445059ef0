//! End-to-end scenarios covering allocator lifecycle and container
//! behavior together, named for what each one verifies.

use wmem::container::{IntervalTree, List};
use wmem::{CallbackEvent, Strategy, WmemAllocator};

#[test]
fn block_arena_reuse_does_not_grow_reserved_memory() {
    let a = WmemAllocator::force_new(Strategy::Block);
    let mut ptrs = Vec::new();
    for _ in 0..1024 {
        let p = a.alloc(48);
        ptrs.push(p);
        a.verify().unwrap();
    }
    let reserved_after_first_round = a.reserved_bytes();
    a.free_all();
    a.verify().unwrap();
    for _ in 0..1024 {
        a.alloc(48);
        a.verify().unwrap();
    }
    assert_eq!(a.reserved_bytes(), reserved_after_first_round);
}

#[test]
fn jumbo_round_trip_preserves_contents_across_every_strategy() {
    for strategy in [Strategy::Simple, Strategy::Block, Strategy::BlockFast, Strategy::Strict] {
        let a = WmemAllocator::force_new(strategy);
        let four_mib = 4 * 1024 * 1024;
        let p = a.alloc(four_mib);
        unsafe { std::ptr::write_bytes(p, 0x5A, four_mib) };

        let q = a.realloc(p, 13 * 1024 * 1024);
        let preserved = unsafe { std::slice::from_raw_parts(q, four_mib) };
        assert!(preserved.iter().all(|&b| b == 0x5A), "{strategy:?} lost jumbo contents on grow");

        let r = a.realloc(q, 10 * 1024 * 1024);
        a.verify().unwrap();
        a.free(r);
        a.free_all();
        a.gc();
        a.verify().unwrap();
    }
}

#[test]
fn callback_cascade_fires_reverse_order_and_prunes_after_false() {
    use std::cell::RefCell;
    use std::rc::Rc;

    let a = WmemAllocator::force_new(Strategy::Simple);
    let order = Rc::new(RefCell::new(Vec::new()));

    let o = order.clone();
    a.register_callback(move |_: CallbackEvent| {
        o.borrow_mut().push('A');
        true
    });
    let o = order.clone();
    a.register_callback(move |_: CallbackEvent| {
        o.borrow_mut().push('B');
        false
    });
    let o = order.clone();
    a.register_callback(move |_: CallbackEvent| {
        o.borrow_mut().push('C');
        true
    });

    a.free_all();
    assert_eq!(*order.borrow(), vec!['C', 'B', 'A']);

    order.borrow_mut().clear();
    a.free_all();
    assert_eq!(*order.borrow(), vec!['C', 'A']);
}

#[test]
#[should_panic]
fn canary_detection_aborts_on_overrun() {
    let a = WmemAllocator::force_new(Strategy::Strict);
    let p = a.alloc(32);
    unsafe { std::ptr::write_bytes(p, 0x41, 33) };
    a.check_canaries().unwrap();
}

#[test]
fn sorted_list_stability_matches_bytewise_order() {
    let a = WmemAllocator::force_new(Strategy::Simple);
    let mut list: List<&str> = List::new(&a);
    for s in ["abc", "bcd", "aaa", "bbb", "zzz", "ggg"] {
        list.insert_sorted(s, |x, y| x.cmp(y));
    }
    let mut seen = Vec::new();
    list.foreach(|s| seen.push(*s));
    assert_eq!(seen, vec!["aaa", "abc", "bbb", "bcd", "ggg", "zzz"]);
    assert_eq!(list.count(), 6);
}

#[test]
fn interval_overlap_returns_exactly_the_overlapping_multiset() {
    let a = WmemAllocator::force_new(Strategy::Simple);
    let mut tree = IntervalTree::new(&a);
    tree.insert(0, 10, 1);
    tree.insert(5, 15, 2);
    tree.insert(20, 30, 3);
    tree.insert(25, 35, 4);

    let mut values: Vec<i32> = tree.find_intervals(12, 22).into_iter().map(|(_, _, v)| v).collect();
    values.sort();
    assert_eq!(values, vec![2, 3]);
}
