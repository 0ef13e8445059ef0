//! Hash map rooted in an allocator handle, with an optional paired
//! data allocator that auto-resets the map's contents.

use std::cell::RefCell;
use std::collections::HashMap;
use std::hash::Hash;
use std::rc::Rc;

use crate::callback::CallbackEvent;
use crate::handle::WmemAllocator;

/// Open-hashing map with standard `Hash`/`Eq` key semantics. The bucket
/// storage lives on the Rust heap (a `HashMap` grown the ordinary way);
/// what this type adds over `std::collections::HashMap` is the allocator
/// lifetime binding and the auto-reset callback wiring.
pub struct Map<'a, K, V> {
    allocator: &'a WmemAllocator,
    inner: Rc<RefCell<HashMap<K, V>>>,
}

impl<'a, K: Eq + Hash + Clone, V> Map<'a, K, V> {
    pub fn new(allocator: &'a WmemAllocator) -> Self {
        Self { allocator, inner: Rc::new(RefCell::new(HashMap::new())) }
    }

    /// Like [`Self::new`], but registers a FREE callback on `data_alloc`
    /// so that whenever `data_alloc` is bulk-freed, this map resets itself
    /// to empty: useful when the map is keyed per-session but its values
    /// reference data owned by a shorter-lived allocator. The
    /// registration always returns `true`, so it re-arms for the next
    /// `free_all`.
    pub fn new_autoreset(main: &'a WmemAllocator, data_alloc: &WmemAllocator) -> Self
    where
        K: 'static,
        V: 'static,
    {
        let map = Self::new(main);
        let inner = map.inner.clone();
        data_alloc.register_callback(move |event| {
            if event == CallbackEvent::FreeEvent {
                inner.borrow_mut().clear();
            }
            true
        });
        map
    }

    /// Inserts `(k, v)`, returning the previous value if the key was
    /// already present.
    pub fn insert(&self, k: K, v: V) -> Option<V> {
        self.inner.borrow_mut().insert(k, v)
    }

    pub fn lookup(&self, k: &K) -> Option<V>
    where
        V: Clone,
    {
        self.inner.borrow().get(k).cloned()
    }

    /// Returns both the stored key and value, useful when the caller
    /// needs the canonical key instance rather than the one it queried
    /// with.
    pub fn lookup_extended(&self, k: &K) -> Option<(K, V)>
    where
        V: Clone,
    {
        self.inner.borrow().get_key_value(k).map(|(k, v)| (k.clone(), v.clone()))
    }

    pub fn contains(&self, k: &K) -> bool {
        self.inner.borrow().contains_key(k)
    }

    pub fn remove(&self, k: &K) -> Option<V> {
        self.inner.borrow_mut().remove(k)
    }

    pub fn foreach(&self, mut f: impl FnMut(&K, &V)) {
        for (k, v) in self.inner.borrow().iter() {
            f(k, v);
        }
    }

    /// Removes every entry for which `predicate` returns `true`.
    pub fn foreach_remove(&self, mut predicate: impl FnMut(&K, &V) -> bool) {
        self.inner.borrow_mut().retain(|k, v| !predicate(k, v));
    }

    /// Returns the first `(k, v)` satisfying `predicate`, in unspecified
    /// order.
    pub fn find(&self, mut predicate: impl FnMut(&K, &V) -> bool) -> Option<(K, V)>
    where
        V: Clone,
    {
        self.inner
            .borrow()
            .iter()
            .find(|(k, v)| predicate(k, v))
            .map(|(k, v)| (k.clone(), v.clone()))
    }

    pub fn size(&self) -> usize {
        self.inner.borrow().len()
    }
}

// `allocator` is retained only to bind the map's lifetime to it; bucket
// storage itself uses the ordinary Rust allocator since `HashMap` offers
// no pluggable allocator hook without nightly APIs.
impl<K, V> Drop for Map<'_, K, V> {
    fn drop(&mut self) {
        let _ = self.allocator;
    }
}
