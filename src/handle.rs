//! The allocator handle.
//!
//! [`WmemAllocator`] is a tagged enum over the four strategy structs,
//! avoiding a deep inheritance hierarchy. Every operation dispatches on
//! the active variant; the callback registry and lifecycle flag are
//! shared state owned by the handle itself, so callback semantics are
//! implemented once rather than once per strategy.

use std::cell::{Cell, RefCell};

use crate::callback::{CallbackEvent, CallbackId, CallbackRegistry};
use crate::config::{self, Strategy};
use crate::error::AllocResult;
use crate::strategy::{BlockAllocator, BlockFastAllocator, SimpleAllocator, StrictAllocator};
use crate::traits::{MemoryUsage, Resettable};

enum Backend {
    Simple(SimpleAllocator),
    Block(BlockAllocator),
    BlockFast(BlockFastAllocator),
    Strict(StrictAllocator),
}

impl Backend {
    fn new(strategy: Strategy) -> Self {
        match strategy {
            Strategy::Simple => Backend::Simple(SimpleAllocator::new()),
            Strategy::Block => Backend::Block(BlockAllocator::new()),
            Strategy::BlockFast => Backend::BlockFast(BlockFastAllocator::new()),
            Strategy::Strict => Backend::Strict(StrictAllocator::new()),
        }
    }

    fn try_alloc(&self, n: usize) -> AllocResult<*mut u8> {
        match self {
            Backend::Simple(a) => a.try_alloc(n),
            Backend::Block(a) => a.try_alloc(n),
            Backend::BlockFast(a) => a.try_alloc(n),
            Backend::Strict(a) => a.try_alloc(n),
        }
    }

    fn try_alloc0(&self, n: usize) -> AllocResult<*mut u8> {
        match self {
            Backend::Simple(a) => a.try_alloc0(n),
            Backend::Block(a) => a.try_alloc0(n),
            Backend::BlockFast(a) => a.try_alloc0(n),
            Backend::Strict(a) => a.try_alloc0(n),
        }
    }

    fn try_realloc(&self, ptr: *mut u8, n: usize) -> AllocResult<*mut u8> {
        match self {
            Backend::Simple(a) => a.try_realloc(ptr, n),
            Backend::Block(a) => a.try_realloc(ptr, n),
            Backend::BlockFast(a) => a.try_realloc(ptr, n),
            Backend::Strict(a) => a.try_realloc(ptr, n),
        }
    }

    fn free(&self, ptr: *mut u8) {
        match self {
            Backend::Simple(a) => a.free(ptr),
            Backend::Block(a) => a.free(ptr),
            Backend::BlockFast(a) => a.free(ptr),
            Backend::Strict(a) => a.free(ptr),
        }
    }

    fn free_all(&self) {
        match self {
            Backend::Simple(a) => a.free_all(),
            Backend::Block(a) => a.free_all(),
            Backend::BlockFast(a) => a.free_all(),
            Backend::Strict(a) => a.free_all(),
        }
    }

    fn gc(&self) {
        match self {
            Backend::Simple(a) => a.gc(),
            Backend::Block(a) => a.gc(),
            Backend::BlockFast(a) => a.gc(),
            Backend::Strict(a) => a.gc(),
        }
    }

    /// `Ok(())` for strategies without an internal structure to verify.
    fn verify(&self) -> Result<(), String> {
        match self {
            Backend::Block(a) => a.verify(),
            Backend::Simple(_) | Backend::BlockFast(_) | Backend::Strict(_) => Ok(()),
        }
    }

    /// `Ok(())` for strategies with no canary to check.
    fn check_canaries(&self) -> AllocResult<()> {
        match self {
            Backend::Strict(a) => a.check_canaries(),
            Backend::Simple(_) | Backend::Block(_) | Backend::BlockFast(_) => Ok(()),
        }
    }
}

impl MemoryUsage for Backend {
    fn used_bytes(&self) -> usize {
        match self {
            Backend::Simple(a) => a.used_bytes(),
            Backend::Block(a) => a.used_bytes(),
            Backend::BlockFast(a) => a.used_bytes(),
            Backend::Strict(a) => a.used_bytes(),
        }
    }

    fn reserved_bytes(&self) -> usize {
        match self {
            Backend::Simple(a) => a.reserved_bytes(),
            Backend::Block(a) => a.reserved_bytes(),
            Backend::BlockFast(a) => a.reserved_bytes(),
            Backend::Strict(a) => a.reserved_bytes(),
        }
    }
}

/// An opaque, scoped allocation arena. Not `Sync`: every operation on a
/// handle, and on any container rooted in it, must come from a single
/// thread. Different handles are independent and may live on different
/// threads.
pub struct WmemAllocator {
    backend: Backend,
    callbacks: RefCell<CallbackRegistry>,
    destroyed: Cell<bool>,
}

impl WmemAllocator {
    /// Creates a new allocator of the requested strategy, honoring a
    /// process-wide override set via `WMEM_DEBUG_ALLOCATOR`.
    pub fn new(strategy: Strategy) -> Self {
        let effective = config::override_strategy().unwrap_or(strategy);
        Self::build(effective)
    }

    /// Like [`Self::new`] but always honors `strategy`, ignoring any
    /// environment override. Exists so tests can pin a specific strategy
    /// even when the whole test binary is being fuzzed under a forced
    /// override.
    pub fn force_new(strategy: Strategy) -> Self {
        Self::build(strategy)
    }

    fn build(strategy: Strategy) -> Self {
        #[cfg(feature = "logging")]
        tracing::debug!(?strategy, "creating wmem allocator");
        Self {
            backend: Backend::new(strategy),
            callbacks: RefCell::new(CallbackRegistry::new()),
            destroyed: Cell::new(false),
        }
    }

    #[track_caller]
    fn check_live(&self) {
        if self.destroyed.get() {
            crate::error::AllocError::new(crate::error::AllocErrorKind::UseAfterDestroy).abort();
        }
    }

    /// Returns a pointer to `n` uninitialized bytes aligned for any
    /// primitive type. Fatal on OOM.
    pub fn alloc(&self, n: usize) -> *mut u8 {
        self.check_live();
        self.backend.try_alloc(n).unwrap_or_else(|e| e.abort())
    }

    /// Like [`Self::alloc`] but zero-fills the returned region.
    pub fn alloc0(&self, n: usize) -> *mut u8 {
        self.check_live();
        self.backend.try_alloc0(n).unwrap_or_else(|e| e.abort())
    }

    /// Grows or shrinks a prior allocation, preserving the content prefix
    /// up to `min(old_len, n)`. `ptr` must have been returned by this same
    /// handle and not yet freed.
    pub fn realloc(&self, ptr: *mut u8, n: usize) -> *mut u8 {
        self.check_live();
        self.backend.try_realloc(ptr, n).unwrap_or_else(|e| e.abort())
    }

    /// Returns one block to the allocator. A no-op for BLOCK_FAST.
    pub fn free(&self, ptr: *mut u8) {
        self.check_live();
        self.backend.free(ptr);
    }

    /// Invalidates every outstanding allocation made through this handle
    /// and fires `FreeEvent` callbacks in reverse registration order.
    pub fn free_all(&self) {
        self.check_live();
        self.backend.free_all();
        self.callbacks.borrow_mut().fire(CallbackEvent::FreeEvent);
    }

    /// Hints that freed memory should be returned to the system allocator
    /// where possible. May be a no-op.
    pub fn gc(&self) {
        self.check_live();
        self.backend.gc();
    }

    /// Registers `callback`, returning an id usable with
    /// [`Self::unregister_callback`]. Fires on `free_all` and `destroy`.
    pub fn register_callback<F>(&self, callback: F) -> CallbackId
    where
        F: FnMut(CallbackEvent) -> bool + 'static,
    {
        self.check_live();
        self.callbacks.borrow_mut().register(callback)
    }

    /// Removes a previously registered callback. No-op if `id` is unknown.
    pub fn unregister_callback(&self, id: CallbackId) {
        self.check_live();
        self.callbacks.borrow_mut().unregister(id);
    }

    /// Fires DESTROY callbacks in reverse registration order, then releases
    /// every chunk this allocator holds. Using the handle afterwards is a
    /// fatal error.
    pub fn destroy(&self) {
        self.check_live();
        self.backend.free_all();
        self.callbacks.borrow_mut().fire(CallbackEvent::DestroyEvent);
        self.destroyed.set(true);
        #[cfg(feature = "logging")]
        tracing::debug!("destroyed wmem allocator");
    }

    /// Walks the allocator's internal structure asserting its invariants.
    /// Strategies with nothing to verify always succeed.
    pub fn verify(&self) -> Result<(), String> {
        self.backend.verify()
    }

    /// Scans every live allocation's guard bytes and aborts on the first
    /// mismatch found. A no-op returning `Ok(())` for every strategy but
    /// STRICT, which has no guard bytes to corrupt.
    pub fn check_canaries(&self) -> AllocResult<()> {
        self.check_live();
        self.backend.check_canaries()
    }

    /// Bytes currently reachable from live allocations.
    pub fn used_bytes(&self) -> usize {
        self.backend.used_bytes()
    }

    /// Bytes reserved from the system allocator.
    pub fn reserved_bytes(&self) -> usize {
        self.backend.reserved_bytes()
    }
}

impl Drop for WmemAllocator {
    fn drop(&mut self) {
        if !self.destroyed.get() {
            self.backend.free_all();
            self.callbacks.borrow_mut().fire(CallbackEvent::DestroyEvent);
        }
    }
}

impl Resettable for WmemAllocator {
    unsafe fn reset(&self) {
        self.free_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alloc_and_free_round_trip_for_every_strategy() {
        for strategy in [Strategy::Simple, Strategy::Block, Strategy::BlockFast, Strategy::Strict] {
            let a = WmemAllocator::force_new(strategy);
            let p = a.alloc(64);
            a.free(p);
        }
    }

    #[test]
    fn zero_byte_alloc_returns_dangling_sentinel() {
        let a = WmemAllocator::force_new(Strategy::Simple);
        let p = a.alloc(0);
        assert_eq!(p, std::ptr::NonNull::<u8>::dangling().as_ptr());
    }

    #[test]
    #[should_panic]
    fn use_after_destroy_is_fatal() {
        let a = WmemAllocator::force_new(Strategy::Simple);
        a.destroy();
        a.alloc(8);
    }

    #[test]
    fn destroy_fires_only_destroy_callbacks_in_reverse_order() {
        use std::cell::RefCell;
        use std::rc::Rc;

        let order = Rc::new(RefCell::new(Vec::new()));
        let a = WmemAllocator::force_new(Strategy::Simple);

        let o = order.clone();
        a.register_callback(move |e| {
            o.borrow_mut().push(('A', e));
            true
        });
        let o = order.clone();
        a.register_callback(move |e| {
            o.borrow_mut().push(('B', e));
            true
        });

        a.destroy();
        let events: Vec<_> = order.borrow().clone();
        assert_eq!(
            events,
            vec![('B', CallbackEvent::DestroyEvent), ('A', CallbackEvent::DestroyEvent)],
        );
    }
}
