//! SIMPLE strategy: the baseline reference allocator.
//!
//! Every live allocation is tracked in a map from address to its
//! `Layout`; `alloc` defers straight to the system allocator and `free`
//! removes the tracking entry. This makes SIMPLE the easiest strategy to
//! reason about, and the one the other three are validated against.

use std::alloc::{self, Layout};
use std::cell::RefCell;
use std::collections::HashMap;

use crate::error::{AllocError, AllocErrorKind, AllocResult};
use crate::traits::{MemoryUsage, Resettable};
use crate::utils::MAX_ALIGN;

pub(crate) struct SimpleAllocator {
    live: RefCell<HashMap<usize, Layout>>,
}

impl SimpleAllocator {
    pub(crate) fn new() -> Self {
        Self { live: RefCell::new(HashMap::new()) }
    }

    fn layout_for(n: usize) -> Layout {
        // SAFETY: MAX_ALIGN is a small power of two and n is validated by
        // callers against `ExceedsMaxSize` before reaching here.
        Layout::from_size_align(n.max(1), MAX_ALIGN).expect("valid layout")
    }

    pub(crate) fn try_alloc(&self, n: usize) -> AllocResult<*mut u8> {
        if n == 0 {
            return Ok(std::ptr::NonNull::<u8>::dangling().as_ptr());
        }
        let layout = Self::layout_for(n);
        // SAFETY: layout has non-zero size.
        let ptr = unsafe { alloc::alloc(layout) };
        if ptr.is_null() {
            return Err(AllocError::with_size(AllocErrorKind::OutOfMemory, n));
        }
        self.live.borrow_mut().insert(ptr as usize, layout);
        Ok(ptr)
    }

    pub(crate) fn try_alloc0(&self, n: usize) -> AllocResult<*mut u8> {
        let ptr = self.try_alloc(n)?;
        if n > 0 {
            // SAFETY: freshly allocated region of `n` bytes.
            unsafe { std::ptr::write_bytes(ptr, 0, n) };
        }
        Ok(ptr)
    }

    pub(crate) fn try_realloc(&self, ptr: *mut u8, new_size: usize) -> AllocResult<*mut u8> {
        if ptr == std::ptr::NonNull::<u8>::dangling().as_ptr() {
            return self.try_alloc(new_size);
        }
        let old_layout = *self
            .live
            .borrow()
            .get(&(ptr as usize))
            .ok_or_else(|| AllocError::with_addr(AllocErrorKind::ForeignPointer, ptr as usize))?;
        if new_size == 0 {
            self.free(ptr);
            return Ok(std::ptr::NonNull::<u8>::dangling().as_ptr());
        }
        let new_layout = Self::layout_for(new_size);
        // SAFETY: `old_layout` is exactly the layout this pointer was
        // allocated with (tracked in `live`), and `new_layout.size() > 0`.
        let new_ptr = unsafe { alloc::realloc(ptr, old_layout, new_layout.size()) };
        if new_ptr.is_null() {
            return Err(AllocError::with_size(AllocErrorKind::OutOfMemory, new_size));
        }
        let mut live = self.live.borrow_mut();
        live.remove(&(ptr as usize));
        live.insert(new_ptr as usize, new_layout);
        Ok(new_ptr)
    }

    pub(crate) fn free(&self, ptr: *mut u8) {
        if ptr == std::ptr::NonNull::<u8>::dangling().as_ptr() {
            return;
        }
        if let Some(layout) = self.live.borrow_mut().remove(&(ptr as usize)) {
            // SAFETY: `layout` matches the tracked allocation exactly.
            unsafe { alloc::dealloc(ptr, layout) };
        }
    }

    pub(crate) fn free_all(&self) {
        let mut live = self.live.borrow_mut();
        for (addr, layout) in live.drain() {
            // SAFETY: every entry was inserted with its exact alloc layout.
            unsafe { alloc::dealloc(addr as *mut u8, layout) };
        }
    }

    pub(crate) fn gc(&self) {
        // No reclaimable side storage; alloc/free already round-trip
        // through the system allocator.
    }
}

impl Resettable for SimpleAllocator {
    unsafe fn reset(&self) {
        self.free_all();
    }
}

impl MemoryUsage for SimpleAllocator {
    fn used_bytes(&self) -> usize {
        self.live.borrow().values().map(|l| l.size()).sum()
    }

    fn reserved_bytes(&self) -> usize {
        self.used_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alloc_then_free_untracks() {
        let a = SimpleAllocator::new();
        let p = a.try_alloc(64).unwrap();
        assert_eq!(a.used_bytes(), 64);
        a.free(p);
        assert_eq!(a.used_bytes(), 0);
    }

    #[test]
    fn free_all_clears_everything() {
        let a = SimpleAllocator::new();
        for _ in 0..10 {
            a.try_alloc(32).unwrap();
        }
        assert_eq!(a.used_bytes(), 320);
        a.free_all();
        assert_eq!(a.used_bytes(), 0);
    }

    #[test]
    fn realloc_preserves_prefix() {
        let a = SimpleAllocator::new();
        let p = a.try_alloc(4).unwrap();
        unsafe { std::ptr::copy_nonoverlapping(b"abcd".as_ptr(), p, 4) };
        let q = a.try_realloc(p, 8).unwrap();
        let bytes = unsafe { std::slice::from_raw_parts(q, 4) };
        assert_eq!(bytes, b"abcd");
    }
}
