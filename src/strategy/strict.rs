//! STRICT strategy: canary-guarded debug allocator.
//!
//! Every allocation is wrapped with guard bytes before and after the
//! user region. `check_canaries` (invoked on every `free`, `realloc`,
//! `free_all`, and `destroy`) detects buffer overruns; freed memory is
//! poisoned and a double free is detected the same way a foreign
//! pointer is, via the `live` map lookup. Both are treated as fatal.

use std::cell::RefCell;
use std::collections::HashMap;

use crate::error::{AllocError, AllocErrorKind, AllocResult};
use crate::traits::{MemoryUsage, Resettable};
use crate::utils::{align_up, MAX_ALIGN};

const CANARY_LEN: usize = 8;
const CANARY_BYTE_FRONT: u8 = 0xFA;
const CANARY_BYTE_BACK: u8 = 0xFB;
const POISON_BYTE: u8 = 0xDD;

struct Guarded {
    /// Owning allocation: `[front canary][user region][back canary]`.
    buf: Box<[u8]>,
    user_len: usize,
}

impl Guarded {
    fn new(n: usize) -> Self {
        let total = CANARY_LEN + n + CANARY_LEN;
        let mut buf = vec![0u8; total].into_boxed_slice();
        buf[..CANARY_LEN].fill(CANARY_BYTE_FRONT);
        buf[CANARY_LEN + n..].fill(CANARY_BYTE_BACK);
        Self { buf, user_len: n }
    }

    fn user_ptr(&self) -> *mut u8 {
        unsafe { (self.buf.as_ptr() as *mut u8).add(CANARY_LEN) }
    }

    fn check(&self) -> Result<(), AllocErrorKind> {
        let front_ok = self.buf[..CANARY_LEN].iter().all(|&b| b == CANARY_BYTE_FRONT);
        let back_ok = self.buf[CANARY_LEN + self.user_len..].iter().all(|&b| b == CANARY_BYTE_BACK);
        if front_ok && back_ok {
            Ok(())
        } else {
            Err(AllocErrorKind::CanaryViolation)
        }
    }

    fn poison(&mut self) {
        self.buf[CANARY_LEN..CANARY_LEN + self.user_len].fill(POISON_BYTE);
    }
}

pub(crate) struct StrictAllocator {
    live: RefCell<HashMap<usize, Guarded>>,
}

impl StrictAllocator {
    pub(crate) fn new() -> Self {
        Self { live: RefCell::new(HashMap::new()) }
    }

    /// Walks every live allocation's canaries, aborting on the first
    /// mismatch found. Also called before any operation that could itself
    /// observe corruption, so a wild write is attributed to the call after
    /// it happened rather than surfacing arbitrarily later.
    pub(crate) fn check_canaries(&self) -> AllocResult<()> {
        for guarded in self.live.borrow().values() {
            if let Err(kind) = guarded.check() {
                AllocError::new(kind).abort();
            }
        }
        Ok(())
    }

    pub(crate) fn try_alloc(&self, n: usize) -> AllocResult<*mut u8> {
        self.check_canaries()?;
        if n == 0 {
            return Ok(std::ptr::NonNull::<u8>::dangling().as_ptr());
        }
        let aligned = align_up(n, MAX_ALIGN);
        let guarded = Guarded::new(aligned);
        let ptr = guarded.user_ptr();
        self.live.borrow_mut().insert(ptr as usize, guarded);
        Ok(ptr)
    }

    pub(crate) fn try_alloc0(&self, n: usize) -> AllocResult<*mut u8> {
        // Guarded::new already zero-initializes the user region via `vec!`.
        self.try_alloc(n)
    }

    pub(crate) fn try_realloc(&self, ptr: *mut u8, new_size: usize) -> AllocResult<*mut u8> {
        self.check_canaries()?;
        if ptr == std::ptr::NonNull::<u8>::dangling().as_ptr() {
            return self.try_alloc(new_size);
        }
        if new_size == 0 {
            self.free(ptr);
            return Ok(std::ptr::NonNull::<u8>::dangling().as_ptr());
        }
        let old_len = {
            let live = self.live.borrow();
            let guarded = live
                .get(&(ptr as usize))
                .unwrap_or_else(|| AllocError::with_addr(AllocErrorKind::ForeignPointer, ptr as usize).abort());
            guarded.user_len
        };
        let new_ptr = self.try_alloc(new_size)?;
        unsafe { std::ptr::copy_nonoverlapping(ptr, new_ptr, old_len.min(new_size)) };
        self.free(ptr);
        Ok(new_ptr)
    }

    pub(crate) fn free(&self, ptr: *mut u8) {
        let _ = self.check_canaries();
        if ptr == std::ptr::NonNull::<u8>::dangling().as_ptr() {
            return;
        }
        let mut live = self.live.borrow_mut();
        match live.remove(&(ptr as usize)) {
            Some(mut guarded) => {
                guarded.poison();
            }
            // A pointer this allocator never produced, or one already
            // freed: both are use-after-free-class bugs in the caller and
            // are treated as fatal, matching a canary violation.
            None => AllocError::with_addr(AllocErrorKind::ForeignPointer, ptr as usize).abort(),
        }
    }

    pub(crate) fn free_all(&self) {
        let _ = self.check_canaries();
        self.live.borrow_mut().clear();
    }

    pub(crate) fn gc(&self) {
        // Every live allocation is already its own heap object; there is
        // no side storage to compact.
    }
}

impl Resettable for StrictAllocator {
    unsafe fn reset(&self) {
        self.free_all();
    }
}

impl MemoryUsage for StrictAllocator {
    fn used_bytes(&self) -> usize {
        self.live.borrow().values().map(|g| g.user_len).sum()
    }

    fn reserved_bytes(&self) -> usize {
        self.live.borrow().values().map(|g| g.buf.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alloc_then_free_round_trips() {
        let a = StrictAllocator::new();
        let p = a.try_alloc(32).unwrap();
        a.free(p);
    }

    #[test]
    #[should_panic(expected = "canary")]
    fn buffer_overrun_past_the_end_is_fatal() {
        let a = StrictAllocator::new();
        let p = a.try_alloc(16).unwrap();
        unsafe { std::ptr::write_bytes(p.add(16), 0x41, 1) };
        a.free(p);
    }

    #[test]
    #[should_panic(expected = "not owned")]
    fn double_free_is_fatal() {
        let a = StrictAllocator::new();
        let p = a.try_alloc(16).unwrap();
        a.free(p);
        a.free(p);
    }

    #[test]
    fn realloc_preserves_prefix_and_rechecks_canaries() {
        let a = StrictAllocator::new();
        let p = a.try_alloc(4).unwrap();
        unsafe { std::ptr::copy_nonoverlapping(b"abcd".as_ptr(), p, 4) };
        let q = a.try_realloc(p, 8).unwrap();
        let bytes = unsafe { std::slice::from_raw_parts(q, 4) };
        assert_eq!(bytes, b"abcd");
    }
}
