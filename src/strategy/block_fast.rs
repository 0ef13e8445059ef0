//! BLOCK_FAST strategy: a pure bump allocator.
//!
//! Individual `free` is a no-op — the only way to reclaim memory is
//! `free_all`/`destroy`. This trades per-block granularity for
//! allocation speed, matching workloads that allocate many small,
//! short-lived objects and discard them all together (e.g. per-packet
//! dissection scratch space).

use std::cell::RefCell;
use std::collections::HashMap;

use crate::error::AllocResult;
use crate::traits::{MemoryUsage, Resettable};
use crate::utils::{align_up, MAX_ALIGN};

const CHUNK_SIZE: usize = 128 * 1024;
const JUMBO_THRESHOLD: usize = CHUNK_SIZE / 2;

struct Chunk {
    storage: Box<[u8]>,
    offset: usize,
}

impl Chunk {
    fn new(capacity: usize) -> Self {
        Self { storage: vec![0u8; capacity].into_boxed_slice(), offset: 0 }
    }

    fn capacity(&self) -> usize {
        self.storage.len()
    }

    fn remaining(&self) -> usize {
        self.capacity() - self.offset
    }

    fn bump(&mut self, size: usize) -> *mut u8 {
        let ptr = unsafe { self.storage.as_mut_ptr().add(self.offset) };
        self.offset += size;
        ptr
    }
}

pub(crate) struct BlockFastAllocator {
    chunks: RefCell<Vec<Chunk>>,
    jumbo: RefCell<HashMap<usize, Box<[u8]>>>,
    /// Sizes of live jumbo allocations, so `realloc` knows how many bytes
    /// are safe to copy out of the old pointer. Like `block_sizes`, only
    /// cleared in bulk by `free_all` — `free` never removes an entry.
    jumbo_live: RefCell<HashMap<usize, usize>>,
    /// Sizes of block-backed allocations, kept only so `realloc` knows how
    /// many bytes are safe to copy out of the old pointer — block
    /// allocations are never individually freed, so entries here are only
    /// cleared in bulk by `free_all`.
    block_sizes: RefCell<HashMap<usize, usize>>,
}

impl BlockFastAllocator {
    pub(crate) fn new() -> Self {
        Self {
            chunks: RefCell::new(Vec::new()),
            jumbo: RefCell::new(HashMap::new()),
            jumbo_live: RefCell::new(HashMap::new()),
            block_sizes: RefCell::new(HashMap::new()),
        }
    }

    pub(crate) fn try_alloc(&self, n: usize) -> AllocResult<*mut u8> {
        if n == 0 {
            return Ok(std::ptr::NonNull::<u8>::dangling().as_ptr());
        }
        let size = align_up(n, MAX_ALIGN);

        if size >= JUMBO_THRESHOLD {
            let buf = vec![0u8; size].into_boxed_slice();
            let ptr = buf.as_ptr() as *mut u8;
            let addr = ptr as usize;
            self.jumbo.borrow_mut().insert(addr, buf);
            self.jumbo_live.borrow_mut().insert(addr, size);
            return Ok(ptr);
        }

        let mut chunks = self.chunks.borrow_mut();
        if chunks.last().map_or(true, |c| c.remaining() < size) {
            chunks.push(Chunk::new(CHUNK_SIZE.max(size)));
        }
        let ptr = chunks.last_mut().unwrap().bump(size);
        drop(chunks);
        self.block_sizes.borrow_mut().insert(ptr as usize, size);
        Ok(ptr)
    }

    pub(crate) fn try_alloc0(&self, n: usize) -> AllocResult<*mut u8> {
        // Freshly bumped chunks are always zeroed (allocated via `vec!`)
        // and never reused before `free_all` resets their offset, so no
        // extra zeroing work is needed for the chunked path; jumbo
        // allocations are likewise fresh.
        self.try_alloc(n)
    }

    pub(crate) fn free(&self, _ptr: *mut u8) {
        // No-op for every pointer, jumbo or block-backed: BLOCK_FAST only
        // reclaims memory in bulk, via free_all.
    }

    pub(crate) fn try_realloc(&self, ptr: *mut u8, new_size: usize) -> AllocResult<*mut u8> {
        if ptr == std::ptr::NonNull::<u8>::dangling().as_ptr() {
            return self.try_alloc(new_size);
        }
        if new_size == 0 {
            return Ok(std::ptr::NonNull::<u8>::dangling().as_ptr());
        }
        let old_size = self
            .jumbo_live
            .borrow()
            .get(&(ptr as usize))
            .copied()
            .or_else(|| self.block_sizes.borrow().get(&(ptr as usize)).copied())
            .unwrap_or(0);
        let new_ptr = self.try_alloc(new_size)?;
        unsafe { std::ptr::copy_nonoverlapping(ptr, new_ptr, old_size.min(new_size)) };
        // The old buffer, jumbo or block-backed, is leaked until free_all.
        Ok(new_ptr)
    }

    pub(crate) fn free_all(&self) {
        for chunk in self.chunks.borrow_mut().iter_mut() {
            chunk.offset = 0;
        }
        self.jumbo.borrow_mut().clear();
        self.jumbo_live.borrow_mut().clear();
        self.block_sizes.borrow_mut().clear();
    }

    pub(crate) fn gc(&self) {
        // Bump chunks have no free-list to compact; trailing chunks with
        // offset 0 (entirely unused since the last free_all) can be
        // dropped, keeping at least one in reserve.
        let mut chunks = self.chunks.borrow_mut();
        while chunks.len() > 1 && chunks.last().map_or(false, |c| c.offset == 0) {
            chunks.pop();
        }
    }

    pub(crate) fn chunk_count(&self) -> usize {
        self.chunks.borrow().len()
    }
}

impl Resettable for BlockFastAllocator {
    unsafe fn reset(&self) {
        self.free_all();
    }
}

impl MemoryUsage for BlockFastAllocator {
    fn used_bytes(&self) -> usize {
        let chunks: usize = self.chunks.borrow().iter().map(|c| c.offset).sum();
        let jumbo: usize = self.jumbo_live.borrow().values().sum();
        chunks + jumbo
    }

    fn reserved_bytes(&self) -> usize {
        let chunks: usize = self.chunks.borrow().iter().map(|c| c.capacity()).sum();
        let jumbo: usize = self.jumbo_live.borrow().values().sum();
        chunks + jumbo
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bump_allocates_contiguously_within_a_chunk() {
        let a = BlockFastAllocator::new();
        let p1 = a.try_alloc(16).unwrap();
        let p2 = a.try_alloc(16).unwrap();
        assert_eq!(p2 as usize - p1 as usize, 16);
    }

    #[test]
    fn free_is_a_noop_for_block_allocations() {
        let a = BlockFastAllocator::new();
        let p = a.try_alloc(64).unwrap();
        a.free(p);
        assert_eq!(a.used_bytes(), 64);
    }

    #[test]
    fn free_all_resets_bump_offsets() {
        let a = BlockFastAllocator::new();
        for _ in 0..100 {
            a.try_alloc(64).unwrap();
        }
        let chunk_count = a.chunk_count();
        a.free_all();
        assert_eq!(a.used_bytes(), 0);
        for _ in 0..100 {
            a.try_alloc(64).unwrap();
        }
        assert_eq!(a.chunk_count(), chunk_count);
    }

    #[test]
    fn free_is_a_noop_for_jumbo_allocations() {
        let a = BlockFastAllocator::new();
        let p = a.try_alloc(1024 * 1024).unwrap();
        assert_eq!(a.used_bytes(), 1024 * 1024);
        a.free(p);
        assert_eq!(a.used_bytes(), 1024 * 1024);
        a.free_all();
        assert_eq!(a.used_bytes(), 0);
    }
}
