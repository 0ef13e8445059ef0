//! Growable, fixed-element-size array over an allocator handle.

use crate::handle::WmemAllocator;

/// A contiguous, geometrically-growing buffer of `T`, allocated from a
/// [`WmemAllocator`]. `T` must be plain old data: the array copies
/// elements byte-wise, never running destructors on removal (there is
/// no removal — elements are only appended, indexed, or discarded
/// wholesale with the allocator).
pub struct Array<'a, T: Copy> {
    allocator: &'a WmemAllocator,
    ptr: *mut T,
    len: usize,
    capacity: usize,
    /// When set, one extra zeroed `T` is always kept one-past-`len`, for
    /// C-string-like consumers that expect a terminator.
    null_terminated: bool,
}

impl<'a, T: Copy + Default> Array<'a, T> {
    /// Creates an empty array that grows geometrically starting from
    /// `capacity_hint` (rounded up to at least 1).
    pub fn new(allocator: &'a WmemAllocator, capacity_hint: usize) -> Self {
        Self::with_options(allocator, capacity_hint, false)
    }

    /// Like [`Self::new`], but keeps a zeroed terminator element one past
    /// the last appended element at all times.
    pub fn new_null_terminated(allocator: &'a WmemAllocator, capacity_hint: usize) -> Self {
        Self::with_options(allocator, capacity_hint, true)
    }

    fn with_options(allocator: &'a WmemAllocator, capacity_hint: usize, null_terminated: bool) -> Self {
        let capacity = capacity_hint.max(1) + usize::from(null_terminated);
        let ptr = allocator.alloc0(capacity * std::mem::size_of::<T>()) as *mut T;
        Self { allocator, ptr, len: 0, capacity, null_terminated }
    }

    fn reserved_len(&self) -> usize {
        self.len + usize::from(self.null_terminated)
    }

    fn grow_to_fit(&mut self, wanted_len: usize) {
        let needed = wanted_len + usize::from(self.null_terminated);
        if needed <= self.capacity {
            return;
        }
        let mut new_capacity = self.capacity.max(1);
        while new_capacity < needed {
            new_capacity *= 2;
        }
        let new_ptr = self
            .allocator
            .realloc(self.ptr as *mut u8, new_capacity * std::mem::size_of::<T>()) as *mut T;
        // SAFETY: the newly extended tail is uninitialized bytes from
        // `realloc`; zero it so a null terminator or future `get_raw`
        // reads never observe stale garbage.
        unsafe {
            let tail_start = new_ptr.add(self.capacity);
            std::ptr::write_bytes(tail_start, 0, new_capacity - self.capacity);
        }
        self.ptr = new_ptr;
        self.capacity = new_capacity;
    }

    /// Appends a single element.
    pub fn append_one(&mut self, value: T) {
        self.grow_to_fit(self.len + 1);
        // SAFETY: `grow_to_fit` guaranteed room for `len + 1` elements.
        unsafe { self.ptr.add(self.len).write(value) };
        self.len += 1;
        if self.null_terminated {
            unsafe { self.ptr.add(self.len).write(T::default()) };
        }
    }

    /// Appends `src` in order.
    pub fn append(&mut self, src: &[T]) {
        if src.is_empty() {
            return;
        }
        self.grow_to_fit(self.len + src.len());
        // SAFETY: `grow_to_fit` guaranteed room for `len + src.len()`.
        unsafe {
            std::ptr::copy_nonoverlapping(src.as_ptr(), self.ptr.add(self.len), src.len());
        }
        self.len += src.len();
        if self.null_terminated {
            unsafe { self.ptr.add(self.len).write(T::default()) };
        }
    }

    /// Returns the element at `i`. Panics if `i >= get_count()`: an
    /// out-of-range index is a programmer bug, not a recoverable
    /// condition.
    pub fn index(&self, i: usize) -> T {
        assert!(i < self.len, "array index {i} out of bounds (len {})", self.len);
        unsafe { *self.ptr.add(i) }
    }

    /// Returns `Some(element)` at `i`, or `None` if out of range: the
    /// non-fatal counterpart to [`Self::index`].
    pub fn try_index(&self, i: usize) -> Option<T> {
        if i < self.len {
            Some(unsafe { *self.ptr.add(i) })
        } else {
            None
        }
    }

    pub fn get_count(&self) -> usize {
        self.len
    }

    /// Returns the backing buffer as a slice of the elements currently in
    /// use (including the terminator element, if any).
    pub fn get_raw(&self) -> &[T] {
        // SAFETY: `[0, reserved_len())` is always initialized.
        unsafe { std::slice::from_raw_parts(self.ptr, self.reserved_len()) }
    }

    /// Sorts the array in place using `cmp`.
    pub fn sort(&mut self, cmp: impl FnMut(&T, &T) -> std::cmp::Ordering) {
        // SAFETY: `[0, len)` is initialized and exclusively borrowed here.
        let slice = unsafe { std::slice::from_raw_parts_mut(self.ptr, self.len) };
        slice.sort_by(cmp);
    }
}

impl<T: Copy> Drop for Array<'_, T> {
    fn drop(&mut self) {
        self.allocator.free(self.ptr as *mut u8);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Strategy;

    #[test]
    fn append_then_index_round_trips() {
        let a = WmemAllocator::force_new(Strategy::Simple);
        let mut arr: Array<i32> = Array::new(&a, 4);
        for v in 0..10 {
            arr.append_one(v);
        }
        assert_eq!(arr.get_count(), 10);
        assert_eq!(arr.index(9), 9);
        assert_eq!(arr.try_index(10), None);
    }

    #[test]
    fn append_slice_grows_geometrically() {
        let a = WmemAllocator::force_new(Strategy::Simple);
        let mut arr: Array<u8> = Array::new(&a, 2);
        arr.append(&[1, 2, 3, 4, 5]);
        assert_eq!(arr.get_raw(), &[1, 2, 3, 4, 5]);
    }

    #[test]
    fn null_terminated_array_keeps_zero_past_the_end() {
        let a = WmemAllocator::force_new(Strategy::Simple);
        let mut arr: Array<u8> = Array::new_null_terminated(&a, 2);
        arr.append(b"hi");
        assert_eq!(arr.get_raw(), &[b'h', b'i', 0]);
    }

    #[test]
    fn sort_orders_elements() {
        let a = WmemAllocator::force_new(Strategy::Simple);
        let mut arr: Array<i32> = Array::new(&a, 4);
        arr.append(&[5, 3, 1, 4, 2]);
        arr.sort(|x, y| x.cmp(y));
        assert_eq!(arr.get_raw(), &[1, 2, 3, 4, 5]);
    }
}
