//! Growable, always-NUL-terminated UTF-8 string buffer.

use crate::handle::WmemAllocator;

/// A byte buffer that is always NUL-terminated internally, grown
/// geometrically. Embedded NULs written via [`Self::append_len`] are
/// preserved; [`Self::get_str`] still reports the buffer up to
/// [`Self::get_len`], not the first embedded NUL.
pub struct StringBuilder<'a> {
    allocator: &'a WmemAllocator,
    ptr: *mut u8,
    len: usize,
    capacity: usize,
}

impl<'a> StringBuilder<'a> {
    pub fn new(allocator: &'a WmemAllocator) -> Self {
        let capacity = 16;
        let ptr = allocator.alloc0(capacity);
        Self { allocator, ptr, len: 0, capacity }
    }

    fn grow_to_fit(&mut self, wanted_len: usize) {
        let needed = wanted_len + 1; // always room for the trailing NUL
        if needed <= self.capacity {
            return;
        }
        let mut new_capacity = self.capacity.max(1);
        while new_capacity < needed {
            new_capacity *= 2;
        }
        self.ptr = self.allocator.realloc(self.ptr, new_capacity);
        self.capacity = new_capacity;
    }

    fn write_nul_terminator(&mut self) {
        unsafe { self.ptr.add(self.len).write(0) };
    }

    pub fn append_len(&mut self, bytes: &[u8]) {
        if bytes.is_empty() {
            return;
        }
        self.grow_to_fit(self.len + bytes.len());
        unsafe {
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), self.ptr.add(self.len), bytes.len());
        }
        self.len += bytes.len();
        self.write_nul_terminator();
    }

    pub fn append(&mut self, s: &str) {
        self.append_len(s.as_bytes());
    }

    pub fn append_c(&mut self, byte: u8) {
        self.append_len(&[byte]);
    }

    pub fn append_c_count(&mut self, byte: u8, count: usize) {
        self.grow_to_fit(self.len + count);
        unsafe { std::ptr::write_bytes(self.ptr.add(self.len), byte, count) };
        self.len += count;
        self.write_nul_terminator();
    }

    pub fn append_printf(&mut self, args: std::fmt::Arguments<'_>) {
        self.append(&std::fmt::format(args));
    }

    /// Encodes `cp` as UTF-8 and appends it.
    pub fn append_unichar(&mut self, cp: char) {
        let mut buf = [0u8; 4];
        self.append(cp.encode_utf8(&mut buf));
    }

    /// Shrinks the length to `min(k, current)`. Never grows.
    pub fn truncate(&mut self, k: usize) {
        self.len = self.len.min(k);
        self.write_nul_terminator();
    }

    /// Returns the written bytes, up to [`Self::get_len`] — not the first
    /// embedded NUL, if any.
    pub fn get_str(&self) -> &[u8] {
        unsafe { std::slice::from_raw_parts(self.ptr, self.len) }
    }

    pub fn get_len(&self) -> usize {
        self.len
    }

    /// Validates the written bytes as UTF-8. On success returns `(true,
    /// len)`; on failure returns `(false, offset)` where `offset` is the
    /// byte position of the first invalid sequence. Embedded NULs are
    /// valid UTF-8 and do not affect the result.
    pub fn utf8_validate(&self) -> (bool, usize) {
        match std::str::from_utf8(self.get_str()) {
            Ok(_) => (true, self.len),
            Err(e) => (false, e.valid_up_to()),
        }
    }
}

impl Drop for StringBuilder<'_> {
    fn drop(&mut self) {
        self.allocator.free(self.ptr);
    }
}
