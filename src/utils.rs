//! Small alignment and pointer helpers shared by the allocator strategies,
//! plus the `memdup`/`strdup`/`strdup_printf` convenience layer.

use std::ffi::CString;

use cfg_if::cfg_if;

use crate::handle::WmemAllocator;

/// Maximum scalar alignment this crate guarantees for every allocation:
/// sufficient for any primitive type.
pub const MAX_ALIGN: usize = 16;

/// Rounds `value` up to the next multiple of `alignment`.
///
/// # Examples
/// ```
/// use wmem::utils::align_up;
/// assert_eq!(align_up(7, 8), 8);
/// assert_eq!(align_up(8, 8), 8);
/// assert_eq!(align_up(9, 8), 16);
/// ```
#[inline(always)]
pub const fn align_up(value: usize, alignment: usize) -> usize {
    debug_assert!(alignment.is_power_of_two());
    (value + alignment - 1) & !(alignment - 1)
}

/// Returns `true` if `value` is a power of two (zero is not).
#[inline(always)]
pub const fn is_power_of_two(value: usize) -> bool {
    value != 0 && (value & (value - 1)) == 0
}

/// Rounds `value` up to the next power of two. `0` rounds to `1`.
#[inline]
pub const fn next_power_of_two(mut value: usize) -> usize {
    if value <= 1 {
        return 1;
    }
    value -= 1;
    value |= value >> 1;
    value |= value >> 2;
    value |= value >> 4;
    value |= value >> 8;
    value |= value >> 16;
    cfg_if! {
        if #[cfg(target_pointer_width = "64")] {
            value |= value >> 32;
        }
    }
    value + 1
}

/// Copies `n` bytes from `src` into a fresh allocation in `allocator`.
///
/// Mirrors wmem's `wmem_memdup`. Returns a dangling 1-aligned pointer (no
/// allocation performed) when `n == 0`, consistent with the zero-size
/// convention chosen for `alloc` (see DESIGN.md).
pub fn memdup(allocator: &WmemAllocator, src: &[u8]) -> *mut u8 {
    let dst = allocator.alloc(src.len());
    if !src.is_empty() {
        // SAFETY: `dst` is freshly allocated for exactly `src.len()` bytes
        // and does not overlap `src`.
        unsafe {
            std::ptr::copy_nonoverlapping(src.as_ptr(), dst, src.len());
        }
    }
    dst
}

/// Duplicates a Rust string into a NUL-terminated buffer owned by
/// `allocator`. Mirrors wmem's `wmem_strdup`.
pub fn strdup(allocator: &WmemAllocator, s: &str) -> *mut std::os::raw::c_char {
    let c = CString::new(s).unwrap_or_else(|_| CString::new("").unwrap());
    let bytes = c.as_bytes_with_nul();
    let dst = allocator.alloc(bytes.len());
    unsafe {
        std::ptr::copy_nonoverlapping(bytes.as_ptr(), dst, bytes.len());
        dst.cast()
    }
}

/// Formats like `format!` and duplicates the result into `allocator`.
/// Mirrors wmem's `wmem_strdup_printf`.
pub fn strdup_printf(
    allocator: &WmemAllocator,
    args: std::fmt::Arguments<'_>,
) -> *mut std::os::raw::c_char {
    strdup(allocator, &std::fmt::format(args))
}

/// Like [`strdup_printf`] but takes a pre-formatted string; provided for
/// call sites that already built the string (most Rust callers will).
pub fn strdup_printf_str(allocator: &WmemAllocator, s: &str) -> *mut std::os::raw::c_char {
    strdup(allocator, s)
}
