//! wmem: a scoped, region-based memory manager with pluggable allocator
//! strategies, plus a companion library of memory-managed containers.
//!
//! Obtain a [`WmemAllocator`] of one of four strategies
//! ([`config::Strategy`]), allocate raw buffers through it or build
//! containers rooted in it, then release everything at once with
//! [`WmemAllocator::free_all`] or [`WmemAllocator::destroy`].
//!
//! ```
//! use wmem::{config::Strategy, WmemAllocator};
//!
//! let allocator = WmemAllocator::new(Strategy::Block);
//! let ptr = allocator.alloc(64);
//! allocator.free(ptr);
//! allocator.free_all();
//! ```

pub mod callback;
pub mod config;
pub mod container;
pub mod error;
mod handle;
mod strategy;
pub mod traits;
pub mod utils;

pub use callback::{CallbackEvent, CallbackId};
pub use config::Strategy;
pub use error::{AllocError, AllocErrorKind, AllocResult};
pub use handle::WmemAllocator;

/// One-time process lifecycle hook; see [`config::init`].
pub fn init() {
    config::init();
}

/// Process shutdown hook; see [`config::cleanup`].
pub fn cleanup() {
    config::cleanup();
}
