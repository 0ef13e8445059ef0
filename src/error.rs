//! Error types for allocation and container operations.
//!
//! Mirrors the diagnostic-rich `AllocError` used throughout the allocator
//! stack this crate is built from: a small closed set of error kinds, an
//! optional size/context payload, and a `Display` impl suitable for
//! fatal-abort diagnostics. OOM and canary corruption are never
//! recoverable; see [`AllocError::abort`].

use std::fmt;

/// The specific kind of allocation failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AllocErrorKind {
    /// The system allocator could not satisfy the request.
    OutOfMemory,
    /// A size computation (e.g. `count * element_size`) overflowed.
    SizeOverflow,
    /// The requested alignment was not a power of two.
    InvalidAlignment,
    /// The request exceeds this allocator's maximum supported size.
    ExceedsMaxSize,
    /// A canary guard region (STRICT strategy) did not match its expected
    /// pattern — indicates a buffer overrun, underrun, or double free.
    CanaryViolation,
    /// A pointer was passed to `free`/`realloc` that this allocator did
    /// not issue.
    ForeignPointer,
    /// The handle was used after `destroy` released its memory.
    UseAfterDestroy,
}

impl AllocErrorKind {
    /// Whether this error kind must abort the process rather than be
    /// returned to the caller: OOM and canary corruption are
    /// programmer/system failures, not recoverable conditions.
    pub const fn is_fatal(self) -> bool {
        matches!(
            self,
            AllocErrorKind::OutOfMemory
                | AllocErrorKind::CanaryViolation
                | AllocErrorKind::ForeignPointer
                | AllocErrorKind::UseAfterDestroy
        )
    }
}

impl fmt::Display for AllocErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AllocErrorKind::OutOfMemory => "out of memory",
            AllocErrorKind::SizeOverflow => "size computation overflowed",
            AllocErrorKind::InvalidAlignment => "alignment is not a power of two",
            AllocErrorKind::ExceedsMaxSize => "exceeds maximum allocation size",
            AllocErrorKind::CanaryViolation => "canary guard corrupted",
            AllocErrorKind::ForeignPointer => "pointer not owned by this allocator",
            AllocErrorKind::UseAfterDestroy => "allocator used after destroy",
        };
        f.write_str(s)
    }
}

/// An allocation or container error.
///
/// `size`/`addr` are populated opportunistically for diagnostics; neither
/// is guaranteed to be present for every kind.
#[derive(Debug, Clone, thiserror::Error)]
#[error("wmem: {kind}{}{}", size.map(|s| format!(", size={s}")).unwrap_or_default(), addr.map(|a| format!(", addr={a:#x}")).unwrap_or_default())]
pub struct AllocError {
    pub kind: AllocErrorKind,
    pub size: Option<usize>,
    pub addr: Option<usize>,
}

impl AllocError {
    pub fn new(kind: AllocErrorKind) -> Self {
        Self { kind, size: None, addr: None }
    }

    pub fn with_size(kind: AllocErrorKind, size: usize) -> Self {
        Self { kind, size: Some(size), addr: None }
    }

    pub fn with_addr(kind: AllocErrorKind, addr: usize) -> Self {
        Self { kind, size: None, addr: Some(addr) }
    }

    /// Terminates the process with a diagnostic. Used for the fatal error
    /// kinds (OOM, canary corruption, foreign-pointer free) that are
    /// programmer bugs or system exhaustion with no recovery path, so this
    /// is the only way callers observe them.
    #[cold]
    #[track_caller]
    pub fn abort(self) -> ! {
        #[cfg(feature = "logging")]
        tracing::error!(kind = %self.kind, size = ?self.size, addr = ?self.addr, "fatal wmem error");
        panic!("wmem: fatal error: {self}");
    }
}

/// Result type for fallible (non-fatal) allocation operations.
pub type AllocResult<T> = Result<T, AllocError>;
