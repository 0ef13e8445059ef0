//! Allocator strategy selection, environment override, and process
//! lifecycle hooks.

use once_cell::sync::OnceCell;

/// Which allocation strategy backs a given [`WmemAllocator`](crate::WmemAllocator).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Strategy {
    /// Tracks every live block individually; baseline reference strategy.
    Simple,
    /// Chunked, free-list-managed sub-blocks with coalescing; the workhorse.
    Block,
    /// Bump allocator with no per-block free.
    BlockFast,
    /// Canary-guarded debug strategy; detects overruns and double frees.
    Strict,
}

impl Strategy {
    fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "simple" => Some(Strategy::Simple),
            "block" => Some(Strategy::Block),
            "block_fast" | "block-fast" | "blockfast" => Some(Strategy::BlockFast),
            "strict" => Some(Strategy::Strict),
            _ => None,
        }
    }
}

/// Name of the environment variable that can force every
/// [`WmemAllocator::new`](crate::WmemAllocator::new) call to return a
/// chosen strategy, used for fuzzing the whole host program under STRICT.
pub const OVERRIDE_ENV_VAR: &str = "WMEM_DEBUG_ALLOCATOR";

static OVERRIDE: OnceCell<Option<Strategy>> = OnceCell::new();
static INITIALIZED: OnceCell<()> = OnceCell::new();

/// One-time initialization of the wmem subsystem. Reads
/// [`OVERRIDE_ENV_VAR`] once; subsequent changes to the environment
/// variable have no effect for the lifetime of the process. Idempotent —
/// safe to call more than once.
pub fn init() {
    INITIALIZED.get_or_init(|| {
        let _ = OVERRIDE.get_or_init(|| {
            std::env::var(OVERRIDE_ENV_VAR)
                .ok()
                .and_then(|v| Strategy::parse(&v))
        });
    });
}

/// Process shutdown hook. Symmetric with [`init`]; currently a no-op since
/// this crate holds no global allocations, kept for API parity with the
/// source it was distilled from.
pub fn cleanup() {}

/// Returns the strategy override configured via [`OVERRIDE_ENV_VAR`], if
/// any. Returns `None` before [`init`] has run.
pub(crate) fn override_strategy() -> Option<Strategy> {
    OVERRIDE.get().copied().flatten()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_strategy_names() {
        assert_eq!(Strategy::parse("strict"), Some(Strategy::Strict));
        assert_eq!(Strategy::parse("Block"), Some(Strategy::Block));
        assert_eq!(Strategy::parse("block_fast"), Some(Strategy::BlockFast));
        assert_eq!(Strategy::parse("nonsense"), None);
    }
}
