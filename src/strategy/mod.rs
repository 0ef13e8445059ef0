//! The four pluggable allocation strategies. [`crate::handle::WmemAllocator`]
//! dispatches to exactly one of these per scope, chosen at construction time.

mod block;
mod block_fast;
mod simple;
mod strict;

pub(crate) use block::BlockAllocator;
pub(crate) use block_fast::BlockFastAllocator;
pub(crate) use simple::SimpleAllocator;
pub(crate) use strict::StrictAllocator;
