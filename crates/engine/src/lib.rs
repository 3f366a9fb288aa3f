//! Engine layer for the TL2 software transactional memory
//!
//! This crate ties storage and concurrency together:
//! - Region: initial segment, segment table, global clock and metrics
//! - Transaction: the client handle for read, write, alloc, free and commit
//! - RegionMetrics: commit and abort counters for a region

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod metrics;
pub mod region;
pub mod transaction;

pub use metrics::RegionMetrics;
pub use region::{Region, RegionBuilder};
pub use transaction::Transaction;

pub use tl2_concurrency::TransactionStatus;
pub use tl2_core::{
    AbortReason, Address, Error, LockOrder, RegionConfig, Result, SegmentId, TxId, TxKind,
    UsageError, Version,
};
