//! # tl2stm
//!
//! Word-based software transactional memory built on Transactional Locking II.
//!
//! A [`Region`] is a shared memory area made of segments. Threads run
//! transactions against it: reads are validated against a snapshot of a
//! global version clock, writes are buffered until commit, and commit locks
//! the written words, validates the reads and publishes the new values under
//! a fresh version. Transactions that commit are serializable; transactions
//! that abort leave no trace.
//!
//! ## Quick Start
//!
//! ```
//! use tl2stm::prelude::*;
//!
//! let region = Region::create(64, 8)?;
//! let start = region.start();
//!
//! let mut tx = region.begin(false)?;
//! let extra = tx.alloc(32)?;
//! tx.write(&1u64.to_ne_bytes(), start)?;
//! tx.write(&2u64.to_ne_bytes(), extra)?;
//! assert!(region.end(tx));
//!
//! let mut tx = region.begin(true)?;
//! let mut buf = [0u8; 8];
//! tx.read(extra, &mut buf)?;
//! assert_eq!(u64::from_ne_bytes(buf), 2);
//! assert!(region.end(tx));
//! # Ok::<(), tl2stm::Error>(())
//! ```
//!
//! ## Crates
//!
//! - `tl2-core`: addresses, configuration, errors
//! - `tl2-storage`: segments of versioned, lockable words and the segment table
//! - `tl2-concurrency`: bloom filter, transaction log, commit protocol
//! - `tl2-engine`: regions and transaction handles

#![warn(missing_docs)]

mod retry;

pub mod prelude;

// Re-export main entry points
pub use retry::{atomically, RetryPolicy};
pub use tl2_engine::{Region, RegionBuilder, RegionMetrics, Transaction, TransactionStatus};

// Re-export error handling
pub use tl2_core::{AbortReason, Error, Result, UsageError};

// Re-export types
pub use tl2_core::{Address, LockOrder, RegionConfig, SegmentId, TxId, TxKind, Version};
