//! Concurrency layer for the TL2 engine
//!
//! This crate implements Transactional Locking II with:
//! - BloomFilter: fast negative membership tests on the write-set
//! - TransactionLog: read-set, write-set, allocated and freed segments
//! - TransactionContext: snapshot version and the per-word read protocol
//! - Read-set validation at commit time
//! - TransactionManager: global clock and the lock/validate/write-back commit

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod bloom;
pub mod log;
pub mod manager;
pub mod transaction;
pub mod validation;

pub use bloom::BloomFilter;
pub use log::{ReadEntry, ReadSet, TransactionLog, WriteEntry, WriteSet};
pub use manager::TransactionManager;
pub use transaction::{TransactionContext, TransactionStatus};
pub use validation::{needs_validation, validate_read_set, ConflictType};
