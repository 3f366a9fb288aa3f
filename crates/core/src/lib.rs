//! Core types for the TL2 transactional memory engine
//!
//! This crate defines the vocabulary shared by every layer:
//! - [`Address`] / [`SegmentId`]: Opaque addressing into a region
//! - [`Version`] / [`TxKind`] / [`TxId`]: Clock values and transaction kinds
//! - [`Error`]: Conflict, exhaustion and usage error taxonomy
//! - [`RegionConfig`]: Region layout and tuning

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod address;
pub mod config;
pub mod error;
pub mod types;

pub use address::{Address, SegmentId};
pub use config::{LockOrder, RegionConfig};
pub use error::{AbortReason, Error, Result, UsageError};
pub use types::{TxId, TxKind, Version};
