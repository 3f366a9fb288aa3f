//! Core types shared by every layer of the engine
//!
//! - [`Version`]: Global clock values stamped onto committed words
//! - [`TxKind`]: Read-only vs read-write transactions
//! - [`TxId`]: Process-unique transaction identifier used in logs

use serde::{Deserialize, Serialize};

/// Logical clock value
///
/// The global clock starts at 0 and only increases. Every word carries the
/// version of the last transaction that wrote it; a freshly allocated word
/// has version 0.
pub type Version = u64;

/// Kind of a transaction, fixed at begin time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TxKind {
    /// Reads only; never buffers writes and always commits.
    ReadOnly,
    /// May read, write, allocate and free.
    ReadWrite,
}

impl TxKind {
    /// Map the `is_ro` flag of the classic TM interface to a kind
    ///
    /// # Examples
    ///
    /// ```
    /// use tl2_core::TxKind;
    ///
    /// assert_eq!(TxKind::from_read_only(true), TxKind::ReadOnly);
    /// assert_eq!(TxKind::from_read_only(false), TxKind::ReadWrite);
    /// ```
    pub fn from_read_only(is_ro: bool) -> Self {
        if is_ro {
            TxKind::ReadOnly
        } else {
            TxKind::ReadWrite
        }
    }

    /// Whether this is a read-only transaction
    pub fn is_read_only(&self) -> bool {
        matches!(self, TxKind::ReadOnly)
    }
}

impl std::fmt::Display for TxKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TxKind::ReadOnly => write!(f, "read-only"),
            TxKind::ReadWrite => write!(f, "read-write"),
        }
    }
}

/// Transaction identifier
///
/// Only used for tracing and diagnostics; never for conflict detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TxId(pub u64);

impl std::fmt::Display for TxId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "tx#{}", self.0)
    }
}
