//! Error types for the transactional memory engine
//!
//! Errors fall into three families:
//!
//! | Family | Variant | Caller reaction |
//! |--------|---------|-----------------|
//! | Resource exhaustion | [`Error::OutOfMemory`] | Free memory or give up |
//! | Optimistic conflict | [`Error::Aborted`] | Begin a new transaction and retry |
//! | Programmer error | [`Error::Usage`], [`Error::InvalidLayout`] | Fix the caller |
//!
//! Conflicts are the common case under contention and are never fatal.

use crate::address::{Address, SegmentId};
use crate::types::Version;
use thiserror::Error;

/// Why a transaction aborted
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AbortReason {
    /// A word was locked by a committing transaction while being read
    #[error("word at {address} is locked by a committing transaction")]
    WordLocked {
        /// Word being read
        address: Address,
    },

    /// A word's version changed while its bytes were being copied
    #[error("word at {address} changed while being read")]
    VersionChanged {
        /// Word being read
        address: Address,
    },

    /// A word was committed after this transaction's snapshot
    #[error("word at {address} has version {version}, newer than snapshot {rv}")]
    VersionTooNew {
        /// Word being read
        address: Address,
        /// Version found on the word
        version: Version,
        /// Read version of the transaction
        rv: Version,
    },

    /// A commit-time lock acquisition failed
    #[error("could not lock word at {address} for commit")]
    LockContention {
        /// Word whose lock was held by another transaction
        address: Address,
    },

    /// A read-set entry failed validation at commit
    #[error("read of {address} is no longer valid at commit")]
    ValidationFailed {
        /// Word that was overwritten or is being overwritten
        address: Address,
    },

    /// A segment was freed by a transaction that committed after this
    /// transaction's snapshot
    #[error("segment {segment} was freed at version {version}, after snapshot {rv}")]
    SegmentRetired {
        /// Segment that was freed
        segment: SegmentId,
        /// Commit version of the freeing transaction
        version: Version,
        /// Read version of the transaction
        rv: Version,
    },

    /// An earlier operation already doomed this transaction
    #[error("transaction was already doomed by an earlier failure")]
    AlreadyDoomed,

    /// The transaction was dropped or explicitly rolled back
    #[error("transaction rolled back by its owner")]
    RolledBack,

    /// A read or write could not log its entry
    #[error("transaction log could not grow")]
    ResourceExhausted,

    /// An operation was rejected as a usage violation
    #[error("operation rejected: {0}")]
    Rejected(Box<Error>),
}

impl AbortReason {
    /// The reason a failed operation dooms its transaction with
    pub fn from_error(error: &Error) -> Self {
        match error {
            Error::Aborted(reason) => reason.clone(),
            Error::OutOfMemory { .. } => AbortReason::ResourceExhausted,
            other => AbortReason::Rejected(Box::new(other.clone())),
        }
    }

    /// The error later operations of a transaction doomed for this reason
    /// report
    ///
    /// A transaction doomed by a usage violation keeps reporting that
    /// violation, so it is never mistaken for a retryable conflict.
    pub fn doomed_error(&self) -> Error {
        match self {
            AbortReason::Rejected(error) => (**error).clone(),
            _ => Error::Aborted(AbortReason::AlreadyDoomed),
        }
    }
}

/// Programmer errors: misuse of the API rather than runtime conditions
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UsageError {
    /// Writes, allocations and frees require a read-write transaction
    #[error("{operation} is not allowed in a read-only transaction")]
    ReadOnlyTransaction {
        /// Operation that was attempted
        operation: &'static str,
    },

    /// The address names a segment id this region never handed out
    #[error("address {0} does not belong to any segment of this region")]
    UnknownSegment(Address),

    /// The address names a segment that has been freed
    #[error("segment {0} has been freed")]
    SegmentFreed(SegmentId),

    /// The access runs past the end of its segment
    #[error("access of {len} bytes at {address} exceeds segment size {segment_size}")]
    OutOfBounds {
        /// Start of the access
        address: Address,
        /// Length of the access in bytes
        len: usize,
        /// Size of the addressed segment
        segment_size: usize,
    },

    /// The address or length is not a positive multiple of the alignment
    #[error("access of {len} bytes at {address} is not aligned to {align}")]
    Misaligned {
        /// Start of the access
        address: Address,
        /// Length of the access in bytes
        len: usize,
        /// Region alignment
        align: usize,
    },

    /// The initial segment can never be freed
    #[error("the initial segment cannot be freed")]
    InitialSegment,

    /// Only the first byte of a segment may be passed to free
    #[error("{0} is not the base address of a segment")]
    NotSegmentBase(Address),

    /// The transaction has already committed or aborted
    #[error("transaction has already finished")]
    TransactionFinished,

    /// The transaction was begun on a different region
    #[error("transaction belongs to a different region")]
    ForeignRegion,
}

/// Error type for all engine operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// Region or allocation sizes violate the layout rules
    #[error("invalid layout: {0}")]
    InvalidLayout(String),

    /// A segment or log allocation failed
    #[error("out of memory: could not allocate {requested} bytes")]
    OutOfMemory {
        /// Bytes that were requested
        requested: usize,
    },

    /// Optimistic conflict; the transaction is doomed
    #[error("transaction aborted: {0}")]
    Aborted(#[from] AbortReason),

    /// API misuse
    #[error("usage violation: {0}")]
    Usage(#[from] UsageError),

    /// Configuration could not be parsed or is inconsistent
    #[error("invalid configuration: {0}")]
    Config(String),
}

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Check if this error is retryable
    ///
    /// Only conflicts are retryable: a fresh transaction may succeed where
    /// this one failed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Aborted(_))
    }

    /// Check if this is an out-of-memory error
    pub fn is_out_of_memory(&self) -> bool {
        matches!(self, Error::OutOfMemory { .. })
    }

    /// Check if this is a programmer error
    pub fn is_usage(&self) -> bool {
        matches!(self, Error::Usage(_) | Error::InvalidLayout(_))
    }

    /// The abort reason, if this is a conflict
    pub fn abort_reason(&self) -> Option<&AbortReason> {
        match self {
            Error::Aborted(reason) => Some(reason),
            _ => None,
        }
    }
}

impl From<toml::de::Error> for Error {
    fn from(e: toml::de::Error) -> Self {
        Error::Config(e.to_string())
    }
}
