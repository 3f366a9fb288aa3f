//! Commit-time read-set validation
//!
//! After a committer holds every write lock and has drawn its write version
//! `wv`, each read-set entry must still be valid:
//!
//! - the word's version is still `<= rv`, and
//! - the word is not locked by another committer.
//!
//! A locked word is ours exactly when it is in our write-set, since we
//! hold a lock on every write-set word at this point.
//!
//! When `wv == rv + 1` no transaction committed between our begin and our
//! commit, so validation is skipped entirely.

use crate::log::{ReadSet, WriteSet};
use tl2_core::{Address, Version};

/// Why a read-set entry failed validation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictType {
    /// The word was committed after our snapshot
    VersionTooNew {
        /// Word that was read
        address: Address,
        /// Version now on the word
        version: Version,
    },
    /// Another transaction holds the word's lock
    LockedByOther {
        /// Word that was read
        address: Address,
    },
}

impl ConflictType {
    /// Address of the conflicting word
    pub fn address(&self) -> Address {
        match self {
            ConflictType::VersionTooNew { address, .. } => *address,
            ConflictType::LockedByOther { address } => *address,
        }
    }
}

/// Whether a commit at `wv` must revalidate reads taken at `rv`
#[inline]
pub fn needs_validation(rv: Version, wv: Version) -> bool {
    wv != rv + 1
}

/// Validate every read against snapshot `rv`, stopping at the first conflict
pub fn validate_read_set(
    reads: &ReadSet,
    writes: &WriteSet,
    rv: Version,
) -> Result<(), ConflictType> {
    for entry in reads.iter() {
        let version = entry.segment.version(entry.word);
        if version > rv {
            return Err(ConflictType::VersionTooNew {
                address: entry.address,
                version,
            });
        }
        if entry.segment.is_locked(entry.word) && !writes.contains(entry.address) {
            return Err(ConflictType::LockedByOther {
                address: entry.address,
            });
        }
    }
    Ok(())
}
