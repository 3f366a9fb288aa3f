//! Transaction context: status, snapshot and log of one transaction
//!
//! A [`TransactionContext`] is owned by the thread that began it. It holds
//! the read version `rv` sampled at begin and performs the per-word read
//! protocol:
//!
//! 1. Sample the word's version
//! 2. Copy the word (from the write-set if this transaction wrote it,
//!    otherwise from shared memory)
//! 3. Re-check: lock clear, version unchanged, version <= `rv`
//!
//! Any violation aborts. Read-write transactions additionally log every
//! read for commit-time validation; read-only transactions log nothing.
//! Writes only touch the write-set until commit.

use crate::bloom::BloomFilter;
use crate::log::TransactionLog;
use std::sync::Arc;
use tl2_core::{AbortReason, Address, Error, Result, TxId, TxKind, UsageError, Version};
use tl2_storage::Segment;

/// Transaction status
///
/// ```text
/// Active ──► Validating ──► Committed
///    │            │
///    └────────────┴──────► Aborted
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransactionStatus {
    /// Accepting reads and writes
    Active,
    /// Commit in progress: locks being acquired or read-set being validated
    Validating,
    /// Committed with the given write version
    Committed {
        /// Version stamped onto the written words
        wv: Version,
    },
    /// Doomed; only `end` remains meaningful
    Aborted {
        /// Why the transaction aborted
        reason: AbortReason,
    },
}

/// Sample a word consistently against snapshot `rv`
///
/// `buffered` overrides the copied bytes with this transaction's own
/// pending write; the shared word is validated either way.
#[inline]
fn sample_word(
    segment: &Segment,
    address: Address,
    word: usize,
    rv: Version,
    buffered: Option<&[u8]>,
    out: &mut [u8],
) -> std::result::Result<(), AbortReason> {
    let before = segment.version(word);
    match buffered {
        Some(value) => out.copy_from_slice(value),
        None => segment.load_word(word, out),
    }
    if segment.is_locked(word) {
        return Err(AbortReason::WordLocked { address });
    }
    let after = segment.version(word);
    if after != before {
        return Err(AbortReason::VersionChanged { address });
    }
    if after > rv {
        return Err(AbortReason::VersionTooNew {
            address,
            version: after,
            rv,
        });
    }
    Ok(())
}

/// State of one in-flight transaction
#[derive(Debug)]
pub struct TransactionContext {
    /// Diagnostic identifier
    pub txn_id: TxId,
    /// Read-only or read-write
    pub kind: TxKind,
    /// Global clock value sampled at begin
    pub rv: Version,
    /// Current status
    pub status: TransactionStatus,
    log: TransactionLog,
}

impl TransactionContext {
    /// Start a transaction at snapshot `rv` with a fresh bloom filter
    pub fn new(
        txn_id: TxId,
        kind: TxKind,
        rv: Version,
        bloom_bits: usize,
        bloom_hashes: u32,
    ) -> Result<Self> {
        // Read-only transactions never consult the filter
        let filter = match kind {
            TxKind::ReadOnly => BloomFilter::new(64, 1)?,
            TxKind::ReadWrite => BloomFilter::new(bloom_bits, bloom_hashes)?,
        };
        Ok(Self {
            txn_id,
            kind,
            rv,
            status: TransactionStatus::Active,
            log: TransactionLog::new(filter),
        })
    }

    /// Whether reads and writes are still accepted
    pub fn is_active(&self) -> bool {
        matches!(self.status, TransactionStatus::Active)
    }

    /// Fail unless the transaction is active
    ///
    /// A doomed transaction reports `AlreadyDoomed`, unless a usage
    /// violation doomed it, in which case that violation is reported again.
    pub fn ensure_active(&self) -> Result<()> {
        match &self.status {
            TransactionStatus::Active => Ok(()),
            TransactionStatus::Aborted { reason } => Err(reason.doomed_error()),
            TransactionStatus::Validating | TransactionStatus::Committed { .. } => {
                Err(UsageError::TransactionFinished.into())
            }
        }
    }

    /// Fail unless this is a read-write transaction
    pub fn ensure_writable(&self, operation: &'static str) -> Result<()> {
        if self.kind.is_read_only() {
            return Err(UsageError::ReadOnlyTransaction { operation }.into());
        }
        Ok(())
    }

    /// Read one word into `out`
    pub fn read_word(
        &mut self,
        segment: &Arc<Segment>,
        address: Address,
        word: usize,
        out: &mut [u8],
    ) -> Result<()> {
        if self.kind.is_read_only() {
            return sample_word(segment, address, word, self.rv, None, out).map_err(Error::from);
        }

        let buffered = self.log.writes.get(address).map(|e| &e.value[..]);
        sample_word(segment, address, word, self.rv, buffered, out)?;
        self.log.reads.record(address, segment, word)
    }

    /// Buffer a write of one word
    pub fn write_word(
        &mut self,
        segment: &Arc<Segment>,
        address: Address,
        word: usize,
        value: &[u8],
    ) -> Result<()> {
        self.ensure_writable("write")?;
        self.log.writes.record(address, segment, word, value)
    }

    /// The transaction's log
    pub fn log(&self) -> &TransactionLog {
        &self.log
    }

    /// Mutable access to the log
    pub fn log_mut(&mut self) -> &mut TransactionLog {
        &mut self.log
    }

    /// Doom the transaction; the first reason recorded wins
    pub fn mark_aborted(&mut self, reason: AbortReason) {
        if !matches!(self.status, TransactionStatus::Aborted { .. }) {
            self.status = TransactionStatus::Aborted { reason };
        }
    }

    /// Record a successful commit
    pub fn mark_committed(&mut self, wv: Version) {
        self.status = TransactionStatus::Committed { wv };
    }

    /// The abort reason, if aborted
    pub fn abort_reason(&self) -> Option<&AbortReason> {
        match &self.status {
            TransactionStatus::Aborted { reason } => Some(reason),
            _ => None,
        }
    }
}
