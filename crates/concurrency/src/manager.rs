//! Transaction manager: global clock and the TL2 commit protocol
//!
//! ## Commit Sequence
//!
//! ```text
//! 1. Read-only transaction      -> COMMITTED (no shared state touched)
//! 2. No writes and no frees     -> COMMITTED (no locks taken)
//! 3. Lock every write-set word  -> on first failure release the acquired
//!                                  prefix and ABORT
//! 4. wv = clock.fetch_add(1) + 1
//! 5. Validate the read-set      -> skipped when wv == rv + 1; on failure
//!                                  release every lock and ABORT
//! 6. Write back: bytes, version := wv, clear lock
//! 7. COMMITTED
//! ```
//!
//! Lock acquisition is a single compare-and-set per word. A contended lock
//! aborts the committer immediately; nothing spins or waits.

use crate::log::WriteSet;
use crate::transaction::{TransactionContext, TransactionStatus};
use crate::validation::{needs_validation, validate_read_set};
use std::sync::atomic::{AtomicU64, Ordering};
use tl2_core::{AbortReason, Error, LockOrder, RegionConfig, Result, TxId, TxKind, Version};
use tracing::trace;

/// Owns the global clock and runs commits
///
/// The clock only increases, and only at step 4 of a write commit. Every
/// write version handed out is strictly greater than every earlier clock
/// value.
pub struct TransactionManager {
    /// Global version clock
    clock: AtomicU64,

    /// Next transaction ID, for diagnostics only
    next_txn_id: AtomicU64,

    lock_order: LockOrder,
    bloom_bits: usize,
    bloom_hashes: u32,
}

impl TransactionManager {
    /// Create a manager with the clock at 0
    pub fn new(config: &RegionConfig) -> Self {
        TransactionManager {
            clock: AtomicU64::new(0),
            next_txn_id: AtomicU64::new(1),
            lock_order: config.lock_order,
            bloom_bits: config.bloom_bits,
            bloom_hashes: config.bloom_hashes,
        }
    }

    /// Get current clock value
    pub fn current_version(&self) -> Version {
        self.clock.load(Ordering::Acquire)
    }

    /// Advance the clock and return the new value
    pub fn allocate_version(&self) -> Version {
        self.clock.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Allocate next transaction ID
    pub fn next_txn_id(&self) -> TxId {
        TxId(self.next_txn_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Configured lock acquisition order
    pub fn lock_order(&self) -> LockOrder {
        self.lock_order
    }

    /// Begin a transaction at the current clock value
    pub fn begin(&self, kind: TxKind) -> Result<TransactionContext> {
        let txn_id = self.next_txn_id();
        let rv = self.current_version();
        let txn = TransactionContext::new(txn_id, kind, rv, self.bloom_bits, self.bloom_hashes)?;
        trace!(txn = %txn_id, %kind, rv, "begin");
        Ok(txn)
    }

    /// Commit a transaction
    ///
    /// Returns the version the transaction is serialized at: `wv` for a
    /// commit that writes or frees, `rv` for read-only and empty commits.
    /// Frees need a `wv` of their own so that readers can tell whether
    /// their snapshot predates the free.
    ///
    /// On failure the transaction is marked aborted, every lock it took is
    /// released and shared memory is unchanged.
    pub fn commit(&self, txn: &mut TransactionContext) -> Result<Version> {
        if let Err(e) = txn.ensure_active() {
            if let Error::Aborted(_) = e {
                trace!(txn = %txn.txn_id, reason = ?txn.abort_reason(), "commit of doomed transaction");
            }
            return Err(e);
        }

        // Steps 1 and 2
        let log = txn.log();
        if txn.kind.is_read_only() || (log.writes.is_empty() && log.freed().is_empty()) {
            txn.mark_committed(txn.rv);
            trace!(txn = %txn.txn_id, rv = txn.rv, "committed without writes");
            return Ok(txn.rv);
        }

        txn.status = TransactionStatus::Validating;
        let writes = &txn.log().writes;
        let order = self.lock_sequence(writes);

        // Step 3
        if let Err(reason) = acquire_locks(writes, &order) {
            return Err(self.abort(txn, reason));
        }

        // Step 4
        let wv = self.allocate_version();

        // Step 5
        if needs_validation(txn.rv, wv) {
            let log = txn.log();
            if let Err(conflict) = validate_read_set(&log.reads, &log.writes, txn.rv) {
                release_locks(&log.writes, &order);
                return Err(self.abort(
                    txn,
                    AbortReason::ValidationFailed {
                        address: conflict.address(),
                    },
                ));
            }
        }

        // Step 6
        for entry in txn.log().writes.entries() {
            entry.segment.publish(entry.word, &entry.value, wv);
        }

        txn.mark_committed(wv);
        trace!(txn = %txn.txn_id, rv = txn.rv, wv, words = txn.log().writes.len(), "committed");
        Ok(wv)
    }

    /// Explicitly abort a transaction
    ///
    /// Returns the error the caller should report. Holds no locks: locks
    /// are only taken inside [`TransactionManager::commit`], which releases
    /// them itself before aborting.
    pub fn abort(&self, txn: &mut TransactionContext, reason: AbortReason) -> Error {
        trace!(txn = %txn.txn_id, %reason, "aborted");
        txn.mark_aborted(reason.clone());
        Error::Aborted(reason)
    }

    fn lock_sequence(&self, writes: &WriteSet) -> Vec<usize> {
        let n = writes.len();
        match self.lock_order {
            LockOrder::WriteSet => (0..n).rev().collect(),
            LockOrder::Address => {
                let entries = writes.entries();
                let mut order: Vec<usize> = (0..n).collect();
                order.sort_unstable_by_key(|&i| entries[i].address);
                order
            }
        }
    }
}

/// Lock every word in `order`; on the first failure release what was taken
fn acquire_locks(writes: &WriteSet, order: &[usize]) -> std::result::Result<(), AbortReason> {
    let entries = writes.entries();
    for (taken, &idx) in order.iter().enumerate() {
        let entry = &entries[idx];
        if !entry.segment.try_lock(entry.word) {
            release_locks(writes, &order[..taken]);
            return Err(AbortReason::LockContention {
                address: entry.address,
            });
        }
    }
    Ok(())
}

fn release_locks(writes: &WriteSet, order: &[usize]) {
    let entries = writes.entries();
    for &idx in order {
        entries[idx].segment.unlock(entries[idx].word);
    }
}

impl Default for TransactionManager {
    fn default() -> Self {
        Self::new(&RegionConfig::new(8, 8))
    }
}

impl std::fmt::Debug for TransactionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionManager")
            .field("clock", &self.current_version())
            .field("lock_order", &self.lock_order)
            .finish()
    }
}
