//! Transaction handle
//!
//! A [`Transaction`] pairs a [`TransactionContext`] with the region it was
//! begun on and exposes the client operations: `read`, `write`, `alloc`,
//! `free` and `commit`.
//!
//! Failure contract: once any operation fails, the transaction is doomed.
//! Later operations fail with `AbortReason::AlreadyDoomed`, or repeat the
//! original error if it was a usage error, and ending it reports ABORTED.
//! The one exception is `alloc` running out of memory, which leaves the
//! transaction usable.
//!
//! Ending ABORTED (including dropping an unfinished transaction) retires the
//! segments the transaction allocated and discards its frees, so shared
//! state is exactly as if the transaction never ran.
//!
//! A committed free retires its segment at the commit's write version. A
//! transaction whose snapshot predates that version aborts with
//! `AbortReason::SegmentRetired` when it reaches the segment, since it merely
//! lost a race with the free.

use crate::region::Region;
use std::sync::Arc;
use tl2_concurrency::{TransactionContext, TransactionStatus};
use tl2_core::config::check_size;
use tl2_core::{AbortReason, Address, Result, SegmentId, TxId, TxKind, UsageError, Version};
use tl2_storage::Segment;
use tracing::{trace, warn};

/// An in-flight transaction on a [`Region`]
pub struct Transaction<'r> {
    region: &'r Region,
    ctx: TransactionContext,
    finished: bool,
}

impl<'r> Transaction<'r> {
    pub(crate) fn new(region: &'r Region, ctx: TransactionContext) -> Self {
        Self {
            region,
            ctx,
            finished: false,
        }
    }

    /// Diagnostic identifier
    pub fn id(&self) -> TxId {
        self.ctx.txn_id
    }

    /// Read-only or read-write
    pub fn kind(&self) -> TxKind {
        self.ctx.kind
    }

    /// Clock value sampled at begin
    pub fn read_version(&self) -> Version {
        self.ctx.rv
    }

    /// Current status
    pub fn status(&self) -> &TransactionStatus {
        &self.ctx.status
    }

    /// Whether an earlier failure doomed this transaction
    pub fn is_doomed(&self) -> bool {
        matches!(self.ctx.status, TransactionStatus::Aborted { .. })
    }

    /// Number of distinct words buffered for commit
    pub fn write_count(&self) -> usize {
        self.ctx.log().writes.len()
    }

    /// Number of reads logged for validation
    pub fn read_count(&self) -> usize {
        self.ctx.log().reads.len()
    }

    pub(crate) fn belongs_to(&self, region: &Region) -> bool {
        std::ptr::eq(self.region, region)
    }

    /// Copy `target.len()` bytes starting at `source` into `target`
    ///
    /// The length must be a positive multiple of the alignment and `source`
    /// must be word aligned.
    pub fn read(&mut self, source: Address, target: &mut [u8]) -> Result<()> {
        let result = self.read_words(source, target);
        self.doom_on_error(result)
    }

    /// Buffer `source` for writing at `target` when the transaction commits
    pub fn write(&mut self, source: &[u8], target: Address) -> Result<()> {
        let result = self.write_words(source, target);
        self.doom_on_error(result)
    }

    /// Allocate a zero-filled segment of `size` bytes
    ///
    /// The segment is visible immediately. It is retired again if this
    /// transaction aborts. Returns [`Error::OutOfMemory`] without dooming
    /// the transaction when memory or segment ids run out.
    pub fn alloc(&mut self, size: usize) -> Result<Address> {
        match self.alloc_segment(size) {
            Err(e) if e.is_out_of_memory() => {
                warn!(txn = %self.ctx.txn_id, size, "segment allocation failed");
                Err(e)
            }
            other => self.doom_on_error(other),
        }
    }

    /// Free the segment starting at `target` when the transaction commits
    pub fn free(&mut self, target: Address) -> Result<()> {
        let result = self.free_segment(target);
        self.doom_on_error(result)
    }

    /// Try to commit, returning the version the transaction is serialized at
    pub fn commit(mut self) -> Result<Version> {
        self.finished = true;
        let result = self.region.manager().commit(&mut self.ctx);
        match &result {
            Ok(wv) => {
                for id in self.ctx.log_mut().take_freed() {
                    self.region.table().retire(id, *wv);
                }
                self.ctx.log_mut().clean();
                self.region.counters().ended(true);
            }
            Err(_) => self.finish_aborted(),
        }
        result
    }

    /// Abandon the transaction
    pub fn rollback(self) {
        self.abandon(AbortReason::RolledBack);
    }

    pub(crate) fn abandon(mut self, reason: AbortReason) {
        self.finished = true;
        self.ctx.mark_aborted(reason);
        self.finish_aborted();
    }

    fn read_words(&mut self, source: Address, target: &mut [u8]) -> Result<()> {
        self.ctx.ensure_active()?;
        let (segment, first) = self.locate(source, target.len())?;
        let align = self.region.align();
        for (i, chunk) in target.chunks_exact_mut(align).enumerate() {
            let address = source.offset_by((i * align) as u64);
            self.ctx.read_word(&segment, address, first + i, chunk)?;
        }
        Ok(())
    }

    fn write_words(&mut self, source: &[u8], target: Address) -> Result<()> {
        self.ctx.ensure_active()?;
        self.ctx.ensure_writable("write")?;
        let (segment, first) = self.locate(target, source.len())?;
        let align = self.region.align();
        for (i, chunk) in source.chunks_exact(align).enumerate() {
            let address = target.offset_by((i * align) as u64);
            self.ctx.write_word(&segment, address, first + i, chunk)?;
        }
        Ok(())
    }

    fn alloc_segment(&mut self, size: usize) -> Result<Address> {
        self.ctx.ensure_active()?;
        self.ctx.ensure_writable("alloc")?;
        let align = self.region.align();
        check_size(size, align)?;

        let table = self.region.table();
        let (id, _) = table.register(Segment::new(size, align)?)?;
        if let Err(e) = self.ctx.log_mut().record_alloc(id) {
            table.retire(id, self.region.manager().current_version());
            return Err(e);
        }
        trace!(txn = %self.ctx.txn_id, segment = %id, size, "allocated");
        Ok(Address::base(id))
    }

    fn free_segment(&mut self, target: Address) -> Result<()> {
        self.ctx.ensure_active()?;
        self.ctx.ensure_writable("free")?;
        let id = target.segment();
        if id == SegmentId::FIRST {
            return Err(UsageError::InitialSegment.into());
        }
        if !target.is_base() {
            return Err(UsageError::NotSegmentBase(target).into());
        }
        self.region.table().get(id, self.ctx.rv)?;
        self.ctx.log_mut().record_free(id)?;
        trace!(txn = %self.ctx.txn_id, segment = %id, "free scheduled");
        Ok(())
    }

    /// Resolve an access to its segment and first word index
    fn locate(&self, address: Address, len: usize) -> Result<(Arc<Segment>, usize)> {
        let align = self.region.align();
        if len == 0 || len % align != 0 || address.offset() % align as u64 != 0 {
            return Err(UsageError::Misaligned {
                address,
                len,
                align,
            }
            .into());
        }
        let segment = self.region.table().resolve(address, self.ctx.rv)?;
        let in_bounds = usize::try_from(address.offset())
            .ok()
            .and_then(|start| start.checked_add(len))
            .map_or(false, |end| end <= segment.size());
        if !in_bounds {
            return Err(UsageError::OutOfBounds {
                address,
                len,
                segment_size: segment.size(),
            }
            .into());
        }
        Ok((segment, address.offset() as usize / align))
    }

    fn doom_on_error<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            if e.is_usage() {
                warn!(txn = %self.ctx.txn_id, error = %e, "usage violation");
            }
            if self.ctx.is_active() {
                self.region.manager().abort(&mut self.ctx, AbortReason::from_error(e));
            }
        }
        result
    }

    fn finish_aborted(&mut self) {
        let table = self.region.table();
        let version = self.region.manager().current_version();
        for id in self.ctx.log_mut().take_allocated() {
            table.retire(id, version);
        }
        self.ctx.log_mut().clean();
        self.region.counters().ended(false);
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.finished = true;
            self.ctx.mark_aborted(AbortReason::RolledBack);
            self.finish_aborted();
        }
    }
}

impl std::fmt::Debug for Transaction<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction")
            .field("id", &self.ctx.txn_id)
            .field("kind", &self.ctx.kind)
            .field("rv", &self.ctx.rv)
            .field("status", &self.ctx.status)
            .field("writes", &self.write_count())
            .field("reads", &self.read_count())
            .finish()
    }
}
