//! Per-transaction read-set and write-set
//!
//! - [`WriteSet`]: buffered values, at most one entry per address, fronted by
//!   a [`BloomFilter`] so that most membership tests never scan
//! - [`ReadSet`]: every word observed, revalidated at commit
//! - [`TransactionLog`]: both sets plus the segments allocated and freed by
//!   the transaction
//!
//! Entries hold an `Arc` to their segment, so a segment freed by another
//! transaction stays valid for as long as this log references it.

use crate::bloom::BloomFilter;
use smallvec::SmallVec;
use std::cell::Cell;
use std::sync::Arc;
use tl2_core::{Address, Error, Result, SegmentId};
use tl2_storage::Segment;

/// Inline buffer for one word's bytes
pub type WordBuf = SmallVec<[u8; 16]>;

/// A buffered write of one word
#[derive(Debug)]
pub struct WriteEntry {
    /// Address of the word
    pub address: Address,
    /// Segment containing the word
    pub segment: Arc<Segment>,
    /// Word index inside the segment
    pub word: usize,
    /// Value to publish at commit
    pub value: WordBuf,
}

/// One word observed by a read
#[derive(Debug)]
pub struct ReadEntry {
    /// Address of the word
    pub address: Address,
    /// Segment containing the word
    pub segment: Arc<Segment>,
    /// Word index inside the segment
    pub word: usize,
}

/// Make room for one more entry before pushing
///
/// `Vec::push` aborts the process when it cannot grow; reserving first turns
/// that into [`Error::OutOfMemory`]. The reservation is amortized like the
/// push it precedes.
fn grow<T>(entries: &mut Vec<T>) -> Result<()> {
    entries.try_reserve(1).map_err(|_| Error::OutOfMemory {
        requested: std::mem::size_of::<T>(),
    })
}

/// Buffered writes of one transaction
///
/// Entries are kept in first-write order; [`WriteSet::iter_recent_first`]
/// yields the most recently inserted entry first.
#[derive(Debug)]
pub struct WriteSet {
    entries: Vec<WriteEntry>,
    filter: BloomFilter,
    false_positives: Cell<u64>,
}

impl WriteSet {
    /// Empty write-set using `filter` for membership tests
    pub fn new(filter: BloomFilter) -> Self {
        Self {
            entries: Vec::new(),
            filter,
            false_positives: Cell::new(0),
        }
    }

    fn position(&self, address: Address) -> Option<usize> {
        if !self.filter.may_contain(address) {
            return None;
        }
        let found = self.entries.iter().position(|e| e.address == address);
        if found.is_none() {
            self.false_positives.set(self.false_positives.get() + 1);
        }
        found
    }

    /// Buffer `value` for `address`, overwriting any earlier value in place
    pub fn record(
        &mut self,
        address: Address,
        segment: &Arc<Segment>,
        word: usize,
        value: &[u8],
    ) -> Result<()> {
        if let Some(idx) = self.position(address) {
            let entry = &mut self.entries[idx];
            entry.value.clear();
            entry.value.extend_from_slice(value);
            return Ok(());
        }
        grow(&mut self.entries)?;
        self.entries.push(WriteEntry {
            address,
            segment: Arc::clone(segment),
            word,
            value: SmallVec::from_slice(value),
        });
        self.filter.insert(address);
        Ok(())
    }

    /// Buffered entry for `address`, if this transaction wrote it
    pub fn get(&self, address: Address) -> Option<&WriteEntry> {
        self.position(address).map(|idx| &self.entries[idx])
    }

    /// Whether this transaction wrote `address`
    pub fn contains(&self, address: Address) -> bool {
        self.position(address).is_some()
    }

    /// Entries in first-write order
    pub fn entries(&self) -> &[WriteEntry] {
        &self.entries
    }

    /// Entries, most recently inserted first
    pub fn iter_recent_first(&self) -> impl Iterator<Item = &WriteEntry> {
        self.entries.iter().rev()
    }

    /// Number of distinct words written
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing was written
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Filter hits that the exact scan then rejected
    pub fn false_positives(&self) -> u64 {
        self.false_positives.get()
    }

    /// Drop every entry and reset the filter
    pub fn clear(&mut self) {
        self.entries.clear();
        self.filter.clear();
        self.false_positives.set(0);
    }
}

/// Words observed by one transaction
#[derive(Debug, Default)]
pub struct ReadSet {
    entries: Vec<ReadEntry>,
}

impl ReadSet {
    /// Empty read-set
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `word` of `segment` was observed
    pub fn record(&mut self, address: Address, segment: &Arc<Segment>, word: usize) -> Result<()> {
        grow(&mut self.entries)?;
        self.entries.push(ReadEntry {
            address,
            segment: Arc::clone(segment),
            word,
        });
        Ok(())
    }

    /// Observed words in read order
    pub fn iter(&self) -> impl Iterator<Item = &ReadEntry> {
        self.entries.iter()
    }

    /// Number of recorded reads
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing was read
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every entry
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// Everything a transaction has logged
#[derive(Debug)]
pub struct TransactionLog {
    /// Words read
    pub reads: ReadSet,
    /// Words written
    pub writes: WriteSet,
    allocated: Vec<SegmentId>,
    freed: Vec<SegmentId>,
}

impl TransactionLog {
    /// Empty log with a fresh bloom filter
    pub fn new(filter: BloomFilter) -> Self {
        Self {
            reads: ReadSet::new(),
            writes: WriteSet::new(filter),
            allocated: Vec::new(),
            freed: Vec::new(),
        }
    }

    /// Remember a segment allocated by this transaction
    pub fn record_alloc(&mut self, id: SegmentId) -> Result<()> {
        grow(&mut self.allocated)?;
        self.allocated.push(id);
        Ok(())
    }

    /// Remember a segment to retire at commit; repeated frees are merged
    pub fn record_free(&mut self, id: SegmentId) -> Result<()> {
        if self.freed.contains(&id) {
            return Ok(());
        }
        grow(&mut self.freed)?;
        self.freed.push(id);
        Ok(())
    }

    /// Segments allocated so far
    pub fn allocated(&self) -> &[SegmentId] {
        &self.allocated
    }

    /// Segments freed so far
    pub fn freed(&self) -> &[SegmentId] {
        &self.freed
    }

    /// Take the allocated list, leaving it empty
    pub fn take_allocated(&mut self) -> Vec<SegmentId> {
        std::mem::take(&mut self.allocated)
    }

    /// Take the freed list, leaving it empty
    pub fn take_freed(&mut self) -> Vec<SegmentId> {
        std::mem::take(&mut self.freed)
    }

    /// Release every entry, buffered value and segment reference
    pub fn clean(&mut self) {
        self.reads.clear();
        self.writes.clear();
        self.allocated.clear();
        self.freed.clear();
    }
}
