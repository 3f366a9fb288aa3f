//! Segment table: the arena mapping segment ids to segments
//!
//! Ids index directly into a growable vector, so decoding an address is one
//! bounds check and one slot load. The vector only ever grows (doubling its
//! capacity when full) and retired slots are emptied rather than removed,
//! which keeps every id unique for the lifetime of the table.
//!
//! # Thread Safety
//!
//! - Lookups take the read side of the table lock and clone the slot's `Arc`.
//! - Registration and retirement take the write side, which also serializes
//!   id assignment and growth.
//! - Segment contents are never guarded by this lock; they are governed by
//!   the per-word lock bits and versions.
//!
//! A retired segment stays alive for as long as any transaction still holds
//! its `Arc` (for instance in a read-set or write-set entry). Its slot keeps
//! the version at which it was retired, so a lookup can tell a stale snapshot
//! from a dangling address:
//!
//! - retired after the reader's snapshot: the reader conflicts with the free
//!   ([`AbortReason::SegmentRetired`])
//! - retired at or before the snapshot: the address is dangling
//!   ([`UsageError::SegmentFreed`])

use crate::segment::Segment;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tl2_core::address::MAX_SEGMENT_ID;
use tl2_core::{AbortReason, Address, Error, Result, SegmentId, UsageError, Version};
use tracing::debug;

#[derive(Debug)]
enum Slot {
    /// The sentinel id 0
    Vacant,
    Live(Arc<Segment>),
    /// Freed by a transaction that committed at this version
    Retired(Version),
}

/// Id-indexed arena of segments
pub struct SegmentTable {
    /// Slot `i` holds segment id `i`; slot 0 is the sentinel
    slots: RwLock<Vec<Slot>>,
    /// Number of occupied slots
    live: AtomicUsize,
}

impl SegmentTable {
    /// Create an empty table with room for `capacity` segments
    pub fn with_capacity(capacity: usize) -> Result<Self> {
        let capacity = capacity.max(2);
        let mut slots = Vec::new();
        slots
            .try_reserve_exact(capacity)
            .map_err(|_| Error::OutOfMemory {
                requested: capacity * std::mem::size_of::<Slot>(),
            })?;
        slots.push(Slot::Vacant);
        Ok(Self {
            slots: RwLock::new(slots),
            live: AtomicUsize::new(0),
        })
    }

    /// Register a fully initialized segment under a fresh id
    ///
    /// Grows the table geometrically when it is full. On failure the segment
    /// is dropped and the table is unchanged.
    pub fn register(&self, segment: Segment) -> Result<(SegmentId, Arc<Segment>)> {
        let size = segment.size();
        let segment = Arc::new(segment);
        let mut slots = self.slots.write();

        let raw = slots.len();
        if raw > MAX_SEGMENT_ID as usize {
            return Err(Error::OutOfMemory { requested: size });
        }
        if slots.len() == slots.capacity() {
            let additional = slots.capacity().max(1);
            slots
                .try_reserve_exact(additional)
                .map_err(|_| Error::OutOfMemory {
                    requested: additional * std::mem::size_of::<Slot>(),
                })?;
            debug!(capacity = slots.capacity(), "grew segment table");
        }

        let id = SegmentId::new(raw as u32);
        slots.push(Slot::Live(Arc::clone(&segment)));
        self.live.fetch_add(1, Ordering::Relaxed);
        debug!(segment = %id, size, "registered segment");
        Ok((id, segment))
    }

    /// Look up a segment by id for a reader at snapshot `rv`
    pub fn get(&self, id: SegmentId, rv: Version) -> Result<Arc<Segment>> {
        self.resolve(Address::base(id), rv)
    }

    /// Decode an address to its segment for a reader at snapshot `rv`
    pub fn resolve(&self, address: Address, rv: Version) -> Result<Arc<Segment>> {
        let id = address.segment();
        let slots = self.slots.read();
        match slots.get(id.index()) {
            Some(Slot::Live(segment)) => Ok(Arc::clone(segment)),
            Some(Slot::Retired(version)) if *version > rv => Err(AbortReason::SegmentRetired {
                segment: id,
                version: *version,
                rv,
            }
            .into()),
            Some(Slot::Retired(_)) => Err(UsageError::SegmentFreed(id).into()),
            Some(Slot::Vacant) | None => Err(UsageError::UnknownSegment(address).into()),
        }
    }

    /// Retire a segment as of commit version `version`
    ///
    /// Returns the segment if it was still registered. The id is never
    /// handed out again.
    pub fn retire(&self, id: SegmentId, version: Version) -> Option<Arc<Segment>> {
        let mut slots = self.slots.write();
        let slot = slots.get_mut(id.index())?;
        if !matches!(slot, Slot::Live(_)) {
            return None;
        }
        let removed = match std::mem::replace(slot, Slot::Retired(version)) {
            Slot::Live(segment) => segment,
            _ => return None,
        };
        drop(slots);
        self.live.fetch_sub(1, Ordering::Relaxed);
        debug!(segment = %id, version, "retired segment");
        Some(removed)
    }

    /// Number of registered, not yet retired segments
    pub fn live_segments(&self) -> usize {
        self.live.load(Ordering::Relaxed)
    }

    /// Number of ids handed out so far, including retired ones
    pub fn ids_assigned(&self) -> usize {
        self.slots.read().len() - 1
    }

    /// Current slot capacity
    pub fn capacity(&self) -> usize {
        self.slots.read().capacity()
    }
}

impl std::fmt::Debug for SegmentTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SegmentTable")
            .field("live_segments", &self.live_segments())
            .field("ids_assigned", &self.ids_assigned())
            .finish()
    }
}
