//! Opaque addresses into a region's segments
//!
//! An [`Address`] is an explicit `(segment id, byte offset)` pair. Decoding
//! one is an indexed lookup of the segment id in the region's segment table,
//! never a scan. Clients treat addresses as opaque handles and derive word
//! addresses with [`Address::offset_by`].
//!
//! For callers that need a plain integer handle, [`Address::to_bits`] packs
//! the pair into a `u64`:
//!
//! ```text
//!  63            40 39                              0
//! +----------------+---------------------------------+
//! |  segment id    |           byte offset           |
//! +----------------+---------------------------------+
//! ```
//!
//! Segment id 0 is reserved, so the all-zero value is never a valid address.

use serde::{Deserialize, Serialize};

/// Number of bits used for the byte offset inside a segment
pub const OFFSET_BITS: u32 = 40;

/// Number of bits used for the segment id
pub const SEGMENT_ID_BITS: u32 = 64 - OFFSET_BITS;

/// Largest segment size in bytes an address can span
pub const MAX_SEGMENT_SIZE: u64 = 1 << OFFSET_BITS;

/// Largest segment id a region may hand out
pub const MAX_SEGMENT_ID: u32 = (1 << SEGMENT_ID_BITS) - 1;

const OFFSET_MASK: u64 = (1 << OFFSET_BITS) - 1;

/// Identifier of a segment within one region
///
/// Ids are assigned in increasing order and never reused while the region
/// is alive. Id 0 is the sentinel; the region's first segment is id 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SegmentId(u32);

impl SegmentId {
    /// Reserved id that never names a segment
    pub const SENTINEL: SegmentId = SegmentId(0);

    /// Id of the region's initial, non-freeable segment
    pub const FIRST: SegmentId = SegmentId(1);

    /// Create an id from its raw value
    pub const fn new(raw: u32) -> Self {
        SegmentId(raw)
    }

    /// Raw value, usable as a table index
    pub const fn get(self) -> u32 {
        self.0
    }

    /// Table index of this id
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    /// Whether this is the reserved sentinel id
    pub const fn is_sentinel(self) -> bool {
        self.0 == 0
    }
}

impl std::fmt::Display for SegmentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "seg{}", self.0)
    }
}

/// Opaque address of a byte inside a region
///
/// Ordering is by segment id, then offset. The engine relies on this order
/// when it acquires commit-time locks canonically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Address {
    segment: SegmentId,
    offset: u64,
}

impl Address {
    /// The null address (sentinel segment, offset 0)
    pub const NULL: Address = Address {
        segment: SegmentId::SENTINEL,
        offset: 0,
    };

    /// Address of `offset` bytes into `segment`
    pub const fn new(segment: SegmentId, offset: u64) -> Self {
        Address { segment, offset }
    }

    /// Address of the first byte of `segment`
    pub const fn base(segment: SegmentId) -> Self {
        Address { segment, offset: 0 }
    }

    /// Segment this address points into
    pub const fn segment(&self) -> SegmentId {
        self.segment
    }

    /// Byte offset inside the segment
    pub const fn offset(&self) -> u64 {
        self.offset
    }

    /// Whether this is the first byte of its segment
    pub const fn is_base(&self) -> bool {
        self.offset == 0
    }

    /// Whether this is the null address
    pub const fn is_null(&self) -> bool {
        self.segment.is_sentinel()
    }

    /// Address `bytes` further into the same segment
    ///
    /// Bounds are checked when the address is used, not here.
    ///
    /// # Examples
    ///
    /// ```
    /// use tl2_core::{Address, SegmentId};
    ///
    /// let base = Address::base(SegmentId::FIRST);
    /// assert_eq!(base.offset_by(16).offset(), 16);
    /// assert_eq!(base.offset_by(16).segment(), SegmentId::FIRST);
    /// ```
    pub const fn offset_by(self, bytes: u64) -> Self {
        Address {
            segment: self.segment,
            offset: self.offset.wrapping_add(bytes),
        }
    }

    /// Pack into a single integer handle
    ///
    /// Returns `None` if the offset does not fit in [`OFFSET_BITS`].
    pub const fn to_bits(self) -> Option<u64> {
        if self.offset > OFFSET_MASK {
            return None;
        }
        Some(((self.segment.0 as u64) << OFFSET_BITS) | self.offset)
    }

    /// Unpack an integer handle produced by [`Address::to_bits`]
    pub const fn from_bits(bits: u64) -> Self {
        Address {
            segment: SegmentId((bits >> OFFSET_BITS) as u32),
            offset: bits & OFFSET_MASK,
        }
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}+{:#x}", self.segment, self.offset)
    }
}
