//! Storage layer for the TL2 engine
//!
//! This crate owns shared memory:
//! - Segment: word-addressed bytes with per-word lock bits and versions
//! - SegmentTable: id-indexed arena decoding addresses in O(1)

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod segment;
pub mod table;

pub use segment::Segment;
pub use table::SegmentTable;
