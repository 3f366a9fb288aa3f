//! Region configuration
//!
//! A [`RegionConfig`] fixes everything about a region at creation time: the
//! size and alignment of the initial segment, the sizing of each
//! transaction's write-set bloom filter, and the commit-time lock order.
//!
//! Configurations can be built in code or loaded from TOML:
//!
//! ```
//! use tl2_core::{LockOrder, RegionConfig};
//!
//! let config = RegionConfig::from_toml_str(
//!     r#"
//!     size = 4096
//!     align = 8
//!     lock_order = "write_set"
//!     "#,
//! )
//! .unwrap();
//! assert_eq!(config.size, 4096);
//! assert_eq!(config.lock_order, LockOrder::WriteSet);
//! assert_eq!(config.bloom_bits, tl2_core::config::DEFAULT_BLOOM_BITS);
//! ```

use crate::address::MAX_SEGMENT_SIZE;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Default number of bits in a transaction's write-set bloom filter
pub const DEFAULT_BLOOM_BITS: usize = 4096;

/// Default number of hash functions of the bloom filter
pub const DEFAULT_BLOOM_HASHES: u32 = 3;

/// Default number of segment-table slots reserved at creation
pub const DEFAULT_TABLE_CAPACITY: usize = 64;

/// Order in which a committing transaction acquires its write locks
///
/// Either order keeps the abort-on-first-failure contract; they differ only
/// in which of two overlapping committers loses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockOrder {
    /// Most-recently-written word first
    WriteSet,
    /// Ascending address order, identical for every transaction
    #[default]
    Address,
}

/// Configuration of a shared memory region
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionConfig {
    /// Size in bytes of the initial segment
    pub size: usize,

    /// Word size and alignment in bytes
    pub align: usize,

    /// Bits in each transaction's write-set bloom filter
    #[serde(default = "default_bloom_bits")]
    pub bloom_bits: usize,

    /// Hash functions per bloom filter membership test
    #[serde(default = "default_bloom_hashes")]
    pub bloom_hashes: u32,

    /// Commit-time lock acquisition order
    #[serde(default)]
    pub lock_order: LockOrder,

    /// Segment-table slots reserved up front
    #[serde(default = "default_table_capacity")]
    pub initial_table_capacity: usize,
}

fn default_bloom_bits() -> usize {
    DEFAULT_BLOOM_BITS
}

fn default_bloom_hashes() -> u32 {
    DEFAULT_BLOOM_HASHES
}

fn default_table_capacity() -> usize {
    DEFAULT_TABLE_CAPACITY
}

impl RegionConfig {
    /// Configuration with default tuning for the given layout
    pub fn new(size: usize, align: usize) -> Self {
        Self {
            size,
            align,
            bloom_bits: DEFAULT_BLOOM_BITS,
            bloom_hashes: DEFAULT_BLOOM_HASHES,
            lock_order: LockOrder::default(),
            initial_table_capacity: DEFAULT_TABLE_CAPACITY,
        }
    }

    /// Parse a configuration from TOML and validate it
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: RegionConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Check that the configuration describes a usable region
    pub fn validate(&self) -> Result<()> {
        check_alignment(self.align)?;
        check_size(self.size, self.align)?;
        if self.bloom_bits == 0 {
            return Err(Error::Config("bloom_bits must be positive".into()));
        }
        if self.bloom_hashes == 0 {
            return Err(Error::Config("bloom_hashes must be positive".into()));
        }
        Ok(())
    }
}

/// Check that `align` is a power of two
pub fn check_alignment(align: usize) -> Result<()> {
    if !align.is_power_of_two() {
        return Err(Error::InvalidLayout(format!(
            "alignment {} is not a power of two",
            align
        )));
    }
    Ok(())
}

/// Check that `size` is a positive multiple of `align` within the address limit
pub fn check_size(size: usize, align: usize) -> Result<()> {
    if size == 0 || size % align != 0 {
        return Err(Error::InvalidLayout(format!(
            "size {} is not a positive multiple of alignment {}",
            size, align
        )));
    }
    // Compared in u64 so the limit is representable on 32-bit targets
    if size as u64 > MAX_SEGMENT_SIZE {
        return Err(Error::InvalidLayout(format!(
            "size {} exceeds the maximum segment size {}",
            size, MAX_SEGMENT_SIZE
        )));
    }
    Ok(())
}
