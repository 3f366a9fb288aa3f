//! Shared memory region: lifecycle and addressing
//!
//! A [`Region`] owns the segment table, the transaction manager (and with it
//! the global clock) and the initial, non-freeable segment. It is shared by
//! reference between threads; every transaction borrows the region it was
//! begun on, so the region cannot be destroyed while a transaction is alive.
//!
//! # Example
//!
//! ```
//! use tl2_engine::Region;
//!
//! let region = Region::create(64, 8).unwrap();
//! let start = region.start();
//!
//! let mut tx = region.begin(false).unwrap();
//! tx.write(&7u64.to_ne_bytes(), start).unwrap();
//! assert!(region.end(tx));
//!
//! let mut tx = region.begin(true).unwrap();
//! let mut buf = [0u8; 8];
//! tx.read(start, &mut buf).unwrap();
//! assert!(region.end(tx));
//! assert_eq!(u64::from_ne_bytes(buf), 7);
//!
//! region.destroy();
//! ```

use crate::metrics::{MetricsCounters, RegionMetrics};
use crate::transaction::Transaction;
use tl2_concurrency::TransactionManager;
use tl2_core::{AbortReason, Address, LockOrder, RegionConfig, Result, TxKind, UsageError};
use tl2_storage::{Segment, SegmentTable};
use tracing::{debug, warn};

/// A shared memory region
pub struct Region {
    config: RegionConfig,
    table: SegmentTable,
    manager: TransactionManager,
    start: Address,
    counters: MetricsCounters,
}

impl Region {
    /// Create a region whose initial segment has `size` bytes of `align`-byte words
    ///
    /// `align` must be a power of two and `size` a positive multiple of it.
    pub fn create(size: usize, align: usize) -> Result<Self> {
        Self::with_config(RegionConfig::new(size, align))
    }

    /// Create a region from a full configuration
    pub fn with_config(config: RegionConfig) -> Result<Self> {
        config.validate()?;
        let table = SegmentTable::with_capacity(config.initial_table_capacity)?;
        let (id, _) = table.register(Segment::new(config.size, config.align)?)?;
        let manager = TransactionManager::new(&config);
        debug!(
            size = config.size,
            align = config.align,
            lock_order = ?config.lock_order,
            "created region"
        );
        Ok(Self {
            start: Address::base(id),
            config,
            table,
            manager,
            counters: MetricsCounters::default(),
        })
    }

    /// Create a builder for region configuration
    pub fn builder() -> RegionBuilder {
        RegionBuilder::new()
    }

    /// Release the region and every segment it still owns
    ///
    /// Taking `self` by value means no transaction can still be running.
    pub fn destroy(self) {
        debug!(
            live_segments = self.table.live_segments(),
            clock = self.manager.current_version(),
            "destroying region"
        );
    }

    /// Address of the first byte of the initial segment
    pub fn start(&self) -> Address {
        self.start
    }

    /// Size in bytes of the initial segment
    pub fn size(&self) -> usize {
        self.config.size
    }

    /// Word size and alignment in bytes
    pub fn align(&self) -> usize {
        self.config.align
    }

    /// Configuration the region was created with
    pub fn config(&self) -> &RegionConfig {
        &self.config
    }

    /// Begin a transaction; `is_ro` selects a read-only transaction
    pub fn begin(&self, is_ro: bool) -> Result<Transaction<'_>> {
        self.begin_kind(TxKind::from_read_only(is_ro))
    }

    /// Begin a transaction of the given kind
    pub fn begin_kind(&self, kind: TxKind) -> Result<Transaction<'_>> {
        let ctx = self.manager.begin(kind)?;
        self.counters.began();
        Ok(Transaction::new(self, ctx))
    }

    /// End a transaction, returning whether it committed
    ///
    /// A transaction begun on another region is rolled back and reported
    /// as aborted.
    pub fn end(&self, tx: Transaction<'_>) -> bool {
        if !tx.belongs_to(self) {
            let error = UsageError::ForeignRegion;
            warn!(txn = %tx.id(), %error, "rejected end");
            tx.abandon(AbortReason::Rejected(Box::new(error.into())));
            return false;
        }
        tx.commit().is_ok()
    }

    /// Snapshot of the region's counters
    pub fn metrics(&self) -> RegionMetrics {
        self.counters
            .snapshot(self.table.live_segments(), self.manager.current_version())
    }

    pub(crate) fn table(&self) -> &SegmentTable {
        &self.table
    }

    pub(crate) fn manager(&self) -> &TransactionManager {
        &self.manager
    }

    pub(crate) fn counters(&self) -> &MetricsCounters {
        &self.counters
    }
}

impl std::fmt::Debug for Region {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Region")
            .field("size", &self.config.size)
            .field("align", &self.config.align)
            .field("start", &self.start)
            .field("table", &self.table)
            .field("manager", &self.manager)
            .finish()
    }
}

/// Builder for region configuration
///
/// # Example
///
/// ```
/// use tl2_engine::Region;
/// use tl2_core::LockOrder;
///
/// let region = Region::builder()
///     .size(4096)
///     .align(8)
///     .bloom_bits(8192)
///     .lock_order(LockOrder::WriteSet)
///     .build()
///     .unwrap();
/// assert_eq!(region.size(), 4096);
/// ```
#[derive(Debug, Clone)]
pub struct RegionBuilder {
    config: RegionConfig,
}

impl RegionBuilder {
    /// Create a new builder with default tuning and an 8-byte word
    pub fn new() -> Self {
        Self {
            config: RegionConfig::new(0, 8),
        }
    }

    /// Start from an existing configuration
    pub fn from_config(config: RegionConfig) -> Self {
        Self { config }
    }

    /// Set the initial segment size in bytes
    pub fn size(mut self, size: usize) -> Self {
        self.config.size = size;
        self
    }

    /// Set the word size and alignment in bytes
    pub fn align(mut self, align: usize) -> Self {
        self.config.align = align;
        self
    }

    /// Set the bloom filter size in bits
    pub fn bloom_bits(mut self, bits: usize) -> Self {
        self.config.bloom_bits = bits;
        self
    }

    /// Set the number of bloom filter hash functions
    pub fn bloom_hashes(mut self, hashes: u32) -> Self {
        self.config.bloom_hashes = hashes;
        self
    }

    /// Set the commit-time lock order
    pub fn lock_order(mut self, order: LockOrder) -> Self {
        self.config.lock_order = order;
        self
    }

    /// Set the number of segment slots reserved up front
    pub fn initial_table_capacity(mut self, capacity: usize) -> Self {
        self.config.initial_table_capacity = capacity;
        self
    }

    /// Create the region
    pub fn build(self) -> Result<Region> {
        Region::with_config(self.config)
    }
}

impl Default for RegionBuilder {
    fn default() -> Self {
        Self::new()
    }
}
