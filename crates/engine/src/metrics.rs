//! Region metrics
//!
//! Counters are updated with `Relaxed` ordering; a snapshot is a consistent
//! view of each counter but not across counters.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use tl2_core::Version;

/// Snapshot of a region's counters
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RegionMetrics {
    /// Transactions that ended COMMITTED
    pub committed: u64,
    /// Transactions that ended ABORTED
    pub aborted: u64,
    /// Transactions begun but not yet ended
    pub active: u64,
    /// Segments currently registered, including the initial one
    pub live_segments: usize,
    /// Current global clock value
    pub clock: Version,
}

impl RegionMetrics {
    /// Fraction of ended transactions that committed (1.0 when none ended)
    pub fn commit_rate(&self) -> f64 {
        let ended = self.committed + self.aborted;
        if ended == 0 {
            1.0
        } else {
            self.committed as f64 / ended as f64
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct MetricsCounters {
    committed: AtomicU64,
    aborted: AtomicU64,
    active: AtomicU64,
}

impl MetricsCounters {
    pub(crate) fn began(&self) {
        self.active.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn ended(&self, committed: bool) {
        self.active.fetch_sub(1, Ordering::Relaxed);
        if committed {
            self.committed.fetch_add(1, Ordering::Relaxed);
        } else {
            self.aborted.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn snapshot(&self, live_segments: usize, clock: Version) -> RegionMetrics {
        RegionMetrics {
            committed: self.committed.load(Ordering::Relaxed),
            aborted: self.aborted.load(Ordering::Relaxed),
            active: self.active.load(Ordering::Relaxed),
            live_segments,
            clock,
        }
    }
}
