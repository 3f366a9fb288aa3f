//! Run a transaction body until it commits
//!
//! Conflicts are expected under optimistic concurrency; the usual pattern
//! is to start over with a fresh snapshot. [`atomically`] does exactly that
//! for conflict aborts and gives up on anything else.

use std::time::Duration;
use tl2_core::{Result, TxKind};
use tl2_engine::{Region, Transaction};
use tracing::debug;

/// How many times to attempt a transaction and how long to wait between
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first (at least one is always made)
    pub max_attempts: u32,
    /// Pause between attempts; zero yields the thread instead
    pub backoff: Duration,
}

impl RetryPolicy {
    /// Retry up to `max_attempts` times without sleeping
    pub const fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            backoff: Duration::ZERO,
        }
    }

    /// Keep retrying until the transaction commits
    pub const fn unbounded() -> Self {
        Self::new(u32::MAX)
    }

    /// Sleep for `backoff` between attempts
    pub const fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    fn pause(&self) {
        if self.backoff.is_zero() {
            std::thread::yield_now();
        } else {
            std::thread::sleep(self.backoff);
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(64)
    }
}

/// Run `body` in a transaction of `kind`, retrying on conflict
///
/// The body's value is returned once its transaction commits. A body error
/// or commit failure that is not a conflict is returned immediately, as is
/// the last conflict once the attempts run out. Every failed attempt is
/// rolled back, so the body may run several times but commits at most once.
///
/// # Example
///
/// ```
/// use tl2stm::{atomically, Region, RetryPolicy, TxKind};
///
/// let region = Region::create(8, 8).unwrap();
/// let counter = region.start();
///
/// let next = atomically(&region, TxKind::ReadWrite, RetryPolicy::default(), |tx| {
///     let mut buf = [0u8; 8];
///     tx.read(counter, &mut buf)?;
///     let n = u64::from_ne_bytes(buf) + 1;
///     tx.write(&n.to_ne_bytes(), counter)?;
///     Ok(n)
/// })
/// .unwrap();
/// assert_eq!(next, 1);
/// ```
pub fn atomically<T, F>(region: &Region, kind: TxKind, policy: RetryPolicy, mut body: F) -> Result<T>
where
    F: FnMut(&mut Transaction<'_>) -> Result<T>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        let mut tx = region.begin_kind(kind)?;
        let err = match body(&mut tx) {
            Ok(value) => match tx.commit() {
                Ok(_) => return Ok(value),
                Err(e) => e,
            },
            Err(e) => {
                tx.rollback();
                e
            }
        };

        if !err.is_retryable() || attempt >= max_attempts {
            return Err(err);
        }
        debug!(attempt, error = %err, "transaction conflicted, retrying");
        policy.pause();
    }
}
