//! Stress Tests
//!
//! Many threads running conflicting transactions on a shared region.

use crate::common::*;
use rand::Rng;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;

const THREADS: usize = 8;

/// Move a random delta between two random words until `count` transfers commit
fn transfer_worker(region: &Region, words: usize, count: usize) -> u64 {
    let mut rng = rand::thread_rng();
    let mut aborts = 0;
    let mut committed = 0;
    while committed < count {
        let from = rng.gen_range(0..words);
        let to = rng.gen_range(0..words);
        let delta: i64 = rng.gen_range(1..100);

        let mut tx = region.begin(false).unwrap();
        let result = (|| -> Result<()> {
            let a = read_i64(&mut tx, word(region.start(), from))?;
            let b = read_i64(&mut tx, word(region.start(), to))?;
            if from == to {
                return Ok(());
            }
            write_i64(&mut tx, word(region.start(), from), a - delta)?;
            write_i64(&mut tx, word(region.start(), to), b + delta)
        })();

        let ok = match result {
            Ok(()) => region.end(tx),
            Err(e) => {
                assert!(e.is_retryable(), "unexpected error: {}", e);
                assert!(!region.end(tx));
                false
            }
        };
        if ok {
            committed += 1;
        } else {
            aborts += 1;
        }
    }
    aborts
}

fn sum_of_words(region: &Region, words: usize) -> i64 {
    let mut tx = region.begin(true).unwrap();
    let sum = (0..words)
        .map(|i| read_i64(&mut tx, word(region.start(), i)).unwrap())
        .sum();
    assert!(region.end(tx));
    sum
}

#[test]
fn concurrent_transfers_preserve_zero_sum() {
    for order in [LockOrder::Address, LockOrder::WriteSet] {
        init_tracing();
        let region = Region::builder().size(4 * 8).align(8).lock_order(order).build().unwrap();

        let mut tx = region.begin(false).unwrap();
        for (i, v) in [10i64, -4, -9, 3].into_iter().enumerate() {
            write_i64(&mut tx, word(region.start(), i), v).unwrap();
        }
        assert!(region.end(tx));
        assert_eq!(sum_of_words(&region, 4), 0);

        let aborts: u64 = thread::scope(|s| {
            let handles: Vec<_> = (0..THREADS)
                .map(|_| s.spawn(|| transfer_worker(&region, 4, 500)))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).sum()
        });

        assert_eq!(sum_of_words(&region, 4), 0);
        let m = region.metrics();
        assert_eq!(m.active, 0);
        assert_eq!(m.aborted, aborts);
        assert!(m.committed >= (THREADS * 500) as u64);
    }
}

#[test]
fn readers_see_consistent_snapshots_during_transfers() {
    let region = region(4);
    let done = AtomicU64::new(0);

    thread::scope(|s| {
        for _ in 0..4 {
            s.spawn(|| {
                transfer_worker(&region, 4, 300);
                done.fetch_add(1, Ordering::SeqCst);
            });
        }
        s.spawn(|| {
            while done.load(Ordering::SeqCst) < 4 {
                let mut tx = region.begin(true).unwrap();
                let sum: Result<i64> = (0..4)
                    .map(|i| read_i64(&mut tx, word(region.start(), i)))
                    .sum();
                match sum {
                    // A read-only transaction that completes saw a consistent snapshot
                    Ok(sum) => {
                        assert_eq!(sum, 0);
                        assert!(region.end(tx));
                    }
                    Err(e) => {
                        assert!(e.is_retryable());
                        assert!(!region.end(tx));
                    }
                }
            }
        });
    });

    assert_eq!(sum_of_words(&region, 4), 0);
}

#[test]
fn concurrent_counter_increments_are_not_lost() {
    let region = region(1);
    let per_thread = 200;

    thread::scope(|s| {
        for _ in 0..THREADS {
            s.spawn(|| {
                for _ in 0..per_thread {
                    atomically(&region, TxKind::ReadWrite, RetryPolicy::unbounded(), |tx| {
                        let v = read_u64(tx, region.start())?;
                        write_u64(tx, region.start(), v + 1)
                    })
                    .unwrap();
                }
            });
        }
    });

    assert_eq!(
        snapshot_u64(&region, region.start()),
        (THREADS * per_thread) as u64
    );
}

#[test]
fn concurrent_alloc_and_free() {
    let region = region(1);

    thread::scope(|s| {
        for t in 0..THREADS {
            let region = &region;
            s.spawn(move || {
                for i in 0..50u64 {
                    let mut tx = region.begin(false).unwrap();
                    let seg = tx.alloc(32).unwrap();
                    write_u64(&mut tx, seg, t as u64 * 1000 + i).unwrap();
                    assert!(region.end(tx));

                    let mut tx = region.begin(false).unwrap();
                    assert_eq!(read_u64(&mut tx, seg).unwrap(), t as u64 * 1000 + i);
                    tx.free(seg).unwrap();
                    assert!(region.end(tx));
                }
            });
        }
    });

    let m = region.metrics();
    assert_eq!(m.live_segments, 1);
    assert_eq!(m.active, 0);
}
