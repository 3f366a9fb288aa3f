//! Atomicity Tests
//!
//! Committed writes appear together; aborted writes never appear.

use crate::common::*;

// ============================================================================
// Round trip
// ============================================================================

#[test]
fn write_commit_then_read_returns_same_bytes() {
    let region = region(8);
    let buf: Vec<u8> = (1..=24).collect();

    let mut tx = region.begin(false).unwrap();
    tx.write(&buf, word(region.start(), 2)).unwrap();
    assert!(region.end(tx));

    let mut tx = region.begin(true).unwrap();
    let mut out = vec![0u8; 24];
    tx.read(word(region.start(), 2), &mut out).unwrap();
    assert!(region.end(tx));
    assert_eq!(out, buf);
}

#[test]
fn fresh_region_reads_zero() {
    let region = region(4);
    let mut tx = region.begin(true).unwrap();
    let mut out = [0xffu8; 32];
    tx.read(region.start(), &mut out).unwrap();
    assert_eq!(out, [0u8; 32]);
    assert!(region.end(tx));
}

#[test]
fn round_trip_with_wide_words() {
    init_tracing();
    let region = Region::create(64, 16).unwrap();
    let buf = [0xabu8; 32];

    let mut tx = region.begin(false).unwrap();
    tx.write(&buf, region.start().offset_by(16)).unwrap();
    assert!(region.end(tx));

    let mut tx = region.begin(true).unwrap();
    let mut out = [0u8; 32];
    tx.read(region.start().offset_by(16), &mut out).unwrap();
    assert_eq!(out, buf);
}

// ============================================================================
// Aborted transactions leave no trace
// ============================================================================

#[test]
fn rolled_back_writes_are_discarded() {
    let region = region(4);
    store_u64(&region, word(region.start(), 0), 10);

    let mut tx = region.begin(false).unwrap();
    write_u64(&mut tx, word(region.start(), 0), 99).unwrap();
    write_u64(&mut tx, word(region.start(), 1), 99).unwrap();
    tx.rollback();

    assert_eq!(snapshot_u64(&region, word(region.start(), 0)), 10);
    assert_eq!(snapshot_u64(&region, word(region.start(), 1)), 0);
}

#[test]
fn failed_validation_leaves_memory_unchanged() {
    let region = region(4);
    let a = word(region.start(), 0);
    let b = word(region.start(), 1);

    // t1 reads a, then t2 commits a newer a
    let mut t1 = region.begin(false).unwrap();
    assert_eq!(read_u64(&mut t1, a).unwrap(), 0);
    write_u64(&mut t1, b, 7).unwrap();

    store_u64(&region, a, 5);
    store_u64(&region, word(region.start(), 2), 6);

    // wv - rv > 1 so t1 validates and sees a's newer version
    assert!(!region.end(t1));
    assert_eq!(snapshot_u64(&region, b), 0);
    assert_eq!(snapshot_u64(&region, a), 5);
}

#[test]
fn doomed_transaction_cannot_commit() {
    let region = region(2);
    let mut tx = region.begin(false).unwrap();
    write_u64(&mut tx, region.start(), 3).unwrap();

    // Out of bounds dooms the whole transaction, including the earlier write
    assert!(write_u64(&mut tx, word(region.start(), 2), 4).is_err());
    // Later operations keep reporting the usage error
    assert!(matches!(
        read_u64(&mut tx, region.start()),
        Err(Error::Usage(UsageError::OutOfBounds { .. }))
    ));
    assert!(!region.end(tx));
    assert_eq!(snapshot_u64(&region, region.start()), 0);
}

#[test]
fn dropped_transaction_is_rolled_back() {
    let region = region(2);
    {
        let mut tx = region.begin(false).unwrap();
        write_u64(&mut tx, region.start(), 1).unwrap();
    }
    assert_eq!(snapshot_u64(&region, region.start()), 0);
    assert_eq!(region.metrics().aborted, 1);
}

// ============================================================================
// Commit versions
// ============================================================================

#[test]
fn write_versions_strictly_increase() {
    let region = region(4);
    let mut last = region.metrics().clock;
    for i in 0..20u64 {
        let mut tx = region.begin(false).unwrap();
        write_u64(&mut tx, word(region.start(), (i % 4) as usize), i).unwrap();
        let wv = tx.commit().unwrap();
        assert!(wv > last);
        assert_eq!(region.metrics().clock, wv);
        last = wv;
    }
}

#[test]
fn read_only_and_empty_commits_do_not_advance_clock() {
    let region = region(2);
    store_u64(&region, region.start(), 1);
    let clock = region.metrics().clock;

    let mut tx = region.begin(true).unwrap();
    read_u64(&mut tx, region.start()).unwrap();
    assert_eq!(tx.commit().unwrap(), clock);

    let tx = region.begin(false).unwrap();
    assert_eq!(tx.commit().unwrap(), clock);

    assert_eq!(region.metrics().clock, clock);
}
