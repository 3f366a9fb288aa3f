//! Lifecycle Tests
//!
//! Region creation and configuration, segment allocation and freeing,
//! metrics, and the retry helper.

use crate::common::*;

// ============================================================================
// Region configuration
// ============================================================================

#[test]
fn region_from_toml_config() {
    init_tracing();
    let config = RegionConfig::from_toml_str(
        r#"
        size = 256
        align = 16
        bloom_bits = 1024
        lock_order = "write_set"
        "#,
    )
    .unwrap();
    let region = Region::with_config(config).unwrap();
    assert_eq!(region.size(), 256);
    assert_eq!(region.align(), 16);
    assert_eq!(region.config().bloom_hashes, 3);
    assert_eq!(region.config().lock_order, LockOrder::WriteSet);
    region.destroy();
}

#[test]
fn invalid_layouts_are_rejected() {
    for (size, align) in [(0, 8), (12, 8), (64, 6), (64, 0)] {
        assert!(
            matches!(Region::create(size, align), Err(Error::InvalidLayout(_))),
            "size {} align {} accepted",
            size,
            align
        );
    }
}

#[test]
fn unparsable_config_is_a_config_error() {
    assert!(matches!(
        RegionConfig::from_toml_str("size = \"big\""),
        Err(Error::Config(_))
    ));
    assert!(matches!(
        RegionConfig::from_toml_str("size = 64\nalign = 8\nbloom_hashes = 0"),
        Err(Error::Config(_))
    ));
}

// ============================================================================
// Segment allocation
// ============================================================================

#[test]
fn allocated_segments_have_distinct_ids() {
    let region = region(1);
    let mut tx = region.begin(false).unwrap();
    let a = tx.alloc(16).unwrap();
    let b = tx.alloc(16).unwrap();
    assert!(region.end(tx));

    assert_ne!(a.segment(), b.segment());
    assert_ne!(a.segment(), region.start().segment());
    assert_eq!(region.metrics().live_segments, 3);
}

#[test]
fn freed_segment_ids_are_not_reused() {
    let region = region(1);
    let mut tx = region.begin(false).unwrap();
    let a = tx.alloc(8).unwrap();
    assert!(region.end(tx));

    let mut tx = region.begin(false).unwrap();
    tx.free(a).unwrap();
    assert!(region.end(tx));

    let mut tx = region.begin(false).unwrap();
    let b = tx.alloc(8).unwrap();
    assert!(region.end(tx));
    assert!(b.segment() > a.segment());
}

#[test]
fn allocation_rolls_back_with_its_transaction() {
    let region = region(1);
    let mut tx = region.begin(false).unwrap();
    let seg = tx.alloc(64).unwrap();
    write_u64(&mut tx, seg, 1).unwrap();
    assert!(write_u64(&mut tx, seg.offset_by(64), 1).is_err());
    assert!(!region.end(tx));

    assert_eq!(region.metrics().live_segments, 1);
    let mut tx = region.begin(true).unwrap();
    assert!(matches!(
        read_u64(&mut tx, seg),
        Err(Error::Usage(UsageError::SegmentFreed(_)))
    ));
}

#[test]
fn allocation_past_address_limit_is_rejected() {
    let region = region(1);
    let mut tx = region.begin(false).unwrap();
    write_u64(&mut tx, region.start(), 5).unwrap();

    assert!(matches!(
        tx.alloc(usize::MAX & !7),
        Err(Error::InvalidLayout(_))
    ));
    assert!(tx.is_doomed());
    assert!(!region.end(tx));
    assert_eq!(snapshot_u64(&region, region.start()), 0);
}

#[test]
fn linked_list_in_allocated_segments() {
    let region = region(1);
    let head = region.start();

    // Push three nodes; each node is [value, next address bits]
    for value in 1..=3u64 {
        let mut tx = region.begin(false).unwrap();
        let node = tx.alloc(16).unwrap();
        let next = read_u64(&mut tx, head).unwrap();
        write_u64(&mut tx, node, value).unwrap();
        write_u64(&mut tx, node.offset_by(8), next).unwrap();
        write_u64(&mut tx, head, node.to_bits().unwrap()).unwrap();
        assert!(region.end(tx));
    }

    // Walk and pop
    let mut tx = region.begin(false).unwrap();
    let mut seen = Vec::new();
    let mut cursor = read_u64(&mut tx, head).unwrap();
    while cursor != 0 {
        let node = Address::from_bits(cursor);
        seen.push(read_u64(&mut tx, node).unwrap());
        cursor = read_u64(&mut tx, node.offset_by(8)).unwrap();
        tx.free(node).unwrap();
    }
    write_u64(&mut tx, head, 0).unwrap();
    assert!(region.end(tx));

    assert_eq!(seen, vec![3, 2, 1]);
    assert_eq!(region.metrics().live_segments, 1);
}

/// Push `values` onto the list at `head`; each node is [value, next bits]
fn push_nodes(region: &Region, head: Address, values: &[u64]) {
    for &value in values {
        let mut tx = region.begin(false).unwrap();
        let node = tx.alloc(16).unwrap();
        let next = read_u64(&mut tx, head).unwrap();
        write_u64(&mut tx, node, value).unwrap();
        write_u64(&mut tx, node.offset_by(8), next).unwrap();
        write_u64(&mut tx, head, node.to_bits().unwrap()).unwrap();
        assert!(region.end(tx));
    }
}

/// Unlink and free the first node, returning its value
fn pop_node(tx: &mut Transaction<'_>, head: Address) -> Result<Option<u64>> {
    let bits = read_u64(tx, head)?;
    if bits == 0 {
        return Ok(None);
    }
    let node = Address::from_bits(bits);
    let value = read_u64(tx, node)?;
    let next = read_u64(tx, node.offset_by(8))?;
    write_u64(tx, head, next)?;
    tx.free(node)?;
    Ok(Some(value))
}

#[test]
fn reader_racing_a_free_aborts_and_retries() {
    let region = region(1);
    let head = region.start();
    push_nodes(&region, head, &[1, 2]);

    // The reader's snapshot still links the node the popper frees
    let mut reader = region.begin(true).unwrap();
    let node = Address::from_bits(read_u64(&mut reader, head).unwrap());

    let mut popper = region.begin(false).unwrap();
    assert_eq!(pop_node(&mut popper, head).unwrap(), Some(2));
    assert!(region.end(popper));

    let err = read_u64(&mut reader, node).unwrap_err();
    assert!(err.is_retryable(), "unexpected error: {}", err);
    assert!(matches!(
        err,
        Error::Aborted(AbortReason::SegmentRetired { segment, .. }) if segment == node.segment()
    ));
    assert!(!region.end(reader));

    // A retry starts from a snapshot that includes the free
    let mut attempts = 0;
    let first = atomically(&region, TxKind::ReadOnly, RetryPolicy::new(3), |tx| {
        attempts += 1;
        let bits = read_u64(tx, head)?;
        read_u64(tx, Address::from_bits(bits))
    })
    .unwrap();
    assert_eq!(first, 1);
    assert_eq!(attempts, 1);
}

#[test]
fn stale_address_after_free_is_a_usage_error() {
    let region = region(1);
    let head = region.start();
    push_nodes(&region, head, &[7]);
    let node = Address::from_bits(snapshot_u64(&region, head));

    let mut tx = region.begin(false).unwrap();
    assert_eq!(pop_node(&mut tx, head).unwrap(), Some(7));
    assert!(region.end(tx));

    // Begun after the free: the address is dangling, not contended
    let mut tx = region.begin(true).unwrap();
    let err = read_u64(&mut tx, node).unwrap_err();
    assert_eq!(err, Error::Usage(UsageError::SegmentFreed(node.segment())));
    assert!(!err.is_retryable());
}

#[test]
fn concurrent_pops_free_each_node_once() {
    let region = region(1);
    let head = region.start();
    let values: Vec<u64> = (1..=64).collect();
    push_nodes(&region, head, &values);

    let popped: Vec<u64> = std::thread::scope(|s| {
        let handles: Vec<_> = (0..4)
            .map(|_| {
                s.spawn(|| {
                    let mut mine = Vec::new();
                    loop {
                        let value = atomically(
                            &region,
                            TxKind::ReadWrite,
                            RetryPolicy::unbounded(),
                            |tx| pop_node(tx, head),
                        )
                        .unwrap();
                        match value {
                            Some(v) => mine.push(v),
                            None => break mine,
                        }
                    }
                })
            })
            .collect();
        handles.into_iter().flat_map(|h| h.join().unwrap()).collect()
    });

    let mut popped = popped;
    popped.sort_unstable();
    assert_eq!(popped, values);
    assert_eq!(region.metrics().live_segments, 1);
}

// ============================================================================
// Metrics and retry
// ============================================================================

#[test]
fn metrics_track_outcomes() {
    let region = region(2);
    store_u64(&region, region.start(), 1);
    let tx = region.begin(false).unwrap();
    tx.rollback();

    let m = region.metrics();
    assert_eq!(m.committed, 1);
    assert_eq!(m.aborted, 1);
    assert_eq!(m.active, 0);
    assert_eq!(m.clock, 1);
    assert!((m.commit_rate() - 0.5).abs() < 1e-9);
}

#[test]
fn atomically_returns_body_value() {
    let region = region(1);
    let total = atomically(&region, TxKind::ReadWrite, RetryPolicy::default(), |tx| {
        let v = read_u64(tx, region.start())? + 10;
        write_u64(tx, region.start(), v)?;
        Ok(v)
    })
    .unwrap();
    assert_eq!(total, 10);
    assert_eq!(snapshot_u64(&region, region.start()), 10);
}
