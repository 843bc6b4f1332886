//! Recalculation gate, write gate, per-address write serialization and the
//! append-only history log.

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};

use vouch_core::constants::SECONDS_PER_DAY;
use vouch_core::traits::{HistoryLog, ScoreRepository};
use vouch_core::types::{ActivityKind, ChangeReason};
use vouch_engine::{Freshness, RecalcStatus, StaleReason, WriteStatus};
use vouch_tests::helpers::*;

#[tokio::test]
async fn lifecycle_initial_fresh_activity_age_forced() {
    let h = Harness::new();
    let a = addr(1);
    h.feed.set(&a, established_wallet(&a));
    let service = h.service();

    let r = service.recalculate(&a, false).await.unwrap();
    assert_eq!(r.freshness, Freshness::Unknown);

    h.clock.advance(600);
    let r = service.recalculate(&a, false).await.unwrap();
    assert_eq!(r.status, RecalcStatus::Fresh);

    h.feed.push(&a, record(&a, "new", 0, 900.0, "USDC", ActivityKind::TokenTransfer));
    let r = service.recalculate(&a, false).await.unwrap();
    assert_eq!(r.freshness, Freshness::Stale(StaleReason::NewActivity));

    h.clock.advance(8 * SECONDS_PER_DAY);
    let r = service.recalculate(&a, false).await.unwrap();
    assert_eq!(r.freshness, Freshness::Stale(StaleReason::MaxAge));

    let r = service.recalculate(&a, true).await.unwrap();
    assert_eq!(r.freshness, Freshness::Fresh);
    assert_eq!(r.status, RecalcStatus::Recomputed);

    let reasons: Vec<ChangeReason> = h
        .stores
        .history
        .history(&a, 100)
        .unwrap()
        .into_iter()
        .map(|e| e.change_reason)
        .collect();
    assert_eq!(
        reasons,
        vec![
            ChangeReason::Initial,
            ChangeReason::NewActivity,
            ChangeReason::MaxAge,
            ChangeReason::Forced,
        ]
    );
}

#[tokio::test]
async fn unchanged_score_skips_write_but_still_records_history() {
    let h = Harness::new();
    let a = addr(1);
    h.feed.set(&a, established_wallet(&a));
    let service = h.service();
    let first = service.recalculate(&a, false).await.unwrap();

    // Past the feature TTL and max age, same activity.
    h.clock.advance(7 * SECONDS_PER_DAY + 1);
    let second = service.recalculate(&a, false).await.unwrap();
    assert_eq!(second.status, RecalcStatus::Recomputed);

    let (old, new) = (first.result.score, second.result.score);
    let relative = f64::from(old.abs_diff(new)) / f64::from(old);
    if relative < 0.05 {
        assert_eq!(second.write, Some(WriteStatus::Skipped));
        assert_eq!(h.writer.write_count(), 1);
    }
    assert_eq!(h.stores.history.history(&a, 10).unwrap().len(), 2);
}

#[tokio::test]
async fn large_change_is_written() {
    let h = Harness::new();
    let a = addr(1);
    h.feed.set(&a, thin_wallet(&a));
    let service = h.service();
    let first = service.recalculate(&a, false).await.unwrap();

    h.clock.advance(2 * 3_600);
    h.feed.set(&a, established_wallet(&a));
    h.feed.push(&a, record(&a, "fresh", 0, 10.0, "USDC", ActivityKind::TokenTransfer));
    let second = service.recalculate(&a, false).await.unwrap();

    let change = f64::from(first.result.score.abs_diff(second.result.score))
        / f64::from(first.result.score);
    assert!(change >= 0.05, "{} -> {}", first.result.score, second.result.score);
    assert!(matches!(second.write, Some(WriteStatus::Written { .. })));
    assert_eq!(h.writer.write_count(), 2);
}

#[tokio::test]
async fn failed_write_keeps_cached_score() {
    let h = Harness::new();
    let a = addr(1);
    h.feed.set(&a, established_wallet(&a));
    h.writer.reject.store(true, Ordering::SeqCst);

    let r = h.service().recalculate(&a, false).await.unwrap();
    assert!(matches!(r.write, Some(WriteStatus::Failed { ref error }) if error.contains("gas price")));
    let saved = h.stores.scores.latest(&a).unwrap().unwrap();
    assert_eq!(saved.result, r.result);
    assert_eq!(saved.last_written_score, None);

    // Nothing reached the chain, so the next recompute writes even if the
    // score has not moved.
    h.writer.reject.store(false, Ordering::SeqCst);
    h.clock.advance(7 * SECONDS_PER_DAY + 1);
    let retry = h.service().recalculate(&a, false).await.unwrap();
    assert!(matches!(retry.write, Some(WriteStatus::Written { .. })));
}

#[tokio::test]
async fn small_moves_accumulate_against_the_written_score() {
    let (h, dial) = Harness::new().with_dial("v3", 0.800);
    let a = addr(1);
    h.feed.set(&a, established_wallet(&a));
    let service = h.service();

    let first = service.recalculate(&a, false).await.unwrap();
    assert_eq!(first.result.score, 800);
    assert_eq!(h.writer.write_count(), 1);

    // 800 -> 770 -> 740: each step is under 5% of the one before, but 740 is
    // 7.5% below what the chain holds.
    dial.set(0.770);
    h.clock.advance(8 * SECONDS_PER_DAY);
    let second = service.recalculate(&a, false).await.unwrap();
    assert_eq!(second.result.score, 770);
    assert_eq!(second.write, Some(WriteStatus::Skipped));

    dial.set(0.740);
    h.clock.advance(8 * SECONDS_PER_DAY);
    let third = service.recalculate(&a, false).await.unwrap();
    assert_eq!(third.old_score, Some(770));
    assert!(matches!(third.write, Some(WriteStatus::Written { .. })));
    assert_eq!(h.writer.write_count(), 2);

    let saved = h.stores.scores.latest(&a).unwrap().unwrap();
    assert_eq!(saved.last_written_score, Some(740));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_forced_recalculations_never_overlap_in_writer() {
    let mut h = Harness::new();
    h.writer = Arc::new(GuardedWriter::with_delay(Duration::from_millis(20)));
    let a = addr(1);
    h.feed.set(&a, established_wallet(&a));
    let service = h.service();

    let mut handles = Vec::new();
    for _ in 0..6 {
        let service = service.clone();
        let a = a.clone();
        handles.push(tokio::spawn(async move { service.recalculate(&a, true).await }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    assert!(!h.writer.overlapped.load(Ordering::SeqCst));
    assert_eq!(h.writer.writes_for(&a), 6);
    assert_eq!(h.stores.history.history(&a, 100).unwrap().len(), 6);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn different_addresses_write_concurrently() {
    let mut h = Harness::new();
    let delay = Duration::from_millis(250);
    h.writer = Arc::new(GuardedWriter::with_delay(delay));
    let addresses: Vec<String> = (1..=4).map(addr).collect();
    for a in &addresses {
        h.feed.set(a, established_wallet(a));
    }
    let service = h.service();

    let started = Instant::now();
    let outcome = service.recalculate_batch(&addresses, true).await;
    let elapsed = started.elapsed();

    assert!(outcome.iter().all(|(_, r)| r.is_ok()));
    assert_eq!(h.writer.write_count(), 4);
    assert!(elapsed < delay * 4, "writes were serialized across addresses: {elapsed:?}");
}

#[tokio::test]
async fn history_is_append_only_and_ordered() {
    let h = Harness::new();
    let a = addr(1);
    h.feed.set(&a, established_wallet(&a));
    let service = h.service();

    let mut seen = Vec::new();
    for step in 0..5 {
        h.clock.advance(60);
        service.recalculate(&a, true).await.unwrap();
        let history = h.stores.history.history(&a, 100).unwrap();
        assert_eq!(history.len(), step + 1);
        // Earlier entries are never rewritten.
        assert_eq!(&history[..seen.len()], seen.as_slice());
        seen = history;
    }

    let timestamps: Vec<i64> = seen.iter().map(|e| e.timestamp).collect();
    assert!(timestamps.windows(2).all(|w| w[0] < w[1]));
    for pair in seen.windows(2) {
        assert_eq!(pair[1].previous_score, Some(pair[0].new_score));
    }

    let newest_two = h.stores.history.history(&a, 2).unwrap();
    assert_eq!(newest_two.as_slice(), &seen[3..]);
}

#[tokio::test]
async fn batch_isolates_a_panicking_address() {
    let h = Harness::new();
    let addresses: Vec<String> = (1..=3).map(addr).collect();
    for a in &addresses {
        h.feed.set(a, thin_wallet(a));
    }
    h.feed.panic_on(&addresses[1]);

    let outcome = h.service().recalculate_batch(&addresses, false).await;
    assert_eq!(outcome.len(), 3);
    for (_, result) in &outcome {
        assert!(result.is_ok());
    }
    let defaulted = outcome[1].1.as_ref().unwrap();
    assert_eq!(defaulted.status, RecalcStatus::Defaulted);
    assert_eq!(defaulted.result.explanation, "Error computing score, using default");
    assert!(h.stores.scores.latest(&addresses[1]).unwrap().is_none());
    assert_ne!(
        outcome[0].1.as_ref().unwrap().result.explanation,
        "Error computing score, using default"
    );
}
