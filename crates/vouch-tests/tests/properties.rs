//! Property tests over the full pipeline.

use std::sync::Arc;

use proptest::prelude::*;

use vouch_core::traits::HistoryLog;
use vouch_core::types::{ActivityKind, ActivityRecord, RiskBand};
use vouch_engine::RecalcStatus;
use vouch_tests::helpers::*;

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

fn kind() -> impl Strategy<Value = ActivityKind> {
    prop_oneof![
        Just(ActivityKind::Transfer),
        Just(ActivityKind::TokenTransfer),
        Just(ActivityKind::ContractCall),
        Just(ActivityKind::Swap),
        Just(ActivityKind::Lend),
        Just(ActivityKind::Borrow),
        Just(ActivityKind::Repay),
        Just(ActivityKind::Stake),
    ]
}

fn activity(address: String) -> impl Strategy<Value = Vec<ActivityRecord>> {
    prop::collection::vec(
        (
            0i64..500,
            0.0f64..50_000.0,
            kind(),
            any::<bool>(),
            prop::sample::select(vec!["USDC", "ETH", "DAI", "PEPE"]),
        ),
        0..40,
    )
    .prop_map(move |rows| {
        rows.into_iter()
            .enumerate()
            .map(|(i, (days_ago, value, kind, incoming, token))| {
                let mut r = record(&address, &format!("p{i}"), days_ago, value, token, kind);
                if !incoming {
                    std::mem::swap(&mut r.from, &mut r.to);
                }
                r
            })
            .collect()
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn score_is_bounded_and_explained(
        records in activity(addr(1)),
        tier in 0u8..6,
        swing in prop::sample::select(vec![0.0, 0.004, 0.01, 0.05]),
    ) {
        let mut h = Harness::new();
        h.oracle = Arc::new(SeriesOracle::choppy(swing));
        let a = addr(1);
        let in_window = records.iter().any(|r| NOW - r.timestamp <= 365 * 86_400);
        h.feed.set(&a, records);
        h.staking.set(&a, tier);

        let result = runtime().block_on(h.service().score(&a)).unwrap();
        prop_assert!(result.score <= 1_000);
        prop_assert!(result.base_score <= 1_000);
        prop_assert!(!result.explanation.is_empty());
        prop_assert!(result.explanation.starts_with("Base score "));
        prop_assert_eq!(result.risk_band == RiskBand::Unknown, !in_window);
        prop_assert!(result.oracle_penalty <= 50);
    }

    #[test]
    fn history_grows_by_one_per_recompute(forces in prop::collection::vec(any::<bool>(), 1..8)) {
        let h = Harness::new();
        let a = addr(1);
        h.feed.set(&a, thin_wallet(&a));
        let service = h.service();
        let rt = runtime();

        let mut recomputed = 0;
        for force in forces {
            h.clock.advance(60);
            let report = rt.block_on(service.recalculate(&a, force)).unwrap();
            if report.status == RecalcStatus::Recomputed {
                recomputed += 1;
            }
            prop_assert_eq!(h.stores.history.history(&a, 100).unwrap().len(), recomputed);
        }
    }
}
