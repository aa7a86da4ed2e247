//! Property-Based Tests for Admission Control
//!
//! Random arrival sequences checked against the quota invariant, the retry
//! hint, and determinism of construction.
//!
//! # Running the Tests
//!
//! ```bash
//! cargo test --lib rate_limit::proptests
//! ```

use proptest::prelude::*;
use std::time::Duration;

use crate::rate_limit::clock::ManualClock;
use crate::rate_limit::config::{Algorithm, ControllerOptions, QuotaPolicy};
use crate::rate_limit::controller::AdmissionController;
use crate::rate_limit::quota::Decision;

fn arb_algorithm() -> impl Strategy<Value = Algorithm> {
    prop_oneof![
        Just(Algorithm::FixedWindow),
        Just(Algorithm::SlidingWindow),
        Just(Algorithm::TokenBucket),
    ]
}

// Non-decreasing arrival times in milliseconds, built from random gaps.
fn arb_arrivals() -> impl Strategy<Value = Vec<u64>> {
    prop::collection::vec(0u64..400, 1..300).prop_map(|gaps| {
        gaps.into_iter()
            .scan(0u64, |t, gap| {
                // Bursts: most gaps are zero or tiny.
                *t += if gap < 300 { gap / 100 } else { gap };
                Some(*t)
            })
            .collect()
    })
}

fn controller(
    limit: u32,
    window: Duration,
    algorithm: Algorithm,
) -> AdmissionController<ManualClock> {
    let policy = QuotaPolicy::new(limit, window).unwrap();
    AdmissionController::with_clock(
        policy,
        ControllerOptions::new().algorithm(algorithm),
        ManualClock::new(),
    )
    .unwrap()
}

fn run(
    controller: &AdmissionController<ManualClock>,
    arrivals: &[u64],
) -> Vec<(Duration, Decision)> {
    arrivals
        .iter()
        .map(|ms| {
            let now = Duration::from_millis(*ms);
            (now, controller.allow("key", now))
        })
        .collect()
}

proptest! {
    #[test]
    fn prop_quota_invariant(
        limit in 1u32..20,
        window_ms in 1u64..1000,
        algorithm in arb_algorithm(),
        arrivals in arb_arrivals(),
    ) {
        let window = Duration::from_millis(window_ms);
        let controller = controller(limit, window, algorithm);
        let decisions = run(&controller, &arrivals);

        let admitted: Vec<Duration> = decisions
            .iter()
            .filter(|(_, d)| d.is_admitted())
            .map(|(t, _)| *t)
            .collect();

        let bound = (limit + algorithm.burst_tolerance(limit)) as usize;
        // Every trailing interval (t - window, t] ending at an admission.
        for (i, end) in admitted.iter().enumerate() {
            let in_window = admitted[..=i]
                .iter()
                .filter(|t| **t + window > *end)
                .count();
            prop_assert!(
                in_window <= bound,
                "{} admissions within {:?} ending at {:?} (bound {})",
                in_window, window, end, bound
            );
        }

        if algorithm == Algorithm::FixedWindow {
            let window_nanos = window.as_nanos();
            let mut per_window = std::collections::HashMap::new();
            for t in &admitted {
                *per_window.entry(t.as_nanos() / window_nanos).or_insert(0u32) += 1;
            }
            for (index, count) in per_window {
                prop_assert!(count <= limit, "window {} admitted {}", index, count);
            }
        }
    }

    #[test]
    fn prop_retry_after_is_honoured(
        limit in 1u32..10,
        window_ms in 1u64..1000,
        algorithm in arb_algorithm(),
        extra in 1usize..10,
    ) {
        let window = Duration::from_millis(window_ms);
        let controller = controller(limit, window, algorithm);
        let now = Duration::from_millis(1234);

        for _ in 0..limit {
            prop_assert!(controller.allow("key", now).is_admitted());
        }
        for _ in 0..extra {
            let decision = controller.allow("key", now);
            let retry_after = decision.retry_after();
            prop_assert!(retry_after.is_some());
            prop_assert!(retry_after.unwrap() > Duration::ZERO);
        }

        let retry_after = controller.allow("key", now).retry_after().unwrap();
        prop_assert!(controller.allow("key", now + retry_after).is_admitted());
    }

    #[test]
    fn prop_identical_construction_is_deterministic(
        limit in 1u32..20,
        window_ms in 1u64..1000,
        algorithm in arb_algorithm(),
        arrivals in arb_arrivals(),
    ) {
        let window = Duration::from_millis(window_ms);
        let first = run(&controller(limit, window, algorithm), &arrivals);
        let second = run(&controller(limit, window, algorithm), &arrivals);
        prop_assert_eq!(first, second);
    }

    #[test]
    fn prop_eviction_does_not_change_decisions(
        limit in 1u32..10,
        window_ms in 1u64..500,
        algorithm in arb_algorithm(),
        arrivals in arb_arrivals(),
    ) {
        let window = Duration::from_millis(window_ms);
        let baseline = controller(limit, window, algorithm);
        let swept = controller(limit, window, algorithm);

        for ms in &arrivals {
            let now = Duration::from_millis(*ms);
            swept.evict_idle(now);
            prop_assert_eq!(baseline.allow("key", now), swept.allow("key", now));
        }
    }
}
