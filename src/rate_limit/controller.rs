//! Admission Controller
//!
//! Owns every per-key counter and decides, per event, whether to admit or
//! reject it under the configured [`QuotaPolicy`].

use prometheus::IntCounter;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, trace, warn};

use super::clock::{Clock, SystemClock};
use super::config::{Algorithm, ControllerOptions, QuotaPolicy};
use super::error::Result;
use super::quota::{Decision, KeyUsage};
use super::store::CounterStore;
use super::sweeper::EvictionSweeper;
use crate::metrics;

/// Cumulative controller statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControllerStats {
    /// Events admitted
    pub admitted: u64,

    /// Events rejected
    pub rejected: u64,

    /// Idle keys evicted
    pub evicted: u64,

    /// Keys currently tracked
    pub tracked_keys: usize,
}

/// Per-key admission controller.
///
/// Cloning is cheap and clones share state.
///
/// ```
/// use throttlegate::rate_limit::{AdmissionController, Decision, QuotaPolicy};
/// use std::time::Duration;
///
/// let policy = QuotaPolicy::new(2, Duration::from_secs(60)).unwrap();
/// let controller = AdmissionController::new(policy).unwrap();
///
/// let now = Duration::from_secs(5);
/// assert!(controller.allow("10.0.0.1", now).is_admitted());
/// assert!(controller.allow("10.0.0.1", now).is_admitted());
/// assert_eq!(
///     controller.allow("10.0.0.1", now),
///     Decision::Rejected { retry_after: Duration::from_secs(55) }
/// );
/// ```
pub struct AdmissionController<C: Clock = SystemClock> {
    inner: Arc<Inner<C>>,
}

struct Inner<C> {
    policy: QuotaPolicy,
    options: ControllerOptions,
    store: CounterStore,
    clock: C,
    admitted: AtomicU64,
    rejected: AtomicU64,
    evicted: AtomicU64,
    over_capacity: AtomicBool,
    admitted_metric: IntCounter,
    rejected_metric: IntCounter,
}

impl AdmissionController<SystemClock> {
    /// Create a fixed-window controller on the system clock
    pub fn new(policy: QuotaPolicy) -> Result<Self> {
        Self::with_options(policy, ControllerOptions::default())
    }

    /// Create a controller with tuning options on the system clock
    pub fn with_options(policy: QuotaPolicy, options: ControllerOptions) -> Result<Self> {
        Self::with_clock(policy, options, SystemClock::new())
    }
}

impl<C: Clock> AdmissionController<C> {
    /// Create a controller reading time from `clock` in [`check`](Self::check)
    /// and in the eviction sweeper
    pub fn with_clock(policy: QuotaPolicy, options: ControllerOptions, clock: C) -> Result<Self> {
        policy.validate()?;
        options.validate()?;

        let store = match options.shards {
            Some(shards) => CounterStore::with_shards(shards),
            None => CounterStore::new(),
        };

        info!(
            limit = policy.limit(),
            window_ms = policy.window().as_millis() as u64,
            idle_horizon_ms = policy.idle_horizon().as_millis() as u64,
            algorithm = %options.algorithm,
            "Admission controller created"
        );

        Ok(Self {
            inner: Arc::new(Inner {
                policy,
                options,
                store,
                clock,
                admitted: AtomicU64::new(0),
                rejected: AtomicU64::new(0),
                evicted: AtomicU64::new(0),
                over_capacity: AtomicBool::new(false),
                admitted_metric: metrics::ADMISSION_DECISIONS_TOTAL.with_label_values(&["admitted"]),
                rejected_metric: metrics::ADMISSION_DECISIONS_TOTAL.with_label_values(&["rejected"]),
            }),
        })
    }

    /// Decide whether to admit one event for `key` at `now`.
    ///
    /// `now` is measured from the controller clock's origin. Never blocks on
    /// other keys' work beyond the shard lock.
    pub fn allow(&self, key: &str, now: Duration) -> Decision {
        let started = Instant::now();
        let inner = &*self.inner;

        let outcome = inner
            .store
            .admit(key, inner.options.algorithm, &inner.policy, now);

        if outcome.created {
            metrics::TRACKED_KEYS.inc();
            self.check_capacity();
        }

        match outcome.decision {
            Decision::Admitted => {
                inner.admitted.fetch_add(1, Ordering::Relaxed);
                inner.admitted_metric.inc();
            }
            Decision::Rejected { .. } => {
                inner.rejected.fetch_add(1, Ordering::Relaxed);
                inner.rejected_metric.inc();
            }
        }

        metrics::ADMISSION_DECISION_DURATION_SECONDS.observe(started.elapsed().as_secs_f64());
        trace!(key, decision = outcome.decision.as_str(), "Admission decision");

        outcome.decision
    }

    /// Decide on one event for `key` at the controller clock's current time
    pub fn check(&self, key: &str) -> Decision {
        self.allow(key, self.now())
    }

    /// Current time on the controller clock
    pub fn now(&self) -> Duration {
        self.inner.clock.now()
    }

    /// Evict counters idle for at least the policy's idle horizon.
    ///
    /// Returns the number of keys removed.
    pub fn evict_idle(&self, now: Duration) -> usize {
        let inner = &*self.inner;
        let evicted = inner.store.evict_idle(&inner.policy, now);
        let tracked = inner.store.len();

        inner.evicted.fetch_add(evicted as u64, Ordering::Relaxed);
        metrics::KEYS_EVICTED_TOTAL.inc_by(evicted as u64);
        metrics::TRACKED_KEYS.set(i64::try_from(tracked).unwrap_or(i64::MAX));

        if let Some(max) = inner.options.max_tracked_keys {
            if tracked < max && inner.over_capacity.swap(false, Ordering::Relaxed) {
                info!(tracked, max, "Tracked rate-limit keys back under capacity");
            }
        }

        evicted
    }

    fn check_capacity(&self) {
        let inner = &*self.inner;
        let Some(max) = inner.options.max_tracked_keys else {
            return;
        };

        let tracked = inner.store.len();
        if tracked > max {
            metrics::CAPACITY_EXCEEDED_TOTAL.inc();
            if !inner.over_capacity.swap(true, Ordering::Relaxed) {
                warn!(
                    tracked,
                    max,
                    idle_horizon_ms = inner.policy.idle_horizon().as_millis() as u64,
                    "Tracked rate-limit keys exceed capacity; eviction is not keeping up"
                );
            }
        }
    }

    /// Start the background eviction sweep, ticking every `interval`.
    ///
    /// Must be called from within a Tokio runtime. The caller owns the
    /// returned handle and stops it when the controller is shut down.
    pub fn spawn_sweeper(&self, interval: Duration) -> EvictionSweeper {
        EvictionSweeper::spawn(self.clone(), interval)
    }

    /// Usage snapshot for one key
    pub fn usage(&self, key: &str, now: Duration) -> Option<KeyUsage> {
        self.inner.store.usage(key, &self.inner.policy, now)
    }

    /// Usage snapshots for every tracked key
    pub fn all_usage(&self, now: Duration) -> Vec<KeyUsage> {
        self.inner.store.all_usage(&self.inner.policy, now)
    }

    /// Number of tracked keys
    pub fn tracked_keys(&self) -> usize {
        self.inner.store.len()
    }

    /// Whether the tracked key set is above the configured capacity
    pub fn is_over_capacity(&self) -> bool {
        self.inner.over_capacity.load(Ordering::Relaxed)
    }

    /// Cumulative statistics
    pub fn stats(&self) -> ControllerStats {
        let inner = &*self.inner;
        ControllerStats {
            admitted: inner.admitted.load(Ordering::Relaxed),
            rejected: inner.rejected.load(Ordering::Relaxed),
            evicted: inner.evicted.load(Ordering::Relaxed),
            tracked_keys: inner.store.len(),
        }
    }

    /// Quota policy
    pub fn policy(&self) -> &QuotaPolicy {
        &self.inner.policy
    }

    /// Tuning options
    pub fn options(&self) -> &ControllerOptions {
        &self.inner.options
    }

    /// Accounting algorithm
    pub fn algorithm(&self) -> Algorithm {
        self.inner.options.algorithm
    }
}

impl<C: Clock> Clone for AdmissionController<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C: Clock> std::fmt::Debug for AdmissionController<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdmissionController")
            .field("policy", &self.inner.policy)
            .field("options", &self.inner.options)
            .field("tracked_keys", &self.inner.store.len())
            .finish()
    }
}
