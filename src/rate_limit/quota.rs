//! Admission Decisions and Per-Key Counters
//!
//! Each tracked key owns one [`KeyCounter`]. The counter variants implement
//! the three accounting algorithms behind one contract: admit at most `limit`
//! events per trailing `window` (plus the algorithm's burst tolerance), and
//! report how long a rejected caller should wait.
//!
//! All arithmetic is done on `Duration`s (integer nanoseconds). Window
//! boundaries use the floor rule: an event at exactly `k * window` belongs to
//! window `k`.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Duration;

use super::config::{Algorithm, QuotaPolicy};

/// Outcome of an admission check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Decision {
    /// The event fits in the key's quota and has been counted
    Admitted,
    /// The key's quota is exhausted
    Rejected {
        /// Advisory delay after which a retry is expected to be admitted
        retry_after: Duration,
    },
}

impl Decision {
    /// Whether the event was admitted
    pub fn is_admitted(&self) -> bool {
        matches!(self, Decision::Admitted)
    }

    /// Retry hint for rejected events
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Decision::Admitted => None,
            Decision::Rejected { retry_after } => Some(*retry_after),
        }
    }

    /// Retry hint in whole seconds, rounded up and at least 1 (for `Retry-After`)
    pub fn retry_after_secs(&self) -> Option<u64> {
        self.retry_after().map(|d| {
            let secs = d.as_secs().saturating_add(u64::from(d.subsec_nanos() > 0));
            secs.max(1)
        })
    }

    /// Label used in metrics and logs
    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::Admitted => "admitted",
            Decision::Rejected { .. } => "rejected",
        }
    }
}

/// Usage snapshot for one key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyUsage {
    /// Rate-limit key
    pub key: String,

    /// Admissions counted against the current window
    pub used: u32,

    /// Admissions still available right now
    pub remaining: u32,

    /// Seconds since the key was last seen
    pub idle_secs: f64,
}

/// Accounting state for one key
#[derive(Debug, Clone)]
pub enum KeyCounter {
    /// Count of admissions in the aligned window starting at `window_start`
    FixedWindow {
        window_start: Duration,
        count: u32,
        last_seen: Duration,
    },
    /// Admission times within the trailing window, oldest first
    SlidingWindow {
        admitted: VecDeque<Duration>,
        last_seen: Duration,
    },
    /// Token bucket in GCRA form: `tat` is the theoretical arrival time of
    /// the next conforming event
    TokenBucket { tat: Duration, last_seen: Duration },
}

impl KeyCounter {
    /// Create an empty counter first observed at `now`
    pub fn new(algorithm: Algorithm, policy: &QuotaPolicy, now: Duration) -> Self {
        match algorithm {
            Algorithm::FixedWindow => KeyCounter::FixedWindow {
                window_start: align_to_window(now, policy.window()),
                count: 0,
                last_seen: now,
            },
            Algorithm::SlidingWindow => KeyCounter::SlidingWindow {
                admitted: VecDeque::new(),
                last_seen: now,
            },
            Algorithm::TokenBucket => KeyCounter::TokenBucket {
                tat: now,
                last_seen: now,
            },
        }
    }

    /// Decide on one event at `now` and record it if admitted.
    ///
    /// A `now` earlier than previously observed time is clamped to the
    /// counter's bookkeeping, so counts never decrease when the clock steps
    /// back.
    pub fn admit(&mut self, policy: &QuotaPolicy, now: Duration) -> Decision {
        let limit = policy.limit();
        let window = policy.window();

        match self {
            KeyCounter::FixedWindow {
                window_start,
                count,
                last_seen,
            } => {
                *last_seen = (*last_seen).max(now);

                let current = align_to_window(now, window);
                if current > *window_start {
                    *window_start = current;
                    *count = 0;
                }
                let now = now.max(*window_start);

                if *count < limit {
                    *count += 1;
                    Decision::Admitted
                } else {
                    Decision::Rejected {
                        retry_after: window_start.saturating_add(window).saturating_sub(now),
                    }
                }
            }
            KeyCounter::SlidingWindow {
                admitted,
                last_seen,
            } => {
                let now = (*last_seen).max(now);
                *last_seen = now;

                // An admission whose window ends past `Duration::MAX` never expires.
                while admitted
                    .front()
                    .and_then(|t| t.checked_add(window))
                    .is_some_and(|end| end <= now)
                {
                    admitted.pop_front();
                }

                if admitted.len() < limit as usize {
                    admitted.push_back(now);
                    Decision::Admitted
                } else {
                    // Non-empty: limit > 0 and the log is full.
                    let oldest = admitted.front().copied().unwrap_or(now);
                    Decision::Rejected {
                        retry_after: oldest.saturating_add(window).saturating_sub(now),
                    }
                }
            }
            KeyCounter::TokenBucket { tat, last_seen } => {
                *last_seen = (*last_seen).max(now);

                let interval = emission_interval(policy);
                // Past the end of the representable timeline nothing conforms.
                let Some(new_tat) = (*tat).max(now).checked_add(interval) else {
                    return Decision::Rejected {
                        retry_after: interval,
                    };
                };
                let allow_at = new_tat.saturating_sub(interval.saturating_mul(limit));

                if now < allow_at {
                    Decision::Rejected {
                        retry_after: allow_at - now,
                    }
                } else {
                    *tat = new_tat;
                    Decision::Admitted
                }
            }
        }
    }

    /// Last time an event was observed for this key
    pub fn last_seen(&self) -> Duration {
        match self {
            KeyCounter::FixedWindow { last_seen, .. }
            | KeyCounter::SlidingWindow { last_seen, .. }
            | KeyCounter::TokenBucket { last_seen, .. } => *last_seen,
        }
    }

    /// Whether the counter can be dropped without changing any future
    /// decision: idle for at least the horizon and holding no live state.
    pub fn is_idle(&self, policy: &QuotaPolicy, now: Duration) -> bool {
        if now.saturating_sub(self.last_seen()) < policy.idle_horizon() {
            return false;
        }
        self.used(policy, now) == 0
    }

    /// Admissions currently counted against the key's quota
    pub fn used(&self, policy: &QuotaPolicy, now: Duration) -> u32 {
        let window = policy.window();
        match self {
            KeyCounter::FixedWindow {
                window_start,
                count,
                ..
            } => {
                if window_start
                    .checked_add(window)
                    .is_some_and(|end| now >= end)
                {
                    0
                } else {
                    *count
                }
            }
            KeyCounter::SlidingWindow { admitted, .. } => {
                let live = admitted
                    .iter()
                    .filter(|t| t.checked_add(window).is_none_or(|end| end > now))
                    .count();
                u32::try_from(live).unwrap_or(u32::MAX)
            }
            KeyCounter::TokenBucket { tat, .. } => {
                let pending = tat.saturating_sub(now);
                if pending.is_zero() {
                    return 0;
                }
                let interval = emission_interval(policy).as_nanos();
                let used = pending.as_nanos().div_ceil(interval);
                u32::try_from(used).unwrap_or(u32::MAX).min(policy.limit())
            }
        }
    }

    /// Usage snapshot for reporting
    pub fn usage(&self, key: &str, policy: &QuotaPolicy, now: Duration) -> KeyUsage {
        let used = self.used(policy, now);
        KeyUsage {
            key: key.to_string(),
            used,
            remaining: policy.limit().saturating_sub(used),
            idle_secs: now.saturating_sub(self.last_seen()).as_secs_f64(),
        }
    }
}

/// Start of the window containing `now`: `floor(now / window) * window`
pub fn align_to_window(now: Duration, window: Duration) -> Duration {
    let window_nanos = window.as_nanos();
    if window_nanos == 0 {
        return now;
    }
    nanos_to_duration(now.as_nanos() / window_nanos * window_nanos)
}

/// Spacing between conforming events for the token bucket, rounded up so the
/// sustained rate never exceeds `limit` per `window`
fn emission_interval(policy: &QuotaPolicy) -> Duration {
    let nanos = policy
        .window()
        .as_nanos()
        .div_ceil(u128::from(policy.limit()))
        .max(1);
    nanos_to_duration(nanos)
}

fn nanos_to_duration(nanos: u128) -> Duration {
    const NANOS_PER_SEC: u128 = 1_000_000_000;
    let secs = u64::try_from(nanos / NANOS_PER_SEC).unwrap_or(u64::MAX);
    // Remainder is always below one second.
    Duration::new(secs, (nanos % NANOS_PER_SEC) as u32)
}
