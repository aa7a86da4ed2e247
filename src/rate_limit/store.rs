//! Counter Store
//!
//! Sharded in-memory storage for per-key counters. Each shard has its own
//! lock, so the check-and-record step for one key only contends with keys
//! hashed to the same shard.

use dashmap::DashMap;
use std::time::Duration;

use super::config::{Algorithm, QuotaPolicy};
use super::quota::{Decision, KeyCounter, KeyUsage};

/// Outcome of [`CounterStore::admit`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdmitOutcome {
    /// The admission decision
    pub decision: Decision,

    /// Whether this call created the key's counter
    pub created: bool,
}

/// Sharded map from rate-limit key to counter
#[derive(Debug)]
pub struct CounterStore {
    counters: DashMap<String, KeyCounter>,
}

impl CounterStore {
    /// Create a store with the default shard count
    pub fn new() -> Self {
        Self {
            counters: DashMap::new(),
        }
    }

    /// Create a store with `shards` shards (must be a power of two)
    pub fn with_shards(shards: usize) -> Self {
        Self {
            counters: DashMap::with_shard_amount(shards),
        }
    }

    /// Decide on one event for `key`, creating its counter on first use.
    ///
    /// The shard's write lock is held across the check and the update, so
    /// concurrent calls for the same key are serialized.
    pub fn admit(
        &self,
        key: &str,
        algorithm: Algorithm,
        policy: &QuotaPolicy,
        now: Duration,
    ) -> AdmitOutcome {
        if let Some(mut counter) = self.counters.get_mut(key) {
            return AdmitOutcome {
                decision: counter.admit(policy, now),
                created: false,
            };
        }

        // Another caller may have inserted the key between the two lookups;
        // the entry API resolves that under the shard lock.
        let mut created = false;
        let mut counter = self.counters.entry(key.to_owned()).or_insert_with(|| {
            created = true;
            KeyCounter::new(algorithm, policy, now)
        });
        AdmitOutcome {
            decision: counter.admit(policy, now),
            created,
        }
    }

    /// Remove idle counters, returning how many were evicted.
    ///
    /// Shards are locked one at a time.
    pub fn evict_idle(&self, policy: &QuotaPolicy, now: Duration) -> usize {
        let mut evicted = 0;
        self.counters.retain(|_, counter| {
            let idle = counter.is_idle(policy, now);
            evicted += usize::from(idle);
            !idle
        });
        evicted
    }

    /// Usage snapshot for one key
    pub fn usage(&self, key: &str, policy: &QuotaPolicy, now: Duration) -> Option<KeyUsage> {
        self.counters
            .get(key)
            .map(|counter| counter.usage(key, policy, now))
    }

    /// Usage snapshots for every tracked key
    pub fn all_usage(&self, policy: &QuotaPolicy, now: Duration) -> Vec<KeyUsage> {
        self.counters
            .iter()
            .map(|entry| entry.value().usage(entry.key(), policy, now))
            .collect()
    }

    /// Check if a key is tracked
    pub fn contains(&self, key: &str) -> bool {
        self.counters.contains_key(key)
    }

    /// Number of tracked keys
    pub fn len(&self) -> usize {
        self.counters.len()
    }

    /// Check if no keys are tracked
    pub fn is_empty(&self) -> bool {
        self.counters.is_empty()
    }

    /// Drop every counter
    pub fn clear(&self) {
        self.counters.clear();
    }
}

impl Default for CounterStore {
    fn default() -> Self {
        Self::new()
    }
}
