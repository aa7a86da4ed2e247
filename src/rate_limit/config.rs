//! Rate Limit Configuration
//!
//! The quota policy (limit, window, idle horizon) plus controller tuning
//! options that do not change admission semantics.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::error::{RateLimitError, Result};

/// Default rate limits
pub const DEFAULT_LIMIT: u32 = 100; // requests per window
pub const DEFAULT_WINDOW_SECS: u64 = 60;

/// Quota policy: at most `limit` events per `window` for each key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "PolicyRepr", into = "PolicyRepr")]
pub struct QuotaPolicy {
    limit: u32,
    window: Duration,
    idle_horizon: Duration,
}

impl QuotaPolicy {
    /// Create a policy. The idle horizon defaults to the window.
    pub fn new(limit: u32, window: Duration) -> Result<Self> {
        let policy = Self {
            limit,
            window,
            idle_horizon: window,
        };
        policy.validate()?;
        Ok(policy)
    }

    /// Set how long a key may stay idle before its counter is evicted
    pub fn with_idle_horizon(mut self, idle_horizon: Duration) -> Result<Self> {
        self.idle_horizon = idle_horizon;
        self.validate()?;
        Ok(self)
    }

    /// Check the policy invariants
    pub fn validate(&self) -> Result<()> {
        if self.limit == 0 {
            return Err(RateLimitError::InvalidLimit);
        }
        if self.window.is_zero() {
            return Err(RateLimitError::InvalidWindow);
        }
        if self.idle_horizon < self.window {
            return Err(RateLimitError::IdleHorizonTooShort {
                horizon: self.idle_horizon,
                window: self.window,
            });
        }
        Ok(())
    }

    /// Maximum admitted events per window
    pub fn limit(&self) -> u32 {
        self.limit
    }

    /// Window length
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Idle time after which a key's counter may be evicted
    pub fn idle_horizon(&self) -> Duration {
        self.idle_horizon
    }
}

impl Default for QuotaPolicy {
    fn default() -> Self {
        Self {
            limit: DEFAULT_LIMIT,
            window: Duration::from_secs(DEFAULT_WINDOW_SECS),
            idle_horizon: Duration::from_secs(DEFAULT_WINDOW_SECS),
        }
    }
}

/// Wire form of [`QuotaPolicy`], with durations in seconds
#[derive(Debug, Clone, Serialize, Deserialize)]
struct PolicyRepr {
    limit: u32,
    window_secs: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    idle_horizon_secs: Option<f64>,
}

impl TryFrom<PolicyRepr> for QuotaPolicy {
    type Error = RateLimitError;

    fn try_from(repr: PolicyRepr) -> Result<Self> {
        let window = secs_to_duration(repr.window_secs).ok_or(RateLimitError::InvalidWindow)?;
        let policy = Self::new(repr.limit, window)?;
        match repr.idle_horizon_secs {
            Some(secs) => {
                let horizon = secs_to_duration(secs).ok_or(RateLimitError::IdleHorizonTooShort {
                    horizon: Duration::ZERO,
                    window,
                })?;
                policy.with_idle_horizon(horizon)
            }
            None => Ok(policy),
        }
    }
}

impl From<QuotaPolicy> for PolicyRepr {
    fn from(policy: QuotaPolicy) -> Self {
        Self {
            limit: policy.limit,
            window_secs: policy.window.as_secs_f64(),
            idle_horizon_secs: Some(policy.idle_horizon.as_secs_f64()),
        }
    }
}

fn secs_to_duration(secs: f64) -> Option<Duration> {
    Duration::try_from_secs_f64(secs).ok()
}

/// Accounting algorithm used for every key
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Algorithm {
    /// Counter reset at aligned, non-overlapping windows
    #[default]
    FixedWindow,
    /// Log of admission times over the trailing window
    SlidingWindow,
    /// Token bucket of capacity `limit`, refilled at `limit` per window
    TokenBucket,
}

impl Algorithm {
    /// Extra admissions, beyond `limit`, that may land in one trailing
    /// window-length interval.
    ///
    /// A fixed window is exact per aligned window but a trailing interval
    /// straddling a boundary can see two full windows' worth.
    pub fn burst_tolerance(&self, limit: u32) -> u32 {
        match self {
            Algorithm::SlidingWindow => 0,
            Algorithm::FixedWindow | Algorithm::TokenBucket => limit,
        }
    }

    /// Name used in config files and metrics
    pub fn as_str(&self) -> &'static str {
        match self {
            Algorithm::FixedWindow => "fixed_window",
            Algorithm::SlidingWindow => "sliding_window",
            Algorithm::TokenBucket => "token_bucket",
        }
    }
}

impl std::fmt::Display for Algorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Algorithm {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "fixed_window" | "fixed" => Ok(Algorithm::FixedWindow),
            "sliding_window" | "sliding" => Ok(Algorithm::SlidingWindow),
            "token_bucket" | "gcra" => Ok(Algorithm::TokenBucket),
            other => Err(format!(
                "unknown algorithm '{}': expected fixed_window, sliding_window or token_bucket",
                other
            )),
        }
    }
}

/// Controller tuning options
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerOptions {
    /// Accounting algorithm
    pub algorithm: Algorithm,

    /// Number of counter shards (power of two); `None` uses the map default
    pub shards: Option<usize>,

    /// Tracked key count above which capacity exhaustion is reported
    pub max_tracked_keys: Option<usize>,
}

impl ControllerOptions {
    /// Create default options
    pub fn new() -> Self {
        Self::default()
    }

    /// Select the accounting algorithm
    pub fn algorithm(mut self, algorithm: Algorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    /// Set the shard count
    pub fn shards(mut self, shards: usize) -> Self {
        self.shards = Some(shards);
        self
    }

    /// Set the capacity alarm threshold
    pub fn max_tracked_keys(mut self, max: usize) -> Self {
        self.max_tracked_keys = Some(max);
        self
    }

    /// Validate tuning options
    pub fn validate(&self) -> Result<()> {
        if let Some(shards) = self.shards {
            if shards < 2 || !shards.is_power_of_two() {
                return Err(RateLimitError::InvalidShardCount(shards));
            }
        }
        if self.max_tracked_keys == Some(0) {
            return Err(RateLimitError::InvalidCapacity);
        }
        Ok(())
    }
}
