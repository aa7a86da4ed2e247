//! Admin Dashboard Support
//!
//! Read-only snapshot of the admission controller for monitoring: policy,
//! cumulative totals, and the busiest keys.

use serde::{Deserialize, Serialize};

use super::clock::Clock;
use super::config::{Algorithm, QuotaPolicy};
use super::controller::{AdmissionController, ControllerStats};
use super::quota::KeyUsage;

/// Default number of keys listed in a dashboard snapshot
pub const DEFAULT_TOP_KEYS: usize = 20;

/// Dashboard data for admin interface
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardData {
    /// Timestamp of data generation
    pub timestamp: chrono::DateTime<chrono::Utc>,

    /// Active quota policy
    pub policy: QuotaPolicy,

    /// Accounting algorithm
    pub algorithm: Algorithm,

    /// Summary statistics
    pub summary: QuotaSummary,

    /// Busiest keys, most used first
    pub top_keys: Vec<KeyUsage>,
}

/// Summary of admission activity across all keys
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuotaSummary {
    /// Cumulative totals
    #[serde(flatten)]
    pub stats: ControllerStats,

    /// Keys that have exhausted their quota right now
    pub exhausted_keys: usize,

    /// Share of all decisions that were rejections
    pub rejection_rate_percent: f64,

    /// Whether the tracked key set is above capacity
    pub over_capacity: bool,
}

impl DashboardData {
    /// Snapshot `controller`, listing at most `top` keys
    pub fn collect<C: Clock>(controller: &AdmissionController<C>, top: usize) -> Self {
        let now = controller.now();
        let mut usage = controller.all_usage(now);

        let exhausted_keys = usage.iter().filter(|u| u.remaining == 0).count();

        usage.sort_by(|a, b| b.used.cmp(&a.used).then_with(|| a.key.cmp(&b.key)));
        usage.truncate(top);

        let stats = controller.stats();
        let decisions = stats.admitted + stats.rejected;
        let rejection_rate_percent = if decisions > 0 {
            (stats.rejected as f64 / decisions as f64) * 100.0
        } else {
            0.0
        };

        DashboardData {
            timestamp: chrono::Utc::now(),
            policy: *controller.policy(),
            algorithm: controller.algorithm(),
            summary: QuotaSummary {
                stats,
                exhausted_keys,
                rejection_rate_percent,
                over_capacity: controller.is_over_capacity(),
            },
            top_keys: usage,
        }
    }
}
