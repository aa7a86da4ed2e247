// Prometheus metrics for admission control
//
// Exposes metrics on /metrics HTTP endpoint:
// - Admission decisions (counter, by decision)
// - Decision latency (histogram)
// - Tracked keys (gauge)
// - Evicted keys (counter)
// - Capacity exhaustion signals (counter)

use lazy_static::lazy_static;
use prometheus::{Encoder, Histogram, IntCounter, IntCounterVec, IntGauge, Registry, TextEncoder};
use std::sync::Arc;

lazy_static! {
    pub static ref REGISTRY: Arc<Registry> = Arc::new(Registry::new());

    pub static ref ADMISSION_DECISIONS_TOTAL: IntCounterVec = IntCounterVec::new(
        prometheus::Opts::new("admission_decisions_total", "Total number of admission decisions"),
        &["decision"]
    ).expect("Failed to create admission decisions metric");

    pub static ref ADMISSION_DECISION_DURATION_SECONDS: Histogram = Histogram::with_opts(
        prometheus::HistogramOpts::new(
            "admission_decision_duration_seconds",
            "Time spent deciding on one admission"
        )
        .buckets(vec![0.000_001, 0.000_005, 0.000_01, 0.000_05, 0.000_1, 0.000_5, 0.001]),
    ).expect("Failed to create admission decision duration metric");

    pub static ref TRACKED_KEYS: IntGauge = IntGauge::new(
        "rate_limit_tracked_keys",
        "Number of rate-limit keys currently tracked"
    ).expect("Failed to create tracked keys metric");

    pub static ref KEYS_EVICTED_TOTAL: IntCounter = IntCounter::new(
        "rate_limit_keys_evicted_total",
        "Total number of idle rate-limit keys evicted"
    ).expect("Failed to create evicted keys metric");

    pub static ref CAPACITY_EXCEEDED_TOTAL: IntCounter = IntCounter::new(
        "rate_limit_capacity_exceeded_total",
        "New keys tracked while the tracked key set was at capacity"
    ).expect("Failed to create capacity exceeded metric");
}

/// Initialize metrics registry at startup; repeated calls are no-ops
pub fn init() -> prometheus::Result<()> {
    register(Box::new(ADMISSION_DECISIONS_TOTAL.clone()))?;
    register(Box::new(ADMISSION_DECISION_DURATION_SECONDS.clone()))?;
    register(Box::new(TRACKED_KEYS.clone()))?;
    register(Box::new(KEYS_EVICTED_TOTAL.clone()))?;
    register(Box::new(CAPACITY_EXCEEDED_TOTAL.clone()))?;
    Ok(())
}

fn register(collector: Box<dyn prometheus::core::Collector>) -> prometheus::Result<()> {
    match REGISTRY.register(collector) {
        Err(prometheus::Error::AlreadyReg) => Ok(()),
        other => other,
    }
}

/// Gather all metrics in Prometheus text format
pub fn gather_metrics() -> anyhow::Result<String> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| anyhow::anyhow!("Failed to encode metrics: {}", e))?;
    String::from_utf8(buffer).map_err(|e| anyhow::anyhow!("Invalid UTF-8 in metrics: {}", e))
}
