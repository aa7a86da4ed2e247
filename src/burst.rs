// Burst load generator
//
// Fires GET requests at a URL from concurrent workers, either a fixed number
// or for a fixed duration, and tallies responses by status class to confirm a
// limiter is rejecting excess traffic. The target server's `/v1/health` is
// checked first so a dead server is reported as such instead of as a run
// full of connection errors.

use anyhow::{Context, Result};
use serde::Serialize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinSet;
use tracing::{debug, info};

/// Burst run parameters
#[derive(Debug, Clone)]
pub struct BurstConfig {
    /// Target URL
    pub url: String,

    /// Total requests to send
    pub requests: usize,

    /// Concurrent workers
    pub concurrency: usize,

    /// Per-request timeout
    pub timeout: Duration,

    /// Keep sending for this long instead of stopping after `requests`
    pub duration: Option<Duration>,

    /// Probe `/v1/health` on the target host before the burst
    pub health_check: bool,
}

impl Default for BurstConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8080/v1/test".to_string(),
            requests: 200,
            concurrency: 20,
            timeout: Duration::from_secs(10),
            duration: None,
            health_check: true,
        }
    }
}

/// When a worker stops sending
#[derive(Debug, Clone, Copy)]
enum Budget {
    Requests(usize),
    Until(Instant),
}

/// Response tallies for one burst run
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BurstReport {
    pub total: usize,
    pub success_2xx: usize,
    pub client_4xx: usize,
    pub server_5xx: usize,
    /// Requests that failed before a status was received
    pub errors: usize,
    pub average_latency_ms: f64,
    pub requests_per_sec: f64,
}

impl BurstReport {
    /// Whether any request was turned away with a 4xx
    pub fn rate_limited(&self) -> bool {
        self.client_4xx > 0
    }

    fn merge(&mut self, other: &Tally) {
        self.success_2xx += other.success_2xx;
        self.client_4xx += other.client_4xx;
        self.server_5xx += other.server_5xx;
        self.errors += other.errors;
    }
}

#[derive(Debug, Default)]
struct Tally {
    success_2xx: usize,
    client_4xx: usize,
    server_5xx: usize,
    errors: usize,
    latency: Duration,
    sent: usize,
}

impl Tally {
    fn record(&mut self, status: Option<reqwest::StatusCode>, latency: Duration) {
        self.sent += 1;
        self.latency += latency;
        match status {
            Some(s) if s.is_success() => self.success_2xx += 1,
            Some(s) if s.is_client_error() => self.client_4xx += 1,
            Some(s) if s.is_server_error() => self.server_5xx += 1,
            Some(_) => {}
            None => self.errors += 1,
        }
    }
}

/// `/v1/health` on the same host as `url`
pub fn health_url(url: &str) -> Result<reqwest::Url> {
    let target = reqwest::Url::parse(url).with_context(|| format!("Invalid URL: {}", url))?;
    target
        .join("/v1/health")
        .with_context(|| format!("Cannot derive health URL from {}", url))
}

/// Fail unless the server behind `url` answers its health endpoint.
///
/// Any HTTP response counts, since a rate-limited server still answers.
pub async fn check_server(client: &reqwest::Client, url: &str) -> Result<()> {
    let health = health_url(url)?;
    let response = client
        .get(health.clone())
        .send()
        .await
        .with_context(|| format!("Server health check failed: {} is not responding", health))?;

    info!(url = %health, status = %response.status(), "Server is responding");
    Ok(())
}

/// Run the burst and collect the report
pub async fn run_burst(config: &BurstConfig) -> Result<BurstReport> {
    if config.concurrency == 0 {
        anyhow::bail!("Burst concurrency must be > 0");
    }
    match config.duration {
        Some(duration) if duration.is_zero() => anyhow::bail!("Burst duration must be > 0"),
        None if config.requests == 0 => anyhow::bail!("Burst needs at least one request"),
        _ => {}
    }

    let client = reqwest::Client::builder()
        .timeout(config.timeout)
        .build()
        .context("Failed to build HTTP client")?;

    if config.health_check {
        check_server(&client, &config.url).await?;
    }

    info!(
        url = %config.url,
        requests = config.requests,
        duration_secs = config.duration.map(|d| d.as_secs_f64()),
        concurrency = config.concurrency,
        "Starting burst"
    );

    let (budget, workers_needed) = match config.duration {
        Some(duration) => {
            let deadline = Instant::now()
                .checked_add(duration)
                .context("Burst duration is too long")?;
            (Budget::Until(deadline), config.concurrency)
        }
        None => (
            Budget::Requests(config.requests),
            config.concurrency.min(config.requests),
        ),
    };

    let issued = Arc::new(AtomicUsize::new(0));
    let started = Instant::now();
    let mut workers = JoinSet::new();

    for _ in 0..workers_needed {
        let client = client.clone();
        let url = config.url.clone();
        let issued = Arc::clone(&issued);

        workers.spawn(async move {
            let mut tally = Tally::default();
            let more = || match budget {
                Budget::Requests(requests) => issued.fetch_add(1, Ordering::Relaxed) < requests,
                Budget::Until(deadline) => Instant::now() < deadline,
            };
            while more() {
                let sent_at = Instant::now();
                let status = match client.get(&url).send().await {
                    Ok(response) => Some(response.status()),
                    Err(e) => {
                        debug!("Request failed: {}", e);
                        None
                    }
                };
                tally.record(status, sent_at.elapsed());
            }
            tally
        });
    }

    let mut report = BurstReport::default();
    let mut latency = Duration::ZERO;
    while let Some(joined) = workers.join_next().await {
        let tally = joined.context("Burst worker panicked")?;
        report.merge(&tally);
        report.total += tally.sent;
        latency += tally.latency;
    }

    let elapsed = started.elapsed();
    if report.total > 0 {
        report.average_latency_ms = latency.as_secs_f64() * 1000.0 / report.total as f64;
    }
    if !elapsed.is_zero() {
        report.requests_per_sec = report.total as f64 / elapsed.as_secs_f64();
    }

    Ok(report)
}
