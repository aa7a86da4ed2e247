//! Throttlegate Library
//!
//! Per-key admission control for network services: a sharded, clock-driven
//! rate limiter (`rate_limit`), plus the HTTP server, configuration, metrics
//! and load tooling built around it.

pub mod burst;
pub mod config;
pub mod metrics;
pub mod metrics_server;
pub mod rate_limit;
pub mod server;
