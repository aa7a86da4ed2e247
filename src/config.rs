// Configuration File Support
//
// This module provides configuration file parsing for the throttlegate server.
// Supports TOML format with environment variable overrides.
// CLI flags are applied on top by the binary.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::SocketAddr;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

use crate::rate_limit::config::{DEFAULT_LIMIT, DEFAULT_WINDOW_SECS};
use crate::rate_limit::{Algorithm, ControllerOptions, QuotaPolicy};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Logging configuration
    pub logging: LoggingConfig,

    /// HTTP server configuration
    pub server: ServerConfig,

    /// Admission control configuration
    pub rate_limit: RateLimitSettings,

    /// Metrics configuration
    pub metrics: MetricsConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (json, pretty, compact)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "compact".to_string(),
        }
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address
    pub addr: String,

    /// Environment name reported by the health endpoint
    pub environment: String,

    /// Key clients by `X-Real-IP`/`X-Forwarded-For`. Enable only behind a
    /// reverse proxy that overwrites these headers.
    pub trust_proxy_headers: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: "0.0.0.0:8080".to_string(),
            environment: "development".to_string(),
            trust_proxy_headers: false,
        }
    }
}

/// Admission control configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RateLimitSettings {
    /// Maximum requests per window for each client
    pub limit: u32,

    /// Window length in seconds
    pub window_secs: u64,

    /// Idle time in seconds before a client's counter is evicted
    /// (defaults to the window)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub idle_horizon_secs: Option<u64>,

    /// Accounting algorithm
    pub algorithm: Algorithm,

    /// Counter shard count (power of two)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shards: Option<usize>,

    /// Tracked client count above which capacity exhaustion is reported
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tracked_keys: Option<usize>,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            limit: DEFAULT_LIMIT,
            window_secs: DEFAULT_WINDOW_SECS,
            idle_horizon_secs: None,
            algorithm: Algorithm::default(),
            shards: None,
            max_tracked_keys: None,
        }
    }
}

impl RateLimitSettings {
    /// Build the quota policy
    pub fn quota_policy(&self) -> Result<QuotaPolicy> {
        let policy = QuotaPolicy::new(self.limit, Duration::from_secs(self.window_secs))
            .context("Invalid rate limit policy")?;
        match self.idle_horizon_secs {
            Some(secs) => policy
                .with_idle_horizon(Duration::from_secs(secs))
                .context("Invalid rate limit idle horizon"),
            None => Ok(policy),
        }
    }

    /// Build the controller tuning options
    pub fn controller_options(&self) -> ControllerOptions {
        ControllerOptions {
            algorithm: self.algorithm,
            shards: self.shards,
            max_tracked_keys: self.max_tracked_keys,
        }
    }
}

/// Metrics configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MetricsConfig {
    /// Whether to enable the metrics server
    pub enabled: bool,

    /// Port for metrics server
    pub port: u16,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: 9090,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            logging: LoggingConfig::default(),
            server: ServerConfig::default(),
            rate_limit: RateLimitSettings::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from a specific path
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed, or if
    /// the resulting configuration is invalid.
    /// If the config file does not exist, defaults are used.
    ///
    /// Runs before logging is set up, so callers report the source
    /// themselves once tracing is initialized.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let config = if path.exists() {
            let content = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file from {:?}", path))?;

            toml::from_str(&content)
                .with_context(|| format!("Failed to parse config file from {:?}", path))?
        } else {
            Self::default()
        };

        let config = config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Apply environment variable overrides to the configuration
    ///
    /// Environment variables take precedence over config file values:
    /// - THROTTLEGATE_LOG_LEVEL
    /// - THROTTLEGATE_LOG_FORMAT
    /// - THROTTLEGATE_ADDR
    /// - THROTTLEGATE_ENV
    /// - THROTTLEGATE_TRUST_PROXY_HEADERS
    /// - THROTTLEGATE_RATE_LIMIT
    /// - THROTTLEGATE_RATE_WINDOW_SECS
    /// - THROTTLEGATE_RATE_ALGORITHM
    /// - THROTTLEGATE_METRICS_ENABLED
    /// - THROTTLEGATE_METRICS_PORT
    ///
    /// Unparseable or out-of-range values are ignored with a warning.
    pub fn apply_env_overrides(self) -> Self {
        self.apply_overrides(|name| std::env::var(name).ok())
    }

    fn apply_overrides(mut self, var: impl Fn(&str) -> Option<String>) -> Self {
        // Logging overrides
        if let Some(level) = var("THROTTLEGATE_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(format) = var("THROTTLEGATE_LOG_FORMAT") {
            self.logging.format = format;
        }

        // Server overrides
        if let Some(addr) = var("THROTTLEGATE_ADDR") {
            self.server.addr = addr;
        }
        if let Some(env) = var("THROTTLEGATE_ENV") {
            self.server.environment = env;
        }
        if let Some(trust) =
            parse_override(&var, "THROTTLEGATE_TRUST_PROXY_HEADERS", |_: &bool| true)
        {
            self.server.trust_proxy_headers = trust;
        }

        // Rate limit overrides; invalid values keep the current setting
        if let Some(limit) = parse_override(&var, "THROTTLEGATE_RATE_LIMIT", |v: &u32| *v > 0) {
            self.rate_limit.limit = limit;
        }
        if let Some(window) =
            parse_override(&var, "THROTTLEGATE_RATE_WINDOW_SECS", |v: &u64| *v > 0)
        {
            self.rate_limit.window_secs = window;
        }
        if let Some(algorithm) =
            parse_override(&var, "THROTTLEGATE_RATE_ALGORITHM", |_: &Algorithm| true)
        {
            self.rate_limit.algorithm = algorithm;
        }

        // Metrics overrides
        if let Some(enabled) =
            parse_override(&var, "THROTTLEGATE_METRICS_ENABLED", |_: &bool| true)
        {
            self.metrics.enabled = enabled;
        }
        if let Some(port) = parse_override(&var, "THROTTLEGATE_METRICS_PORT", |v: &u16| *v > 0) {
            self.metrics.port = port;
        }

        self
    }

    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn validate(&self) -> Result<()> {
        // Validate logging level
        match self.logging.level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => anyhow::bail!(
                "Invalid log level: {}. Must be one of: trace, debug, info, warn, error",
                self.logging.level
            ),
        }

        // Validate logging format
        match self.logging.format.to_lowercase().as_str() {
            "json" | "pretty" | "compact" => {}
            _ => anyhow::bail!(
                "Invalid log format: {}. Must be one of: json, pretty, compact",
                self.logging.format
            ),
        }

        // Validate server configuration
        self.socket_addr()?;

        // Validate rate limit configuration
        self.rate_limit.quota_policy()?;
        self.rate_limit
            .controller_options()
            .validate()
            .context("Invalid rate limit options")?;

        // Validate metrics configuration
        if self.metrics.port == 0 {
            anyhow::bail!("Metrics port must be > 0");
        }

        Ok(())
    }

    /// Parsed listen address
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        self.server
            .addr
            .parse()
            .with_context(|| format!("Invalid server address: {}", self.server.addr))
    }

    /// Convert log level string to tracing::Level
    pub fn log_level(&self) -> Result<tracing::Level> {
        self.logging
            .level
            .to_lowercase()
            .parse()
            .map_err(|e| anyhow::anyhow!("Failed to parse log level: {}", e))
    }
}

/// Read and parse one override, warning when it is present but unusable
fn parse_override<T: FromStr>(
    var: &impl Fn(&str) -> Option<String>,
    name: &str,
    accept: impl Fn(&T) -> bool,
) -> Option<T> {
    let raw = var(name)?;
    match raw.trim().parse::<T>() {
        Ok(value) if accept(&value) => Some(value),
        _ => {
            warn!(
                variable = name,
                value = %raw,
                "Ignoring invalid environment override"
            );
            None
        }
    }
}
