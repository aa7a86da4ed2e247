// Throttlegate - Main Entry Point
//
// CLI for the rate-limited HTTP server:
// - serve: run the API behind the admission controller
// - check-config: validate and print the effective configuration
// - burst: fire a burst of requests and report how many were limited

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::time::Duration;
use throttlegate::burst::{self, BurstConfig};
use throttlegate::config::Config;
use throttlegate::rate_limit::Algorithm;
use throttlegate::server;
use tracing::{debug, info, Level};
use tracing_subscriber::EnvFilter;

/// Throttlegate: per-client admission control for HTTP services
#[derive(Parser, Debug)]
#[command(name = "throttlegate")]
#[command(author = "Throttlegate Contributors")]
#[command(version)]
#[command(about = "Rate-limited HTTP server and load tooling", long_about = None)]
struct Args {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to the TOML config file (defaults apply when it does not exist)
    #[arg(short, long, global = true, default_value = "throttlegate.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the rate-limited HTTP server
    Serve {
        /// Listen address (overrides config)
        #[arg(long)]
        addr: Option<String>,

        /// Requests per window per client (overrides config)
        #[arg(long)]
        limit: Option<u32>,

        /// Window length in seconds (overrides config)
        #[arg(long)]
        window_secs: Option<u64>,

        /// fixed_window, sliding_window or token_bucket (overrides config)
        #[arg(long)]
        algorithm: Option<Algorithm>,
    },
    /// Validate the configuration and print the effective values
    CheckConfig,
    /// Send a burst of requests and tally the responses
    Burst {
        /// Target URL
        #[arg(long, default_value = "http://localhost:8080/v1/test")]
        url: String,

        /// Total requests to send
        #[arg(long, default_value_t = 200)]
        requests: usize,

        /// Concurrent connections
        #[arg(long, default_value_t = 20)]
        concurrency: usize,

        /// Per-request timeout in seconds
        #[arg(long, default_value_t = 10)]
        timeout_secs: u64,

        /// Send for this many seconds instead of a fixed request count
        #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
        duration_secs: Option<u64>,

        /// Skip the /v1/health check before the burst
        #[arg(long)]
        skip_health_check: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // The configured subscriber depends on the config, so loading logs go
    // through a stderr-only one scoped to this call.
    let config = tracing::subscriber::with_default(bootstrap_subscriber(args.verbose), || {
        Config::load_from_path(&args.config)
    })
    .with_context(|| format!("Failed to load configuration from {:?}", args.config))?;

    let level = if args.verbose {
        Level::DEBUG
    } else {
        config.log_level()?
    };
    init_tracing(level, &config.logging.format);
    log_config_source(&args.config);

    match args.command {
        Some(Commands::Serve {
            addr,
            limit,
            window_secs,
            algorithm,
        }) => {
            let mut config = config;
            if let Some(addr) = addr {
                config.server.addr = addr;
            }
            if let Some(limit) = limit {
                config.rate_limit.limit = limit;
            }
            if let Some(window_secs) = window_secs {
                config.rate_limit.window_secs = window_secs;
            }
            if let Some(algorithm) = algorithm {
                config.rate_limit.algorithm = algorithm;
            }
            config.validate().context("Invalid command-line overrides")?;

            info!("Throttlegate v{} starting...", env!("CARGO_PKG_VERSION"));
            server::serve(config).await?;
        }
        Some(Commands::CheckConfig) => {
            let rendered =
                toml::to_string_pretty(&config).context("Failed to render configuration")?;
            println!("{}", rendered);
            println!("# configuration OK");
        }
        Some(Commands::Burst {
            url,
            requests,
            concurrency,
            timeout_secs,
            duration_secs,
            skip_health_check,
        }) => {
            let burst_config = BurstConfig {
                url,
                requests,
                concurrency,
                timeout: Duration::from_secs(timeout_secs),
                duration: duration_secs.map(Duration::from_secs),
                health_check: !skip_health_check,
            };
            run_burst(&burst_config).await?;
        }
        None => {
            info!("No command specified. Use \"throttlegate --help\" for usage.");
        }
    }

    Ok(())
}

fn init_tracing(level: Level, format: &str) {
    let filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    match format.to_lowercase().as_str() {
        "json" => builder.json().init(),
        "pretty" => builder.pretty().init(),
        _ => builder.compact().init(),
    }
}

fn bootstrap_subscriber(verbose: bool) -> impl tracing::Subscriber + Send + Sync {
    tracing_subscriber::fmt()
        .with_max_level(if verbose { Level::DEBUG } else { Level::WARN })
        .with_writer(std::io::stderr)
        .compact()
        .finish()
}

fn log_config_source(path: &Path) {
    if path.exists() {
        info!("Loaded configuration from {:?}", path);
    } else {
        debug!("Config file not found at {:?}, using defaults", path);
    }
}

async fn run_burst(config: &BurstConfig) -> Result<()> {
    println!("Burst test against {}", config.url);
    match config.duration {
        Some(duration) => println!(
            "Sending for {}s over {} connections...",
            duration.as_secs(),
            config.concurrency
        ),
        None => println!(
            "Sending {} requests over {} connections...",
            config.requests, config.concurrency
        ),
    }
    println!();

    let report = burst::run_burst(config).await?;

    println!("Results:");
    println!("   Total Requests: {}", report.total);
    println!("   2xx responses: {}", report.success_2xx);
    println!("   4xx responses: {}", report.client_4xx);
    println!("   5xx responses: {}", report.server_5xx);
    println!("   Connection errors: {}", report.errors);
    println!("   Average latency: {:.2}ms", report.average_latency_ms);
    println!("   Requests/sec: {:.1}", report.requests_per_sec);
    println!();

    if report.rate_limited() {
        println!("Rate limiter is working! Some requests were blocked.");
    } else {
        println!("No rate limiting detected. Check your configuration.");
    }

    Ok(())
}
