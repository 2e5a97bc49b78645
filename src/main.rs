use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tracing::info;
use tracing_subscriber::EnvFilter;

use weaver_ratelimit::config::ServiceConfig;
use weaver_ratelimit::http::{router, HttpServer};
use weaver_ratelimit::ratelimit::{open_store, BucketTable, RateLimiter};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

/// Rate limit decision service for the WorldWeaver API.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Service configuration file (YAML)
    #[arg(short, long, env = "WEAVER_CONFIG")]
    config: Option<PathBuf>,

    /// Bucket table file, overriding `rate_limiting.buckets_path`
    #[arg(short, long)]
    buckets: Option<PathBuf>,

    /// Log output format
    #[arg(long, value_enum, default_value = "text")]
    log_format: LogFormat,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.log_format);

    info!("Starting Weaver rate limit service");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let config = ServiceConfig::load(args.config.as_deref())?;
    info!(
        http_addr = %config.server.http_addr,
        trust_proxy_headers = config.rate_limiting.trust_proxy_headers,
        "Configuration loaded"
    );

    let buckets_path = args
        .buckets
        .or_else(|| config.rate_limiting.buckets_path.as_ref().map(PathBuf::from));
    let table = match buckets_path {
        Some(path) => BucketTable::from_file(path)?,
        None => BucketTable::builtin(),
    };
    info!(buckets = table.len(), "Bucket table loaded");

    let store = open_store(&config.storage).await;
    let rate_limiter = Arc::new(RateLimiter::new(store, table));
    info!(backend = rate_limiter.backend_name(), "Rate limiter initialized");

    let server = HttpServer::new(config.server.http_addr, router(rate_limiter));
    server.serve_with_shutdown(shutdown_signal()).await?;

    info!("Weaver rate limit service stopped");
    Ok(())
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true);

    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
