//! promrelay: metrics-aggregation reverse proxy.
//!
//! Every listener fans a scrape out to its exporters, injects the configured
//! labels into each returned series and streams the merged document back.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{fmt, EnvFilter};

use promrelay_gateway::{config, server};

/// Aggregate exporters behind one scrape endpoint per listener.
#[derive(Debug, Parser)]
#[command(name = "promrelay", version)]
struct Args {
    /// Logging level: debug, info, warn, error (RUST_LOG takes precedence).
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Configuration file path (.yaml, .yml or .json).
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    /// Expand $VAR / ${VAR} in the configuration file.
    #[arg(long)]
    expand_env: bool,

    /// Listen address for self metrics (empty to disable).
    #[arg(long, default_value = ":9716")]
    self_metrics_address: String,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(args.log_level.to_lowercase()));
    fmt().with_env_filter(filter).with_file(true).with_line_number(true).init();

    let cfg = match config::load_from_file(&args.config, args.expand_env) {
        Ok(cfg) => cfg,
        Err(e) => {
            tracing::error!(error = %e, "config load failed");
            return ExitCode::FAILURE;
        }
    };
    tracing::info!(config = %args.config.display(), listeners = cfg.listeners.len(), "config loaded");

    let self_metrics = if args.self_metrics_address.is_empty() {
        None
    } else {
        match config::bind_address(&args.self_metrics_address) {
            Ok(addr) => Some(addr),
            Err(e) => {
                tracing::error!(error = %e, "invalid self metrics address");
                return ExitCode::FAILURE;
            }
        }
    };

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        server::shutdown_signal().await;
        signal.cancel();
    });

    match server::run(&cfg, self_metrics, shutdown).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "startup failed");
            ExitCode::FAILURE
        }
    }
}
