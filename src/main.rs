//! ClockRelay attendance relay.
//!
//! Main entry point. `serve` (the default) runs the device-facing relay;
//! `replay` forwards a file of stored device payloads with per-event retry.

#![forbid(unsafe_code)]

use std::{path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use clockrelay_api::{AppState, Config};
use clockrelay_core::RealClock;
use tracing::info;

mod replay;

#[derive(Parser)]
#[command(name = "clockrelay", version)]
#[command(about = "Relay biometric attendance events to a downstream webhook")]
struct Cli {
    /// Configuration file; missing files are ignored
    #[arg(short, long, global = true, default_value = "clockrelay.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the relay server (default)
    Serve,
    /// Forward a JSON array of stored device payloads, retrying each event
    Replay {
        /// File holding the JSON array
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::load_from(&cli.config)?;
    init_tracing(&config.rust_log);

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config).await,
        Command::Replay { file } => replay::run(&config, &file).await,
    }
}

async fn serve(config: Config) -> Result<()> {
    let addr = config.parse_server_addr()?;

    info!(
        server_addr = %addr,
        webhook_path = %config.webhook_path,
        downstream_host = %config.downstream_host(),
        delivery_timeout_seconds = config.delivery_timeout_seconds,
        default_device_id = %config.default_device_id,
        "Configuration loaded"
    );

    let state = AppState::from_config(&config, Arc::new(RealClock::new()))
        .context("Failed to build relay state")?;

    clockrelay_api::start_server(state, addr).await.context("HTTP server failed")?;

    info!("ClockRelay shutdown complete");
    Ok(())
}

/// Initializes tracing with environment-based configuration.
///
/// `RUST_LOG` wins over the configured filter.
fn init_tracing(fallback_filter: &str) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(fallback_filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let fmt_layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_thread_names(true)
        .with_file(true)
        .with_line_number(true);

    tracing_subscriber::registry().with(filter).with(fmt_layer).init();
}
