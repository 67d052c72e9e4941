//! slackirc - relays one Slack channel to one IRC channel and back.
//!
//! This is the main binary entry point. See the `slackirc` library for the
//! core functionality.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use mimalloc::MiMalloc;
use slackirc::{Bridge, Config};

/// Global allocator configured per M-MIMALLOC-APPS guideline.
/// mimalloc provides better multi-threaded performance than the system allocator.
#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[derive(Parser, Debug)]
#[command(name = "slackirc")]
#[command(about = "Relay messages between a Slack channel and an IRC channel", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to the JSON config file (default: <config dir>/slackirc/config.json)
    #[arg(short, long)]
    config: Option<PathBuf>,
}

fn init_logging() -> Result<()> {
    let builder_env = env_logger::Env::default().default_filter_or("info");
    let mut builder = env_logger::Builder::from_env(builder_env);
    builder.format_timestamp_secs();

    // SLACKIRC_LOG_FILE sends logs to a file instead of stderr.
    if let Ok(path) = std::env::var("SLACKIRC_LOG_FILE") {
        let log_file = std::fs::File::create(&path)
            .with_context(|| format!("Failed to create log file at {path}"))?;
        builder.target(env_logger::Target::Pipe(Box::new(log_file)));
    }

    builder.init();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging()?;

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;
    config.validate()?;
    log::debug!("Loaded config: {config:?}");

    let bridge = Bridge::start(&config)?;

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result.context("Failed to listen for Ctrl-C")?;
            log::info!("Received Ctrl-C");
        }
        () = bridge.died() => {
            log::info!("Received die command");
        }
    }

    bridge.shutdown().await;
    Ok(())
}
