//! # easybus
//!
//! ```text
//! easybus --config bus.toml listen --scope S [--scope S2] [--output DIR]
//! easybus --config bus.toml send --scope S --to NAME:EMAIL --file payload.bin
//! easybus --config bus.toml purge
//! easybus --config bus.toml initial
//! ```

use anyhow::{Context, Result};
use bus_runtime::{Args, BusRuntime, Command, RuntimeConfig};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(true)
        .with_thread_ids(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    // Load configuration
    let config = RuntimeConfig::load(&args.config)
        .with_context(|| format!("Unable to load {}", args.config.display()))?;

    let runtime = BusRuntime::connect(&config).await?;

    match args.command {
        Command::Listen {
            scopes,
            output,
            count,
        } => {
            info!("Listening. Press Ctrl+C to stop.");
            let received = runtime
                .listen(&scopes, output.as_deref(), count, async {
                    if let Err(e) = tokio::signal::ctrl_c().await {
                        warn!(error = %e, "Unable to listen for Ctrl+C");
                        std::future::pending::<()>().await;
                    }
                })
                .await?;
            info!(received, "Stopped listening");
        }
        Command::Send { scope, to, file } => {
            runtime.send_file(&scope, to, &file).await?;
        }
        Command::Purge => {
            runtime.purge().await?;
        }
        Command::Initial => {
            let messages = runtime.initial_messages().await?;
            info!(count = messages.len(), "Initial messages listed");
        }
    }

    runtime.shutdown().await;
    Ok(())
}
