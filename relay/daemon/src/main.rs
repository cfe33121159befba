//! Relay Daemon - Streaming LLM relay for prompt-hub
//!
//! # Usage
//!
//! ```bash
//! # Start with defaults (0.0.0.0:5555, LM Studio at localhost:8000)
//! relay-daemon
//!
//! # Custom port and config file
//! relay-daemon --port 8080 --config ./relay.toml
//!
//! # Enable OpenAI
//! OPENAI_API_KEY=sk-... OPENAI_MODELS=gpt-4o-mini,gpt-4o relay-daemon
//!
//! # Verbose logging
//! RUST_LOG=debug relay-daemon
//! ```
//!
//! # Signals
//!
//! - `SIGTERM` / `SIGINT`: Graceful shutdown

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use relay_core::config::{load_config, load_config_from_path, ConfigOverrides};
use relay_daemon::{shutdown_signal, RelayServer};

/// Relay Daemon - Streams LLM tokens to browsers over Server-Sent Events
#[derive(Parser, Debug)]
#[command(name = "relay-daemon")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short = 'c', long, env = "RELAY_CONFIG", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Listen address
    #[arg(long, value_name = "ADDR")]
    host: Option<String>,

    /// Listen port
    #[arg(short = 'p', long, value_name = "PORT")]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("relay_daemon=info".parse()?)
                .add_directive("relay_core=info".parse()?),
        )
        .with_target(true)
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "Starting relay daemon");

    let mut config = match args.config {
        Some(path) => load_config_from_path(Some(path)),
        None => load_config(),
    }
    .context("Failed to load configuration")?;

    let overrides = ConfigOverrides {
        host: args.host,
        port: args.port,
    };
    overrides.apply(&mut config);
    config.validate().context("Invalid configuration")?;
    info!(source = %config.source(), addr = %config.bind_addr(), "Configuration loaded");

    let server = RelayServer::new(config)?;
    let relay = server.relay().clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        relay.shutdown();
    });

    let listener = server.bind().await?;
    server.serve(listener).await
}
