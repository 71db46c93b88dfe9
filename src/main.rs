//! Caching forward HTTP proxy.
//!
//! # Architecture Overview
//!
//! ```text
//!                     ┌───────────────────────────────────────────────────┐
//!                     │                  CACHING PROXY                    │
//!                     │                                                   │
//!  Client Request     │  ┌──────────┐   ┌───────────┐   ┌─────────────┐   │
//!  ───────────────────┼─▶│ listener │──▶│  worker   │──▶│  admission  │   │
//!                     │  │ (accept) │   │ (1/conn)  │   │  (400 max)  │   │
//!                     │  └──────────┘   └───────────┘   └──────┬──────┘   │
//!                     │                                        ▼          │
//!                     │                  ┌───────────┐   ┌─────────────┐  │
//!                     │                  │  response │◀──│   handler   │  │
//!                     │                  │   cache   │──▶│             │  │
//!                     │                  └───────────┘   └──────┬──────┘  │
//!                     │                                        │ miss     │
//!  Client Response    │                                  ┌─────▼──────┐   │     Origin
//!  ◀──────────────────┼──────────────────────────────────│  upstream  │◀──┼──── Server
//!                     │                                  └────────────┘   │
//!                     └───────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use clap::Parser;

use caching_proxy::lifecycle::startup;
use caching_proxy::observability::logging;

#[derive(Parser)]
#[command(name = "caching-proxy")]
#[command(about = "Forwarding HTTP proxy with an in-memory LRU response cache", long_about = None)]
struct Cli {
    /// Port to listen on.
    port: u16,

    /// Optional TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level used when RUST_LOG is unset (overrides the config file).
    #[arg(short, long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = startup::resolve_config(cli.port, cli.config.as_deref())?;
    let level = cli
        .log_level
        .as_deref()
        .unwrap_or(&config.observability.log_level);
    logging::init(level);

    tracing::info!(port = cli.port, "caching-proxy v0.1.0 starting");

    startup::run(config).await
}
