//! Startup orchestration.
//!
//! # Responsibilities
//! - Assemble configuration from defaults, an optional file and the CLI port
//! - Start the metrics exporter when enabled
//! - Bind the listener and run the server until shutdown
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - The listener binds last (traffic only when ready)

use std::path::Path;

use crate::config::{load_config, ConfigError, ProxyConfig};
use crate::http::ProxyServer;
use crate::lifecycle::{signals, Shutdown};
use crate::net::Listener;
use crate::observability::metrics;

/// Build the effective configuration for a run.
pub fn resolve_config(port: u16, config_path: Option<&Path>) -> Result<ProxyConfig, ConfigError> {
    let config = match config_path {
        Some(path) => load_config(path)?,
        None => ProxyConfig::default(),
    };
    Ok(config.with_port(port))
}

/// Run the proxy until a termination signal arrives.
pub async fn run(config: ProxyConfig) -> Result<(), Box<dyn std::error::Error>> {
    tracing::info!(
        bind_address = %config.listener.bind_address,
        max_connections = config.listener.max_connections,
        max_cache_bytes = config.cache.max_total_bytes,
        max_element_bytes = config.cache.max_element_bytes,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let listener = Listener::bind(&config.listener).await?;

    let shutdown = Shutdown::new();
    signals::spawn_signal_handler(shutdown.clone());

    let server = ProxyServer::new(config);
    server.run(listener, shutdown.subscribe()).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn cli_port_overrides_defaults() {
        let config = resolve_config(3128, None).unwrap();
        assert_eq!(config.listener.bind_address, "0.0.0.0:3128");
    }

    #[test]
    fn cli_port_overrides_file() {
        let path = std::env::temp_dir().join(format!("caching-proxy-{}.toml", std::process::id()));
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            "[listener]\nbind_address = \"127.0.0.1:8080\"\nmax_connections = 8"
        )
        .unwrap();

        let config = resolve_config(9999, Some(&path)).unwrap();
        assert_eq!(config.listener.bind_address, "127.0.0.1:9999");
        assert_eq!(config.listener.max_connections, 8);

        std::fs::remove_file(path).unwrap_or_default();
    }
}
