//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the proxy.
//! All types derive Serde traits for deserialization from config files.
//! Defaults are the compiled-in limits the proxy ships with.

use serde::{Deserialize, Serialize};

/// Maximum number of requests processed concurrently.
pub const MAX_CLIENTS: usize = 400;

/// Total byte budget of the response cache (200 MiB).
pub const MAX_TOTAL_CACHE_BYTES: usize = 200 * (1 << 20);

/// Largest accounting size a single cache entry may have (10 MiB).
pub const MAX_ELEMENT_BYTES: usize = 10 * (1 << 20);

/// Size of one socket read/write unit.
pub const IO_BUFFER_SIZE: usize = 4096;

/// Root configuration for the caching proxy.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ProxyConfig {
    /// Listener configuration (bind address, admission capacity).
    pub listener: ListenerConfig,

    /// Response cache limits.
    pub cache: CacheConfig,

    /// Origin forwarding settings.
    pub forwarding: ForwardingConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

impl ProxyConfig {
    /// Replace the port of the configured bind address.
    pub fn with_port(mut self, port: u16) -> Self {
        let host = match self.listener.bind_address.rsplit_once(':') {
            Some((host, _)) => host.to_string(),
            None => self.listener.bind_address.clone(),
        };
        self.listener.bind_address = format!("{}:{}", host, port);
        self
    }
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Maximum requests processed at once (admission control capacity).
    pub max_connections: usize,

    /// Listen backlog handed to the OS.
    pub backlog: u32,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            max_connections: MAX_CLIENTS,
            backlog: MAX_CLIENTS as u32,
        }
    }
}

/// Response cache configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Serve and store responses through the cache.
    pub enabled: bool,

    /// Total accounted bytes the cache may hold.
    pub max_total_bytes: usize,

    /// Entries with a larger accounting size are never stored.
    pub max_element_bytes: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_total_bytes: MAX_TOTAL_CACHE_BYTES,
            max_element_bytes: MAX_ELEMENT_BYTES,
        }
    }
}

/// Forwarding configuration for client and origin traffic.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ForwardingConfig {
    /// Bytes moved per socket read.
    pub io_buffer_size: usize,

    /// Largest request header block accepted from a client.
    pub max_request_bytes: usize,

    /// Origin port used when the request names none.
    pub default_port: u16,

    /// Origin connect timeout in seconds (0 = wait indefinitely).
    pub connect_timeout_secs: u64,

    /// Hosts that are answered with 403 instead of being forwarded.
    pub blocked_hosts: Vec<String>,
}

impl Default for ForwardingConfig {
    fn default() -> Self {
        Self {
            io_buffer_size: IO_BUFFER_SIZE,
            max_request_bytes: 16 * IO_BUFFER_SIZE,
            default_port: 80,
            connect_timeout_secs: 0,
            blocked_hosts: Vec::new(),
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
