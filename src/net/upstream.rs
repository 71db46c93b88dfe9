//! Remote connector for origin servers.
//!
//! # Responsibilities
//! - Resolve the origin host name
//! - Open one TCP connection to the origin
//! - Report resolution and connect failures distinctly
//!
//! # Design Decisions
//! - Never retries; the caller answers the client with an error page
//! - Resolved addresses are tried in resolver order until one connects
//! - Optional connect timeout (disabled by default)

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;
use tokio::net::{lookup_host, TcpStream};

/// Errors opening a connection to an origin.
#[derive(Debug, Error)]
pub enum ConnectError {
    /// Name resolution failed.
    #[error("failed to resolve {host}: {source}")]
    Resolve { host: String, source: io::Error },

    /// Name resolution returned no addresses.
    #[error("no addresses found for {host}")]
    NoAddress { host: String },

    /// Every resolved address refused or failed the connection.
    #[error("failed to connect to {addr}: {source}")]
    Connect { addr: SocketAddr, source: io::Error },

    /// The connect attempt did not finish in time.
    #[error("connect to {host}:{port} timed out after {secs}s")]
    Timeout { host: String, port: u16, secs: u64 },
}

impl ConnectError {
    /// Short label for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            ConnectError::Resolve { .. } | ConnectError::NoAddress { .. } => "resolve",
            ConnectError::Connect { .. } => "connect",
            ConnectError::Timeout { .. } => "timeout",
        }
    }
}

/// Opens TCP connections to origin servers.
#[derive(Debug, Clone, Copy, Default)]
pub struct RemoteConnector {
    connect_timeout: Option<Duration>,
}

impl RemoteConnector {
    /// Create a connector; `connect_timeout_secs == 0` waits indefinitely.
    pub fn new(connect_timeout_secs: u64) -> Self {
        Self {
            connect_timeout: (connect_timeout_secs > 0)
                .then(|| Duration::from_secs(connect_timeout_secs)),
        }
    }

    /// Connect to `host:port`.
    ///
    /// The caller owns the returned stream and closes it by dropping it.
    pub async fn connect(&self, host: &str, port: u16) -> Result<TcpStream, ConnectError> {
        match self.connect_timeout {
            Some(limit) => tokio::time::timeout(limit, connect(host, port))
                .await
                .map_err(|_| ConnectError::Timeout {
                    host: host.to_string(),
                    port,
                    secs: limit.as_secs(),
                })?,
            None => connect(host, port).await,
        }
    }
}

async fn connect(host: &str, port: u16) -> Result<TcpStream, ConnectError> {
    let addrs = lookup_host((host, port))
        .await
        .map_err(|source| ConnectError::Resolve {
            host: host.to_string(),
            source,
        })?;

    let mut last_error = None;
    for addr in addrs {
        match TcpStream::connect(addr).await {
            Ok(stream) => {
                tracing::debug!(host, %addr, "Connected to origin");
                return Ok(stream);
            }
            Err(source) => last_error = Some(ConnectError::Connect { addr, source }),
        }
    }

    Err(last_error.unwrap_or_else(|| ConnectError::NoAddress {
        host: host.to_string(),
    }))
}
