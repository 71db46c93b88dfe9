//! Proxy server: accept loop and per-connection workers.
//!
//! # Responsibilities
//! - Accept client connections and log their peer address
//! - Spawn one worker per connection, moving the socket into it
//! - Gate each worker on admission control before any processing
//! - Stop accepting on shutdown and wait for workers to drain

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::broadcast;
use tracing::Instrument;

use crate::cache::ResponseCache;
use crate::config::ProxyConfig;
use crate::http::handler::RequestHandler;
use crate::net::connection::ConnectionGuard;
use crate::net::{AdmissionControl, ConnectionTracker, Listener};
use crate::observability::metrics;

/// How long shutdown waits for in-flight workers.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// The caching forward proxy.
pub struct ProxyServer {
    config: ProxyConfig,
    cache: Arc<ResponseCache>,
    admission: AdmissionControl,
    tracker: ConnectionTracker,
    handler: Arc<RequestHandler>,
}

impl ProxyServer {
    /// Create a new proxy server with the given configuration.
    pub fn new(config: ProxyConfig) -> Self {
        let cache = Arc::new(ResponseCache::from_config(&config.cache));
        let handler = Arc::new(RequestHandler::new(&config, Arc::clone(&cache)));
        let admission = AdmissionControl::new(config.listener.max_connections);

        Self {
            config,
            cache,
            admission,
            tracker: ConnectionTracker::new(),
            handler,
        }
    }

    /// Shared response cache.
    pub fn cache(&self) -> Arc<ResponseCache> {
        Arc::clone(&self.cache)
    }

    /// Admission limiter shared by the workers.
    pub fn admission(&self) -> AdmissionControl {
        self.admission.clone()
    }

    /// Accept connections until `shutdown` fires, then drain workers.
    pub async fn run(
        self,
        listener: Listener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            max_connections = self.admission.capacity(),
            cache_enabled = self.config.cache.enabled,
            "Proxy server starting"
        );

        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => self.dispatch(stream, peer),
                    Err(e) => tracing::error!(error = %e, "Error accepting connection"),
                },
                _ = shutdown.recv() => {
                    tracing::info!("Shutdown signal received, no longer accepting");
                    break;
                }
            }
        }

        drop(listener);
        let pending = self.tracker.active_count();
        if pending > 0 {
            tracing::info!(pending, "Waiting for in-flight connections");
        }
        if tokio::time::timeout(DRAIN_TIMEOUT, self.tracker.wait_for_drain())
            .await
            .is_err()
        {
            tracing::warn!(
                remaining = self.tracker.active_count(),
                "Drain timeout elapsed; abandoning connections"
            );
        }

        tracing::info!("Proxy server stopped");
        Ok(())
    }

    fn dispatch(&self, stream: TcpStream, peer: SocketAddr) {
        let guard = self.tracker.track();
        tracing::info!(connection_id = %guard.id(), peer_addr = %peer, "Client connected");
        metrics::record_connection_accepted();

        let span = tracing::info_span!("connection", id = %guard.id(), peer = %peer);
        let handler = Arc::clone(&self.handler);
        let admission = self.admission.clone();
        tokio::spawn(
            async move { serve_connection(stream, handler, admission, guard).await }
                .instrument(span),
        );
    }
}

/// Worker body: owns the client socket for its whole life.
async fn serve_connection(
    mut stream: TcpStream,
    handler: Arc<RequestHandler>,
    admission: AdmissionControl,
    _guard: ConnectionGuard,
) {
    let permit = match admission.acquire().await {
        Ok(permit) => permit,
        Err(e) => {
            tracing::error!(error = %e, "Could not obtain admission slot");
            return;
        }
    };

    let start = Instant::now();
    let outcome = handler.handle(&mut stream).await;

    if let Err(e) = stream.shutdown().await {
        tracing::trace!(error = %e, "Client socket shutdown failed");
    }
    drop(stream);
    drop(permit);

    metrics::record_request(outcome.label(), start);
    tracing::debug!(
        outcome = outcome.label(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "Connection finished"
    );
}
