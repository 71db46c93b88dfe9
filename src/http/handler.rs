//! Request handling and forwarding.
//!
//! # Responsibilities
//! - Read the client's request and use its raw bytes as the cache key
//! - Serve cache hits in buffer-sized chunks
//! - Validate and rewrite misses, connect to the origin and stream its
//!   response to the client while buffering it for the cache
//! - Answer every failure before forwarding starts with a canned page
//!
//! # Design Decisions
//! - Only GET is forwarded; other methods are logged and closed
//! - The origin is asked for `Connection: close`, so a zero-byte read ends the response
//! - A response is cached only when the origin closed cleanly
//! - Mid-transfer failures tear the connection down without an error page

use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::cache::{InsertOutcome, ResponseCache};
use crate::config::ProxyConfig;
use crate::http::request::{read_request, request_method, ParseError, ParsedRequest, ReadOutcome};
use crate::http::response::ErrorPage;
use crate::net::upstream::RemoteConnector;
use crate::observability::metrics;

/// How a request ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerOutcome {
    /// Served from the cache.
    CacheHit,
    /// Forwarded to the origin and fully relayed.
    Forwarded { cached: bool },
    /// Client closed before sending a complete request.
    ClientClosed,
    /// Reading the request failed.
    ClientError,
    /// Method other than GET; closed without a reply.
    UnsupportedMethod,
    /// Answered locally with an error page.
    Rejected(ErrorPage),
    /// The transfer broke off after it started.
    Aborted,
}

impl HandlerOutcome {
    /// Label used for metrics.
    pub fn label(&self) -> &'static str {
        match self {
            HandlerOutcome::CacheHit => "cache_hit",
            HandlerOutcome::Forwarded { .. } => "forwarded",
            HandlerOutcome::ClientClosed => "client_closed",
            HandlerOutcome::ClientError => "client_error",
            HandlerOutcome::UnsupportedMethod => "unsupported_method",
            HandlerOutcome::Rejected(_) => "rejected",
            HandlerOutcome::Aborted => "aborted",
        }
    }
}

/// Result of relaying an origin response.
struct Transfer {
    /// The origin closed the connection after a complete response.
    complete: bool,
    bytes: usize,
    /// Buffered response, dropped once it can no longer be cached.
    body: Option<Vec<u8>>,
}

/// Serves one client request through the cache or the origin.
#[derive(Debug)]
pub struct RequestHandler {
    cache: Arc<ResponseCache>,
    cache_enabled: bool,
    connector: RemoteConnector,
    io_buffer_size: usize,
    max_request_bytes: usize,
    default_port: u16,
    blocked_hosts: Vec<String>,
}

impl RequestHandler {
    pub fn new(config: &ProxyConfig, cache: Arc<ResponseCache>) -> Self {
        let forwarding = &config.forwarding;
        Self {
            cache,
            cache_enabled: config.cache.enabled,
            connector: RemoteConnector::new(forwarding.connect_timeout_secs),
            io_buffer_size: forwarding.io_buffer_size,
            max_request_bytes: forwarding.max_request_bytes,
            default_port: forwarding.default_port,
            blocked_hosts: forwarding
                .blocked_hosts
                .iter()
                .map(|h| h.to_ascii_lowercase())
                .collect(),
        }
    }

    /// Read one request from `client` and answer it.
    pub async fn handle<S>(&self, client: &mut S) -> HandlerOutcome
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        match read_request(client, self.io_buffer_size, self.max_request_bytes).await {
            Ok(ReadOutcome::Request(raw)) => self.serve(client, &raw).await,
            Ok(ReadOutcome::Closed) => {
                tracing::info!("Client disconnected");
                HandlerOutcome::ClientClosed
            }
            Ok(ReadOutcome::TooLarge) => {
                tracing::warn!(limit = self.max_request_bytes, "Request header block too large");
                self.reject(client, ErrorPage::BadRequest).await
            }
            Err(e) => {
                tracing::warn!(error = %e, "Error receiving from client");
                HandlerOutcome::ClientError
            }
        }
    }

    /// Answer a request whose raw header block is `raw`.
    pub async fn serve<S>(&self, client: &mut S, raw: &[u8]) -> HandlerOutcome
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        if self.cache_enabled {
            if let Some(hit) = self.cache.lookup(raw) {
                tracing::info!(bytes = hit.len(), "Serving from cache");
                for chunk in hit.data().chunks(self.io_buffer_size) {
                    if let Err(e) = client.write_all(chunk).await {
                        tracing::warn!(error = %e, "Error sending cached response to client");
                        return HandlerOutcome::Aborted;
                    }
                }
                return HandlerOutcome::CacheHit;
            }
        }

        // Non-GET requests close silently whatever their target or version.
        if let Some(method) = request_method(raw).filter(|m| *m != "GET") {
            tracing::info!(method = %method, "Only GET requests are supported");
            return HandlerOutcome::UnsupportedMethod;
        }

        let mut request = match ParsedRequest::parse(raw) {
            Ok(request) => request,
            Err(ParseError::Version) => {
                tracing::warn!("Unsupported HTTP version");
                return self.reject(client, ErrorPage::HttpVersionNotSupported).await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to parse request");
                return self.reject(client, ErrorPage::InternalServerError).await;
            }
        };

        let Some(host) = request.host.clone() else {
            tracing::warn!(path = %request.path, "Request names no host");
            return self.reject(client, ErrorPage::InternalServerError).await;
        };
        if self.is_blocked(&host) {
            tracing::info!(host = %host, "Blocked host");
            return self.reject(client, ErrorPage::Forbidden).await;
        }

        request.set_header("Connection", "close");
        request.remove_header("Proxy-Connection");
        if request.header("Host").is_none() {
            request.set_header("Host", &host);
        }
        let outgoing = request.origin_request();
        let port = request.port.unwrap_or(self.default_port);

        let mut origin = match self.connector.connect(&host, port).await {
            Ok(origin) => origin,
            Err(e) => {
                tracing::warn!(host = %host, port, error = %e, "Failed to connect to origin");
                metrics::record_upstream_error(e.kind());
                return self.reject(client, ErrorPage::InternalServerError).await;
            }
        };

        if let Err(e) = origin.write_all(&outgoing).await {
            tracing::warn!(host = %host, port, error = %e, "Error sending request to origin");
            metrics::record_upstream_error("send");
            return HandlerOutcome::Aborted;
        }

        let transfer = self.relay(&mut origin, client).await;
        drop(origin);

        if !transfer.complete {
            return HandlerOutcome::Aborted;
        }
        tracing::info!(host = %host, port, bytes = transfer.bytes, "Forwarded response");

        let cached = match transfer.body {
            Some(body) if self.cache_enabled && !body.is_empty() => {
                matches!(self.cache.insert(raw, &body), InsertOutcome::Stored { .. })
            }
            _ => false,
        };
        HandlerOutcome::Forwarded { cached }
    }

    /// Copy the origin's response to the client until the origin closes.
    async fn relay<O, C>(&self, origin: &mut O, client: &mut C) -> Transfer
    where
        O: AsyncRead + Unpin,
        C: AsyncWrite + Unpin,
    {
        let mut chunk = vec![0u8; self.io_buffer_size];
        let mut body = self
            .cache_enabled
            .then(|| Vec::with_capacity(self.io_buffer_size));
        let mut bytes = 0;

        loop {
            let n = match origin.read(&mut chunk).await {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) => {
                    tracing::warn!(error = %e, bytes, "Error receiving from origin");
                    metrics::record_upstream_error("receive");
                    return Transfer { complete: false, bytes, body: None };
                }
            };

            if let Err(e) = client.write_all(&chunk[..n]).await {
                tracing::warn!(error = %e, bytes, "Error sending data to client");
                return Transfer { complete: false, bytes, body: None };
            }
            bytes += n;

            if let Some(buf) = body.as_mut() {
                if buf.len() + n > self.cache.max_element_bytes() {
                    tracing::debug!(bytes, "Response exceeds cache entry limit; not buffering");
                    body = None;
                } else {
                    buf.extend_from_slice(&chunk[..n]);
                }
            }
        }

        Transfer { complete: true, bytes, body }
    }

    async fn reject<S>(&self, client: &mut S, page: ErrorPage) -> HandlerOutcome
    where
        S: AsyncWrite + Unpin,
    {
        if let Err(e) = page.send(client).await {
            tracing::warn!(status = page.status(), error = %e, "Failed to send error page");
        }
        HandlerOutcome::Rejected(page)
    }

    fn is_blocked(&self, host: &str) -> bool {
        let host = host.to_ascii_lowercase();
        self.blocked_hosts.iter().any(|blocked| *blocked == host)
    }
}
