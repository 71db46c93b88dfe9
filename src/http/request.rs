//! Request reading and parsing.
//!
//! # Responsibilities
//! - Read a client's request line and headers up to the blank line
//! - Split the request into method, host, port, path and version
//! - Get, set and remove headers by name
//! - Serialize the rewritten request for the origin
//!
//! # Design Decisions
//! - Tokenizing is delegated to `httparse`; absolute-form targets to `url`
//! - The raw header block is kept verbatim because it is the cache key
//! - Header names compare case-insensitively, values are kept as sent

use std::fmt;
use std::io;

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};
use url::Url;

const MAX_HEADERS: usize = 64;
const HEADER_END: &[u8] = b"\r\n\r\n";

/// Result of reading a request from a client.
#[derive(Debug, PartialEq, Eq)]
pub enum ReadOutcome {
    /// Raw bytes up to and including the blank line ending the headers.
    Request(Vec<u8>),
    /// The client closed the connection before finishing its headers.
    Closed,
    /// The header block grew past the configured limit.
    TooLarge,
}

/// Read one request header block from `reader`.
///
/// Bytes following the blank line (a request body) are discarded.
pub async fn read_request<R>(
    reader: &mut R,
    chunk_size: usize,
    limit: usize,
) -> io::Result<ReadOutcome>
where
    R: AsyncRead + Unpin,
{
    let mut buf = Vec::with_capacity(chunk_size);
    let mut chunk = vec![0u8; chunk_size];

    loop {
        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            return Ok(ReadOutcome::Closed);
        }

        // The terminator may straddle two reads.
        let search_from = buf.len().saturating_sub(HEADER_END.len() - 1);
        buf.extend_from_slice(&chunk[..n]);

        if let Some(pos) = find_header_end(&buf[search_from..]) {
            buf.truncate(search_from + pos + HEADER_END.len());
            if buf.len() > limit {
                return Ok(ReadOutcome::TooLarge);
            }
            return Ok(ReadOutcome::Request(buf));
        }
        if buf.len() >= limit {
            return Ok(ReadOutcome::TooLarge);
        }
    }
}

fn find_header_end(buf: &[u8]) -> Option<usize> {
    buf.windows(HEADER_END.len()).position(|w| w == HEADER_END)
}

/// Method token of the first request line, read without validating the
/// target or version.
///
/// Returns `None` when the line does not start with a well-formed token.
pub fn request_method(buf: &[u8]) -> Option<&str> {
    let line = buf
        .split(|&b| b == b'\n')
        .map(|line| line.strip_suffix(b"\r").unwrap_or(line))
        .find(|line| !line.is_empty())?;
    let (method, _) = line.split_at(line.iter().position(|&b| b == b' ')?);
    if method.is_empty() || !method.iter().all(|&b| is_token_byte(b)) {
        return None;
    }
    std::str::from_utf8(method).ok()
}

fn is_token_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~".contains(&b)
}

/// Request parsing failures.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("request header block is incomplete")]
    Incomplete,
    #[error("unsupported HTTP version")]
    Version,
    #[error("malformed request: {0}")]
    Malformed(httparse::Error),
    #[error("invalid request target '{0}'")]
    Target(String),
}

impl From<httparse::Error> for ParseError {
    fn from(e: httparse::Error) -> Self {
        match e {
            httparse::Error::Version => ParseError::Version,
            other => ParseError::Malformed(other),
        }
    }
}

/// HTTP versions the proxy forwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpVersion {
    Http10,
    Http11,
}

impl HttpVersion {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpVersion::Http10 => "HTTP/1.0",
            HttpVersion::Http11 => "HTTP/1.1",
        }
    }
}

impl fmt::Display for HttpVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single request header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub name: String,
    pub value: String,
}

/// A parsed client request.
#[derive(Debug, Clone)]
pub struct ParsedRequest {
    /// Request method exactly as sent.
    pub method: String,
    /// Origin host, from the absolute-form target or the `Host` header.
    pub host: Option<String>,
    /// Explicit origin port, if one was given.
    pub port: Option<u16>,
    /// Path and query to request from the origin.
    pub path: String,
    pub version: HttpVersion,
    headers: Vec<Header>,
}

impl ParsedRequest {
    /// Parse a complete request header block.
    pub fn parse(buf: &[u8]) -> Result<Self, ParseError> {
        let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
        let mut req = httparse::Request::new(&mut headers);
        if req.parse(buf)?.is_partial() {
            return Err(ParseError::Incomplete);
        }

        let method = req.method.ok_or(ParseError::Incomplete)?.to_string();
        let target = req.path.ok_or(ParseError::Incomplete)?;
        let version = match req.version {
            Some(0) => HttpVersion::Http10,
            Some(1) => HttpVersion::Http11,
            _ => return Err(ParseError::Version),
        };
        let headers: Vec<Header> = req
            .headers
            .iter()
            .map(|h| Header {
                name: h.name.to_string(),
                value: String::from_utf8_lossy(h.value).into_owned(),
            })
            .collect();

        let mut request = Self {
            method,
            host: None,
            port: None,
            path: String::new(),
            version,
            headers,
        };
        request.resolve_target(target)?;
        Ok(request)
    }

    fn resolve_target(&mut self, target: &str) -> Result<(), ParseError> {
        if target.starts_with('/') {
            self.path = target.to_string();
            if let Some(host) = self.header("Host") {
                let (host, port) = split_host_port(host)
                    .ok_or_else(|| ParseError::Target(host.to_string()))?;
                self.host = Some(host);
                self.port = port;
            }
            return Ok(());
        }

        let url = Url::parse(target).map_err(|_| ParseError::Target(target.to_string()))?;
        if url.scheme() != "http" {
            return Err(ParseError::Target(target.to_string()));
        }
        self.host = url
            .host_str()
            .map(|h| h.trim_start_matches('[').trim_end_matches(']').to_string());
        self.port = url.port();
        self.path = match url.query() {
            Some(query) => format!("{}?{}", url.path(), query),
            None => url.path().to_string(),
        };
        Ok(())
    }

    /// Value of the first header named `name`.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case(name))
            .map(|h| h.value.as_str())
    }

    /// Set `name` to `value`, replacing any existing occurrences.
    pub fn set_header(&mut self, name: &str, value: &str) {
        match self.headers.iter().position(|h| h.name.eq_ignore_ascii_case(name)) {
            Some(index) => {
                self.headers[index].value = value.to_string();
                let mut seen = 0;
                self.headers.retain(|h| {
                    if h.name.eq_ignore_ascii_case(name) {
                        seen += 1;
                        seen == 1
                    } else {
                        true
                    }
                });
            }
            None => self.headers.push(Header {
                name: name.to_string(),
                value: value.to_string(),
            }),
        }
    }

    /// Remove every header named `name`. Returns whether any was present.
    pub fn remove_header(&mut self, name: &str) -> bool {
        let before = self.headers.len();
        self.headers.retain(|h| !h.name.eq_ignore_ascii_case(name));
        self.headers.len() != before
    }

    pub fn headers(&self) -> &[Header] {
        &self.headers
    }

    /// Serialize the headers and the terminating blank line into `out`.
    pub fn write_headers(&self, out: &mut Vec<u8>) {
        for header in &self.headers {
            out.extend_from_slice(header.name.as_bytes());
            out.extend_from_slice(b": ");
            out.extend_from_slice(header.value.as_bytes());
            out.extend_from_slice(b"\r\n");
        }
        out.extend_from_slice(b"\r\n");
    }

    /// Serialize an origin-form request line followed by the headers.
    pub fn origin_request(&self) -> Vec<u8> {
        let mut out = format!("{} {} {}\r\n", self.method, self.path, self.version).into_bytes();
        self.write_headers(&mut out);
        out
    }
}

/// Split a `Host` header value into host and optional port.
fn split_host_port(value: &str) -> Option<(String, Option<u16>)> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    if let Some(rest) = value.strip_prefix('[') {
        let (host, tail) = rest.split_once(']')?;
        let port = match tail.strip_prefix(':') {
            Some(port) => Some(port.parse().ok()?),
            None if tail.is_empty() => None,
            None => return None,
        };
        return Some((host.to_string(), port));
    }

    match value.rsplit_once(':') {
        Some((host, port)) => Some((host.to_string(), Some(port.parse().ok()?))),
        None => Some((value.to_string(), None)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_absolute_form() {
        let req = ParsedRequest::parse(
            b"GET http://example.com:8080/a/b?x=1 HTTP/1.1\r\nHost: example.com:8080\r\nAccept: */*\r\n\r\n",
        )
        .unwrap();
        assert_eq!(req.method, "GET");
        assert_eq!(req.host.as_deref(), Some("example.com"));
        assert_eq!(req.port, Some(8080));
        assert_eq!(req.path, "/a/b?x=1");
        assert_eq!(req.version, HttpVersion::Http11);
        assert_eq!(req.header("accept"), Some("*/*"));
    }

    #[test]
    fn absolute_form_default_port_is_absent() {
        let req = ParsedRequest::parse(b"GET http://example.com HTTP/1.0\r\n\r\n").unwrap();
        assert_eq!(req.host.as_deref(), Some("example.com"));
        assert_eq!(req.port, None);
        assert_eq!(req.path, "/");
        assert_eq!(req.version, HttpVersion::Http10);
    }

    #[test]
    fn origin_form_uses_host_header() {
        let req =
            ParsedRequest::parse(b"GET /index.html HTTP/1.1\r\nHost: 127.0.0.1:9000\r\n\r\n")
                .unwrap();
        assert_eq!(req.host.as_deref(), Some("127.0.0.1"));
        assert_eq!(req.port, Some(9000));
        assert_eq!(req.path, "/index.html");
    }

    #[test]
    fn origin_form_without_host_has_no_host() {
        let req = ParsedRequest::parse(b"POST / HTTP/1.1\r\n\r\n").unwrap();
        assert_eq!(req.method, "POST");
        assert!(req.host.is_none());
    }

    #[test]
    fn bracketed_ipv6_host() {
        assert_eq!(split_host_port("[::1]:8080"), Some(("::1".into(), Some(8080))));
        assert_eq!(split_host_port("[::1]"), Some(("::1".into(), None)));
        assert_eq!(split_host_port("host:notaport"), None);
    }

    #[test]
    fn method_is_read_before_target_and_version() {
        assert_eq!(request_method(b"CONNECT example.com:443 HTTP/1.1\r\n\r\n"), Some("CONNECT"));
        assert_eq!(request_method(b"OPTIONS * HTTP/1.1\r\n\r\n"), Some("OPTIONS"));
        assert_eq!(request_method(b"\r\nPOST / HTTP/2.0\r\n\r\n"), Some("POST"));
        assert_eq!(request_method(b"GET http://a/ HTTP/1.1\r\n\r\n"), Some("GET"));
        assert_eq!(request_method(b"\x00\x01 garbage\r\n\r\n"), None);
        assert_eq!(request_method(b"GET\r\n\r\n"), None);
    }

    #[test]
    fn rejects_unknown_version() {
        let err = ParsedRequest::parse(b"GET / HTTP/2.0\r\nHost: a\r\n\r\n").unwrap_err();
        assert!(matches!(err, ParseError::Version));
    }

    #[test]
    fn rejects_garbage_and_partial_input() {
        assert!(matches!(
            ParsedRequest::parse(b"\x00\x01 garbage\r\n\r\n"),
            Err(ParseError::Malformed(_))
        ));
        assert!(matches!(
            ParsedRequest::parse(b"GET / HTTP/1.1\r\nHost: a\r\n"),
            Err(ParseError::Incomplete)
        ));
    }

    #[test]
    fn rejects_non_http_scheme() {
        let err = ParsedRequest::parse(b"GET ftp://example.com/ HTTP/1.1\r\n\r\n").unwrap_err();
        assert!(matches!(err, ParseError::Target(_)));
    }

    #[test]
    fn header_mutation_and_serialization() {
        let mut req = ParsedRequest::parse(
            b"GET http://example.com/ HTTP/1.1\r\nHost: example.com\r\nconnection: keep-alive\r\nConnection: upgrade\r\nProxy-Connection: keep-alive\r\n\r\n",
        )
        .unwrap();

        req.set_header("Connection", "close");
        assert!(req.remove_header("proxy-connection"));
        assert!(!req.remove_header("proxy-connection"));

        assert_eq!(
            req.origin_request(),
            b"GET / HTTP/1.1\r\nHost: example.com\r\nconnection: close\r\n\r\n".to_vec()
        );
    }

    #[test]
    fn set_header_appends_when_missing() {
        let mut req = ParsedRequest::parse(b"GET http://example.com/ HTTP/1.0\r\n\r\n").unwrap();
        assert_eq!(req.header("Host"), None);
        req.set_header("Host", "example.com");
        assert_eq!(req.header("host"), Some("example.com"));
        assert_eq!(req.headers().len(), 1);
    }

    #[tokio::test]
    async fn reads_up_to_blank_line() {
        let mut input: &[u8] = b"GET / HTTP/1.1\r\nHost: a\r\n\r\nBODY";
        let outcome = read_request(&mut input, 8, 1024).await.unwrap();
        assert_eq!(outcome, ReadOutcome::Request(b"GET / HTTP/1.1\r\nHost: a\r\n\r\n".to_vec()));
    }

    #[tokio::test]
    async fn terminator_split_across_reads() {
        let (mut client, mut server) = tokio::io::duplex(64);
        let writer = tokio::spawn(async move {
            use tokio::io::AsyncWriteExt;
            client.write_all(b"GET / HTTP/1.1\r\n\r").await.unwrap();
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            client.write_all(b"\n").await.unwrap();
            client
        });
        let outcome = read_request(&mut server, 4096, 4096).await.unwrap();
        assert_eq!(outcome, ReadOutcome::Request(b"GET / HTTP/1.1\r\n\r\n".to_vec()));
        writer.await.unwrap();
    }

    #[tokio::test]
    async fn empty_and_truncated_input_is_closed() {
        let mut empty: &[u8] = b"";
        assert_eq!(read_request(&mut empty, 16, 64).await.unwrap(), ReadOutcome::Closed);

        let mut partial: &[u8] = b"GET / HTTP/1.1\r\n";
        assert_eq!(read_request(&mut partial, 16, 64).await.unwrap(), ReadOutcome::Closed);
    }

    #[tokio::test]
    async fn oversized_header_block() {
        let big = format!("GET / HTTP/1.1\r\nX-Fill: {}\r\n\r\n", "a".repeat(200));
        let mut input = big.as_bytes();
        assert_eq!(read_request(&mut input, 16, 64).await.unwrap(), ReadOutcome::TooLarge);
    }
}
