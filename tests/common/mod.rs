//! Shared utilities for integration tests.
#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use caching_proxy::net::{AdmissionControl, Listener};
use caching_proxy::{ProxyConfig, ProxyServer, ResponseCache, Shutdown};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

/// What a mock origin observed.
#[derive(Debug, Default)]
pub struct OriginStats {
    pub connections: AtomicUsize,
    pub active: AtomicUsize,
    pub peak: AtomicUsize,
    pub requests: Mutex<Vec<String>>,
}

/// Start a mock origin that answers every request with `body` after `delay`.
pub async fn start_origin(body: &'static str, delay: Duration) -> (SocketAddr, Arc<OriginStats>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let stats = Arc::new(OriginStats::default());

    let shared = Arc::clone(&stats);
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let stats = Arc::clone(&shared);
            tokio::spawn(async move {
                stats.connections.fetch_add(1, Ordering::SeqCst);
                let active = stats.active.fetch_add(1, Ordering::SeqCst) + 1;
                stats.peak.fetch_max(active, Ordering::SeqCst);

                let request = read_head(&mut socket).await;
                stats.requests.lock().unwrap().push(request);
                tokio::time::sleep(delay).await;
                stats.active.fetch_sub(1, Ordering::SeqCst);

                let response = format!(
                    "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    body.len(),
                    body
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    (addr, stats)
}

async fn read_head(socket: &mut TcpStream) -> String {
    let mut head = Vec::new();
    let mut buf = [0u8; 1024];
    while !head.windows(4).any(|w| w == b"\r\n\r\n") {
        match socket.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => head.extend_from_slice(&buf[..n]),
        }
    }
    String::from_utf8_lossy(&head).into_owned()
}

/// A running proxy and handles into its shared state.
pub struct TestProxy {
    pub addr: SocketAddr,
    pub cache: Arc<ResponseCache>,
    pub admission: AdmissionControl,
    pub shutdown: Shutdown,
}

/// Start the proxy on an ephemeral port.
pub async fn start_proxy(mut config: ProxyConfig) -> TestProxy {
    config.listener.bind_address = "127.0.0.1:0".to_string();
    let listener = Listener::bind(&config.listener).await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = ProxyServer::new(config);
    let cache = server.cache();
    let admission = server.admission();
    let shutdown = Shutdown::new();
    let rx = shutdown.subscribe();
    tokio::spawn(async move {
        let _ = server.run(listener, rx).await;
    });

    TestProxy {
        addr,
        cache,
        admission,
        shutdown,
    }
}

/// Send raw bytes to the proxy and read until it closes the connection.
pub async fn send_raw(proxy: SocketAddr, request: &[u8]) -> Vec<u8> {
    let mut stream = TcpStream::connect(proxy).await.unwrap();
    stream.write_all(request).await.unwrap();
    let mut reply = Vec::new();
    tokio::time::timeout(Duration::from_secs(10), stream.read_to_end(&mut reply))
        .await
        .expect("proxy did not close the connection")
        .unwrap();
    reply
}

/// Poll `condition` until it holds or two seconds pass.
pub async fn eventually(condition: impl Fn() -> bool) -> bool {
    for _ in 0..200 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
