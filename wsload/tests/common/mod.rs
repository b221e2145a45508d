//! Common Test Utilities for Integration Tests
//!
//! Shared helpers used across integration test modules.

#![allow(dead_code)]

use axum::http::StatusCode;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use wsload::config::{ServerConfig, SleepConfig};
use wsload::server::{self, AppState};
use wsload::stats::MetricsAggregator;

/// A real server on an ephemeral port.
pub struct TestServer {
    pub addr: SocketAddr,
    pub metrics: Arc<MetricsAggregator>,
    pub shutdown: CancellationToken,
    pub handle: JoinHandle<std::io::Result<()>>,
}

impl TestServer {
    /// `host:port` as the client flags take it
    pub fn target(&self) -> String {
        self.addr.to_string()
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn ws_url(&self) -> String {
        format!("ws://{}/ws", self.addr)
    }

    pub async fn stop(self) {
        self.shutdown.cancel();
        let _ = tokio::time::timeout(Duration::from_secs(5), self.handle).await;
    }
}

/// Server config with a short `/sleep` latency.
pub fn test_server_config(status: StatusCode) -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        sleep: SleepConfig {
            latency: Duration::from_millis(10),
            status,
        },
        ..ServerConfig::default()
    }
}

pub async fn spawn_server(config: ServerConfig) -> TestServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let shutdown = CancellationToken::new();
    let state = AppState::new(config).with_shutdown(shutdown.clone());
    let metrics = Arc::clone(&state.metrics);
    let handle = tokio::spawn(server::serve(listener, state));

    TestServer {
        addr,
        metrics,
        shutdown,
        handle,
    }
}

/// Poll `cond` every 10ms until it holds or `limit` elapses.
pub async fn wait_until(limit: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + limit;
    while tokio::time::Instant::now() < deadline {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    cond()
}
