//! Capacity-test server
//!
//! Routes:
//! - `POST /sleep` waits the simulated latency and answers with the configured status
//! - `GET /ws` upgrades to a keep-alive websocket session
//! - `GET /health` and `GET /metrics/prometheus` for operators

pub mod health;
pub mod sleep;
pub mod websocket;

pub use websocket::ws_handler;

use crate::config::ServerConfig;
use crate::stats::MetricsAggregator;
use axum::Router;
use axum::routing::{get, post};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    pub metrics: Arc<MetricsAggregator>,
    /// Parent of every websocket session's cancellation token
    pub shutdown: CancellationToken,
    pub started_at: Instant,
    pub prometheus: Option<PrometheusHandle>,
}

impl AppState {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config: Arc::new(config),
            metrics: Arc::new(MetricsAggregator::new()),
            shutdown: CancellationToken::new(),
            started_at: Instant::now(),
            prometheus: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsAggregator>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn with_shutdown(mut self, shutdown: CancellationToken) -> Self {
        self.shutdown = shutdown;
        self
    }

    pub fn with_prometheus(mut self, handle: PrometheusHandle) -> Self {
        self.prometheus = Some(handle);
        self
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/sleep", post(sleep::sleep_handler))
        .route("/ws", get(ws_handler))
        .route("/health", get(health::health))
        .route("/metrics/prometheus", get(health::prometheus_metrics))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Serve until the state's shutdown token fires.
pub async fn serve(listener: TcpListener, state: AppState) -> std::io::Result<()> {
    let shutdown = state.shutdown.clone();
    let app = router(state);

    if let Ok(addr) = listener.local_addr() {
        info!("wsload server listening on {}", addr);
    }

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled_owned().await })
        .await
}
