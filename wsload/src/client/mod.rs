//! Load generator
//!
//! Wires the connection pool, the request pacer and the per-window reporter
//! around one shared `MetricsAggregator`.

pub mod pacer;
pub mod pool;

pub use pacer::{AttemptOutcome, Endpoint, HttpSleepEndpoint, RequestPacer};
pub use pool::{ConnectionPool, ConnectionSlot, Connector, SlotId, WsConnector};

use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::stats::{MetricsAggregator, ReportStyle, Reporter};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub struct LoadGenerator {
    config: Arc<ClientConfig>,
    metrics: Arc<MetricsAggregator>,
}

impl LoadGenerator {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config: Arc::new(config),
            metrics: Arc::new(MetricsAggregator::new()),
        }
    }

    pub fn metrics(&self) -> Arc<MetricsAggregator> {
        Arc::clone(&self.metrics)
    }

    /// Run until `shutdown` fires, then let live sessions close and hand back
    /// their slots.
    pub async fn run(self, shutdown: CancellationToken) -> Result<(), ClientError> {
        self.config.validate()?;
        let config = &self.config;

        info!(
            addr = %config.addr,
            connections = config.connections,
            rate = config.rate,
            pacing = ?config.pacing,
            "starting load generator"
        );

        let pool = Arc::new(
            ConnectionPool::new(
                WsConnector::new(config.ws_url()),
                config.connections,
                config.keepalive.clone(),
                Arc::clone(&self.metrics),
                shutdown.clone(),
            )
            .with_messages(config.send_messages)
            .with_handshake_timeout(config.handshake_timeout),
        );

        let endpoint = HttpSleepEndpoint::new(config.sleep_url(), config.request_timeout)?;
        let pacer = Arc::new(RequestPacer::new(
            endpoint,
            config.rate,
            config.pacing,
            Arc::clone(&self.metrics),
            shutdown.clone(),
        ));

        let reporter = Reporter::new(
            Arc::clone(&self.metrics),
            ReportStyle::Client,
            config.show_metrics,
        );

        let pool_task = tokio::spawn(Arc::clone(&pool).run());
        let pacer_task = tokio::spawn(Arc::clone(&pacer).run());
        let reporter_task = tokio::spawn(reporter.run(shutdown.clone()));

        shutdown.cancelled().await;
        info!("shutting down load generator");

        let _ = tokio::join!(pool_task, pacer_task, reporter_task);

        // Each session gets one close write plus one sink flush.
        let drain_limit = config.keepalive.write_wait * 2;
        if !drain_sessions(&pool, drain_limit).await {
            warn!(
                outstanding = pool.outstanding(),
                "sessions still open after shutdown"
            );
        }
        debug!(issued = pacer.issued(), "load generator stopped");
        Ok(())
    }
}

async fn drain_sessions<C: Connector>(pool: &ConnectionPool<C>, limit: Duration) -> bool {
    let wait = async {
        while pool.outstanding() > 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    };
    tokio::time::timeout(limit, wait).await.is_ok()
}
