//! Bounded pool of persistent websocket connections
//!
//! The pool holds an admission gate of W tokens. Its spawning loop acquires a
//! token, starts one session, and immediately goes back for the next token;
//! a session returns its token when it closes, so the pool continuously
//! refills itself up to W. A dial that fails or outlives the handshake
//! timeout hands its token straight back, so the slot is retried.

use crate::config::KeepAliveConfig;
use crate::error::ConnectError;
use crate::keepalive::{
    FrameSink, FrameStream, KeepAliveSession, SessionState, SessionStatus, frame,
};
use crate::stats::MetricsAggregator;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub type SlotId = u64;

/// Matches the usual websocket dialer default.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(45);

/// Dials one persistent connection.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    async fn connect(&self, slot: SlotId) -> Result<(FrameSink, FrameStream), ConnectError>;
}

/// Dials `ws://<addr>/ws` with tokio-tungstenite.
pub struct WsConnector {
    url: String,
}

impl WsConnector {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, _slot: SlotId) -> Result<(FrameSink, FrameStream), ConnectError> {
        let (ws, _response) = tokio_tungstenite::connect_async(self.url.as_str())
            .await
            .map_err(|e| ConnectError::Handshake {
                url: self.url.clone(),
                reason: e.to_string(),
            })?;
        Ok(frame::from_tungstenite(ws))
    }
}

/// One occupied pool position.
#[derive(Debug, Clone)]
pub struct ConnectionSlot {
    pub id: SlotId,
    pub status: Arc<SessionStatus>,
    pub opened_at: Instant,
}

impl ConnectionSlot {
    pub fn state(&self) -> SessionState {
        self.status.state()
    }

    pub fn last_activity(&self) -> Instant {
        self.status.last_activity()
    }
}

pub struct ConnectionPool<C: Connector> {
    connector: Arc<C>,
    size: usize,
    keepalive: KeepAliveConfig,
    send_messages: bool,
    handshake_timeout: Duration,
    gate: Arc<Semaphore>,
    slots: Arc<DashMap<SlotId, ConnectionSlot>>,
    metrics: Arc<MetricsAggregator>,
    /// Dial failures since the last successful connect
    failures: Arc<AtomicU64>,
    next_id: AtomicU64,
    shutdown: CancellationToken,
}

impl<C: Connector> ConnectionPool<C> {
    pub fn new(
        connector: C,
        size: usize,
        keepalive: KeepAliveConfig,
        metrics: Arc<MetricsAggregator>,
        shutdown: CancellationToken,
    ) -> Self {
        // `ClientConfig::validate` rejects anything larger.
        let size = size.min(Semaphore::MAX_PERMITS);
        Self {
            connector: Arc::new(connector),
            size,
            keepalive,
            send_messages: false,
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            gate: Arc::new(Semaphore::new(size)),
            slots: Arc::new(DashMap::new()),
            metrics,
            failures: Arc::new(AtomicU64::new(0)),
            next_id: AtomicU64::new(1),
            shutdown,
        }
    }

    pub fn with_messages(mut self, enabled: bool) -> Self {
        self.send_messages = enabled;
        self
    }

    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    pub fn consecutive_failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    /// Tokens currently held: sessions dialing, live, or closing.
    pub fn outstanding(&self) -> usize {
        self.size - self.gate.available_permits()
    }

    /// Slots whose connection has been established and not yet released.
    pub fn live_slots(&self) -> usize {
        self.slots.len()
    }

    pub fn slots(&self) -> Vec<ConnectionSlot> {
        self.slots.iter().map(|entry| entry.value().clone()).collect()
    }

    /// Wait for a free token, then start one session in the background.
    ///
    /// Returns the new slot id, or `None` once shutdown has begun.
    pub async fn acquire_slot(&self) -> Option<SlotId> {
        let permit = tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => return None,
            permit = Arc::clone(&self.gate).acquire_owned() => permit.ok()?,
        };

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        tokio::spawn(open_slot(
            id,
            Arc::clone(&self.connector),
            permit,
            SlotContext {
                keepalive: self.keepalive.clone(),
                send_messages: self.send_messages,
                handshake_timeout: self.handshake_timeout,
                slots: Arc::clone(&self.slots),
                metrics: Arc::clone(&self.metrics),
                failures: Arc::clone(&self.failures),
                shutdown: self.shutdown.clone(),
            },
        ));
        Some(id)
    }

    /// Keep the pool topped up until shutdown.
    pub async fn run(self: Arc<Self>) {
        info!(connections = self.size, "starting connection pool");
        while self.acquire_slot().await.is_some() {}
        debug!("connection pool stopped acquiring");
    }
}

struct SlotContext {
    keepalive: KeepAliveConfig,
    send_messages: bool,
    handshake_timeout: Duration,
    slots: Arc<DashMap<SlotId, ConnectionSlot>>,
    metrics: Arc<MetricsAggregator>,
    failures: Arc<AtomicU64>,
    shutdown: CancellationToken,
}

async fn open_slot<C: Connector>(
    id: SlotId,
    connector: Arc<C>,
    permit: OwnedSemaphorePermit,
    ctx: SlotContext,
) {
    let status = Arc::new(SessionStatus::new());

    let connected = tokio::select! {
        biased;
        _ = ctx.shutdown.cancelled() => Err(ConnectError::Cancelled),
        result = tokio::time::timeout(ctx.handshake_timeout, connector.connect(id)) => {
            result.unwrap_or(Err(ConnectError::Timeout { after: ctx.handshake_timeout }))
        }
    };

    let (sink, stream) = match connected {
        Ok(pair) => pair,
        Err(ConnectError::Cancelled) => return,
        Err(e) => {
            let failures = ctx.failures.fetch_add(1, Ordering::Relaxed) + 1;
            // A refusing target fails every retry; warn at 1, 2, 4, 8, ...
            if failures.is_power_of_two() {
                warn!(slot = id, failures, error = %e, "ws: failed to open websocket connection");
            } else {
                debug!(slot = id, failures, error = %e, "ws: failed to open websocket connection");
            }
            // The token goes back only after this task is scheduled again.
            tokio::task::yield_now().await;
            drop(permit);
            return;
        }
    };

    let failed = ctx.failures.swap(0, Ordering::Relaxed);
    if failed > 0 {
        info!(slot = id, failed_attempts = failed, "ws: connected after failures");
    } else {
        debug!(slot = id, "ws: connected");
    }
    ctx.slots.insert(
        id,
        ConnectionSlot {
            id,
            status: Arc::clone(&status),
            opened_at: Instant::now(),
        },
    );
    let open = ctx.metrics.track_connection();

    let registry = Arc::clone(&ctx.slots);
    let metrics = Arc::clone(&ctx.metrics);
    let session = KeepAliveSession::with_status(
        format!("slot-{}", id),
        ctx.keepalive,
        &ctx.shutdown,
        status,
    )
    .with_messages(ctx.send_messages)
    .on_release(move |reason| {
        registry.remove(&id);
        drop(open);
        if reason.is_graceful() {
            metrics.record_graceful_close();
        } else {
            metrics.record_abnormal_close();
        }
        drop(permit);
    });

    session.run(sink, stream).await;
}
