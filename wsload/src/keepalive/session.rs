use super::deadline::LivenessDeadline;
use super::frame::{CloseFrame, Frame, FrameSink, FrameStream};
use super::teardown::{CloseReason, SessionState, SessionStatus, Teardown};
use crate::config::KeepAliveConfig;
use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Heartbeat and liveness driver for one persistent connection.
///
/// `run` spawns the heartbeat loop as its own task and drives the receive
/// loop itself. Whichever loop fails first triggers the teardown; the other
/// one observes the cancellation and stops.
pub struct KeepAliveSession {
    id: String,
    config: KeepAliveConfig,
    send_messages: bool,
    status: Arc<SessionStatus>,
    teardown: Arc<Teardown>,
}

impl KeepAliveSession {
    /// Create a session that also stops when `shutdown` is cancelled.
    pub fn new(id: impl Into<String>, config: KeepAliveConfig, shutdown: &CancellationToken) -> Self {
        Self::with_status(id, config, shutdown, Arc::new(SessionStatus::new()))
    }

    /// Create a session reporting into an existing status handle.
    pub fn with_status(
        id: impl Into<String>,
        config: KeepAliveConfig,
        shutdown: &CancellationToken,
        status: Arc<SessionStatus>,
    ) -> Self {
        let teardown = Arc::new(Teardown::new(shutdown.child_token(), Arc::clone(&status)));
        Self {
            id: id.into(),
            config,
            send_messages: false,
            status,
            teardown,
        }
    }

    /// Also send a timestamp text message once per `message_period`.
    pub fn with_messages(mut self, enabled: bool) -> Self {
        self.send_messages = enabled;
        self
    }

    /// Register work to run exactly once when the session is closed.
    pub fn on_release(self, hook: impl FnOnce(&CloseReason) + Send + 'static) -> Self {
        self.teardown.on_release(hook);
        self
    }

    pub fn status(&self) -> Arc<SessionStatus> {
        Arc::clone(&self.status)
    }

    pub fn teardown(&self) -> Arc<Teardown> {
        Arc::clone(&self.teardown)
    }

    /// Drive the session until it closes and return why it closed.
    pub async fn run(self, sink: FrameSink, stream: FrameStream) -> CloseReason {
        // Release also happens if this future is dropped mid-flight.
        let _release = ReleaseOnDrop(Arc::clone(&self.teardown));

        self.status.advance(SessionState::Established);
        self.status.touch(Instant::now());
        debug!(session = %self.id, "session established");

        let writer = tokio::spawn(heartbeat_loop(
            sink,
            self.config.clone(),
            self.send_messages,
            Arc::clone(&self.teardown),
            self.id.clone(),
        ));

        receive_loop(
            stream,
            self.config.pong_wait,
            &self.teardown,
            &self.status,
            &self.id,
        )
        .await;

        if let Err(e) = writer.await {
            warn!(session = %self.id, error = %e, "heartbeat task failed");
        }

        let reason = self
            .teardown
            .reason()
            .cloned()
            .unwrap_or(CloseReason::Shutdown);
        self.teardown.release();

        if reason.is_graceful() {
            debug!(session = %self.id, reason = %reason, "session closed");
        } else {
            warn!(session = %self.id, reason = %reason, "session closed abnormally");
        }
        reason
    }
}

struct ReleaseOnDrop(Arc<Teardown>);

impl Drop for ReleaseOnDrop {
    fn drop(&mut self) {
        self.0.release();
    }
}

/// Wait for inbound frames until the teardown fires or the deadline passes.
async fn receive_loop(
    mut stream: FrameStream,
    window: Duration,
    teardown: &Teardown,
    status: &SessionStatus,
    id: &str,
) {
    let cancel = teardown.token().clone();
    let mut deadline = LivenessDeadline::new(Instant::now(), window);

    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                teardown.trigger(CloseReason::Shutdown);
                return;
            }
            next = tokio::time::timeout_at(deadline.at(), stream.next()) => next,
        };

        let frame = match next {
            Err(_) => {
                debug!(session = %id, "liveness deadline expired");
                teardown.trigger(CloseReason::LivenessTimeout);
                return;
            }
            Ok(None) => {
                teardown.trigger(CloseReason::Dropped);
                return;
            }
            Ok(Some(Err(e))) => {
                debug!(session = %id, error = %e, "failed to read message");
                teardown.trigger(CloseReason::Transport(e));
                return;
            }
            Ok(Some(Ok(frame))) => frame,
        };

        let now = Instant::now();
        deadline.extend(now);
        status.touch(now);

        match frame {
            Frame::Close(close) => {
                teardown.trigger(CloseReason::PeerClosed {
                    code: close.map(|c| c.code),
                });
                return;
            }
            other => debug!(session = %id, kind = other.kind(), "received frame"),
        }
    }
}

/// Send pings (and optionally text messages) until the teardown fires.
async fn heartbeat_loop(
    mut sink: FrameSink,
    config: KeepAliveConfig,
    send_messages: bool,
    teardown: Arc<Teardown>,
    id: String,
) {
    let cancel = teardown.token().clone();
    let mut ping = ticker(config.ping_period);
    let mut messages = send_messages.then(|| ticker(config.message_period));

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                // A cancellation with no recorded reason came from the parent.
                teardown.trigger(CloseReason::Shutdown);
                break;
            }
            _ = ping.tick() => {
                if let Err(reason) = send_frame(&mut sink, Frame::Ping(Bytes::new()), config.write_wait).await {
                    debug!(session = %id, reason = %reason, "failed to send ping");
                    teardown.trigger(reason);
                    break;
                }
                debug!(session = %id, "sent ping");
            }
            _ = next_tick(&mut messages) => {
                let text = chrono::Utc::now().to_rfc3339();
                if let Err(reason) = send_frame(&mut sink, Frame::Text(text), config.write_wait).await {
                    debug!(session = %id, reason = %reason, "failed to write message");
                    teardown.trigger(reason);
                    break;
                }
                debug!(session = %id, "sent message");
            }
        }
    }

    // Only a local shutdown announces itself; every other path just drops.
    if teardown.reason() == Some(&CloseReason::Shutdown) {
        let close = Frame::Close(Some(CloseFrame::going_away()));
        let _ = send_frame(&mut sink, close, config.write_wait).await;
    }
    let _ = tokio::time::timeout(config.write_wait, sink.close()).await;
}

fn ticker(period: Duration) -> Interval {
    let mut interval = tokio::time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

async fn next_tick(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

async fn send_frame(sink: &mut FrameSink, frame: Frame, wait: Duration) -> Result<(), CloseReason> {
    match tokio::time::timeout(wait, sink.send(frame)).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(CloseReason::Transport(e)),
        Err(_) => Err(CloseReason::WriteTimeout),
    }
}
