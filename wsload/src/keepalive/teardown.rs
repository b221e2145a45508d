//! Session lifecycle state and exactly-once teardown.

use super::frame::{CLOSE_GOING_AWAY, CLOSE_NORMAL};
use crate::error::TransportError;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Lifecycle of one persistent connection. Ordered: a session only moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum SessionState {
    Connecting = 0,
    Established = 1,
    Closing = 2,
    Closed = 3,
}

impl SessionState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => SessionState::Connecting,
            1 => SessionState::Established,
            2 => SessionState::Closing,
            _ => SessionState::Closed,
        }
    }
}

/// Why a session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// The peer sent a close frame.
    PeerClosed { code: Option<u16> },
    /// The inbound stream ended without a close frame.
    Dropped,
    /// A read or write failed.
    Transport(TransportError),
    /// A ping or message could not be written within the write timeout.
    WriteTimeout,
    /// Nothing was received within the liveness window.
    LivenessTimeout,
    /// The local process is shutting down.
    Shutdown,
}

impl CloseReason {
    /// Normal/going-away closes and local shutdown are expected churn.
    pub fn is_graceful(&self) -> bool {
        match self {
            CloseReason::PeerClosed { code: Some(code) } => {
                *code == CLOSE_NORMAL || *code == CLOSE_GOING_AWAY
            }
            CloseReason::Shutdown => true,
            _ => false,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            CloseReason::PeerClosed { .. } => "peer_closed",
            CloseReason::Dropped => "dropped",
            CloseReason::Transport(_) => "transport",
            CloseReason::WriteTimeout => "write_timeout",
            CloseReason::LivenessTimeout => "liveness_timeout",
            CloseReason::Shutdown => "shutdown",
        }
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CloseReason::PeerClosed { code: Some(code) } => write!(f, "peer closed ({})", code),
            CloseReason::PeerClosed { code: None } => write!(f, "peer closed (no status)"),
            CloseReason::Dropped => write!(f, "connection dropped without close frame"),
            CloseReason::Transport(e) => write!(f, "{}", e),
            CloseReason::WriteTimeout => write!(f, "write timed out"),
            CloseReason::LivenessTimeout => write!(f, "no inbound activity within liveness window"),
            CloseReason::Shutdown => write!(f, "shutting down"),
        }
    }
}

/// Observable state of a session, shared with whoever owns its slot.
#[derive(Debug)]
pub struct SessionStatus {
    state: AtomicU8,
    epoch: Instant,
    last_activity_ms: AtomicU64,
}

impl SessionStatus {
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(SessionState::Connecting as u8),
            epoch: Instant::now(),
            last_activity_ms: AtomicU64::new(0),
        }
    }

    pub fn state(&self) -> SessionState {
        SessionState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Advance the state; requests to move backwards are ignored.
    pub fn advance(&self, to: SessionState) {
        self.state.fetch_max(to as u8, Ordering::AcqRel);
    }

    pub fn is_open(&self) -> bool {
        self.state() == SessionState::Established
    }

    pub fn touch(&self, now: Instant) {
        let ms = now.saturating_duration_since(self.epoch).as_millis() as u64;
        self.last_activity_ms.fetch_max(ms, Ordering::AcqRel);
    }

    pub fn last_activity(&self) -> Instant {
        self.epoch + Duration::from_millis(self.last_activity_ms.load(Ordering::Acquire))
    }
}

impl Default for SessionStatus {
    fn default() -> Self {
        Self::new()
    }
}

type ReleaseHook = Box<dyn FnOnce(&CloseReason) + Send>;

/// Coordinates the `Closing` transition between racing loops.
///
/// The first `trigger` records the reason and cancels both loops; later
/// triggers are no-ops. `release` runs the registered hooks exactly once.
pub struct Teardown {
    reason: OnceLock<CloseReason>,
    released: AtomicBool,
    cancel: CancellationToken,
    status: Arc<SessionStatus>,
    hooks: Mutex<Vec<ReleaseHook>>,
}

impl Teardown {
    pub fn new(cancel: CancellationToken, status: Arc<SessionStatus>) -> Self {
        Self {
            reason: OnceLock::new(),
            released: AtomicBool::new(false),
            cancel,
            status,
            hooks: Mutex::new(Vec::new()),
        }
    }

    pub fn token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn on_release(&self, hook: impl FnOnce(&CloseReason) + Send + 'static) {
        self.hooks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(Box::new(hook));
    }

    /// Move to `Closing`. Returns true only for the call that won the race.
    pub fn trigger(&self, reason: CloseReason) -> bool {
        let won = self.reason.set(reason).is_ok();
        if won {
            self.status.advance(SessionState::Closing);
            self.cancel.cancel();
        }
        won
    }

    pub fn reason(&self) -> Option<&CloseReason> {
        self.reason.get()
    }

    /// Move to `Closed` and run the release hooks. Returns true only once.
    pub fn release(&self) -> bool {
        if self.released.swap(true, Ordering::AcqRel) {
            return false;
        }
        let reason = self.reason.get_or_init(|| CloseReason::Shutdown).clone();
        self.cancel.cancel();
        self.status.advance(SessionState::Closed);

        let hooks = std::mem::take(
            &mut *self
                .hooks
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner()),
        );
        for hook in hooks {
            hook(&reason);
        }
        true
    }
}
