//! Error types shared by the client and server halves.

use std::time::Duration;
use thiserror::Error;

/// A read or write on an established websocket failed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("socket error: {0}")]
    Socket(String),

    #[error("connection reset without closing handshake")]
    Reset,

    #[error("connection already closed")]
    AlreadyClosed,
}

/// A persistent connection could not be established.
#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("websocket handshake with {url} failed: {reason}")]
    Handshake { url: String, reason: String },

    #[error("websocket handshake timed out after {after:?}")]
    Timeout { after: Duration },

    #[error("connection attempt cancelled")]
    Cancelled,
}

/// Configuration rejected at startup.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("liveness window must be greater than zero")]
    ZeroLivenessWindow,

    #[error("heartbeat period ({ping_ms}ms) must be shorter than the liveness window ({pong_ms}ms)")]
    HeartbeatTooSlow { ping_ms: u128, pong_ms: u128 },

    #[error("write timeout must be greater than zero")]
    ZeroWriteTimeout,

    #[error("invalid target address: {0}")]
    InvalidAddr(String),

    #[error("invalid status code: {0}")]
    InvalidStatus(u16),

    #[error("cannot hold {requested} connections (at most {max})")]
    TooManyConnections { requested: usize, max: usize },

    #[error("handshake timeout must be greater than zero")]
    ZeroHandshakeTimeout,
}

/// The load generator could not start.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),
}
