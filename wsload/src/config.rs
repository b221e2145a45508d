//! Runtime configuration
//!
//! Both binaries build one immutable config value at startup (see `cli`) and
//! hand it to the components explicitly.

use crate::error::ConfigError;
use axum::http::StatusCode;
use std::time::Duration;
use tokio::sync::Semaphore;

/// Heartbeat and liveness timing for one persistent connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeepAliveConfig {
    /// Liveness window: maximum silence tolerated from the peer
    pub pong_wait: Duration,
    /// Heartbeat period, 9/10 of the liveness window
    pub ping_period: Duration,
    /// Bound on a single ping or message write
    pub write_wait: Duration,
    /// Cadence of application text messages (client only, when enabled)
    pub message_period: Duration,
}

impl Default for KeepAliveConfig {
    fn default() -> Self {
        Self::with_pong_wait(Duration::from_secs(60))
    }
}

impl KeepAliveConfig {
    /// Derive the heartbeat period from the liveness window.
    pub fn with_pong_wait(pong_wait: Duration) -> Self {
        Self {
            pong_wait,
            ping_period: pong_wait * 9 / 10,
            write_wait: Duration::from_secs(10),
            message_period: Duration::from_secs(1),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.pong_wait.is_zero() {
            return Err(ConfigError::ZeroLivenessWindow);
        }
        if self.ping_period >= self.pong_wait || self.ping_period.is_zero() {
            return Err(ConfigError::HeartbeatTooSlow {
                ping_ms: self.ping_period.as_millis(),
                pong_ms: self.pong_wait.as_millis(),
            });
        }
        if self.write_wait.is_zero() {
            return Err(ConfigError::ZeroWriteTimeout);
        }
        Ok(())
    }
}

/// How the request pacer lays attempts out inside a window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum PacingMode {
    /// Dispatch all R attempts at the window tick.
    #[default]
    Burst,
    /// One worker per attempt, each at a random offset within the window.
    Spread,
}

/// Behavior of the `/sleep` endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SleepConfig {
    /// Simulated handler latency
    pub latency: Duration,
    /// Status returned after the delay
    pub status: StatusCode,
}

impl Default for SleepConfig {
    fn default() -> Self {
        Self {
            latency: Duration::from_millis(50),
            status: StatusCode::OK,
        }
    }
}

/// Capacity-test server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub show_metrics: bool,
    pub sleep: SleepConfig,
    /// Read limit for inbound websocket messages
    pub max_message_size: usize,
    pub keepalive: KeepAliveConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            show_metrics: false,
            sleep: SleepConfig::default(),
            max_message_size: 512,
            keepalive: KeepAliveConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.keepalive.validate()
    }
}

/// Load generator configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Target `host:port`
    pub addr: String,
    /// Persistent connections to hold open (W)
    pub connections: usize,
    /// Request attempts per window (R)
    pub rate: u32,
    pub show_metrics: bool,
    /// Send a timestamp text message over every session once per period
    pub send_messages: bool,
    pub pacing: PacingMode,
    /// Upper bound on a single `/sleep` exchange
    pub request_timeout: Duration,
    /// Upper bound on dialing one websocket, upgrade included
    pub handshake_timeout: Duration,
    pub keepalive: KeepAliveConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            addr: "localhost:8080".to_string(),
            connections: 1,
            rate: 1,
            show_metrics: false,
            send_messages: false,
            pacing: PacingMode::Burst,
            request_timeout: Duration::from_secs(30),
            handshake_timeout: Duration::from_secs(45),
            keepalive: KeepAliveConfig::default(),
        }
    }
}

impl ClientConfig {
    pub fn sleep_url(&self) -> String {
        format!("http://{}/sleep", self.addr)
    }

    pub fn ws_url(&self) -> String {
        format!("ws://{}/ws", self.addr)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.addr.is_empty() || reqwest::Url::parse(&self.sleep_url()).is_err() {
            return Err(ConfigError::InvalidAddr(self.addr.clone()));
        }
        if self.connections > Semaphore::MAX_PERMITS {
            return Err(ConfigError::TooManyConnections {
                requested: self.connections,
                max: Semaphore::MAX_PERMITS,
            });
        }
        if self.handshake_timeout.is_zero() {
            return Err(ConfigError::ZeroHandshakeTimeout);
        }
        self.keepalive.validate()
    }
}
