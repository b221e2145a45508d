//! Command-line interface definitions.
//!
//! Every flag falls back to a `WSLOAD_*` environment variable.

use crate::config::{ClientConfig, KeepAliveConfig, PacingMode, ServerConfig, SleepConfig};
use crate::error::ConfigError;
use axum::http::StatusCode;
use clap::Parser;
use std::time::Duration;

/// wsload-server - capacity-test target for HTTP and websocket load.
#[derive(Parser, Debug)]
#[command(name = "wsload-server")]
#[command(version, about, long_about = None)]
pub struct ServerArgs {
    /// Interface to bind
    #[arg(long, env = "WSLOAD_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Port to bind
    #[arg(long, env = "WSLOAD_PORT", default_value_t = 8080)]
    pub port: u16,

    /// Log connection open/close and every frame
    #[arg(short, long, env = "WSLOAD_VERBOSE")]
    pub verbose: bool,

    /// Print a metrics line every second
    #[arg(long, env = "WSLOAD_SHOW_METRICS")]
    pub show_metrics: bool,

    /// Simulated latency of POST /sleep
    #[arg(long, env = "WSLOAD_SLEEP_LATENCY_MS", default_value_t = 50)]
    pub sleep_latency_ms: u64,

    /// Status returned by POST /sleep
    #[arg(long, env = "WSLOAD_SLEEP_STATUS", default_value_t = 200)]
    pub sleep_status: u16,

    /// Read limit for inbound websocket messages, in bytes
    #[arg(long, env = "WSLOAD_MAX_MESSAGE_SIZE", default_value_t = 512)]
    pub max_message_size: usize,

    /// Liveness window for websocket peers
    #[arg(long, env = "WSLOAD_PONG_WAIT_SECS", default_value_t = 60)]
    pub pong_wait_secs: u64,
}

impl ServerArgs {
    pub fn into_config(self) -> Result<ServerConfig, ConfigError> {
        let status = StatusCode::from_u16(self.sleep_status)
            .map_err(|_| ConfigError::InvalidStatus(self.sleep_status))?;

        let config = ServerConfig {
            host: self.host,
            port: self.port,
            show_metrics: self.show_metrics,
            sleep: SleepConfig {
                latency: Duration::from_millis(self.sleep_latency_ms),
                status,
            },
            max_message_size: self.max_message_size,
            keepalive: KeepAliveConfig::with_pong_wait(Duration::from_secs(self.pong_wait_secs)),
        };
        config.validate()?;
        Ok(config)
    }
}

/// wsload-client - hold W websockets open and fire R requests per second.
#[derive(Parser, Debug)]
#[command(name = "wsload-client")]
#[command(version, about, long_about = None)]
pub struct ClientArgs {
    /// Target server host:port
    #[arg(long, env = "WSLOAD_ADDR", default_value = "localhost:8080")]
    pub addr: String,

    /// Persistent websocket connections to hold open
    #[arg(long = "ws", env = "WSLOAD_WS", default_value_t = 1)]
    pub connections: usize,

    /// POST /sleep attempts per second
    #[arg(long = "sleep", env = "WSLOAD_SLEEP", default_value_t = 1)]
    pub rate: u32,

    /// Log connection open/close and every frame
    #[arg(short, long, env = "WSLOAD_VERBOSE")]
    pub verbose: bool,

    /// Print a metrics line every second
    #[arg(long, env = "WSLOAD_SHOW_METRICS")]
    pub show_metrics: bool,

    /// Send a timestamp text message over every websocket each second
    #[arg(long, env = "WSLOAD_WS_TEST_MESSAGE")]
    pub ws_test_message: bool,

    /// How attempts are laid out inside each second
    #[arg(long, env = "WSLOAD_PACING", value_enum, default_value_t = PacingMode::Burst)]
    pub pacing: PacingMode,

    /// Upper bound on a single /sleep exchange
    #[arg(long, env = "WSLOAD_REQUEST_TIMEOUT_SECS", default_value_t = 30)]
    pub request_timeout_secs: u64,

    /// Give up on a websocket dial that has not completed the upgrade
    #[arg(long, env = "WSLOAD_HANDSHAKE_TIMEOUT_SECS", default_value_t = 45)]
    pub handshake_timeout_secs: u64,

    /// Liveness window for websocket peers
    #[arg(long, env = "WSLOAD_PONG_WAIT_SECS", default_value_t = 60)]
    pub pong_wait_secs: u64,
}

impl ClientArgs {
    pub fn into_config(self) -> Result<ClientConfig, ConfigError> {
        let config = ClientConfig {
            addr: self.addr,
            connections: self.connections,
            rate: self.rate,
            show_metrics: self.show_metrics,
            send_messages: self.ws_test_message,
            pacing: self.pacing,
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            handshake_timeout: Duration::from_secs(self.handshake_timeout_secs),
            keepalive: KeepAliveConfig::with_pong_wait(Duration::from_secs(self.pong_wait_secs)),
        };
        config.validate()?;
        Ok(config)
    }
}
