//! wsload: synthetic HTTP + websocket load generation
//!
//! The client holds W persistent websocket connections open against a target
//! while firing R `POST /sleep` requests per second; the server is the
//! matching capacity-test target. Both sides share the keep-alive protocol
//! and the per-second counters.

pub mod cli;
pub mod client;
pub mod config;
pub mod error;
pub mod keepalive;
pub mod server;
pub mod shutdown;
pub mod stats;
pub mod telemetry;

// Re-export commonly used types
pub use client::LoadGenerator;
pub use config::{ClientConfig, KeepAliveConfig, PacingMode, ServerConfig};
pub use error::{ClientError, ConfigError, ConnectError, TransportError};
pub use server::AppState;
pub use stats::{MetricsAggregator, Snapshot};
