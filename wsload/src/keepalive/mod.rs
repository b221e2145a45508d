//! Connection liveness protocol
//!
//! Shared by the client pool and the server's `/ws` handler:
//! - `KeepAliveSession` runs the heartbeat and receive loops for one socket
//! - `LivenessDeadline` is the rolling inbound-activity deadline
//! - `Teardown` makes the `Closing` transition idempotent between the loops
//! - `frame` adapts axum and tungstenite sockets into one frame type

pub mod deadline;
pub mod frame;
pub mod memory;
pub mod session;
pub mod teardown;

pub use deadline::LivenessDeadline;
pub use frame::{CloseFrame, Frame, FrameSink, FrameStream};
pub use session::KeepAliveSession;
pub use teardown::{CloseReason, SessionState, SessionStatus, Teardown};
