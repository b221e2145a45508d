use super::AppState;
use crate::keepalive::{KeepAliveSession, frame};
use axum::{
    extract::{
        State,
        ws::{WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

/// WebSocket upgrade handler
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.max_message_size(state.config.max_message_size)
        .on_upgrade(|socket| handle_socket(socket, state))
}

/// Hold one connection open until either side gives up on it.
async fn handle_socket(socket: WebSocket, state: AppState) {
    let connection_id = Uuid::new_v4();
    debug!(%connection_id, "ws: connection opened");

    let open = state.metrics.track_connection();
    let metrics = Arc::clone(&state.metrics);
    let (sink, stream) = frame::from_axum(socket);

    let session = KeepAliveSession::new(
        connection_id.to_string(),
        state.config.keepalive.clone(),
        &state.shutdown,
    )
    .on_release(move |reason| {
        drop(open);
        if reason.is_graceful() {
            metrics.record_graceful_close();
        } else {
            metrics.record_abnormal_close();
        }
    });

    let reason = session.run(sink, stream).await;
    debug!(%connection_id, reason = %reason, "ws: connection closed");
}
