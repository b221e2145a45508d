use super::AppState;
use axum::extract::State;
use axum::http::StatusCode;
use tracing::debug;

/// `POST /sleep`: the request body is ignored.
///
/// The request is counted on arrival, so a window's rate reflects load
/// offered rather than load completed.
pub async fn sleep_handler(State(state): State<AppState>) -> StatusCode {
    state.metrics.record_success();
    tokio::time::sleep(state.config.sleep.latency).await;

    let status = state.config.sleep.status;
    if status != StatusCode::OK {
        debug!(status = status.as_u16(), "sleep: answering with forced status");
    }
    status
}
