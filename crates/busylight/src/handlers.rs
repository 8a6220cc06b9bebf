use axum::{extract::State, http::HeaderMap, http::StatusCode};
use shared_types::{CHANNEL_ID_HEADER, RESOURCE_STATE_HEADER};
use std::sync::Arc;

use crate::error::{ApiError, ApiResult};
use crate::services::Scheduler;

/// Shared state for the HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub scheduler: Arc<Scheduler>,
    /// Id of the watch channel registered for this process
    pub channel_id: Arc<str>,
}

// Calendar push notification. Anything not carrying our channel id is
// rejected before the scheduler is touched.
pub async fn handle_calendar_notification(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<StatusCode> {
    let channel_id = headers
        .get(CHANNEL_ID_HEADER)
        .and_then(|value| value.to_str().ok());

    if channel_id != Some(&*state.channel_id) {
        tracing::warn!("Rejected notification from channel {:?}", channel_id);
        return Err(ApiError::forbidden("unknown notification channel"));
    }

    let resource_state = headers
        .get(RESOURCE_STATE_HEADER)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown");
    tracing::info!("Calendar notification received (state: {})", resource_state);

    // A failed sync keeps the previous schedule; the watcher catches up.
    if let Err(e) = state.scheduler.sync().await {
        tracing::error!("Sync after notification failed: {:#}", anyhow::Error::from(e));
    }

    Ok(StatusCode::OK)
}

pub async fn health_check() -> &'static str {
    "ok"
}
