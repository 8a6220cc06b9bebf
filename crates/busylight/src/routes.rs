use axum::{
    routing::{get, post},
    Router,
};
use shared_types::{HEALTHCHECK_PATH, WEBHOOK_PATH};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::handlers::{self, AppState};

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route(WEBHOOK_PATH, post(handlers::handle_calendar_notification))
        .route(HEALTHCHECK_PATH, get(handlers::health_check))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(state)
}
