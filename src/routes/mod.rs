pub mod health;
pub mod metrics;
pub mod mission;

use axum::routing::{get, post};
use axum::Router;

use crate::app_state::AppState;

/// Ingress, status and health routes (without `/metrics`, which needs the recorder handle).
pub fn api_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        .route("/mission_entry", post(mission::mission_entry))
        .route("/api/v1/missions/{task_serial}", get(mission::get_mission))
        .with_state(state)
}
