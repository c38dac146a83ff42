use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use garde::Validate;
use tracing::{error, info, warn};

use crate::app_state::AppState;
use crate::models::api::StandardResponse;
use crate::models::{Mission, MissionRecord};

/// POST /mission_entry: accept a mission, persist it and queue it for the workers.
pub async fn mission_entry(
    State(state): State<AppState>,
    payload: Result<Json<Mission>, JsonRejection>,
) -> (StatusCode, Json<StandardResponse>) {
    let mission = match payload {
        Ok(Json(mission)) => mission,
        Err(rejection) => {
            warn!(error = %rejection.body_text(), "Rejected mission body");
            return (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(StandardResponse::error(422, rejection.body_text())),
            );
        }
    };

    if let Err(e) = mission.validate() {
        return (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(StandardResponse::error(422, e.to_string())),
        );
    }

    if let Err(e) = state.store.save_mission(&mission).await {
        error!(task_serial = %mission.task_serial, error = %e, "Failed to persist mission");
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(StandardResponse::error(500, e.to_string())),
        );
    }

    if let Err(e) = state.queue.enqueue_mission(&mission).await {
        error!(task_serial = %mission.task_serial, error = %e, "Failed to queue mission");
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(StandardResponse::error(500, e.to_string())),
        );
    }

    metrics::counter!("missions_queued_total").increment(1);
    if let Ok(depth) = state.queue.queue_depth().await {
        metrics::gauge!("mission_queue_depth").set(depth as f64);
    }

    info!(
        task_serial = %mission.task_serial,
        pictures = mission.picture_list.len(),
        "Mission queued"
    );

    (StatusCode::OK, Json(StandardResponse::accepted()))
}

/// GET /api/v1/missions/{task_serial}: persisted status and per-picture results.
pub async fn get_mission(
    State(state): State<AppState>,
    Path(task_serial): Path<String>,
) -> Result<Json<MissionRecord>, StatusCode> {
    match state.store.get_mission(&task_serial).await {
        Ok(Some(record)) => Ok(Json(record)),
        Ok(None) => Err(StatusCode::NOT_FOUND),
        Err(e) => {
            error!(task_serial = %task_serial, error = %e, "Failed to load mission");
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}
