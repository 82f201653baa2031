use axum::extract::State;
use axum::Json;

use crate::error::AppError;
use crate::state::AppState;

/// GET /api/v1/schedules: registered schedules and their next fire times.
pub async fn list_schedules(
    State(app): State<AppState>,
) -> Result<Json<serde_json::Value>, AppError> {
    Ok(Json(serde_json::json!({
        "timezone": app.scheduler.timezone().name(),
        "entries": app.scheduler.entries(),
        "jobs": app.scheduler.jobs(),
    })))
}
