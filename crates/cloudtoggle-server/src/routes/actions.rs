use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;

use cloudtoggle_core::orchestrator::parse_action_id;

use crate::error::AppError;
use crate::state::AppState;

const DEFAULT_LIST_LIMIT: usize = 50;

/// GET /api/v1/actions/{id}: action record.
pub async fn get_action(
    State(app): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let action_id = parse_action_id(&id)?;
    let tracker = app.tracker.clone();
    let action = tokio::task::spawn_blocking(move || tracker.get(action_id))
        .await
        .map_err(AppError::join)??;
    Ok(Json(serde_json::json!(action)))
}

#[derive(Deserialize)]
pub struct ListQuery {
    pub limit: Option<usize>,
}

/// GET /api/v1/actions?limit=N: recent actions, newest first.
pub async fn list_actions(
    State(app): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<serde_json::Value>, AppError> {
    let tracker = app.tracker.clone();
    let limit = query.limit.unwrap_or(DEFAULT_LIST_LIMIT);
    let actions = tokio::task::spawn_blocking(move || tracker.list(Some(limit)))
        .await
        .map_err(AppError::join)??;
    Ok(Json(serde_json::json!(actions)))
}
