use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;

use cloudtoggle_core::group::NewGroup;
use cloudtoggle_core::types::{ActionKind, ResourceBinding};

use crate::error::{json_body, AppError};
use crate::state::AppState;

/// Ensure the group exists before accepting work for it.
async fn require_group(app: &AppState, id: &str) -> Result<(), AppError> {
    let groups = app.groups.clone();
    let id = id.to_string();
    tokio::task::spawn_blocking(move || groups.get_group(&id).map(|_| ()))
        .await
        .map_err(AppError::join)??;
    Ok(())
}

async fn dispatch(
    app: AppState,
    id: String,
    kind: ActionKind,
) -> Result<Json<serde_json::Value>, AppError> {
    require_group(&app, &id).await?;
    let orchestrator = app.orchestrator.clone();
    let gid = id.clone();
    let action_id = tokio::task::spawn_blocking(move || orchestrator.execute(&gid, kind))
        .await
        .map_err(AppError::join)??;
    let message = match kind {
        ActionKind::Start => "Group is starting",
        ActionKind::Stop => "Group is stopping",
    };
    Ok(Json(serde_json::json!({
        "status": "success",
        "message": message,
        "action_id": action_id,
    })))
}

/// POST /api/v1/groups/{id}/start: dispatch a start action.
pub async fn start_group(
    State(app): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    dispatch(app, id, ActionKind::Start).await
}

/// POST /api/v1/groups/{id}/stop: dispatch a stop action.
pub async fn stop_group(
    State(app): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    dispatch(app, id, ActionKind::Stop).await
}

#[derive(Deserialize)]
pub struct ScheduleBody {
    pub start_time: Option<String>,
    pub stop_time: Option<String>,
}

/// POST /api/v1/groups/{id}/schedule: register daily start/stop times.
pub async fn schedule_group(
    State(app): State<AppState>,
    Path(id): Path<String>,
    body: Result<Json<ScheduleBody>, JsonRejection>,
) -> Result<Json<serde_json::Value>, AppError> {
    let body = json_body(body)?;
    let start_time = body
        .start_time
        .ok_or_else(|| AppError::bad_request("start_time is required"))?;
    let stop_time = body
        .stop_time
        .ok_or_else(|| AppError::bad_request("stop_time is required"))?;
    require_group(&app, &id).await?;
    let entry = app
        .scheduler
        .schedule_group(&id, &start_time, &stop_time)?;
    Ok(Json(serde_json::json!({
        "status": "success",
        "message": format!("Schedule successfully created for group {id}"),
        "entry": entry,
    })))
}

/// GET /api/v1/groups: list all groups.
pub async fn list_groups(
    State(app): State<AppState>,
) -> Result<Json<serde_json::Value>, AppError> {
    let groups = app.groups.clone();
    let list = tokio::task::spawn_blocking(move || groups.list_groups())
        .await
        .map_err(AppError::join)??;
    Ok(Json(serde_json::json!(list)))
}

/// GET /api/v1/groups/{id}: one group with its bindings.
pub async fn get_group(
    State(app): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let groups = app.groups.clone();
    let group = tokio::task::spawn_blocking(move || groups.get_group(&id))
        .await
        .map_err(AppError::join)??;
    Ok(Json(serde_json::json!(group)))
}

#[derive(Deserialize)]
pub struct CreateGroupBody {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub resources: Vec<ResourceBinding>,
}

/// POST /api/v1/resource-groups: create a group.
pub async fn create_group(
    State(app): State<AppState>,
    body: Result<Json<CreateGroupBody>, JsonRejection>,
) -> Result<(StatusCode, Json<serde_json::Value>), AppError> {
    let body = json_body(body)?;
    let registry = app.orchestrator.registry();
    let warnings: Vec<String> = body
        .resources
        .iter()
        .filter(|b| !registry.contains(&b.kind))
        .map(|b| format!("no controller registered for resource type {}", b.kind))
        .collect();
    for w in &warnings {
        tracing::warn!(name = %body.name, "{w}");
    }

    let groups = app.groups.clone();
    let created = tokio::task::spawn_blocking(move || {
        groups.add_group(NewGroup {
            name: body.name,
            status: body.status,
            resources: body.resources,
        })
    })
    .await
    .map_err(AppError::join)??;
    tracing::info!(group_id = %created.id, name = %created.name, "resource group created");
    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({
            "id": created.id,
            "message": "Resource group added successfully",
            "warnings": warnings,
        })),
    ))
}

/// DELETE /api/v1/resource-groups/{id}: delete a group.
pub async fn delete_group(
    State(app): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let groups = app.groups.clone();
    let gid = id.clone();
    tokio::task::spawn_blocking(move || groups.delete_group(&gid))
        .await
        .map_err(AppError::join)??;
    tracing::info!(group_id = %id, "resource group deleted");
    Ok(Json(serde_json::json!({
        "status": "success",
        "message": "Resource group deleted successfully",
    })))
}
