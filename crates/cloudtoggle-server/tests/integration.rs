use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;
use cloudtoggle_core::config::Config;
use cloudtoggle_core::group::FileGroupRepository;
use cloudtoggle_core::orchestrator::{parse_action_id, ActionTracker};
use cloudtoggle_core::provider::simulated::InstanceSpec;
use cloudtoggle_core::provider::{FleetSpec, SimulatedFleet};
use cloudtoggle_core::runtime::Runtime;
use cloudtoggle_server::auth::ApiAuth;
use cloudtoggle_server::state::AppState;
use http_body_util::BodyExt;
use tempfile::TempDir;
use tower::ServiceExt;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn instance(id: &str, env: &str) -> InstanceSpec {
    InstanceSpec {
        id: id.to_string(),
        tags: BTreeMap::from([("env".to_string(), env.to_string())]),
        running: false,
    }
}

/// A runtime over a temp data dir, an in-memory action store and a
/// simulated fleet of two dev instances and one prod instance.
fn runtime(dir: &TempDir) -> Runtime {
    let spec = FleetSpec {
        instances: vec![instance("i-1", "dev"), instance("i-2", "dev"), instance("i-3", "prod")],
        ..FleetSpec::default()
    };
    let mut config = Config::default();
    config.data_dir = dir.path().to_path_buf();
    Runtime::assemble(
        config,
        Arc::new(SimulatedFleet::new(spec)),
        Arc::new(FileGroupRepository::new(dir.path())),
        Arc::new(ActionTracker::in_memory()),
    )
    .unwrap()
}

fn app(rt: &Runtime) -> axum::Router {
    cloudtoggle_server::build_router(AppState::new(rt), ApiAuth::none())
}

async fn send(
    app: axum::Router,
    method: &str,
    uri: &str,
    body: Option<serde_json::Value>,
    bearer: Option<&str>,
) -> (StatusCode, serde_json::Value) {
    let mut req = axum::http::Request::builder().method(method).uri(uri);
    if let Some(token) = bearer {
        req = req.header("authorization", format!("Bearer {token}"));
    }
    let req = match body {
        Some(b) => req
            .header("content-type", "application/json")
            .body(axum::body::Body::from(serde_json::to_vec(&b).unwrap()))
            .unwrap(),
        None => req.body(axum::body::Body::empty()).unwrap(),
    };
    let response = app.oneshot(req).await.unwrap();
    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null);
    (status, json)
}

/// Send a GET request via `oneshot` and return (status, parsed JSON body).
async fn get(app: axum::Router, uri: &str) -> (StatusCode, serde_json::Value) {
    send(app, "GET", uri, None, None).await
}

/// Send a POST request with an optional JSON body.
async fn post(
    app: axum::Router,
    uri: &str,
    body: Option<serde_json::Value>,
) -> (StatusCode, serde_json::Value) {
    send(app, "POST", uri, body, None).await
}

async fn create_dev_group(app: axum::Router) -> String {
    let (status, body) = post(
        app,
        "/api/v1/resource-groups",
        Some(serde_json::json!({
            "name": "dev",
            "status": "active",
            "resources": [
                { "type": "EC2", "tags": [{ "key": "env", "value": "dev" }] }
            ]
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    body["id"].as_str().unwrap().to_string()
}

// ---------------------------------------------------------------------------
// Health
// ---------------------------------------------------------------------------

#[tokio::test]
async fn healthz_returns_ok() {
    let dir = TempDir::new().unwrap();
    let rt = runtime(&dir);
    let (status, body) = get(app(&rt), "/healthz").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

// ---------------------------------------------------------------------------
// Groups
// ---------------------------------------------------------------------------

#[tokio::test]
async fn create_list_get_delete_group() {
    let dir = TempDir::new().unwrap();
    let rt = runtime(&dir);
    let id = create_dev_group(app(&rt)).await;
    assert_eq!(id, "1");

    let (status, list) = get(app(&rt), "/api/v1/groups").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list.as_array().unwrap().len(), 1);
    assert_eq!(list[0]["resources"][0]["type"], "EC2");

    let (status, group) = get(app(&rt), "/api/v1/groups/1").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(group["name"], "dev");

    let (status, _) = send(app(&rt), "DELETE", "/api/v1/resource-groups/1", None, None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = get(app(&rt), "/api/v1/groups/1").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().unwrap().contains("1"));
}

#[tokio::test]
async fn create_group_without_name_is_400() {
    let dir = TempDir::new().unwrap();
    let rt = runtime(&dir);
    let (status, body) = post(
        app(&rt),
        "/api/v1/resource-groups",
        Some(serde_json::json!({ "name": "", "resources": [] })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn create_group_warns_about_unsupported_types() {
    let dir = TempDir::new().unwrap();
    let rt = runtime(&dir);
    let (status, body) = post(
        app(&rt),
        "/api/v1/resource-groups",
        Some(serde_json::json!({
            "name": "mixed",
            "resources": [
                { "type": "EC2", "tags": [{ "key": "env", "value": "dev" }] },
                { "type": "S3", "tags": [{ "key": "env", "value": "dev" }] }
            ]
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let warnings = body["warnings"].as_array().unwrap();
    assert_eq!(warnings.len(), 1);
    assert!(warnings[0].as_str().unwrap().contains("S3"));
}

#[tokio::test]
async fn delete_unknown_group_is_404() {
    let dir = TempDir::new().unwrap();
    let rt = runtime(&dir);
    let (status, _) = send(app(&rt), "DELETE", "/api/v1/resource-groups/9", None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

// ---------------------------------------------------------------------------
// Start / stop
// ---------------------------------------------------------------------------

#[tokio::test]
async fn start_group_dispatches_and_action_succeeds() {
    let dir = TempDir::new().unwrap();
    let rt = runtime(&dir);
    let id = create_dev_group(app(&rt)).await;

    let (status, body) = post(app(&rt), &format!("/api/v1/groups/{id}/start"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "success");
    assert_eq!(body["message"], "Group is starting");
    let action_id = body["action_id"].as_str().unwrap().to_string();

    let action = rt
        .tracker
        .wait_terminal(parse_action_id(&action_id).unwrap(), Duration::from_secs(5))
        .await
        .unwrap();
    assert!(action.status.is_terminal());

    let (status, record) = get(app(&rt), &format!("/api/v1/actions/{action_id}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(record["status"]["type"], "succeeded");
    assert_eq!(record["group_id"], id);
    assert_eq!(record["kind"], "start");
    assert_eq!(rt.fleet.instance_running("i-1"), Some(true));
    assert_eq!(rt.fleet.instance_running("i-3"), Some(false));
}

#[tokio::test]
async fn stop_unknown_group_is_404() {
    let dir = TempDir::new().unwrap();
    let rt = runtime(&dir);
    let (status, body) = post(app(&rt), "/api/v1/groups/42/stop", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().unwrap().contains("42"));
    assert!(rt.tracker.list(None).unwrap().is_empty());
}

#[tokio::test]
async fn list_actions_returns_newest_first() {
    let dir = TempDir::new().unwrap();
    let rt = runtime(&dir);
    let id = create_dev_group(app(&rt)).await;
    post(app(&rt), &format!("/api/v1/groups/{id}/start"), None).await;
    post(app(&rt), &format!("/api/v1/groups/{id}/stop"), None).await;

    let (status, list) = get(app(&rt), "/api/v1/actions?limit=1").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list.as_array().unwrap().len(), 1);
    assert_eq!(list[0]["kind"], "stop");
}

// ---------------------------------------------------------------------------
// Actions
// ---------------------------------------------------------------------------

#[tokio::test]
async fn unknown_action_is_404() {
    let dir = TempDir::new().unwrap();
    let rt = runtime(&dir);
    let (status, _) = get(
        app(&rt),
        "/api/v1/actions/6f1c3c9e-8e4b-4a43-9d0b-1f2f3a4b5c6d",
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = get(app(&rt), "/api/v1/actions/not-a-uuid").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

// ---------------------------------------------------------------------------
// Schedules
// ---------------------------------------------------------------------------

#[tokio::test]
async fn schedule_group_registers_entry() {
    let dir = TempDir::new().unwrap();
    let rt = runtime(&dir);
    let id = create_dev_group(app(&rt)).await;

    let (status, body) = post(
        app(&rt),
        &format!("/api/v1/groups/{id}/schedule"),
        Some(serde_json::json!({ "start_time": "09:00", "stop_time": "18:30" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["status"], "success");

    let (status, schedules) = get(app(&rt), "/api/v1/schedules").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(schedules["timezone"], "UTC");
    assert_eq!(schedules["entries"][0]["group_id"], id.as_str());
    assert_eq!(schedules["jobs"][0]["expression"], "0 0 9 * * ?");
    assert_eq!(schedules["jobs"][1]["expression"], "0 30 18 * * ?");
}

#[tokio::test]
async fn malformed_schedule_time_is_400_and_registers_nothing() {
    let dir = TempDir::new().unwrap();
    let rt = runtime(&dir);
    let id = create_dev_group(app(&rt)).await;

    let (status, body) = post(
        app(&rt),
        &format!("/api/v1/groups/{id}/schedule"),
        Some(serde_json::json!({ "start_time": "09:00", "stop_time": "9:60:00" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("9:60:00"));
    assert!(rt.scheduler.entries().is_empty());
}

#[tokio::test]
async fn schedule_without_stop_time_is_400_json() {
    let dir = TempDir::new().unwrap();
    let rt = runtime(&dir);
    let id = create_dev_group(app(&rt)).await;

    let (status, body) = post(
        app(&rt),
        &format!("/api/v1/groups/{id}/schedule"),
        Some(serde_json::json!({ "start_time": "09:00" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("stop_time"));
    assert!(rt.scheduler.jobs().is_empty());
}

#[tokio::test]
async fn malformed_json_body_is_400_json() {
    let dir = TempDir::new().unwrap();
    let rt = runtime(&dir);
    let req = axum::http::Request::builder()
        .method("POST")
        .uri("/api/v1/resource-groups")
        .header("content-type", "application/json")
        .body(axum::body::Body::from("{\"name\": "))
        .unwrap();
    let response = app(&rt).oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert!(json["error"].is_string());
}

#[tokio::test]
async fn schedule_unknown_group_is_404() {
    let dir = TempDir::new().unwrap();
    let rt = runtime(&dir);
    let (status, _) = post(
        app(&rt),
        "/api/v1/groups/5/schedule",
        Some(serde_json::json!({ "start_time": "09:00", "stop_time": "18:00" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(rt.scheduler.jobs().is_empty());
}

// ---------------------------------------------------------------------------
// Auth
// ---------------------------------------------------------------------------

#[tokio::test]
async fn bearer_token_gates_api_but_not_healthz() {
    let dir = TempDir::new().unwrap();
    let rt = runtime(&dir);
    let router = || {
        cloudtoggle_server::build_router(AppState::new(&rt), ApiAuth::with_token("s3cret"))
    };

    let (status, body) = get(router(), "/api/v1/groups").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "unauthorized");

    let (status, _) = send(router(), "GET", "/api/v1/groups", None, Some("s3cret")).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = get(router(), "/healthz").await;
    assert_eq!(status, StatusCode::OK);
}
