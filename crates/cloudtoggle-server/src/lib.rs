pub mod auth;
pub mod error;
pub mod routes;
pub mod state;

use std::sync::Arc;

use axum::routing::{delete, get, post};
use axum::{middleware, Router};
use cloudtoggle_core::runtime::Runtime;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::auth::ApiAuth;

/// Build the axum Router with all API routes and middleware.
/// Used by `serve()` and available for integration testing.
pub fn build_router(app_state: state::AppState, auth: ApiAuth) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api = Router::new()
        // Group actions
        .route("/groups", get(routes::groups::list_groups))
        .route("/groups/{id}", get(routes::groups::get_group))
        .route("/groups/{id}/start", post(routes::groups::start_group))
        .route("/groups/{id}/stop", post(routes::groups::stop_group))
        .route(
            "/groups/{id}/schedule",
            post(routes::groups::schedule_group),
        )
        // Group management
        .route("/resource-groups", post(routes::groups::create_group))
        .route(
            "/resource-groups/{id}",
            delete(routes::groups::delete_group),
        )
        // Actions
        .route("/actions", get(routes::actions::list_actions))
        .route("/actions/{id}", get(routes::actions::get_action))
        // Schedules
        .route("/schedules", get(routes::schedules::list_schedules));

    Router::new()
        .nest("/api/v1", api)
        .route("/healthz", get(routes::health::healthz))
        .layer(middleware::from_fn_with_state(
            Arc::new(auth),
            auth::auth_middleware,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(app_state)
}

/// Start the API server and the scheduler driver.
pub async fn serve(runtime: Runtime) -> anyhow::Result<()> {
    let addr = runtime.config.server.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    serve_on(runtime, listener).await
}

/// Start the API server on a pre-bound listener.
///
/// Unlike `serve`, this accepts a `TcpListener` that was already bound so the
/// caller can read the actual port before starting (useful when `port = 0` and
/// the OS picks a free port).
pub async fn serve_on(runtime: Runtime, listener: tokio::net::TcpListener) -> anyhow::Result<()> {
    let actual_port = listener.local_addr()?.port();

    let auth = runtime
        .config
        .auth
        .resolve_token()
        .map(ApiAuth::with_token)
        .unwrap_or_default();
    if !auth.is_enabled() {
        tracing::warn!("no API token configured; requests are not authenticated");
    }

    let app = build_router(state::AppState::new(&runtime), auth);
    runtime.scheduler.start();

    tracing::info!("cloudtoggle API listening on http://localhost:{actual_port}");

    let scheduler = runtime.scheduler.clone();
    let orchestrator = runtime.orchestrator.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown requested");
        })
        .await?;
    scheduler.stop();
    orchestrator.shutdown();
    Ok(())
}
