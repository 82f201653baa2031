use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use subtle::ConstantTimeEq;

/// Controls API authentication.
///
/// When `token` is `None` the middleware is a transparent no-op and all
/// requests pass through.
#[derive(Clone, Default)]
pub struct ApiAuth {
    pub token: Option<String>,
}

impl ApiAuth {
    /// No token configured; every request passes.
    pub fn none() -> Self {
        Self { token: None }
    }

    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            token: Some(token.into()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.token.is_some()
    }
}

/// Axum middleware that gates `/api/v1/*` behind a bearer token.
///
/// Auth flow (evaluated in order):
/// 1. `token` is `None` → passthrough
/// 2. path is `/healthz` → passthrough
/// 3. `Authorization: Bearer <token>` matches → passthrough
/// 4. otherwise → 401 with a JSON error body
pub async fn auth_middleware(
    State(auth): State<Arc<ApiAuth>>,
    req: Request,
    next: Next,
) -> Response {
    let Some(ref token) = auth.token else {
        return next.run(req).await;
    };

    if req.uri().path() == "/healthz" {
        return next.run(req).await;
    }

    let presented = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim);

    if presented.is_some_and(|p| p.as_bytes().ct_eq(token.as_bytes()).into()) {
        return next.run(req).await;
    }

    tracing::debug!(path = %req.uri().path(), "rejected unauthenticated request");
    Response::builder()
        .status(401)
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::WWW_AUTHENTICATE, "Bearer")
        .body(Body::from(r#"{"error":"unauthorized"}"#))
        .unwrap_or_else(|_| Response::new(Body::empty()))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
