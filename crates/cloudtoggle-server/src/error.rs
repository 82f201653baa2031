use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use cloudtoggle_core::error::ToggleError;

// ---------------------------------------------------------------------------
// AppError: unified error type for HTTP responses
// ---------------------------------------------------------------------------

/// Unified error type for HTTP responses.
#[derive(Debug)]
pub struct AppError(pub anyhow::Error);

impl AppError {
    /// Construct a 400 Bad Request error with the given message.
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self(ToggleError::Validation(msg.into()).into())
    }

    pub fn join(err: tokio::task::JoinError) -> Self {
        Self(anyhow::anyhow!("task join error: {err}"))
    }
}

/// Unwrap a JSON request body. Malformed or incomplete payloads are
/// validation errors (400 with a JSON body), not axum's plain-text 4xx.
pub fn json_body<T>(body: Result<Json<T>, JsonRejection>) -> Result<T, AppError> {
    body.map(|Json(value)| value)
        .map_err(|rejection| AppError::bad_request(rejection.body_text()))
}

fn status_for(err: &ToggleError) -> StatusCode {
    match err {
        ToggleError::GroupNotFound(_) | ToggleError::ActionNotFound(_) => StatusCode::NOT_FOUND,
        ToggleError::Validation(_) => StatusCode::BAD_REQUEST,
        ToggleError::InvalidTransition { .. } => StatusCode::CONFLICT,
        ToggleError::Controller(_)
        | ToggleError::UnknownResourceKind(_)
        | ToggleError::Store(_)
        | ToggleError::Io(_)
        | ToggleError::Yaml(_)
        | ToggleError::Json(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self
            .0
            .downcast_ref::<ToggleError>()
            .map(status_for)
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        if status.is_server_error() {
            tracing::error!(error = %format!("{:#}", self.0), "request failed");
        }

        let body = serde_json::json!({ "error": self.0.to_string() });
        (status, axum::Json(body)).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cloudtoggle_core::controller::ControllerError;
    use cloudtoggle_core::types::ResourceKind;

    #[test]
    fn group_not_found_maps_to_404() {
        let err = AppError(ToggleError::GroupNotFound("g1".into()).into());
        assert_eq!(err.into_response().status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn action_not_found_maps_to_404() {
        let err = AppError(ToggleError::ActionNotFound("abc".into()).into());
        assert_eq!(err.into_response().status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn validation_maps_to_400() {
        let err = AppError::bad_request("invalid time '25:00'");
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn invalid_transition_maps_to_409() {
        let err = AppError(
            ToggleError::InvalidTransition {
                from: "succeeded".into(),
                to: "running".into(),
                reason: "terminal".into(),
            }
            .into(),
        );
        assert_eq!(err.into_response().status(), StatusCode::CONFLICT);
    }

    #[test]
    fn controller_error_maps_to_500() {
        let err = AppError(
            ToggleError::Controller(ControllerError {
                kind: ResourceKind::compute(),
                message: "throttled".into(),
                unconfirmed: vec![],
            })
            .into(),
        );
        assert_eq!(err.into_response().status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn plain_anyhow_maps_to_500() {
        let err = AppError(anyhow::anyhow!("something broke"));
        assert_eq!(err.into_response().status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
