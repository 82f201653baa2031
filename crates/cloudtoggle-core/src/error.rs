use thiserror::Error;

use crate::controller::ControllerError;

#[derive(Debug, Error)]
pub enum ToggleError {
    #[error("group not found: {0}")]
    GroupNotFound(String),

    #[error("action not found: {0}")]
    ActionNotFound(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error(transparent)]
    Controller(#[from] ControllerError),

    #[error("no controller registered for resource kind: {0}")]
    UnknownResourceKind(String),

    #[error("invalid transition from {from} to {to}: {reason}")]
    InvalidTransition {
        from: String,
        to: String,
        reason: String,
    },

    #[error("action store error: {0}")]
    Store(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl ToggleError {
    /// True for the "record does not exist" family of errors.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::GroupNotFound(_) | Self::ActionNotFound(_))
    }
}

pub type Result<T> = std::result::Result<T, ToggleError>;
