//! Resource controllers: one per resource kind, each exposing
//! `resolve_by_tag`, `start` and `stop` over its provider API.
//!
//! ```text
//! ControllerRegistry ── kind ──▶ Arc<dyn ResourceController>
//!                                     │
//!                   ┌─────────────────┼──────────────────┐
//!                   ▼                 ▼                  ▼
//!           ComputeController  ContainerController  DatabaseController
//!                   │                 │                  │
//!              ComputeApi        ContainerApi        DatabaseApi
//! ```

pub mod compute;
pub mod container;
pub mod database;
pub mod registry;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::provider::ProviderError;
use crate::types::{ResourceKind, TagSelector};

pub use compute::ComputeController;
pub use container::ContainerController;
pub use database::DatabaseController;
pub use registry::{ControllerRegistry, ControllerRegistryBuilder};

/// A provider call failed. `unconfirmed` lists the ids whose transition was
/// not confirmed by the provider.
#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize, Deserialize)]
#[error("{kind} controller error: {message}")]
pub struct ControllerError {
    pub kind: ResourceKind,
    pub message: String,
    #[serde(default)]
    pub unconfirmed: Vec<String>,
}

impl ControllerError {
    pub fn new(kind: ResourceKind, source: ProviderError, unconfirmed: Vec<String>) -> Self {
        Self {
            kind,
            message: source.message,
            unconfirmed,
        }
    }
}

pub type ControllerResult<T> = std::result::Result<T, ControllerError>;

/// Start/stop/resolve capability for one resource kind.
///
/// `start` and `stop` are idempotent from the caller's side and succeed
/// trivially on an empty id list. `resolve_by_tag` never treats an empty
/// selector as "everything".
#[async_trait]
pub trait ResourceController: Send + Sync {
    fn kind(&self) -> ResourceKind;

    async fn resolve_by_tag(
        &self,
        selector: &TagSelector,
        cancel: &CancellationToken,
    ) -> ControllerResult<Vec<String>>;

    async fn start(&self, ids: &[String], cancel: &CancellationToken) -> ControllerResult<()>;

    async fn stop(&self, ids: &[String], cancel: &CancellationToken) -> ControllerResult<()>;
}
