//! Provider API shapes consumed by the resource controllers.
//!
//! Each trait mirrors the call surface of one cloud service closely enough
//! that a real SDK client can sit behind it with a thin adapter:
//!
//! | Trait | Shape |
//! |-------|-------|
//! | `ComputeApi` | server-side tag filters, batch start/stop |
//! | `ContainerApi` | paginated clusters + services, desired-count updates |
//! | `DatabaseApi` | marker-paginated instances, per-instance start/stop |
//!
//! `simulated::SimulatedFleet` implements all three in memory.

pub mod simulated;

use async_trait::async_trait;
use std::collections::HashMap;
use std::future::Future;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::types::Tag;

pub use simulated::{FleetSpec, SimulatedFleet};

/// Error returned by a provider call.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct ProviderError {
    pub message: String,
}

impl ProviderError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn cancelled() -> Self {
        Self::new("cancelled")
    }
}

pub type ProviderResult<T> = std::result::Result<T, ProviderError>;

/// One page of a paginated listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next_token: Option<String>,
}

/// Race a provider call against `cancel`. The token only ever reaches the
/// provider call; callers above the controller never observe it.
pub(crate) async fn with_cancel<T, F>(cancel: &CancellationToken, fut: F) -> ProviderResult<T>
where
    F: Future<Output = ProviderResult<T>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(ProviderError::cancelled()),
        res = fut => res,
    }
}

#[async_trait]
pub trait ComputeApi: Send + Sync {
    /// Instance ids whose tags match every filter.
    ///
    /// An empty filter list matches every instance, as the real API does.
    async fn describe_instances(&self, filters: &[Tag]) -> ProviderResult<Vec<String>>;
    async fn start_instances(&self, ids: &[String]) -> ProviderResult<()>;
    async fn stop_instances(&self, ids: &[String]) -> ProviderResult<()>;
}

#[async_trait]
pub trait ContainerApi: Send + Sync {
    async fn list_clusters(&self, next_token: Option<String>) -> ProviderResult<Page<String>>;
    async fn list_cluster_tags(&self, cluster: &str) -> ProviderResult<HashMap<String, String>>;
    async fn list_services(
        &self,
        cluster: &str,
        next_token: Option<String>,
    ) -> ProviderResult<Page<String>>;
    /// `None` when the service is not known to the provider.
    async fn desired_count(&self, cluster: &str, service: &str) -> ProviderResult<Option<u32>>;
    async fn update_desired_count(
        &self,
        cluster: &str,
        service: &str,
        count: u32,
    ) -> ProviderResult<()>;
}

#[async_trait]
pub trait DatabaseApi: Send + Sync {
    async fn describe_db_instances(&self, marker: Option<String>) -> ProviderResult<Page<String>>;
    async fn list_db_tags(&self, id: &str) -> ProviderResult<HashMap<String, String>>;
    async fn start_db_instance(&self, id: &str) -> ProviderResult<()>;
    async fn stop_db_instance(&self, id: &str) -> ProviderResult<()>;
}
