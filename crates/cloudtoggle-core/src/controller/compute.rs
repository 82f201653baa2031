use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::{ControllerError, ControllerResult, ResourceController};
use crate::provider::{with_cancel, ComputeApi};
use crate::types::{ResourceKind, TagSelector};

/// Virtual machine instances. Tag matching is pushed down to the provider as
/// filters; start/stop are single batch calls.
pub struct ComputeController {
    api: Arc<dyn ComputeApi>,
}

impl ComputeController {
    pub fn new(api: Arc<dyn ComputeApi>) -> Self {
        Self { api }
    }

    fn error(&self, source: crate::provider::ProviderError, ids: &[String]) -> ControllerError {
        ControllerError::new(self.kind(), source, ids.to_vec())
    }
}

#[async_trait]
impl ResourceController for ComputeController {
    fn kind(&self) -> ResourceKind {
        ResourceKind::compute()
    }

    async fn resolve_by_tag(
        &self,
        selector: &TagSelector,
        cancel: &CancellationToken,
    ) -> ControllerResult<Vec<String>> {
        // The provider treats "no filters" as "every instance".
        if selector.is_empty() {
            return Ok(Vec::new());
        }
        let ids = with_cancel(cancel, self.api.describe_instances(selector.tags()))
            .await
            .map_err(|e| self.error(e, &[]))?;
        debug!(selector = %selector, count = ids.len(), "resolved compute instances");
        Ok(ids)
    }

    async fn start(&self, ids: &[String], cancel: &CancellationToken) -> ControllerResult<()> {
        if ids.is_empty() {
            return Ok(());
        }
        info!(?ids, "starting compute instances");
        with_cancel(cancel, self.api.start_instances(ids))
            .await
            .map_err(|e| self.error(e, ids))?;
        info!(?ids, "started compute instances");
        Ok(())
    }

    async fn stop(&self, ids: &[String], cancel: &CancellationToken) -> ControllerResult<()> {
        if ids.is_empty() {
            return Ok(());
        }
        info!(?ids, "stopping compute instances");
        with_cancel(cancel, self.api.stop_instances(ids))
            .await
            .map_err(|e| self.error(e, ids))?;
        info!(?ids, "stopped compute instances");
        Ok(())
    }
}
