use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{ControllerError, ControllerResult, ResourceController};
use crate::provider::{with_cancel, DatabaseApi};
use crate::types::{ResourceKind, TagSelector};

/// Managed database instances, started and stopped one at a time.
pub struct DatabaseController {
    api: Arc<dyn DatabaseApi>,
}

impl DatabaseController {
    pub fn new(api: Arc<dyn DatabaseApi>) -> Self {
        Self { api }
    }
}

#[async_trait]
impl ResourceController for DatabaseController {
    fn kind(&self) -> ResourceKind {
        ResourceKind::database()
    }

    async fn resolve_by_tag(
        &self,
        selector: &TagSelector,
        cancel: &CancellationToken,
    ) -> ControllerResult<Vec<String>> {
        if selector.is_empty() {
            return Ok(Vec::new());
        }

        let mut instances = Vec::new();
        let mut marker = None;
        loop {
            let page = with_cancel(cancel, self.api.describe_db_instances(marker))
                .await
                .map_err(|e| ControllerError::new(self.kind(), e, Vec::new()))?;
            instances.extend(page.items);
            match page.next_token {
                Some(m) => marker = Some(m),
                None => break,
            }
        }

        let mut matching = Vec::new();
        for id in instances {
            match with_cancel(cancel, self.api.list_db_tags(&id)).await {
                Ok(tags) if selector.matches(&tags) => matching.push(id),
                Ok(_) => {}
                Err(e) if cancel.is_cancelled() => {
                    return Err(ControllerError::new(self.kind(), e, Vec::new()));
                }
                Err(e) => warn!(db_instance = %id, error = %e, "failed to read db instance tags"),
            }
        }
        debug!(selector = %selector, ?matching, "resolved db instances");
        Ok(matching)
    }

    async fn start(&self, ids: &[String], cancel: &CancellationToken) -> ControllerResult<()> {
        for (i, id) in ids.iter().enumerate() {
            info!(db_instance = %id, "starting db instance");
            with_cancel(cancel, self.api.start_db_instance(id))
                .await
                .map_err(|e| ControllerError::new(self.kind(), e, ids[i..].to_vec()))?;
        }
        Ok(())
    }

    async fn stop(&self, ids: &[String], cancel: &CancellationToken) -> ControllerResult<()> {
        for (i, id) in ids.iter().enumerate() {
            info!(db_instance = %id, "stopping db instance");
            with_cancel(cancel, self.api.stop_db_instance(id))
                .await
                .map_err(|e| ControllerError::new(self.kind(), e, ids[i..].to_vec()))?;
        }
        Ok(())
    }
}
