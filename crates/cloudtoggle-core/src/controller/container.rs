use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{ControllerError, ControllerResult, ResourceController};
use crate::provider::{with_cancel, ContainerApi, ProviderError};
use crate::types::{ResourceKind, TagSelector};

/// Desired count used on start when no previous count was observed.
pub const DEFAULT_DESIRED_COUNT: u32 = 1;

/// Container services. Resources are clusters; starting or stopping a cluster
/// scales every service in it.
///
/// Stop records each service's desired count before scaling it to zero so
/// that the following start can restore it. The cache is keyed by
/// `cluster/service` and lives as long as the controller.
pub struct ContainerController {
    api: Arc<dyn ContainerApi>,
    last_desired: RwLock<HashMap<String, u32>>,
}

fn service_key(cluster: &str, service: &str) -> String {
    format!("{cluster}/{service}")
}

impl ContainerController {
    pub fn new(api: Arc<dyn ContainerApi>) -> Self {
        Self {
            api,
            last_desired: RwLock::new(HashMap::new()),
        }
    }

    /// Last desired count recorded for a service by a stop, if any.
    pub fn last_desired(&self, cluster: &str, service: &str) -> Option<u32> {
        self.last_desired
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&service_key(cluster, service))
            .copied()
    }

    fn remember(&self, cluster: &str, service: &str, count: u32) {
        self.last_desired
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(service_key(cluster, service), count);
    }

    fn restore_count(&self, cluster: &str, service: &str) -> u32 {
        match self.last_desired(cluster, service) {
            Some(n) if n > 0 => n,
            _ => DEFAULT_DESIRED_COUNT,
        }
    }

    async fn list_services(
        &self,
        cluster: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<String>, ProviderError> {
        let mut services = Vec::new();
        let mut token = None;
        loop {
            let page = with_cancel(cancel, self.api.list_services(cluster, token)).await?;
            services.extend(page.items);
            match page.next_token {
                Some(t) => token = Some(t),
                None => break,
            }
        }
        Ok(services)
    }

    async fn start_cluster(
        &self,
        cluster: &str,
        cancel: &CancellationToken,
    ) -> Result<(), ProviderError> {
        info!(cluster, "starting container services");
        for service in self.list_services(cluster, cancel).await? {
            let count = self.restore_count(cluster, &service);
            with_cancel(
                cancel,
                self.api.update_desired_count(cluster, &service, count),
            )
            .await
            .map_err(|e| ProviderError::new(format!("failed to start service {service}: {e}")))?;
            info!(cluster, service = %service, count, "started container service");
        }
        Ok(())
    }

    async fn stop_cluster(
        &self,
        cluster: &str,
        cancel: &CancellationToken,
    ) -> Result<(), ProviderError> {
        info!(cluster, "stopping container services");
        for service in self.list_services(cluster, cancel).await? {
            let current = with_cancel(cancel, self.api.desired_count(cluster, &service))
                .await
                .map_err(|e| {
                    ProviderError::new(format!("failed to describe service {service}: {e}"))
                })?;
            // An already-stopped service keeps the count recorded by the
            // stop that scaled it down.
            if let Some(n) = current.filter(|n| *n > 0) {
                self.remember(cluster, &service, n);
            }
            with_cancel(cancel, self.api.update_desired_count(cluster, &service, 0))
                .await
                .map_err(|e| {
                    ProviderError::new(format!("failed to stop service {service}: {e}"))
                })?;
            info!(cluster, service = %service, "stopped container service");
        }
        Ok(())
    }
}

#[async_trait]
impl ResourceController for ContainerController {
    fn kind(&self) -> ResourceKind {
        ResourceKind::container()
    }

    async fn resolve_by_tag(
        &self,
        selector: &TagSelector,
        cancel: &CancellationToken,
    ) -> ControllerResult<Vec<String>> {
        if selector.is_empty() {
            return Ok(Vec::new());
        }

        let mut clusters = Vec::new();
        let mut token = None;
        loop {
            let page = with_cancel(cancel, self.api.list_clusters(token))
                .await
                .map_err(|e| ControllerError::new(self.kind(), e, Vec::new()))?;
            clusters.extend(page.items);
            match page.next_token {
                Some(t) => token = Some(t),
                None => break,
            }
        }

        let mut matching = Vec::new();
        for cluster in clusters {
            match with_cancel(cancel, self.api.list_cluster_tags(&cluster)).await {
                Ok(tags) if selector.matches(&tags) => matching.push(cluster),
                Ok(_) => {}
                Err(e) if cancel.is_cancelled() => {
                    return Err(ControllerError::new(self.kind(), e, Vec::new()));
                }
                Err(e) => warn!(cluster = %cluster, error = %e, "failed to read cluster tags"),
            }
        }
        debug!(selector = %selector, ?matching, "resolved container clusters");
        Ok(matching)
    }

    async fn start(&self, ids: &[String], cancel: &CancellationToken) -> ControllerResult<()> {
        for (i, cluster) in ids.iter().enumerate() {
            self.start_cluster(cluster, cancel)
                .await
                .map_err(|e| ControllerError::new(self.kind(), e, ids[i..].to_vec()))?;
        }
        Ok(())
    }

    async fn stop(&self, ids: &[String], cancel: &CancellationToken) -> ControllerResult<()> {
        for (i, cluster) in ids.iter().enumerate() {
            self.stop_cluster(cluster, cancel)
                .await
                .map_err(|e| ControllerError::new(self.kind(), e, ids[i..].to_vec()))?;
        }
        Ok(())
    }
}
