//! In-memory fleet implementing every provider API.
//!
//! Backs the `simulated` provider backend and the test suites. State lives
//! behind a single `std::sync::Mutex`; no lock is held across an await.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use super::{ComputeApi, ContainerApi, DatabaseApi, Page, ProviderError, ProviderResult};
use crate::error::Result;
use crate::types::Tag;

/// Page size used for cluster and service listings.
const PAGE_SIZE: usize = 10;

// ---------------------------------------------------------------------------
// Fleet file model
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FleetSpec {
    #[serde(default)]
    pub instances: Vec<InstanceSpec>,
    #[serde(default)]
    pub clusters: Vec<ClusterSpec>,
    #[serde(default)]
    pub databases: Vec<DatabaseSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceSpec {
    pub id: String,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
    #[serde(default)]
    pub running: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterSpec {
    pub id: String,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
    #[serde(default)]
    pub services: Vec<ServiceSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceSpec {
    pub name: String,
    #[serde(default)]
    pub desired_count: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSpec {
    pub id: String,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
    #[serde(default)]
    pub running: bool,
}

impl FleetSpec {
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&data)?)
    }
}

// ---------------------------------------------------------------------------
// SimulatedFleet
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct FleetState {
    instances: BTreeMap<String, (HashMap<String, String>, bool)>,
    clusters: BTreeMap<String, (HashMap<String, String>, BTreeMap<String, u32>)>,
    databases: BTreeMap<String, (HashMap<String, String>, bool)>,
    failing: HashSet<String>,
    calls: Vec<String>,
}

/// In-memory stand-in for the cloud provider.
#[derive(Debug, Default)]
pub struct SimulatedFleet {
    state: Mutex<FleetState>,
    latency: Option<Duration>,
}

impl SimulatedFleet {
    pub fn new(spec: FleetSpec) -> Self {
        let mut state = FleetState::default();
        for i in spec.instances {
            state
                .instances
                .insert(i.id, (i.tags.into_iter().collect(), i.running));
        }
        for c in spec.clusters {
            let services = c
                .services
                .into_iter()
                .map(|s| (s.name, s.desired_count))
                .collect();
            state
                .clusters
                .insert(c.id, (c.tags.into_iter().collect(), services));
        }
        for d in spec.databases {
            state
                .databases
                .insert(d.id, (d.tags.into_iter().collect(), d.running));
        }
        Self {
            state: Mutex::new(state),
            latency: None,
        }
    }

    /// Delay every call by `latency`. Used to exercise deadlines.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Make every call that touches `id` fail from now on.
    pub fn fail_on(&self, id: impl Into<String>) {
        self.lock().failing.insert(id.into());
    }

    pub fn instance_running(&self, id: &str) -> Option<bool> {
        self.lock().instances.get(id).map(|(_, running)| *running)
    }

    pub fn database_running(&self, id: &str) -> Option<bool> {
        self.lock().databases.get(id).map(|(_, running)| *running)
    }

    pub fn service_desired(&self, cluster: &str, service: &str) -> Option<u32> {
        self.lock()
            .clusters
            .get(cluster)
            .and_then(|(_, services)| services.get(service).copied())
    }

    /// Mutating calls made so far, formatted as `op:id[,id…]`.
    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, FleetState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    async fn delay(&self) {
        if let Some(d) = self.latency {
            tokio::time::sleep(d).await;
        }
    }

    fn check(state: &FleetState, id: &str) -> ProviderResult<()> {
        if state.failing.contains(id) {
            return Err(ProviderError::new(format!("simulated failure for {id}")));
        }
        Ok(())
    }
}

fn paginate(items: Vec<String>, token: Option<String>) -> ProviderResult<Page<String>> {
    let start = match token {
        Some(t) => t
            .parse::<usize>()
            .map_err(|_| ProviderError::new(format!("invalid pagination token: {t}")))?,
        None => 0,
    };
    let end = (start + PAGE_SIZE).min(items.len());
    let next_token = (end < items.len()).then(|| end.to_string());
    Ok(Page {
        items: items.get(start..end).map(<[String]>::to_vec).unwrap_or_default(),
        next_token,
    })
}

#[async_trait]
impl ComputeApi for SimulatedFleet {
    async fn describe_instances(&self, filters: &[Tag]) -> ProviderResult<Vec<String>> {
        self.delay().await;
        let state = self.lock();
        Ok(state
            .instances
            .iter()
            .filter(|(_, (tags, _))| {
                filters
                    .iter()
                    .all(|f| tags.get(&f.key).is_some_and(|v| *v == f.value))
            })
            .map(|(id, _)| id.clone())
            .collect())
    }

    async fn start_instances(&self, ids: &[String]) -> ProviderResult<()> {
        self.set_instances(ids, true, "start_instances").await
    }

    async fn stop_instances(&self, ids: &[String]) -> ProviderResult<()> {
        self.set_instances(ids, false, "stop_instances").await
    }
}

impl SimulatedFleet {
    async fn set_instances(&self, ids: &[String], running: bool, op: &str) -> ProviderResult<()> {
        self.delay().await;
        let mut state = self.lock();
        // Batch call: validated as a whole before anything changes.
        for id in ids {
            Self::check(&state, id)?;
            if !state.instances.contains_key(id) {
                return Err(ProviderError::new(format!("instance not found: {id}")));
            }
        }
        for id in ids {
            if let Some(entry) = state.instances.get_mut(id) {
                entry.1 = running;
            }
        }
        state.calls.push(format!("{op}:{}", ids.join(",")));
        Ok(())
    }
}

#[async_trait]
impl ContainerApi for SimulatedFleet {
    async fn list_clusters(&self, next_token: Option<String>) -> ProviderResult<Page<String>> {
        self.delay().await;
        let ids: Vec<String> = self.lock().clusters.keys().cloned().collect();
        paginate(ids, next_token)
    }

    async fn list_cluster_tags(&self, cluster: &str) -> ProviderResult<HashMap<String, String>> {
        self.delay().await;
        let state = self.lock();
        Self::check(&state, cluster)?;
        state
            .clusters
            .get(cluster)
            .map(|(tags, _)| tags.clone())
            .ok_or_else(|| ProviderError::new(format!("cluster not found: {cluster}")))
    }

    async fn list_services(
        &self,
        cluster: &str,
        next_token: Option<String>,
    ) -> ProviderResult<Page<String>> {
        self.delay().await;
        let services = {
            let state = self.lock();
            Self::check(&state, cluster)?;
            state
                .clusters
                .get(cluster)
                .map(|(_, services)| services.keys().cloned().collect::<Vec<_>>())
                .ok_or_else(|| ProviderError::new(format!("cluster not found: {cluster}")))?
        };
        paginate(services, next_token)
    }

    async fn desired_count(&self, cluster: &str, service: &str) -> ProviderResult<Option<u32>> {
        self.delay().await;
        let state = self.lock();
        Self::check(&state, cluster)?;
        Ok(state
            .clusters
            .get(cluster)
            .and_then(|(_, services)| services.get(service).copied()))
    }

    async fn update_desired_count(
        &self,
        cluster: &str,
        service: &str,
        count: u32,
    ) -> ProviderResult<()> {
        self.delay().await;
        let mut state = self.lock();
        Self::check(&state, cluster)?;
        let slot = state
            .clusters
            .get_mut(cluster)
            .and_then(|(_, services)| services.get_mut(service))
            .ok_or_else(|| ProviderError::new(format!("service not found: {cluster}/{service}")))?;
        *slot = count;
        state
            .calls
            .push(format!("update_service:{cluster}/{service}={count}"));
        Ok(())
    }
}

#[async_trait]
impl DatabaseApi for SimulatedFleet {
    async fn describe_db_instances(&self, marker: Option<String>) -> ProviderResult<Page<String>> {
        self.delay().await;
        let ids: Vec<String> = self.lock().databases.keys().cloned().collect();
        paginate(ids, marker)
    }

    async fn list_db_tags(&self, id: &str) -> ProviderResult<HashMap<String, String>> {
        self.delay().await;
        let state = self.lock();
        Self::check(&state, id)?;
        state
            .databases
            .get(id)
            .map(|(tags, _)| tags.clone())
            .ok_or_else(|| ProviderError::new(format!("db instance not found: {id}")))
    }

    async fn start_db_instance(&self, id: &str) -> ProviderResult<()> {
        self.set_database(id, true, "start_db_instance").await
    }

    async fn stop_db_instance(&self, id: &str) -> ProviderResult<()> {
        self.set_database(id, false, "stop_db_instance").await
    }
}

impl SimulatedFleet {
    async fn set_database(&self, id: &str, running: bool, op: &str) -> ProviderResult<()> {
        self.delay().await;
        let mut state = self.lock();
        Self::check(&state, id)?;
        let entry = state
            .databases
            .get_mut(id)
            .ok_or_else(|| ProviderError::new(format!("db instance not found: {id}")))?;
        entry.1 = running;
        state.calls.push(format!("{op}:{id}"));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FLEET: &str = r#"
instances:
  - id: i-1
    tags: { env: dev }
  - id: i-2
    tags: { env: prod }
    running: true
clusters:
  - id: c-1
    tags: { env: dev }
    services:
      - { name: web, desired_count: 3 }
databases:
  - id: db-1
    tags: { env: dev }
"#;

    fn fleet() -> SimulatedFleet {
        SimulatedFleet::new(serde_yaml::from_str(FLEET).unwrap())
    }

    #[tokio::test]
    async fn describe_instances_filters_by_tag() {
        let f = fleet();
        let ids = f.describe_instances(&[Tag::new("env", "dev")]).await.unwrap();
        assert_eq!(ids, vec!["i-1".to_string()]);
        let all = f.describe_instances(&[]).await.unwrap();
        assert_eq!(all.len(), 2);
    }

    #[tokio::test]
    async fn batch_start_is_all_or_nothing() {
        let f = fleet();
        f.fail_on("i-2");
        let err = f
            .start_instances(&["i-1".into(), "i-2".into()])
            .await
            .unwrap_err();
        assert!(err.message.contains("i-2"));
        assert_eq!(f.instance_running("i-1"), Some(false));
    }

    #[tokio::test]
    async fn pagination_walks_every_page() {
        let spec = FleetSpec {
            clusters: (0..23)
                .map(|n| ClusterSpec {
                    id: format!("c-{n:02}"),
                    tags: BTreeMap::new(),
                    services: vec![],
                })
                .collect(),
            ..Default::default()
        };
        let f = SimulatedFleet::new(spec);
        let mut token = None;
        let mut seen = 0;
        loop {
            let page = f.list_clusters(token).await.unwrap();
            seen += page.items.len();
            match page.next_token {
                Some(t) => token = Some(t),
                None => break,
            }
        }
        assert_eq!(seen, 23);
    }

    #[tokio::test]
    async fn desired_count_updates_are_recorded() {
        let f = fleet();
        f.update_desired_count("c-1", "web", 0).await.unwrap();
        assert_eq!(f.service_desired("c-1", "web"), Some(0));
        assert_eq!(f.calls(), vec!["update_service:c-1/web=0".to_string()]);
    }
}
