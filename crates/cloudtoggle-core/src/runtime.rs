//! Wires configuration into a running engine: provider backend, controller
//! registry, group repository, action tracker, orchestrator and scheduler.

use std::sync::Arc;

use tracing::info;

use crate::config::{Config, ProviderBackend};
use crate::controller::{
    ComputeController, ContainerController, ControllerRegistry, DatabaseController,
};
use crate::error::Result;
use crate::group::{FileGroupRepository, GroupRepository};
use crate::io;
use crate::orchestrator::{ActionDb, ActionTracker, GroupOrchestrator, OrchestratorOptions};
use crate::provider::{FleetSpec, SimulatedFleet};
use crate::scheduler::Scheduler;

pub const ACTIONS_DB_FILE: &str = "actions.redb";

pub struct Runtime {
    pub config: Config,
    pub fleet: Arc<SimulatedFleet>,
    pub groups: Arc<dyn GroupRepository>,
    pub registry: Arc<ControllerRegistry>,
    pub tracker: Arc<ActionTracker>,
    pub orchestrator: Arc<GroupOrchestrator>,
    pub scheduler: Arc<Scheduler>,
}

/// Load the fleet for the configured backend.
pub fn load_fleet(config: &Config) -> Result<SimulatedFleet> {
    match config.provider.backend {
        ProviderBackend::Simulated => {
            let spec = match &config.provider.fleet_file {
                Some(path) => FleetSpec::load(path)?,
                None => FleetSpec::default(),
            };
            info!(
                instances = spec.instances.len(),
                clusters = spec.clusters.len(),
                databases = spec.databases.len(),
                "simulated fleet loaded"
            );
            Ok(SimulatedFleet::new(spec))
        }
    }
}

/// One controller per supported resource kind, all backed by `fleet`.
pub fn build_registry(fleet: Arc<SimulatedFleet>) -> ControllerRegistry {
    ControllerRegistry::builder()
        .with(Arc::new(ComputeController::new(fleet.clone())))
        .with(Arc::new(ContainerController::new(fleet.clone())))
        .with(Arc::new(DatabaseController::new(fleet)))
        .build()
}

impl Runtime {
    /// Open the on-disk stores under `config.data_dir` and recover actions
    /// left unfinished by a previous process.
    pub fn open(config: Config) -> Result<Self> {
        io::ensure_dir(&config.data_dir)?;
        let fleet = Arc::new(load_fleet(&config)?);
        let groups: Arc<dyn GroupRepository> =
            Arc::new(FileGroupRepository::new(&config.data_dir));
        let tracker = Arc::new(ActionTracker::new(Arc::new(ActionDb::open(
            &config.actions_db_path(),
        )?)));
        tracker.startup_recovery()?;
        Self::assemble(config, fleet, groups, tracker)
    }

    /// Build the engine from already-constructed stores.
    pub fn assemble(
        config: Config,
        fleet: Arc<SimulatedFleet>,
        groups: Arc<dyn GroupRepository>,
        tracker: Arc<ActionTracker>,
    ) -> Result<Self> {
        let registry = Arc::new(build_registry(fleet.clone()));
        let orchestrator = Arc::new(GroupOrchestrator::new(
            groups.clone(),
            registry.clone(),
            tracker.clone(),
            OrchestratorOptions {
                controller_timeout: config.orchestrator.controller_timeout(),
                max_concurrent_actions: config.orchestrator.max_concurrent_actions,
                serialize_group_actions: config.orchestrator.serialize_group_actions,
            },
        ));
        let scheduler = Arc::new(
            Scheduler::new(orchestrator.clone())
                .with_timezone(config.scheduler.timezone()?)
                .with_tick_interval(config.scheduler.tick_interval()),
        );
        Ok(Self {
            config,
            fleet,
            groups,
            registry,
            tracker,
            orchestrator,
            scheduler,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::group::NewGroup;
    use crate::orchestrator::{ActionStatus, ActionTrigger, INTERRUPTED_REASON};
    use crate::types::{ActionKind, ResourceBinding, ResourceKind, TagSelector};
    use std::time::Duration;
    use tempfile::TempDir;

    #[test]
    fn registry_covers_every_kind() {
        let registry = build_registry(Arc::new(SimulatedFleet::new(FleetSpec::default())));
        assert_eq!(
            registry.kinds(),
            vec![
                ResourceKind::compute(),
                ResourceKind::container(),
                ResourceKind::database()
            ]
        );
    }

    #[test]
    fn invalid_timezone_is_rejected() {
        let mut config = Config::default();
        config.scheduler.timezone = "Nowhere/Special".into();
        let result = Runtime::assemble(
            config,
            Arc::new(SimulatedFleet::new(FleetSpec::default())),
            Arc::new(FileGroupRepository::new(std::path::Path::new("."))),
            Arc::new(ActionTracker::in_memory()),
        );
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn open_runs_a_group_against_the_fleet_file() {
        let dir = TempDir::new().unwrap();
        let fleet_path = dir.path().join("fleet.yaml");
        std::fs::write(
            &fleet_path,
            "instances:\n  - { id: i-1, tags: { env: dev }, running: false }\n",
        )
        .unwrap();

        let mut config = Config::default();
        config.data_dir = dir.path().join("data");
        config.provider.fleet_file = Some(fleet_path);
        let rt = Runtime::open(config).unwrap();

        let group = rt
            .groups
            .add_group(NewGroup {
                name: "dev".into(),
                status: "active".into(),
                resources: vec![ResourceBinding::new("EC2", TagSelector::single("env", "dev"))],
            })
            .unwrap();
        let id = rt.orchestrator.execute(&group.id, ActionKind::Start).unwrap();
        let action = rt
            .tracker
            .wait_terminal(id, Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(action.status, ActionStatus::Succeeded);
        assert_eq!(rt.fleet.instance_running("i-1"), Some(true));
        assert!(dir.path().join("data").join(ACTIONS_DB_FILE).exists());
    }

    #[test]
    fn reopen_fails_actions_left_unfinished() {
        let dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.data_dir = dir.path().to_path_buf();

        let id = {
            let rt = Runtime::open(config.clone()).unwrap();
            let id = rt
                .tracker
                .create("1", ActionKind::Start, ActionTrigger::Manual)
                .unwrap();
            rt.tracker.mark_running(id).unwrap();
            id
        };

        let rt = Runtime::open(config).unwrap();
        assert_eq!(
            rt.tracker.get_status(id).unwrap(),
            ActionStatus::Failed {
                reason: INTERRUPTED_REASON.into()
            }
        );
    }
}
