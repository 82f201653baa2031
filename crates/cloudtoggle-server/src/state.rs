use std::sync::Arc;

use cloudtoggle_core::group::GroupRepository;
use cloudtoggle_core::orchestrator::{ActionTracker, GroupOrchestrator};
use cloudtoggle_core::runtime::Runtime;
use cloudtoggle_core::scheduler::Scheduler;

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub groups: Arc<dyn GroupRepository>,
    pub tracker: Arc<ActionTracker>,
    pub orchestrator: Arc<GroupOrchestrator>,
    pub scheduler: Arc<Scheduler>,
}

impl AppState {
    pub fn new(runtime: &Runtime) -> Self {
        Self {
            groups: runtime.groups.clone(),
            tracker: runtime.tracker.clone(),
            orchestrator: runtime.orchestrator.clone(),
            scheduler: runtime.scheduler.clone(),
        }
    }
}
