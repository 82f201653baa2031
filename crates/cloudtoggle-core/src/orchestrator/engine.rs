//! Group start/stop orchestration.
//!
//! `execute` records a `Dispatched` action and returns its id immediately.
//! The rest happens in a supervised background task:
//!
//! 1. mark the action `Running`
//! 2. load the group's bindings (a missing group fails the action)
//! 3. for each binding, look up the controller, resolve ids by tag and
//!    apply the transition under a deadline
//! 4. write the aggregated terminal status
//!
//! Bindings are processed in declaration order and a failing binding never
//! stops the remaining ones. Store and repository calls go through the
//! blocking pool.
//!
//! With `serialize_group_actions`, an action waits for its group's lock
//! before taking a concurrency permit.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::controller::ControllerRegistry;
use crate::error::{Result, ToggleError};
use crate::group::GroupRepository;
use crate::types::{ActionKind, ResourceBinding};

use super::action::{ActionTrigger, BindingOutcome};
use super::supervisor::{TaskSupervisor, DEFAULT_MAX_CONCURRENT_ACTIONS};
use super::tracker::ActionTracker;

pub const DEFAULT_CONTROLLER_TIMEOUT: Duration = Duration::from_secs(120);

/// Anything that can turn a (group, kind) request into a tracked action.
pub trait ActionDispatcher: Send + Sync {
    fn dispatch(&self, group_id: &str, kind: ActionKind, trigger: ActionTrigger) -> Result<Uuid>;
}

#[derive(Debug, Clone)]
pub struct OrchestratorOptions {
    /// Deadline for resolving and transitioning one binding.
    pub controller_timeout: Duration,
    pub max_concurrent_actions: usize,
    /// Run actions for the same group one at a time.
    pub serialize_group_actions: bool,
}

impl Default for OrchestratorOptions {
    fn default() -> Self {
        Self {
            controller_timeout: DEFAULT_CONTROLLER_TIMEOUT,
            max_concurrent_actions: DEFAULT_MAX_CONCURRENT_ACTIONS,
            serialize_group_actions: false,
        }
    }
}

#[derive(Default)]
struct GroupLocks {
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl GroupLocks {
    fn lock_for(&self, group_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        self.locks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entry(group_id.to_string())
            .or_default()
            .clone()
    }
}

struct Shared {
    groups: Arc<dyn GroupRepository>,
    registry: Arc<ControllerRegistry>,
    tracker: Arc<ActionTracker>,
    options: OrchestratorOptions,
    group_locks: GroupLocks,
    /// Parent of every per-binding deadline token.
    shutdown: CancellationToken,
}

pub struct GroupOrchestrator {
    shared: Arc<Shared>,
    supervisor: TaskSupervisor,
}

impl GroupOrchestrator {
    pub fn new(
        groups: Arc<dyn GroupRepository>,
        registry: Arc<ControllerRegistry>,
        tracker: Arc<ActionTracker>,
        options: OrchestratorOptions,
    ) -> Self {
        let supervisor = TaskSupervisor::new(tracker.clone(), options.max_concurrent_actions);
        Self {
            shared: Arc::new(Shared {
                groups,
                registry,
                tracker,
                options,
                group_locks: GroupLocks::default(),
                shutdown: CancellationToken::new(),
            }),
            supervisor,
        }
    }

    pub fn tracker(&self) -> &Arc<ActionTracker> {
        &self.shared.tracker
    }

    pub fn registry(&self) -> &Arc<ControllerRegistry> {
        &self.shared.registry
    }

    /// Cancel every in-flight controller call. Bindings still running fail
    /// with a cancellation error; actions dispatched afterwards fail the
    /// same way.
    pub fn shutdown(&self) {
        self.shared.shutdown.cancel();
    }

    /// Dispatch a manual start/stop for `group_id`. Must be called from
    /// within a Tokio runtime. The action record is written before this
    /// returns, so async callers run it on the blocking pool.
    pub fn execute(&self, group_id: &str, kind: ActionKind) -> Result<Uuid> {
        self.dispatch(group_id, kind, ActionTrigger::Manual)
    }
}

impl ActionDispatcher for GroupOrchestrator {
    fn dispatch(&self, group_id: &str, kind: ActionKind, trigger: ActionTrigger) -> Result<Uuid> {
        let id = self.shared.tracker.create(group_id, kind, trigger)?;
        info!(action_id = %id, group_id, %kind, ?trigger, "action dispatched");
        let lock = self
            .shared
            .options
            .serialize_group_actions
            .then(|| self.shared.group_locks.lock_for(group_id));
        self.supervisor.submit_serialized(
            id,
            lock,
            run_action(self.shared.clone(), id, group_id.to_string(), kind),
        );
        Ok(id)
    }
}

/// Run a store or repository call on the blocking pool.
async fn blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ToggleError::Store(format!("blocking task failed: {e}")))?
}

async fn run_action(shared: Arc<Shared>, action_id: Uuid, group_id: String, kind: ActionKind) {
    let tracker = shared.tracker.clone();
    if let Err(e) = blocking(move || tracker.mark_running(action_id)).await {
        error!(action_id = %action_id, error = %e, "failed to mark action running");
        return;
    }

    let groups = shared.groups.clone();
    let gid = group_id.clone();
    let bindings = match blocking(move || groups.get_bindings(&gid)).await {
        Ok(b) => b,
        Err(e) => {
            warn!(action_id = %action_id, group_id = %group_id, error = %e, "cannot load group");
            let tracker = shared.tracker.clone();
            let reason = e.to_string();
            if let Err(e) = blocking(move || tracker.fail(action_id, reason)).await {
                error!(action_id = %action_id, error = %e, "failed to record action failure");
            }
            return;
        }
    };

    info!(
        action_id = %action_id,
        group_id = %group_id,
        %kind,
        bindings = bindings.len(),
        "processing group"
    );

    let mut outcomes = Vec::with_capacity(bindings.len());
    for binding in &bindings {
        outcomes.push(apply_binding(&shared, binding, kind).await);
    }

    let tracker = shared.tracker.clone();
    match blocking(move || tracker.finish(action_id, outcomes)).await {
        Ok(status) => info!(
            action_id = %action_id,
            group_id = %group_id,
            status = status.label(),
            "action finished"
        ),
        Err(e) => error!(action_id = %action_id, error = %e, "failed to record action result"),
    }
}

async fn apply_binding(
    shared: &Shared,
    binding: &ResourceBinding,
    kind: ActionKind,
) -> BindingOutcome {
    let Some(controller) = shared.registry.get(&binding.kind) else {
        let reason = ToggleError::UnknownResourceKind(binding.kind.to_string());
        warn!(resource_kind = %binding.kind, "skipping binding: {reason}");
        return BindingOutcome::skipped(binding, reason.to_string());
    };

    let cancel = shared.shutdown.child_token();
    let deadline = {
        let cancel = cancel.clone();
        let timeout = shared.options.controller_timeout;
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            cancel.cancel();
        })
    };

    let ids = match controller.resolve_by_tag(&binding.tags, &cancel).await {
        Ok(ids) => ids,
        Err(e) => {
            deadline.abort();
            warn!(resource_kind = %binding.kind, selector = %binding.tags, error = %e, "resolve failed");
            return BindingOutcome::failed(binding, Vec::new(), e);
        }
    };

    if ids.is_empty() {
        deadline.abort();
        info!(resource_kind = %binding.kind, selector = %binding.tags, "no matching resources");
        return BindingOutcome::skipped(binding, "no matching resources");
    }

    let result = match kind {
        ActionKind::Start => controller.start(&ids, &cancel).await,
        ActionKind::Stop => controller.stop(&ids, &cancel).await,
    };
    deadline.abort();

    match result {
        Ok(()) => {
            info!(resource_kind = %binding.kind, ?ids, %kind, "binding applied");
            BindingOutcome::succeeded(binding, ids)
        }
        Err(e) => {
            warn!(
                resource_kind = %binding.kind,
                unconfirmed = ?e.unconfirmed,
                error = %e,
                "binding failed"
            );
            BindingOutcome::failed(binding, ids, e)
        }
    }
}
