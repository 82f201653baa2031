//! Action lifecycle bookkeeping.
//!
//! `ActionTracker` owns every status transition. It serializes
//! read-modify-write cycles so that a status only ever moves forward, no
//! matter how many tasks report on the same action.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{Result, ToggleError};
use crate::types::ActionKind;

use super::action::{Action, ActionStatus, ActionTrigger, BindingOutcome};

/// Poll interval used by [`ActionTracker::wait_terminal`].
const WAIT_POLL: Duration = Duration::from_millis(25);

/// Reason recorded on actions abandoned by a previous process.
pub const INTERRUPTED_REASON: &str = "interrupted by restart";

// ---------------------------------------------------------------------------
// ActionStore
// ---------------------------------------------------------------------------

/// Keyed storage for action records.
pub trait ActionStore: Send + Sync {
    fn insert(&self, action: &Action) -> Result<()>;

    fn update(&self, action: &Action) -> Result<()>;

    /// `ActionNotFound` when no record exists for `id`.
    fn get(&self, id: Uuid) -> Result<Action>;

    /// All records, newest first.
    fn list_all(&self) -> Result<Vec<Action>>;
}

/// Process-local store. Records are lost on restart.
#[derive(Default)]
pub struct InMemoryActionStore {
    actions: RwLock<HashMap<Uuid, Action>>,
}

impl InMemoryActionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ActionStore for InMemoryActionStore {
    fn insert(&self, action: &Action) -> Result<()> {
        self.actions
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(action.id, action.clone());
        Ok(())
    }

    fn update(&self, action: &Action) -> Result<()> {
        self.insert(action)
    }

    fn get(&self, id: Uuid) -> Result<Action> {
        self.actions
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&id)
            .cloned()
            .ok_or_else(|| ToggleError::ActionNotFound(id.to_string()))
    }

    fn list_all(&self) -> Result<Vec<Action>> {
        let mut all: Vec<Action> = self
            .actions
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .cloned()
            .collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(all)
    }
}

/// Parse a caller-supplied action id. Malformed ids cannot name an action,
/// so they are reported as not found.
pub fn parse_action_id(raw: &str) -> Result<Uuid> {
    Uuid::parse_str(raw.trim()).map_err(|_| ToggleError::ActionNotFound(raw.to_string()))
}

// ---------------------------------------------------------------------------
// ActionTracker
// ---------------------------------------------------------------------------

pub struct ActionTracker {
    store: Arc<dyn ActionStore>,
    transitions: Mutex<()>,
}

impl ActionTracker {
    pub fn new(store: Arc<dyn ActionStore>) -> Self {
        Self {
            store,
            transitions: Mutex::new(()),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryActionStore::new()))
    }

    /// Record a new `Dispatched` action and return its id.
    pub fn create(&self, group_id: &str, kind: ActionKind, trigger: ActionTrigger) -> Result<Uuid> {
        let action = Action::new(group_id, kind, trigger);
        self.store.insert(&action)?;
        debug!(action_id = %action.id, group_id, %kind, "action recorded");
        Ok(action.id)
    }

    pub fn get(&self, id: Uuid) -> Result<Action> {
        self.store.get(id)
    }

    pub fn get_status(&self, id: Uuid) -> Result<ActionStatus> {
        Ok(self.store.get(id)?.status)
    }

    /// Most recent actions first, optionally capped at `limit`.
    pub fn list(&self, limit: Option<usize>) -> Result<Vec<Action>> {
        let mut all = self.store.list_all()?;
        if let Some(n) = limit {
            all.truncate(n);
        }
        Ok(all)
    }

    pub fn mark_running(&self, id: Uuid) -> Result<()> {
        self.transition(id, ActionStatus::Running, None)
    }

    /// Record the per-binding outcomes and move the action to its
    /// aggregated terminal state.
    pub fn finish(&self, id: Uuid, outcomes: Vec<BindingOutcome>) -> Result<ActionStatus> {
        let status = ActionStatus::aggregate(&outcomes);
        self.transition(id, status.clone(), Some(outcomes))?;
        Ok(status)
    }

    pub fn fail(&self, id: Uuid, reason: impl Into<String>) -> Result<()> {
        self.transition(
            id,
            ActionStatus::Failed {
                reason: reason.into(),
            },
            None,
        )
    }

    fn transition(
        &self,
        id: Uuid,
        next: ActionStatus,
        outcomes: Option<Vec<BindingOutcome>>,
    ) -> Result<()> {
        let _guard = self.transitions.lock().unwrap_or_else(|e| e.into_inner());
        let mut action = self.store.get(id)?;
        if !action.status.can_transition_to(&next) {
            return Err(ToggleError::InvalidTransition {
                from: action.status.label().to_string(),
                to: next.label().to_string(),
                reason: format!("action {id} cannot move backwards or leave a terminal state"),
            });
        }
        debug!(action_id = %id, from = action.status.label(), to = next.label(), "action transition");
        action.status = next;
        if let Some(outcomes) = outcomes {
            action.bindings = outcomes;
        }
        action.updated_at = Utc::now();
        self.store.update(&action)
    }

    /// Fail every non-terminal action. Returns the number of actions
    /// recovered.
    ///
    /// Run once at startup, before anything new is dispatched. The store is
    /// held exclusively by this process, so records left in `Dispatched` or
    /// `Running` belong to a process that is gone and will never be
    /// finished by anyone else.
    pub fn startup_recovery(&self) -> Result<u32> {
        let mut recovered = 0u32;
        for action in self.store.list_all()? {
            if action.status.is_terminal() {
                continue;
            }
            match self.fail(action.id, INTERRUPTED_REASON) {
                Ok(()) => recovered += 1,
                Err(e) => warn!(action_id = %action.id, error = %e, "failed to recover action"),
            }
        }
        if recovered > 0 {
            info!(recovered, "recovered interrupted actions");
        }
        Ok(recovered)
    }

    /// Wait until the action reaches a terminal state or `timeout` elapses.
    /// Returns the last observed record either way.
    pub async fn wait_terminal(&self, id: Uuid, timeout: Duration) -> Result<Action> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let store = Arc::clone(&self.store);
            let action = tokio::task::spawn_blocking(move || store.get(id))
                .await
                .map_err(|e| ToggleError::Store(format!("blocking task failed: {e}")))??;
            if action.status.is_terminal() || tokio::time::Instant::now() >= deadline {
                return Ok(action);
            }
            tokio::time::sleep(WAIT_POLL).await;
        }
    }
}
