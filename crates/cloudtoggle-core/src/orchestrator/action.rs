//! Action data model.
//!
//! An `Action` is one start/stop invocation against a group. It is created
//! in `Dispatched` state when the request is accepted and is driven to a
//! terminal state by the detached orchestration task.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::controller::ControllerError;
use crate::types::{ActionKind, ResourceBinding, ResourceKind, TagSelector};

// ---------------------------------------------------------------------------
// ActionTrigger
// ---------------------------------------------------------------------------

/// What caused the action to be dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionTrigger {
    Manual,
    Scheduled,
}

// ---------------------------------------------------------------------------
// ActionStatus
// ---------------------------------------------------------------------------

/// Lifecycle state of an action.
///
/// Transitions: `Dispatched → Running → Succeeded | Failed`, plus
/// `Dispatched → Failed` for faults before processing starts. No state is
/// ever revisited and terminal states are final.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActionStatus {
    Dispatched,
    Running,
    Succeeded,
    Failed { reason: String },
}

impl ActionStatus {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Dispatched => "dispatched",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed { .. } => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed { .. })
    }

    pub fn can_transition_to(&self, next: &ActionStatus) -> bool {
        matches!(
            (self, next),
            (Self::Dispatched, Self::Running)
                | (Self::Dispatched, Self::Failed { .. })
                | (Self::Running, Self::Succeeded)
                | (Self::Running, Self::Failed { .. })
        )
    }

    /// Aggregate per-binding outcomes: any failed binding fails the action,
    /// skipped bindings count as success.
    pub fn aggregate(outcomes: &[BindingOutcome]) -> ActionStatus {
        let failed = outcomes.iter().filter(|o| o.is_failed()).count();
        if failed == 0 {
            ActionStatus::Succeeded
        } else {
            ActionStatus::Failed {
                reason: format!("{failed} of {} bindings failed", outcomes.len()),
            }
        }
    }
}

// ---------------------------------------------------------------------------
// BindingOutcome
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BindingResult {
    Succeeded,
    Skipped { reason: String },
    Failed { error: ControllerError },
}

/// What happened to one binding during an action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BindingOutcome {
    pub kind: ResourceKind,
    pub selector: TagSelector,
    #[serde(default)]
    pub resolved: Vec<String>,
    pub result: BindingResult,
}

impl BindingOutcome {
    pub fn succeeded(binding: &ResourceBinding, resolved: Vec<String>) -> Self {
        Self::with(binding, resolved, BindingResult::Succeeded)
    }

    pub fn skipped(binding: &ResourceBinding, reason: impl Into<String>) -> Self {
        Self::with(
            binding,
            Vec::new(),
            BindingResult::Skipped {
                reason: reason.into(),
            },
        )
    }

    pub fn failed(binding: &ResourceBinding, resolved: Vec<String>, error: ControllerError) -> Self {
        Self::with(binding, resolved, BindingResult::Failed { error })
    }

    fn with(binding: &ResourceBinding, resolved: Vec<String>, result: BindingResult) -> Self {
        Self {
            kind: binding.kind.clone(),
            selector: binding.tags.clone(),
            resolved,
            result,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.result, BindingResult::Failed { .. })
    }
}

// ---------------------------------------------------------------------------
// Action
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Action {
    pub id: Uuid,
    pub group_id: String,
    pub kind: ActionKind,
    pub trigger: ActionTrigger,
    pub status: ActionStatus,
    #[serde(default)]
    pub bindings: Vec<BindingOutcome>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Action {
    /// Create a new action in `Dispatched` state with a fresh v4 id.
    pub fn new(group_id: impl Into<String>, kind: ActionKind, trigger: ActionTrigger) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            group_id: group_id.into(),
            kind,
            trigger,
            status: ActionStatus::Dispatched,
            bindings: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TagSelector;

    fn binding() -> ResourceBinding {
        ResourceBinding::new("EC2", TagSelector::single("env", "dev"))
    }

    fn failure() -> ControllerError {
        ControllerError {
            kind: ResourceKind::compute(),
            message: "boom".into(),
            unconfirmed: vec!["i-1".into()],
        }
    }

    #[test]
    fn transitions_are_monotonic() {
        use ActionStatus::*;
        let failed = Failed {
            reason: "x".into(),
        };
        assert!(Dispatched.can_transition_to(&Running));
        assert!(Dispatched.can_transition_to(&failed));
        assert!(Running.can_transition_to(&Succeeded));
        assert!(Running.can_transition_to(&failed));

        assert!(!Dispatched.can_transition_to(&Succeeded));
        assert!(!Running.can_transition_to(&Dispatched));
        assert!(!Running.can_transition_to(&Running));
        assert!(!Succeeded.can_transition_to(&failed));
        assert!(!failed.can_transition_to(&Running));
    }

    #[test]
    fn aggregate_treats_skips_as_success() {
        let b = binding();
        let outcomes = vec![
            BindingOutcome::succeeded(&b, vec!["i-1".into()]),
            BindingOutcome::skipped(&b, "no matching resources"),
        ];
        assert_eq!(ActionStatus::aggregate(&outcomes), ActionStatus::Succeeded);
        assert_eq!(ActionStatus::aggregate(&[]), ActionStatus::Succeeded);
    }

    #[test]
    fn aggregate_fails_on_any_failed_binding() {
        let b = binding();
        let outcomes = vec![
            BindingOutcome::succeeded(&b, vec!["i-1".into()]),
            BindingOutcome::failed(&b, vec!["i-2".into()], failure()),
        ];
        match ActionStatus::aggregate(&outcomes) {
            ActionStatus::Failed { reason } => assert_eq!(reason, "1 of 2 bindings failed"),
            other => panic!("expected Failed, got {other:?}"),
        }
    }

    #[test]
    fn status_serializes_with_type_tag() {
        let json = serde_json::to_value(ActionStatus::Failed {
            reason: "nope".into(),
        })
        .unwrap();
        assert_eq!(json["type"], "failed");
        assert_eq!(json["reason"], "nope");
    }

    #[test]
    fn new_action_is_dispatched_with_unique_id() {
        let a = Action::new("1", ActionKind::Start, ActionTrigger::Manual);
        let b = Action::new("1", ActionKind::Start, ActionTrigger::Manual);
        assert_eq!(a.status, ActionStatus::Dispatched);
        assert_eq!(a.id.get_version_num(), 4);
        assert_ne!(a.id, b.id);
    }
}
