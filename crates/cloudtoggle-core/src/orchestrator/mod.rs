//! Action orchestration.
//!
//! `GroupOrchestrator` accepts start/stop requests, `ActionTracker` records
//! their lifecycle in an `ActionStore` (`ActionDb` on disk or
//! `InMemoryActionStore`), and `TaskSupervisor` runs the detached work.

pub mod action;
pub mod db;
pub mod engine;
pub mod supervisor;
pub mod tracker;

pub use action::{Action, ActionStatus, ActionTrigger, BindingOutcome, BindingResult};
pub use db::ActionDb;
pub use engine::{ActionDispatcher, GroupOrchestrator, OrchestratorOptions};
pub use supervisor::TaskSupervisor;
pub use tracker::{
    parse_action_id, ActionStore, ActionTracker, InMemoryActionStore, INTERRUPTED_REASON,
};
