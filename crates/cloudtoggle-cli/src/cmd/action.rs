use crate::cmd::Context;
use crate::output::{print_json, print_table};
use clap::Subcommand;
use cloudtoggle_core::orchestrator::{
    parse_action_id, Action, ActionDb, ActionStatus, ActionTracker, ActionTrigger, BindingResult,
};
use std::sync::Arc;

// ---------------------------------------------------------------------------
// Subcommand types
// ---------------------------------------------------------------------------

#[derive(Subcommand)]
pub enum ActionSubcommand {
    /// List recent actions, newest first
    List {
        /// Maximum number of actions to show
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },

    /// Show one action with its per-binding outcomes
    Show {
        /// Action id (UUID)
        id: String,
    },
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

pub fn run(ctx: &Context, subcmd: ActionSubcommand) -> anyhow::Result<()> {
    let config = ctx.load_config()?;
    cloudtoggle_core::io::ensure_dir(&config.data_dir)?;
    let tracker = ActionTracker::new(Arc::new(ActionDb::open(&config.actions_db_path())?));
    match subcmd {
        ActionSubcommand::List { limit } => list(&tracker, limit, ctx.json),
        ActionSubcommand::Show { id } => {
            let action = tracker.get(parse_action_id(&id)?)?;
            if ctx.json {
                print_json(&action)
            } else {
                print_action(&action);
                Ok(())
            }
        }
    }
}

fn list(tracker: &ActionTracker, limit: usize, json: bool) -> anyhow::Result<()> {
    let actions = tracker.list(Some(limit))?;
    if json {
        return print_json(&actions);
    }
    if actions.is_empty() {
        println!("No actions recorded.");
        return Ok(());
    }
    let rows = actions
        .iter()
        .map(|a| {
            vec![
                a.id.to_string(),
                a.group_id.clone(),
                a.kind.to_string(),
                trigger_label(a.trigger).to_string(),
                a.status.label().to_string(),
                a.created_at.format("%Y-%m-%d %H:%M:%S").to_string(),
            ]
        })
        .collect();
    print_table(
        &["ID", "GROUP", "KIND", "TRIGGER", "STATUS", "CREATED (UTC)"],
        rows,
    );
    Ok(())
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

fn trigger_label(trigger: ActionTrigger) -> &'static str {
    match trigger {
        ActionTrigger::Manual => "manual",
        ActionTrigger::Scheduled => "scheduled",
    }
}

/// Human-readable action summary followed by one row per binding.
pub fn print_action(action: &Action) {
    println!("Action:  {}", action.id);
    println!("Group:   {}", action.group_id);
    println!("Kind:    {} ({})", action.kind, trigger_label(action.trigger));
    match &action.status {
        ActionStatus::Failed { reason } => println!("Status:  failed: {reason}"),
        status => println!("Status:  {}", status.label()),
    }
    println!("Updated: {}", action.updated_at.to_rfc3339());

    if action.bindings.is_empty() {
        return;
    }
    println!();
    let rows = action
        .bindings
        .iter()
        .map(|b| {
            let (result, detail) = match &b.result {
                BindingResult::Succeeded => ("succeeded", String::new()),
                BindingResult::Skipped { reason } => ("skipped", reason.clone()),
                BindingResult::Failed { error } => ("failed", error.to_string()),
            };
            vec![
                b.kind.to_string(),
                b.selector.to_string(),
                b.resolved.join(","),
                result.to_string(),
                detail,
            ]
        })
        .collect();
    print_table(&["TYPE", "TAGS", "RESOURCES", "RESULT", "DETAIL"], rows);
}
