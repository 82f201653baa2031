use crate::cmd::action::print_action;
use crate::cmd::Context;
use crate::output::print_json;
use clap::ValueEnum;
use cloudtoggle_core::orchestrator::ActionStatus;
use cloudtoggle_core::runtime::Runtime;
use cloudtoggle_core::types::ActionKind;
use std::time::Duration;

#[derive(Clone, Copy, ValueEnum)]
pub enum RunKind {
    Start,
    Stop,
}

impl From<RunKind> for ActionKind {
    fn from(kind: RunKind) -> Self {
        match kind {
            RunKind::Start => ActionKind::Start,
            RunKind::Stop => ActionKind::Stop,
        }
    }
}

/// Dispatch one action through a local engine and let it finish.
///
/// The action runs inside this process, so the command always stays up until
/// the action is terminal or `timeout_secs` elapses. `wait` controls the
/// report: the full per-binding outcome and a non-zero exit on failure.
pub fn run(
    ctx: &Context,
    kind: RunKind,
    group_id: &str,
    wait: bool,
    timeout_secs: u64,
) -> anyhow::Result<()> {
    let config = ctx.load_config()?;
    let runtime = Runtime::open(config)?;
    // Unknown groups are rejected before an action is recorded.
    runtime.groups.get_group(group_id)?;

    let rt = tokio::runtime::Runtime::new()?;
    // Recording the action is synchronous; only the submit needs the runtime.
    let id = {
        let _guard = rt.enter();
        runtime.orchestrator.execute(group_id, kind.into())?
    };
    let action = rt.block_on(async {
        let action = runtime
            .tracker
            .wait_terminal(id, Duration::from_secs(timeout_secs))
            .await?;
        anyhow::Ok(action)
    })?;

    if ctx.json {
        print_json(&action)?;
    } else if wait {
        print_action(&action);
    } else {
        println!("{} {}", action.id, action.status.label());
    }

    match &action.status {
        ActionStatus::Succeeded => Ok(()),
        ActionStatus::Failed { reason } if wait => {
            anyhow::bail!("action {} failed: {reason}", action.id)
        }
        ActionStatus::Failed { .. } => Ok(()),
        _ => anyhow::bail!(
            "action {} still {} after {timeout_secs}s",
            action.id,
            action.status.label()
        ),
    }
}
