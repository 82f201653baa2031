mod cmd;
mod output;

use clap::{Parser, Subcommand};
use cmd::{
    action::ActionSubcommand, config::ConfigSubcommand, group::GroupSubcommand, run::RunKind,
};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "cloudtoggle",
    about = "Start and stop groups of cloud resources on demand or on a schedule",
    version,
    propagate_version = true
)]
struct Cli {
    /// Config file
    #[arg(
        long,
        global = true,
        env = "CLOUDTOGGLE_CONFIG",
        default_value = cloudtoggle_core::config::CONFIG_FILE
    )]
    config: PathBuf,

    /// Override `data_dir` from the config file
    #[arg(long, global = true, env = "CLOUDTOGGLE_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP API and the schedule driver
    Serve {
        /// Listen port (overrides server.port)
        #[arg(long)]
        port: Option<u16>,
        /// Listen address (overrides server.host)
        #[arg(long)]
        host: Option<String>,
    },

    /// Manage resource groups
    Group {
        #[command(subcommand)]
        subcommand: GroupSubcommand,
    },

    /// Inspect recorded actions
    Action {
        #[command(subcommand)]
        subcommand: ActionSubcommand,
    },

    /// Start or stop a group from this process
    Run {
        /// start or stop
        #[arg(value_enum)]
        kind: RunKind,
        /// Group id
        group: String,
        /// Print every binding outcome and exit non-zero if the action failed
        #[arg(long)]
        wait: bool,
        /// Seconds to wait for the action to finish
        #[arg(long, default_value_t = 300)]
        timeout: u64,
    },

    /// Inspect and validate the config file
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },

    /// Show the cron expression for HH:MM (or a cron spec) and its next fire times
    Cron {
        /// "HH:MM" or a six-field cron expression
        spec: String,
        /// Number of upcoming fire times to print
        #[arg(long, short = 'n', default_value_t = 3)]
        count: usize,
        /// IANA timezone (defaults to scheduler.timezone)
        #[arg(long)]
        timezone: Option<String>,
    },
}

fn main() {
    let cli = Cli::parse();

    let default_level = match &cli.command {
        Commands::Serve { .. } | Commands::Run { .. } => tracing::Level::INFO,
        _ => tracing::Level::WARN,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let ctx = cmd::Context {
        config_path: cli.config,
        data_dir: cli.data_dir,
        json: cli.json,
    };

    let result = match cli.command {
        Commands::Serve { port, host } => cmd::serve::run(&ctx, host, port),
        Commands::Group { subcommand } => cmd::group::run(&ctx, subcommand),
        Commands::Action { subcommand } => cmd::action::run(&ctx, subcommand),
        Commands::Run {
            kind,
            group,
            wait,
            timeout,
        } => cmd::run::run(&ctx, kind, &group, wait, timeout),
        Commands::Config { subcommand } => cmd::config::run(&ctx, subcommand),
        Commands::Cron {
            spec,
            count,
            timezone,
        } => cmd::cron::run(&ctx, &spec, count, timezone.as_deref()),
    };

    if let Err(e) = result {
        // Print the full error chain (anyhow's alternate Display)
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
