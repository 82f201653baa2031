use crate::cmd::Context;
use crate::output::print_json;
use clap::Subcommand;
use cloudtoggle_core::config::{Config, WarnLevel};

// ---------------------------------------------------------------------------
// Subcommand types
// ---------------------------------------------------------------------------

#[derive(Subcommand)]
pub enum ConfigSubcommand {
    /// Print the effective config (file values plus defaults)
    Show,

    /// Validate the config for common mistakes
    Validate,

    /// Write a config file with every default spelled out
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Generate a random API token to export in the configured token variable
    Token {
        /// Token length
        #[arg(long, default_value_t = 32)]
        length: usize,
    },
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

pub fn run(ctx: &Context, subcmd: ConfigSubcommand) -> anyhow::Result<()> {
    match subcmd {
        ConfigSubcommand::Show => show(ctx),
        ConfigSubcommand::Validate => validate(ctx),
        ConfigSubcommand::Init { force } => init(ctx, force),
        ConfigSubcommand::Token { length } => token(ctx, length),
    }
}

fn show(ctx: &Context) -> anyhow::Result<()> {
    let config = ctx.load_config()?;
    if ctx.json {
        print_json(&config)
    } else {
        print!("{}", serde_yaml::to_string(&config)?);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// validate
// ---------------------------------------------------------------------------

fn validate(ctx: &Context) -> anyhow::Result<()> {
    let config = ctx.load_config()?;
    let warnings = config.validate();

    if ctx.json {
        let value = serde_json::json!({
            "warnings": warnings,
        });
        print_json(&value)?;
    } else if warnings.is_empty() {
        println!("Config is valid. No warnings.");
    } else {
        for w in &warnings {
            let prefix = match w.level {
                WarnLevel::Warning => "warning",
                WarnLevel::Error => "error",
            };
            println!("[{prefix}] {}", w.message);
        }
    }

    let has_errors = warnings.iter().any(|w| w.level == WarnLevel::Error);
    if has_errors {
        anyhow::bail!("config validation found errors");
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// init / token
// ---------------------------------------------------------------------------

fn init(ctx: &Context, force: bool) -> anyhow::Result<()> {
    let path = &ctx.config_path;
    if path.exists() && !force {
        anyhow::bail!(
            "{} already exists (use --force to overwrite)",
            path.display()
        );
    }
    Config::default().save(path)?;
    if ctx.json {
        print_json(&serde_json::json!({ "path": path }))?;
    } else {
        println!("Wrote {}", path.display());
    }
    Ok(())
}

fn token(ctx: &Context, length: usize) -> anyhow::Result<()> {
    if length < 16 {
        anyhow::bail!("token length must be at least 16");
    }
    let token = generate_token(length);
    if ctx.json {
        print_json(&serde_json::json!({ "token": token }))
    } else {
        println!("{token}");
        Ok(())
    }
}

/// Generate a random alphanumeric token.
pub fn generate_token(length: usize) -> String {
    use rand::{distributions::Alphanumeric, Rng};
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(length)
        .map(char::from)
        .collect()
}
