pub mod action;
pub mod config;
pub mod cron;
pub mod group;
pub mod run;
pub mod serve;

use anyhow::Context as _;
use cloudtoggle_core::config::Config;
use std::path::PathBuf;

/// Global flags shared by every subcommand.
pub struct Context {
    pub config_path: PathBuf,
    pub data_dir: Option<PathBuf>,
    pub json: bool,
}

impl Context {
    /// Load the config file and apply `--data-dir`.
    pub fn load_config(&self) -> anyhow::Result<Config> {
        let mut config = Config::load(&self.config_path).with_context(|| {
            format!("failed to load config {}", self.config_path.display())
        })?;
        if let Some(dir) = &self.data_dir {
            config.data_dir = dir.clone();
        }
        Ok(config)
    }
}
