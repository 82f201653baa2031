use crate::error::Result;
use crate::scheduler::parse_timezone;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_FILE: &str = "cloudtoggle.yaml";
pub const DEFAULT_TOKEN_ENV: &str = "CLOUDTOGGLE_API_TOKEN";

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// ServerConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl ServerConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

// ---------------------------------------------------------------------------
// SchedulerConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
    #[serde(default = "default_timezone")]
    pub timezone: String,
}

fn default_tick_interval_ms() -> u64 {
    1000
}

fn default_timezone() -> String {
    "UTC".to_string()
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval_ms(),
            timezone: default_timezone(),
        }
    }
}

impl SchedulerConfig {
    /// Zero is clamped to 1ms; `validate` reports it.
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }

    pub fn timezone(&self) -> Result<Tz> {
        parse_timezone(&self.timezone)
    }
}

// ---------------------------------------------------------------------------
// OrchestratorConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    #[serde(default = "default_max_concurrent_actions")]
    pub max_concurrent_actions: usize,
    #[serde(default = "default_controller_timeout_secs")]
    pub controller_timeout_secs: u64,
    #[serde(default)]
    pub serialize_group_actions: bool,
}

fn default_max_concurrent_actions() -> usize {
    16
}

fn default_controller_timeout_secs() -> u64 {
    120
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_concurrent_actions: default_max_concurrent_actions(),
            controller_timeout_secs: default_controller_timeout_secs(),
            serialize_group_actions: false,
        }
    }
}

impl OrchestratorConfig {
    pub fn controller_timeout(&self) -> Duration {
        Duration::from_secs(self.controller_timeout_secs)
    }
}

// ---------------------------------------------------------------------------
// ProviderConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderBackend {
    #[default]
    Simulated,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default)]
    pub backend: ProviderBackend,
    /// Fleet description for the simulated backend. Without one the fleet
    /// starts empty.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fleet_file: Option<PathBuf>,
}

// ---------------------------------------------------------------------------
// AuthConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Name of the environment variable holding the API bearer token.
    #[serde(default = "default_token_env")]
    pub token_env: Option<String>,
}

fn default_token_env() -> Option<String> {
    Some(DEFAULT_TOKEN_ENV.to_string())
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            token_env: default_token_env(),
        }
    }
}

impl AuthConfig {
    /// The configured token, if the named variable is set and non-empty.
    pub fn resolve_token(&self) -> Option<String> {
        let var = self.token_env.as_deref()?;
        std::env::var(var)
            .ok()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
    }
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
    #[serde(default)]
    pub provider: ProviderConfig,
    #[serde(default)]
    pub auth: AuthConfig,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from(".cloudtoggle")
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            server: ServerConfig::default(),
            scheduler: SchedulerConfig::default(),
            orchestrator: OrchestratorConfig::default(),
            provider: ProviderConfig::default(),
            auth: AuthConfig::default(),
        }
    }
}

impl Config {
    /// Load from `path`. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let data = std::fs::read_to_string(path)?;
        if data.trim().is_empty() {
            return Ok(Self::default());
        }
        let cfg: Config = serde_yaml::from_str(&data)?;
        Ok(cfg)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let data = serde_yaml::to_string(self)?;
        crate::io::atomic_write(path, data.as_bytes())
    }

    pub fn groups_path(&self) -> PathBuf {
        self.data_dir.join(crate::group::GROUPS_FILE)
    }

    pub fn actions_db_path(&self) -> PathBuf {
        self.data_dir.join(crate::runtime::ACTIONS_DB_FILE)
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();

        if let Err(e) = self.scheduler.timezone() {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: format!("scheduler.timezone: {e}"),
            });
        }

        if self.scheduler.tick_interval_ms == 0 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: "scheduler.tick_interval_ms is 0; using 1ms".to_string(),
            });
        } else if self.scheduler.tick_interval_ms > 60_000 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: format!(
                    "scheduler.tick_interval_ms={} is over a minute; schedules may fire late",
                    self.scheduler.tick_interval_ms
                ),
            });
        }

        if self.orchestrator.max_concurrent_actions == 0 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: "orchestrator.max_concurrent_actions is 0; using 1".to_string(),
            });
        }

        if self.orchestrator.controller_timeout_secs == 0 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: "orchestrator.controller_timeout_secs is 0; every binding would time out"
                    .to_string(),
            });
        }

        if let Some(fleet) = &self.provider.fleet_file {
            if !fleet.exists() {
                warnings.push(ConfigWarning {
                    level: WarnLevel::Error,
                    message: format!("provider.fleet_file not found: {}", fleet.display()),
                });
            }
        }

        if self.auth.resolve_token().is_none() {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: match &self.auth.token_env {
                    Some(var) => format!("{var} is not set; the API will accept unauthenticated requests"),
                    None => "auth.token_env is unset; the API will accept unauthenticated requests"
                        .to_string(),
                },
            });
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn no_auth() -> AuthConfig {
        AuthConfig { token_env: None }
    }

    #[test]
    fn missing_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        let cfg = Config::load(&dir.path().join(CONFIG_FILE)).unwrap();
        assert_eq!(cfg.data_dir, PathBuf::from(".cloudtoggle"));
        assert_eq!(cfg.server.port, 8080);
        assert_eq!(cfg.server.bind_addr(), "0.0.0.0:8080");
        assert_eq!(cfg.scheduler.tick_interval(), Duration::from_secs(1));
        assert_eq!(cfg.scheduler.timezone().unwrap(), Tz::UTC);
        assert_eq!(cfg.orchestrator.max_concurrent_actions, 16);
        assert_eq!(cfg.orchestrator.controller_timeout(), Duration::from_secs(120));
        assert!(!cfg.orchestrator.serialize_group_actions);
        assert_eq!(cfg.provider.backend, ProviderBackend::Simulated);
        assert_eq!(cfg.auth.token_env.as_deref(), Some(DEFAULT_TOKEN_ENV));
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let yaml = r#"
data_dir: /var/lib/cloudtoggle
scheduler:
  timezone: Asia/Seoul
orchestrator:
  serialize_group_actions: true
"#;
        let cfg: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(cfg.data_dir, PathBuf::from("/var/lib/cloudtoggle"));
        assert_eq!(cfg.scheduler.tick_interval_ms, 1000);
        assert_eq!(cfg.scheduler.timezone, "Asia/Seoul");
        assert!(cfg.orchestrator.serialize_group_actions);
        assert_eq!(cfg.orchestrator.max_concurrent_actions, 16);
        assert_eq!(cfg.server.host, "0.0.0.0");
    }

    #[test]
    fn save_then_load_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        let mut cfg = Config::default();
        cfg.server.port = 9090;
        cfg.provider.fleet_file = Some(PathBuf::from("fleet.yaml"));
        cfg.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.server.port, 9090);
        assert_eq!(loaded.provider.fleet_file, Some(PathBuf::from("fleet.yaml")));
    }

    #[test]
    fn validate_defaults_without_auth_warns_only_about_auth() {
        let cfg = Config {
            auth: no_auth(),
            ..Config::default()
        };
        let warnings = cfg.validate();
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].level, WarnLevel::Warning);
        assert!(warnings[0].message.contains("unauthenticated"));
    }

    #[test]
    fn validate_reports_bad_values() {
        let mut cfg = Config {
            auth: no_auth(),
            ..Config::default()
        };
        cfg.scheduler.timezone = "Mars/Olympus".into();
        cfg.scheduler.tick_interval_ms = 0;
        cfg.orchestrator.controller_timeout_secs = 0;
        cfg.provider.fleet_file = Some(PathBuf::from("/definitely/not/here.yaml"));

        let warnings = cfg.validate();
        let errors: Vec<_> = warnings
            .iter()
            .filter(|w| w.level == WarnLevel::Error)
            .collect();
        assert_eq!(errors.len(), 3);
        assert!(warnings.iter().any(|w| w.message.contains("tick_interval_ms")));
        assert!(warnings.iter().any(|w| w.message.contains("Mars/Olympus")));
        assert_eq!(cfg.scheduler.tick_interval(), Duration::from_millis(1));
    }

    #[test]
    fn token_env_pointing_at_unset_var_resolves_to_none() {
        let auth = AuthConfig {
            token_env: Some("CLOUDTOGGLE_TEST_TOKEN_THAT_IS_NEVER_SET".into()),
        };
        assert!(auth.resolve_token().is_none());
        assert!(no_auth().resolve_token().is_none());
    }
}
