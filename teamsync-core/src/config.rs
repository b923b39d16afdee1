//! YAML configuration at `~/.teamsync/config.yaml`.
//!
//! # Storage layout
//!
//! ```text
//! ~/.teamsync/
//!   config.yaml        (mode 0600)
//!   state/
//!     <org>.json       (last full sync per organization)
//! ```
//!
//! Every function touching the filesystem takes the home directory
//! explicitly; callers resolve it once with [`home`].
//!
//! Credentials never live in the file. The config names the environment
//! variables that hold them and [`resolve_token`] reads them at run time.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::types::{OrgName, TeamName};

pub const DEFAULT_GITHUB_API_URL: &str = "https://api.github.com/";
pub const DEFAULT_GITHUB_TOKEN_ENV: &str = "GITHUB_ACCESS_TOKEN";
pub const DEFAULT_SERVICE_TOKEN_ENV: &str = "TEAMSYNC_SERVICE_TOKEN";
pub const DEFAULT_DIRECTORY_ACCOUNT: &str = "github";
pub const DEFAULT_FALLBACK_TEAM: &str = "All Organization Members";
pub const DEFAULT_FULL_SYNC_INTERVAL_SECS: u64 = 60 * 60;
pub const DEFAULT_DAEMON_INTERVAL_SECS: u64 = 300;

// ---------------------------------------------------------------------------
// 1. Config types
// ---------------------------------------------------------------------------

/// Root of `config.yaml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Organizations reconciled on every run, in this order.
    pub organizations: Vec<OrgName>,
    #[serde(default)]
    pub github: GithubConfig,
    pub directory: DirectoryConfig,
    pub team_service: TeamServiceConfig,
    /// Environment variable holding the bearer token for the internal services.
    #[serde(default = "default_service_token_env")]
    pub service_token_env: String,
    #[serde(default = "default_full_sync_interval_secs")]
    pub full_sync_interval_secs: u64,
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default)]
    pub no_remove: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
    /// Wall-clock budget per organization run. A full run past its deadline
    /// stops without recording the sync.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub org_timeout_secs: Option<u64>,
    #[serde(default = "default_fallback_team")]
    pub fallback_team: TeamName,
    #[serde(default)]
    pub daemon: DaemonConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GithubConfig {
    #[serde(default = "default_github_api_url")]
    pub api_url: String,
    #[serde(default = "default_github_token_env")]
    pub token_env: String,
}

impl Default for GithubConfig {
    fn default() -> Self {
        Self {
            api_url: default_github_api_url(),
            token_env: default_github_token_env(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryConfig {
    pub url: String,
    /// Value of the `account` query parameter selecting remote usernames.
    #[serde(default = "default_directory_account")]
    pub account: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamServiceConfig {
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DaemonConfig {
    #[serde(default = "default_daemon_interval_secs")]
    pub interval_secs: u64,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_daemon_interval_secs(),
        }
    }
}

impl Config {
    /// A config with defaults for everything but the required endpoints.
    pub fn new(
        organizations: Vec<OrgName>,
        directory_url: impl Into<String>,
        team_service_url: impl Into<String>,
    ) -> Self {
        Self {
            organizations,
            github: GithubConfig::default(),
            directory: DirectoryConfig {
                url: directory_url.into(),
                account: default_directory_account(),
            },
            team_service: TeamServiceConfig {
                url: team_service_url.into(),
            },
            service_token_env: default_service_token_env(),
            full_sync_interval_secs: default_full_sync_interval_secs(),
            dry_run: false,
            no_remove: false,
            filter: None,
            org_timeout_secs: None,
            fallback_team: default_fallback_team(),
            daemon: DaemonConfig::default(),
        }
    }

    pub fn full_sync_interval(&self) -> Duration {
        Duration::from_secs(self.full_sync_interval_secs)
    }

    pub fn org_timeout(&self) -> Option<Duration> {
        self.org_timeout_secs.map(Duration::from_secs)
    }

    pub fn daemon_interval(&self) -> Duration {
        Duration::from_secs(self.daemon.interval_secs)
    }

    /// Reject configs that would make a run meaningless.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.organizations.is_empty() {
            return Err(ConfigError::Invalid(
                "at least one organization is required".to_string(),
            ));
        }
        if self.organizations.iter().any(|o| o.0.trim().is_empty()) {
            return Err(ConfigError::Invalid("organization names must not be empty".to_string()));
        }
        for (field, url) in [
            ("github.api_url", &self.github.api_url),
            ("directory.url", &self.directory.url),
            ("team_service.url", &self.team_service.url),
        ] {
            if url.trim().is_empty() {
                return Err(ConfigError::Invalid(format!("{field} must not be empty")));
            }
        }
        if self.fallback_team.0.trim().is_empty() {
            return Err(ConfigError::Invalid("fallback_team must not be empty".to_string()));
        }
        if self.daemon.interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "daemon.interval_secs must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

fn default_github_api_url() -> String {
    DEFAULT_GITHUB_API_URL.to_string()
}
fn default_github_token_env() -> String {
    DEFAULT_GITHUB_TOKEN_ENV.to_string()
}
fn default_service_token_env() -> String {
    DEFAULT_SERVICE_TOKEN_ENV.to_string()
}
fn default_directory_account() -> String {
    DEFAULT_DIRECTORY_ACCOUNT.to_string()
}
fn default_fallback_team() -> TeamName {
    TeamName::from(DEFAULT_FALLBACK_TEAM)
}
fn default_full_sync_interval_secs() -> u64 {
    DEFAULT_FULL_SYNC_INTERVAL_SECS
}
fn default_daemon_interval_secs() -> u64 {
    DEFAULT_DAEMON_INTERVAL_SECS
}

// ---------------------------------------------------------------------------
// 2. Path helpers
// ---------------------------------------------------------------------------

/// `<home>/.teamsync/`
pub fn teamsync_root(home: &Path) -> PathBuf {
    home.join(".teamsync")
}

/// `<home>/.teamsync/config.yaml`. Pure, no I/O.
pub fn config_path_at(home: &Path) -> PathBuf {
    teamsync_root(home).join("config.yaml")
}

/// `<home>/.teamsync/state/`. Pure, no I/O.
pub fn state_dir_at(home: &Path) -> PathBuf {
    teamsync_root(home).join("state")
}

/// The current user's home directory.
pub fn home() -> Result<PathBuf, ConfigError> {
    dirs::home_dir().ok_or(ConfigError::HomeNotFound)
}

// ---------------------------------------------------------------------------
// 3. Load / save
// ---------------------------------------------------------------------------

/// Load and validate the config.
///
/// Returns `ConfigError::ConfigNotFound` if absent,
/// `ConfigError::Parse` (with path + line context) if malformed YAML.
pub fn load_at(home: &Path) -> Result<Config, ConfigError> {
    let path = config_path_at(home);
    if !path.exists() {
        return Err(ConfigError::ConfigNotFound { path });
    }
    let contents = std::fs::read_to_string(&path)?;
    let config: Config =
        serde_yaml::from_str(&contents).map_err(|e| ConfigError::Parse { path, source: e })?;
    config.validate()?;
    Ok(config)
}

/// Atomically save the config.
///
/// Write flow: serialize → `.yaml.tmp` sibling → `chmod 0600` → `rename`.
pub fn save_at(home: &Path, config: &Config) -> Result<(), ConfigError> {
    let root = teamsync_root(home);
    if !root.exists() {
        std::fs::create_dir_all(&root)?;
        set_dir_permissions(&root)?;
    }
    let path = config_path_at(home);
    let tmp_path = path.with_file_name("config.yaml.tmp");

    let yaml = serde_yaml::to_string(config)?;
    std::fs::write(&tmp_path, yaml)?;
    set_file_permissions(&tmp_path)?;
    std::fs::rename(&tmp_path, &path)?;
    Ok(())
}

/// Write `config` unless a config already exists.
///
/// Idempotent: an existing file is loaded and returned unchanged.
pub fn init_at(home: &Path, config: Config) -> Result<Config, ConfigError> {
    if config_path_at(home).exists() {
        return load_at(home);
    }
    config.validate()?;
    save_at(home, &config)?;
    Ok(config)
}

// ---------------------------------------------------------------------------
// 4. Credentials
// ---------------------------------------------------------------------------

/// Read a token from the environment variable `var`.
pub fn resolve_token(var: &str) -> Result<String, ConfigError> {
    match std::env::var(var) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(ConfigError::MissingToken {
            var: var.to_string(),
        }),
    }
}

// ---------------------------------------------------------------------------
// Private helpers
// ---------------------------------------------------------------------------

#[cfg(unix)]
fn set_dir_permissions(path: &Path) -> Result<(), ConfigError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700))?;
    Ok(())
}
#[cfg(not(unix))]
fn set_dir_permissions(_path: &Path) -> Result<(), ConfigError> {
    Ok(())
}

#[cfg(unix)]
fn set_file_permissions(path: &Path) -> Result<(), ConfigError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    Ok(())
}
#[cfg(not(unix))]
fn set_file_permissions(_path: &Path) -> Result<(), ConfigError> {
    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
