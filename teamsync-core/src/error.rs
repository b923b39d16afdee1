//! Error types for teamsync-core.

use std::path::PathBuf;

use thiserror::Error;

/// All errors that can arise from configuration handling.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Underlying I/O failure (file not found, permission denied, etc.).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization error (write/save path).
    #[error("YAML serialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// YAML parse error on load; includes file path and line context from serde_yaml.
    #[error("failed to parse config at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// `dirs::home_dir()` returned `None`, so we cannot locate `~/.teamsync/`.
    #[error("cannot determine home directory; set $HOME or equivalent")]
    HomeNotFound,

    /// The config file did not exist at the expected path.
    #[error("config not found at {path}")]
    ConfigNotFound { path: PathBuf },

    /// The config parsed but is not usable.
    #[error("invalid config: {0}")]
    Invalid(String),

    /// A credential environment variable named by the config is unset or empty.
    #[error("environment variable {var} is not set")]
    MissingToken { var: String },
}

/// Errors surfaced by the directory, team-membership, and remote clients.
#[derive(Debug, Error)]
pub enum SourceError {
    /// The directory service failed at the top level.
    #[error("directory unavailable: {reason}")]
    DirectoryUnavailable { reason: String },

    /// The team-membership service failed at the top level.
    #[error("team service unavailable: {reason}")]
    TeamServiceUnavailable { reason: String },

    /// The remote platform answered with an unexpected status.
    #[error("{request} returned HTTP {status}: {body}")]
    RemoteStatus {
        request: String,
        status: u16,
        body: String,
    },

    /// The remote platform could not be reached.
    #[error("{request} failed: {reason}")]
    RemoteTransport { request: String, reason: String },

    /// The remote platform answered with a payload we could not decode.
    #[error("{request} returned an unreadable payload: {reason}")]
    RemoteDecode { request: String, reason: String },
}
