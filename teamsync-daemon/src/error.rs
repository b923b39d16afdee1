use std::path::PathBuf;

use thiserror::Error;

/// Error surface for the scheduled runner and its health socket.
#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("config error: {0}")]
    Config(#[from] teamsync_core::ConfigError),

    #[error("task join error: {0}")]
    Join(String),

    #[error("signal handler failed: {0}")]
    Signal(String),

    #[error("daemon is not running (no socket at {socket})")]
    NotRunning { socket: PathBuf },

    #[error("another daemon is already listening on {socket}")]
    AlreadyRunning { socket: PathBuf },

    #[error("daemon protocol error: {0}")]
    Protocol(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> DaemonError {
    DaemonError::Io {
        path: path.into(),
        source,
    }
}
