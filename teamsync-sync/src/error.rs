//! Error types for teamsync-sync.

use std::path::PathBuf;

use thiserror::Error;

use teamsync_core::{OrgName, SourceError};

/// All errors that end a single organization's run.
#[derive(Debug, Error)]
pub enum SyncError {
    /// A directory, team-service or remote read failed at the top level.
    #[error("source error: {0}")]
    Source(#[from] SourceError),

    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// JSON serialization error (state cache).
    #[error("state cache JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The run passed its deadline; nothing was recorded as a completed sync.
    #[error("run for {org} cancelled after exceeding its deadline")]
    Cancelled { org: OrgName },
}

/// Convenience constructor for [`SyncError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> SyncError {
    SyncError::Io {
        path: path.into(),
        source,
    }
}
