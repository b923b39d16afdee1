//! Liveness state and the local socket that serves it.

use std::fs;
use std::io::ErrorKind;
use std::os::unix::net::UnixStream as StdUnixStream;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::OwnedWriteHalf;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{broadcast, RwLock};

use crate::error::{io_err, DaemonError};
use crate::protocol::{DaemonRequest, DaemonResponse};

/// Outcome of the most recent scheduled run.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct RunSummary {
    pub finished_at: DateTime<Utc>,
    pub organizations: usize,
    pub failed: usize,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthState {
    pub started_at: DateTime<Utc>,
    pub interval_secs: u64,
    pub dry_run: bool,
    pub running: bool,
    pub runs_started: usize,
    pub last_run: Option<RunSummary>,
}

impl HealthState {
    pub fn new(interval_secs: u64, dry_run: bool) -> Self {
        Self {
            started_at: Utc::now(),
            interval_secs,
            dry_run,
            running: false,
            runs_started: 0,
            last_run: None,
        }
    }

    pub fn run_started(&mut self) {
        self.running = true;
        self.runs_started += 1;
    }

    pub fn run_finished(&mut self, summary: RunSummary) {
        self.running = false;
        self.last_run = Some(summary);
    }
}

pub type SharedHealth = Arc<RwLock<HealthState>>;

/// Accept clients on `socket` until shutdown, then remove the socket file.
pub async fn serve_health(
    socket: PathBuf,
    health: SharedHealth,
    shutdown_tx: broadcast::Sender<()>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    if let Some(parent) = socket.parent() {
        fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
    }
    prepare_socket_for_bind(&socket)?;

    let listener = UnixListener::bind(&socket).map_err(|e| io_err(&socket, e))?;
    set_socket_permissions(&socket)?;
    tracing::info!(socket = %socket.display(), "health socket listening");

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            accepted = listener.accept() => {
                let (stream, _) = accepted.map_err(|e| io_err(&socket, e))?;
                let health = health.clone();
                let shutdown_tx = shutdown_tx.clone();
                tokio::spawn(async move {
                    if let Err(err) = handle_client(stream, health, shutdown_tx).await {
                        tracing::error!(error = %err, "health socket client error");
                    }
                });
            }
        }
    }

    if socket.exists() {
        let _ = fs::remove_file(&socket);
    }
    Ok(())
}

async fn handle_client(
    stream: UnixStream,
    health: SharedHealth,
    shutdown_tx: broadcast::Sender<()>,
) -> Result<(), DaemonError> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    while let Some(line) = lines
        .next_line()
        .await
        .map_err(|e| io_err("health socket read", e))?
    {
        if line.trim().is_empty() {
            continue;
        }
        let request: DaemonRequest = match serde_json::from_str(&line) {
            Ok(request) => request,
            Err(err) => {
                let response = DaemonResponse::error(format!("invalid request JSON: {err}"));
                write_response(&mut writer, &response).await?;
                continue;
            }
        };

        let response = match request.cmd.as_str() {
            "health" => {
                let snapshot = health.read().await.clone();
                let mut payload = serde_json::to_value(snapshot)?;
                payload["status"] = json!("OK");
                DaemonResponse::ok(payload)
            }
            "stop" => {
                tracing::info!("stop requested over health socket");
                let _ = shutdown_tx.send(());
                DaemonResponse::ok(json!({ "stopping": true }))
            }
            other => DaemonResponse::error(format!("unknown command '{other}'")),
        };

        write_response(&mut writer, &response).await?;
        if request.cmd == "stop" {
            break;
        }
    }
    Ok(())
}

async fn write_response(
    writer: &mut OwnedWriteHalf,
    response: &DaemonResponse,
) -> Result<(), DaemonError> {
    let mut payload = serde_json::to_string(response)?;
    payload.push('\n');
    writer
        .write_all(payload.as_bytes())
        .await
        .map_err(|e| io_err("health socket write", e))?;
    writer
        .flush()
        .await
        .map_err(|e| io_err("health socket flush", e))
}

/// Refuse to bind over a live daemon; clear a stale socket file.
pub(crate) fn prepare_socket_for_bind(socket: &Path) -> Result<(), DaemonError> {
    if !socket.exists() {
        return Ok(());
    }
    match StdUnixStream::connect(socket) {
        Ok(_) => {
            return Err(DaemonError::AlreadyRunning {
                socket: socket.to_path_buf(),
            })
        }
        Err(err) => {
            tracing::warn!(socket = %socket.display(), error = %err, "removing stale daemon socket");
        }
    }
    match fs::remove_file(socket) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(err) => Err(io_err(socket, err)),
    }
}

fn set_socket_permissions(path: &Path) -> Result<(), DaemonError> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600)).map_err(|e| io_err(path, e))
}
