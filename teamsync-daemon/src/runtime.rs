use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use teamsync_clients::{Clients, HttpClient};
use teamsync_core::Config;
use teamsync_sync::{pipeline, OrgRunResult, OrgScope, RunOptions, Sources, StateCache};

use crate::error::{io_err, DaemonError};
use crate::health::{prepare_socket_for_bind, serve_health, HealthState, RunSummary, SharedHealth};
use crate::protocol::socket_path;

/// Counters for one scheduler lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScheduleStats {
    pub runs_started: usize,
    pub ticks_skipped: usize,
}

/// Start the scheduled runner and block the current thread until it exits.
pub fn start_blocking(home: &Path, config: Config, json_logs: bool) -> Result<(), DaemonError> {
    init_tracing(json_logs);
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| io_err("tokio-runtime", e))?;
    runtime.block_on(run(home.to_path_buf(), config))
}

/// Reconcile every configured organization on `config.daemon.interval_secs`
/// until ctrl-c or a `stop` request on the health socket.
pub async fn run(home: PathBuf, config: Config) -> Result<(), DaemonError> {
    let clients = Arc::new(Clients::from_config(&config, HttpClient::default())?);
    let options = Arc::new(RunOptions::from_config(&config));
    let cache = Arc::new(StateCache::at_home(&home));
    let interval = config.daemon_interval();
    let socket = socket_path(&home);
    prepare_socket_for_bind(&socket)?;
    let health: SharedHealth = Arc::new(RwLock::new(HealthState::new(
        interval.as_secs(),
        options.dry_run,
    )));

    tracing::info!(
        organizations = options.organizations.len(),
        interval_secs = interval.as_secs(),
        dry_run = options.dry_run,
        "daemon starting"
    );

    let (shutdown_tx, _) = broadcast::channel::<()>(16);

    let job = {
        let health = health.clone();
        move || {
            let clients = clients.clone();
            let options = options.clone();
            let cache = cache.clone();
            let health = health.clone();
            async move {
                health.write().await.run_started();
                let started = Instant::now();
                let joined = tokio::task::spawn_blocking(move || {
                    let sources = Sources {
                        directory: &clients.directory,
                        teams: &clients.teams,
                        remote: &clients.github,
                    };
                    pipeline::run(&options, sources, &cache, &OrgScope::All)
                })
                .await;
                let elapsed = started.elapsed();
                let (organizations, failed) = match joined {
                    Ok(results) => (results.len(), log_results(&results, elapsed)),
                    Err(err) => {
                        tracing::error!(error = %err, "scheduled run panicked");
                        (0, 0)
                    }
                };
                health.write().await.run_finished(RunSummary {
                    finished_at: Utc::now(),
                    organizations,
                    failed,
                    duration_ms: elapsed.as_millis() as u64,
                });
            }
        }
    };

    let schedule_handle = {
        let shutdown_rx = shutdown_tx.subscribe();
        tokio::spawn(async move { run_schedule(interval, job, shutdown_rx).await })
    };

    let health_handle = {
        let shutdown = shutdown_tx.clone();
        let shutdown_rx = shutdown_tx.subscribe();
        tokio::spawn(async move {
            let result = serve_health(socket, health, shutdown.clone(), shutdown_rx).await;
            let _ = shutdown.send(());
            result
        })
    };

    let signal_handle = {
        let shutdown = shutdown_tx.clone();
        let mut shutdown_rx = shutdown_tx.subscribe();
        tokio::spawn(async move {
            tokio::select! {
                _ = shutdown_rx.recv() => Ok(()),
                signal = tokio::signal::ctrl_c() => {
                    match signal {
                        Ok(()) => {
                            tracing::info!("received ctrl-c, shutting down daemon");
                            let _ = shutdown.send(());
                            Ok(())
                        }
                        Err(err) => Err(DaemonError::Signal(err.to_string())),
                    }
                }
            }
        })
    };

    let (schedule_result, health_result, signal_result) =
        tokio::join!(schedule_handle, health_handle, signal_handle);
    let stats = schedule_result.map_err(|err| DaemonError::Join(err.to_string()))?;
    health_result.map_err(|err| DaemonError::Join(err.to_string()))??;
    signal_result.map_err(|err| DaemonError::Join(err.to_string()))??;
    tracing::info!(
        runs = stats.runs_started,
        skipped = stats.ticks_skipped,
        "daemon stopped"
    );
    Ok(())
}

/// Fire `job` on every tick of `period`, starting immediately.
///
/// A tick that arrives while the previous run is still going is skipped. On
/// shutdown the in-flight run, if any, is awaited before returning.
pub async fn run_schedule<F, Fut>(
    period: Duration,
    job: F,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> ScheduleStats
where
    F: Fn() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let running = Arc::new(AtomicBool::new(false));
    let mut skipped = 0usize;
    let mut started = 0usize;
    let mut in_flight: Option<JoinHandle<()>> = None;

    loop {
        tokio::select! {
            biased;
            _ = shutdown_rx.recv() => break,
            _ = interval.tick() => {
                if running.swap(true, Ordering::SeqCst) {
                    skipped += 1;
                    tracing::info!("previous run still in progress, skipping tick");
                    continue;
                }
                started += 1;
                let running = running.clone();
                let fut = job();
                in_flight = Some(tokio::spawn(async move {
                    fut.await;
                    running.store(false, Ordering::SeqCst);
                }));
            }
        }
    }

    if let Some(handle) = in_flight {
        if !handle.is_finished() {
            tracing::info!("waiting for in-flight run to finish");
        }
        if let Err(err) = handle.await {
            tracing::error!(error = %err, "in-flight run did not complete");
        }
    }

    ScheduleStats {
        runs_started: started,
        ticks_skipped: skipped,
    }
}

/// Log each organization's outcome; returns how many failed.
fn log_results(results: &[OrgRunResult], elapsed: Duration) -> usize {
    let failed = results.iter().filter(|r| !r.is_ok()).count();
    for result in results {
        if let Ok(report) = &result.outcome {
            tracing::info!(
                org = %result.org,
                mode = %report.mode,
                applied = report.applied_count(),
                failed = report.failed_count(),
                "organization reconciled"
            );
        }
    }
    tracing::info!(
        organizations = results.len(),
        failed,
        duration_ms = elapsed.as_millis() as u64,
        "scheduled run finished"
    );
    failed
}

/// Install the global subscriber on stderr. `RUST_LOG` overrides the `info`
/// default.
pub fn init_tracing(json: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    let _ = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::Notify;
    use tokio::time::sleep;

    #[tokio::test(start_paused = true, flavor = "current_thread")]
    async fn runs_once_per_tick_starting_immediately() {
        let calls = Arc::new(AtomicUsize::new(0));
        let (shutdown_tx, _) = broadcast::channel::<()>(1);
        let job = {
            let calls = calls.clone();
            move || {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                }
            }
        };
        let handle = tokio::spawn(run_schedule(
            Duration::from_secs(60),
            job,
            shutdown_tx.subscribe(),
        ));

        sleep(Duration::from_secs(181)).await;
        shutdown_tx.send(()).expect("send shutdown");
        let stats = handle.await.expect("join");

        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert_eq!(stats.runs_started, 4);
        assert_eq!(stats.ticks_skipped, 0);
    }

    #[tokio::test(start_paused = true, flavor = "current_thread")]
    async fn overlapping_ticks_are_skipped() {
        let release = Arc::new(Notify::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let (shutdown_tx, _) = broadcast::channel::<()>(1);
        let job = {
            let release = release.clone();
            let calls = calls.clone();
            move || {
                let release = release.clone();
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    release.notified().await;
                }
            }
        };
        let handle = tokio::spawn(run_schedule(
            Duration::from_secs(60),
            job,
            shutdown_tx.subscribe(),
        ));

        sleep(Duration::from_secs(181)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        release.notify_one();
        shutdown_tx.send(()).expect("send shutdown");
        let stats = handle.await.expect("join");

        assert_eq!(stats.runs_started, 1);
        assert_eq!(stats.ticks_skipped, 3);
    }

    #[tokio::test(start_paused = true, flavor = "current_thread")]
    async fn shutdown_waits_for_in_flight_run() {
        let release = Arc::new(Notify::new());
        let finished = Arc::new(AtomicBool::new(false));
        let (shutdown_tx, _) = broadcast::channel::<()>(1);
        let job = {
            let release = release.clone();
            let finished = finished.clone();
            move || {
                let release = release.clone();
                let finished = finished.clone();
                async move {
                    release.notified().await;
                    finished.store(true, Ordering::SeqCst);
                }
            }
        };
        let handle = tokio::spawn(run_schedule(
            Duration::from_secs(60),
            job,
            shutdown_tx.subscribe(),
        ));

        sleep(Duration::from_secs(1)).await;
        shutdown_tx.send(()).expect("send shutdown");
        tokio::task::yield_now().await;
        assert!(!handle.is_finished());

        release.notify_one();
        let stats = handle.await.expect("join");
        assert!(finished.load(Ordering::SeqCst));
        assert_eq!(stats.runs_started, 1);
    }

    #[tokio::test]
    async fn missing_token_stops_before_scheduling() {
        let home = tempfile::TempDir::new().expect("home");
        let mut config = Config::new(
            vec![teamsync_core::OrgName::from("zalando")],
            "https://directory.example",
            "https://teams.example",
        );
        config.service_token_env = "TEAMSYNC_DAEMON_TEST_UNSET_TOKEN".to_owned();

        let err = run(home.path().to_path_buf(), config)
            .await
            .expect_err("token missing");
        assert!(matches!(
            err,
            DaemonError::Config(teamsync_core::ConfigError::MissingToken { .. })
        ));
    }
}
