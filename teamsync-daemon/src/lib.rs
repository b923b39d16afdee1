//! Scheduled runner: reconciles every configured organization on an interval,
//! answers liveness checks on a local socket and stops cleanly on ctrl-c or a
//! `stop` request.

mod error;
mod health;
mod protocol;
mod runtime;

pub use error::DaemonError;
pub use health::{serve_health, HealthState, RunSummary, SharedHealth};
pub use protocol::{
    request_health, request_stop, send_request, socket_path, DaemonRequest, DaemonResponse,
};
pub use runtime::{init_tracing, run, run_schedule, start_blocking, ScheduleStats};
