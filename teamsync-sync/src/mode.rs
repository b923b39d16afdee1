//! Full vs incremental mode selection.
//!
//! A full sync onboards everyone and removes strays; an incremental sync only
//! onboards people missing from the organization. The state cache acts as a
//! debounce: a full sync runs at most once per `full_sync_interval`.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncMode {
    Full,
    Incremental,
}

impl fmt::Display for SyncMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncMode::Full => write!(f, "full"),
            SyncMode::Incremental => write!(f, "incremental"),
        }
    }
}

/// Incremental iff the last full sync is younger than `interval`.
pub fn decide_mode(
    last_full_sync: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    interval: Duration,
) -> SyncMode {
    let Some(last) = last_full_sync else {
        return SyncMode::Full;
    };
    let Ok(interval) = chrono::Duration::from_std(interval) else {
        return SyncMode::Incremental;
    };
    if now.signed_duration_since(last) < interval {
        SyncMode::Incremental
    } else {
        SyncMode::Full
    }
}

/// Compact age of a timestamp relative to now, e.g. `"5m"`.
pub fn format_age(timestamp: DateTime<Utc>) -> String {
    let age = Utc::now().signed_duration_since(timestamp).num_seconds().max(0) as u64;
    format_seconds(age)
}

pub fn format_seconds(seconds: u64) -> String {
    if seconds < 60 {
        return format!("{seconds}s");
    }
    if seconds < 60 * 60 {
        return format!("{}m", seconds / 60);
    }
    if seconds < 60 * 60 * 24 {
        return format!("{}h", seconds / (60 * 60));
    }
    format!("{}d", seconds / (60 * 60 * 24))
}
