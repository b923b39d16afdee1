//! `teamsync daemon`: scheduled syncs in the foreground.

use anyhow::{Context, Result};
use clap::Args;

use teamsync_daemon::start_blocking;

use super::{home, load_config};

/// Arguments for `teamsync daemon`.
#[derive(Args, Debug)]
pub struct DaemonArgs {
    /// Report changes without touching GitHub.
    #[arg(long)]
    pub dry_run: bool,

    /// Seconds between runs (default from config).
    #[arg(long, value_name = "SECS")]
    pub interval: Option<u64>,

    /// Emit JSON log lines.
    #[arg(long)]
    pub json: bool,
}

impl DaemonArgs {
    pub fn run(self) -> Result<()> {
        let home = home()?;
        let mut config = load_config(&home)?;
        config.dry_run |= self.dry_run;
        if let Some(secs) = self.interval {
            config.daemon.interval_secs = secs;
        }
        config.validate().context("invalid daemon settings")?;
        start_blocking(&home, config, self.json).context("daemon exited with error")
    }
}
