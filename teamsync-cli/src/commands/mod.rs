pub mod daemon;
pub mod health;
pub mod init;
pub mod plan;
pub mod status;
pub mod sync;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use teamsync_clients::{Clients, HttpClient};
use teamsync_core::{config, Config};
use teamsync_sync::{RunOptions, Sources};

/// Flags that override config values for one invocation.
#[derive(Args, Debug, Default, Clone)]
pub struct RunFlags {
    /// Report every change without touching GitHub.
    #[arg(long)]
    pub dry_run: bool,

    /// Never remove members from teams.
    #[arg(long)]
    pub no_remove: bool,

    /// Only consider usernames containing this string (case-insensitive).
    #[arg(long, value_name = "SUBSTRING")]
    pub filter: Option<String>,

    /// Ignore the last full sync and run a full pass.
    #[arg(long)]
    pub full: bool,
}

impl RunFlags {
    pub fn apply(&self, options: &mut RunOptions) {
        options.dry_run |= self.dry_run;
        options.no_remove |= self.no_remove;
        options.force_full |= self.full;
        if let Some(filter) = &self.filter {
            options.filter = Some(filter.clone());
        }
    }
}

pub fn home() -> Result<PathBuf> {
    config::home().context("could not determine home directory")
}

pub fn load_config(home: &std::path::Path) -> Result<Config> {
    config::load_at(home).context("failed to load config; run `teamsync init` first")
}

/// Clients for every upstream, with tokens read from the environment.
pub fn build_clients(config: &Config) -> Result<Clients> {
    Clients::from_config(config, HttpClient::default()).context("failed to configure API clients")
}

pub fn sources(clients: &Clients) -> Sources<'_> {
    Sources {
        directory: &clients.directory,
        teams: &clients.teams,
        remote: &clients.github,
    }
}

/// Start logging for one-shot commands.
pub fn init_logging() {
    teamsync_daemon::init_tracing(false);
}
