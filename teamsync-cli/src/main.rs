//! teamsync: keep GitHub team memberships in line with the internal directory.
//!
//! # Usage
//!
//! ```text
//! teamsync init --org <org>... --directory-url <url> --team-service-url <url>
//! teamsync sync [--org <org>] [--dry-run] [--no-remove] [--filter <s>] [--full] [--json]
//! teamsync plan --org <org> [--filter <s>] [--full] [--json]
//! teamsync status [--json]
//! teamsync daemon [--dry-run] [--interval <secs>] [--json]
//! teamsync health [--stop] [--json]
//! ```

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{
    daemon::DaemonArgs, health::HealthArgs, init::InitArgs, plan::PlanArgs, status::StatusArgs,
    sync::SyncArgs,
};

#[derive(Parser, Debug)]
#[command(
    name = "teamsync",
    version,
    about = "Reconcile GitHub organization teams with the internal people directory",
    long_about = None,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Write a starter config to ~/.teamsync/config.yaml.
    Init(InitArgs),

    /// Reconcile configured organizations once.
    Sync(SyncArgs),

    /// Show what a sync of one organization would change.
    Plan(PlanArgs),

    /// Show the last full sync and next mode per organization.
    Status(StatusArgs),

    /// Run syncs on an interval until ctrl-c.
    Daemon(DaemonArgs),

    /// Check on, or stop, a running daemon.
    Health(HealthArgs),
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Init(args) => args.run(),
        Commands::Sync(args) => args.run(),
        Commands::Plan(args) => args.run(),
        Commands::Status(args) => args.run(),
        Commands::Daemon(args) => args.run(),
        Commands::Health(args) => args.run(),
    }
}
