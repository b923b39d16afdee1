//! `teamsync sync`: reconcile organizations once.

use anyhow::{bail, Context, Result};
use clap::Args;
use colored::Colorize;

use teamsync_core::OrgName;
use teamsync_sync::{
    pipeline, OrgRunResult, OrgScope, OutcomeStatus, ReconcileReport, RunOptions, StateCache,
};

use super::{build_clients, home, init_logging, load_config, sources, RunFlags};

/// Arguments for `teamsync sync`.
#[derive(Args, Debug)]
pub struct SyncArgs {
    /// Sync only this organization (default: every configured one).
    #[arg(long, value_name = "ORG")]
    pub org: Option<String>,

    #[command(flatten)]
    pub flags: RunFlags,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

impl SyncArgs {
    pub fn run(self) -> Result<()> {
        init_logging();
        let home = home()?;
        let config = load_config(&home)?;
        let mut options = RunOptions::from_config(&config);
        self.flags.apply(&mut options);

        let clients = build_clients(&config)?;
        let cache = StateCache::at_home(&home);
        let scope = match self.org {
            Some(org) => OrgScope::Org(OrgName::from(org)),
            None => OrgScope::All,
        };

        let results = pipeline::run(&options, sources(&clients), &cache, &scope);

        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&results).context("failed to render sync JSON")?
            );
        } else {
            if results.is_empty() {
                println!("No organizations configured. Add some to ~/.teamsync/config.yaml.");
            }
            for result in &results {
                print_result(result);
            }
        }

        let failed = results.iter().filter(|r| !r.is_ok()).count();
        tracing::info!(
            organizations = results.len(),
            failed,
            dry_run = options.dry_run,
            "sync finished"
        );
        if failed > 0 {
            bail!("{failed} of {} organization run(s) failed", results.len());
        }
        Ok(())
    }
}

fn print_result(result: &OrgRunResult) {
    match &result.outcome {
        Ok(report) => print_report(report),
        Err(err) => println!("{} '{}' failed: {err}", "✗".red(), result.org),
    }
}

fn print_report(report: &ReconcileReport) {
    let prefix = if report.dry_run { "[dry-run] " } else { "" };
    if report.outcomes.is_empty() {
        println!("{prefix}{} '{}' {} sync, nothing to do", "✓".green(), report.org, report.mode);
    } else {
        println!(
            "{prefix}{} '{}' {} sync ({} applied, {} failed)",
            "✓".green(),
            report.org,
            report.mode,
            report.applied_count(),
            report.failed_count()
        );
    }

    for outcome in &report.outcomes {
        let line = &outcome.mutation;
        match &outcome.status {
            OutcomeStatus::Applied => println!("  ✎  {line}"),
            OutcomeStatus::WouldApply => println!("  ~  {line}"),
            OutcomeStatus::AlreadyExists => println!("  ·  {line} (already exists)"),
            OutcomeStatus::Skipped { reason } => println!("  -  {line} ({reason})"),
            OutcomeStatus::Failed { error } => println!("  {}  {line}: {error}", "!".red()),
        }
    }
    for user in &report.missing_users {
        println!("  ?  {user} not found on GitHub");
    }
    for failure in &report.failures {
        println!("  {}  {}: {}", "!".red(), failure.user, failure.error);
    }
    if !report.unknown_members.is_empty() {
        println!(
            "  {} {} organization member(s) without a directory mapping",
            "warning:".yellow(),
            report.unknown_members.len()
        );
    }
}

