//! `teamsync status`: last full sync and next mode per organization.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use teamsync_core::{Config, OrgName};
use teamsync_sync::{decide_mode, mode::format_age, StateCache, SyncMode};

use super::{home, load_config};

/// Arguments for `teamsync status`.
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Serialize)]
struct OrgStatus {
    organization: OrgName,
    last_full_sync: Option<DateTime<Utc>>,
    next_mode: SyncMode,
}

#[derive(Serialize)]
struct StatusJson {
    full_sync_interval_secs: u64,
    dry_run: bool,
    organizations: Vec<OrgStatus>,
    /// Organizations with a recorded sync that are no longer configured.
    unconfigured: Vec<OrgStatus>,
}

#[derive(Tabled)]
struct StatusTableRow {
    #[tabled(rename = "organization")]
    organization: String,
    #[tabled(rename = "last full sync")]
    last_full_sync: String,
    #[tabled(rename = "age")]
    age: String,
    #[tabled(rename = "next run")]
    next_mode: String,
}

impl StatusArgs {
    pub fn run(self) -> Result<()> {
        let home = home()?;
        let config = load_config(&home)?;
        let cache = StateCache::at_home(&home);
        let now = Utc::now();
        let rows = build_rows(&config, &cache, now);
        let unconfigured = unconfigured_rows(&config, &cache, now);

        if self.json {
            let payload = StatusJson {
                full_sync_interval_secs: config.full_sync_interval_secs,
                dry_run: config.dry_run,
                organizations: rows,
                unconfigured,
            };
            println!(
                "{}",
                serde_json::to_string_pretty(&payload).context("failed to render status JSON")?
            );
            return Ok(());
        }

        print_table(&config, rows);
        if !unconfigured.is_empty() {
            let names: Vec<String> = unconfigured
                .iter()
                .map(|row| row.organization.to_string())
                .collect();
            println!(
                "{} recorded syncs for unconfigured organization(s): {}",
                "note:".yellow(),
                names.join(", ")
            );
        }
        Ok(())
    }
}

fn build_rows(config: &Config, cache: &StateCache, now: DateTime<Utc>) -> Vec<OrgStatus> {
    config
        .organizations
        .iter()
        .map(|org| {
            let last_full_sync = cache.get(org);
            OrgStatus {
                organization: org.clone(),
                last_full_sync,
                next_mode: decide_mode(last_full_sync, now, config.full_sync_interval()),
            }
        })
        .collect()
}

/// Cached entries whose organization is not in the config.
fn unconfigured_rows(config: &Config, cache: &StateCache, now: DateTime<Utc>) -> Vec<OrgStatus> {
    cache
        .entries()
        .into_iter()
        .filter(|entry| !config.organizations.contains(&entry.organization))
        .map(|entry| OrgStatus {
            next_mode: decide_mode(Some(entry.last_full_sync), now, config.full_sync_interval()),
            organization: entry.organization,
            last_full_sync: Some(entry.last_full_sync),
        })
        .collect()
}

fn print_table(config: &Config, rows: Vec<OrgStatus>) {
    if rows.is_empty() {
        println!("No organizations configured.");
        return;
    }

    let full = rows.iter().filter(|r| r.next_mode == SyncMode::Full).count();
    let mode_note = if config.dry_run { " (dry-run)" } else { "" };
    println!(
        "{} organization(s), {} due for a full sync{mode_note}",
        rows.len(),
        full
    );

    let table_rows: Vec<StatusTableRow> = rows
        .into_iter()
        .map(|row| StatusTableRow {
            organization: row.organization.to_string(),
            last_full_sync: row
                .last_full_sync
                .map(|at| at.format("%Y-%m-%d %H:%M:%S UTC").to_string())
                .unwrap_or_else(|| "never".to_owned()),
            age: row.last_full_sync.map(format_age).unwrap_or_else(|| "-".to_owned()),
            next_mode: match row.next_mode {
                SyncMode::Full => "full".yellow().to_string(),
                SyncMode::Incremental => "incremental".green().to_string(),
            },
        })
        .collect();

    let mut table = Table::new(table_rows);
    table.with(Style::rounded());
    println!("{table}");
}
