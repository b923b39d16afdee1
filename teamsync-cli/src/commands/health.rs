//! `teamsync health`: ask a running daemon whether it is alive.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use serde_json::Value;

use teamsync_daemon::{request_health, request_stop};

use super::home;

/// Arguments for `teamsync health`.
#[derive(Args, Debug)]
pub struct HealthArgs {
    /// Ask the daemon to stop after its current run.
    #[arg(long)]
    pub stop: bool,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

impl HealthArgs {
    pub fn run(self) -> Result<()> {
        let home = home()?;
        if self.stop {
            request_stop(&home).context("failed to stop daemon")?;
            println!("{} daemon stopping", "✓".green());
            return Ok(());
        }

        let payload = request_health(&home).context("daemon health check failed")?;
        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&payload).context("failed to render health JSON")?
            );
            return Ok(());
        }
        print_health(&payload);
        Ok(())
    }
}

fn print_health(payload: &Value) {
    let state = if payload["running"].as_bool().unwrap_or(false) {
        "running a sync"
    } else {
        "idle"
    };
    println!(
        "{} daemon up since {} ({state})",
        "✓".green(),
        payload["started_at"].as_str().unwrap_or("?")
    );
    println!("  runs started: {}", payload["runs_started"]);
    match payload["last_run"].as_object() {
        Some(last) => println!(
            "  last run: {} organization(s), {} failed, finished {}",
            last.get("organizations").unwrap_or(&Value::Null),
            last.get("failed").unwrap_or(&Value::Null),
            last.get("finished_at").and_then(Value::as_str).unwrap_or("?")
        ),
        None => println!("  last run: none yet"),
    }
}
