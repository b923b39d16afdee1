//! `teamsync plan --org <org>`: compute a reconciliation plan without applying it.

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;

use teamsync_core::{OrgName, Username};
use teamsync_sync::{pipeline, Mutation, PreparedRun, RunOptions, StateCache, SyncMode};

use super::{build_clients, home, init_logging, load_config, sources};

/// Arguments for `teamsync plan`.
#[derive(Args, Debug)]
pub struct PlanArgs {
    /// Organization to plan for.
    #[arg(long, value_name = "ORG")]
    pub org: String,

    /// Only consider usernames containing this string (case-insensitive).
    #[arg(long, value_name = "SUBSTRING")]
    pub filter: Option<String>,

    /// Plan a full pass regardless of the last full sync.
    #[arg(long)]
    pub full: bool,

    /// Plan as if removals were disabled.
    #[arg(long)]
    pub no_remove: bool,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Serialize)]
struct PlanJson<'a> {
    org: &'a OrgName,
    mode: SyncMode,
    mutations: Vec<Mutation>,
    missing_users: Vec<&'a Username>,
    unknown_members: Vec<&'a Username>,
    desired_identities: usize,
}

impl PlanArgs {
    pub fn run(self) -> Result<()> {
        init_logging();
        let home = home()?;
        let config = load_config(&home)?;
        let mut options = RunOptions::from_config(&config);
        options.force_full |= self.full;
        options.no_remove |= self.no_remove;
        if self.filter.is_some() {
            options.filter = self.filter.clone();
        }

        let clients = build_clients(&config)?;
        let cache = StateCache::at_home(&home);
        let org = OrgName::from(self.org);
        let prepared = pipeline::preview(&options, sources(&clients), &cache, &org)
            .with_context(|| format!("failed to plan '{org}'"))?;

        if self.json {
            let payload = PlanJson {
                org: &prepared.org,
                mode: prepared.mode,
                mutations: prepared.plan.mutations(),
                missing_users: prepared.missing_users.iter().collect(),
                unknown_members: prepared.unknown_members.iter().collect(),
                desired_identities: prepared.desired_count,
            };
            println!(
                "{}",
                serde_json::to_string_pretty(&payload).context("failed to render plan JSON")?
            );
            return Ok(());
        }

        print_plan(&prepared);
        Ok(())
    }
}

fn print_plan(prepared: &PreparedRun) {
    let mutations = prepared.plan.mutations();
    println!(
        "Plan for '{}' ({} sync, {} desired identities)",
        prepared.org, prepared.mode, prepared.desired_count
    );
    if mutations.is_empty() {
        println!("  nothing to do");
    }
    for mutation in &mutations {
        let marker = match mutation {
            Mutation::CreateTeam { .. } | Mutation::AddMember { .. } => "+",
            Mutation::RemoveMember { .. } => "-",
        };
        println!("  {marker}  {mutation}");
    }
    for user in &prepared.missing_users {
        println!("  ?  {user} not found on GitHub");
    }
    for failure in &prepared.failures {
        println!("  !  {}: {}", failure.user, failure.error);
    }
    if !prepared.unknown_members.is_empty() {
        println!(
            "  warning: {} organization member(s) without a directory mapping",
            prepared.unknown_members.len()
        );
    }
}
