//! Shared run entrypoint used by the CLI and the daemon.
//!
//! Organizations are reconciled one after another in configured order. A
//! failing organization is logged and reported; the rest still run.

use std::time::{Duration, Instant};

use serde::Serialize;

use teamsync_core::{Config, OrgName, TeamName};

use crate::error::SyncError;
use crate::reconciler::{self, PreparedRun, ReconcileContext, ReconcileReport, Sources};
use crate::state_cache::StateCache;

/// Which organizations a run covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrgScope {
    /// Every configured organization.
    All,
    /// One organization, configured or not.
    Org(OrgName),
}

/// Per-invocation settings, seeded from the config file.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub organizations: Vec<OrgName>,
    pub dry_run: bool,
    pub no_remove: bool,
    pub filter: Option<String>,
    pub fallback_team: TeamName,
    pub full_sync_interval: Duration,
    pub force_full: bool,
    pub org_timeout: Option<Duration>,
}

impl RunOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            organizations: config.organizations.clone(),
            dry_run: config.dry_run,
            no_remove: config.no_remove,
            filter: config.filter.clone(),
            fallback_team: config.fallback_team.clone(),
            full_sync_interval: config.full_sync_interval(),
            force_full: false,
            org_timeout: config.org_timeout(),
        }
    }

    fn organizations(&self, scope: &OrgScope) -> Vec<OrgName> {
        match scope {
            OrgScope::All => self.organizations.clone(),
            OrgScope::Org(org) => vec![org.clone()],
        }
    }

    /// Context for one organization. The deadline starts counting now.
    pub fn context(&self, org: &OrgName) -> ReconcileContext {
        ReconcileContext {
            org: org.clone(),
            dry_run: self.dry_run,
            no_remove: self.no_remove,
            filter: self.filter.clone(),
            fallback_team: self.fallback_team.clone(),
            full_sync_interval: self.full_sync_interval,
            force_full: self.force_full,
            deadline: self.org_timeout.map(|t| Instant::now() + t),
        }
    }
}

/// Outcome of one organization's run.
#[derive(Debug, Serialize)]
pub struct OrgRunResult {
    pub org: OrgName,
    #[serde(serialize_with = "serialize_outcome")]
    pub outcome: Result<ReconcileReport, SyncError>,
}

impl OrgRunResult {
    pub fn is_ok(&self) -> bool {
        self.outcome.is_ok()
    }
}

fn serialize_outcome<S: serde::Serializer>(
    outcome: &Result<ReconcileReport, SyncError>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    #[derive(Serialize)]
    #[serde(rename_all = "snake_case")]
    enum Repr<'a> {
        Report(&'a ReconcileReport),
        Error(String),
    }
    match outcome {
        Ok(report) => Repr::Report(report).serialize(serializer),
        Err(err) => Repr::Error(err.to_string()).serialize(serializer),
    }
}

/// Reconcile every organization in `scope`.
pub fn run(
    options: &RunOptions,
    sources: Sources<'_>,
    cache: &StateCache,
    scope: &OrgScope,
) -> Vec<OrgRunResult> {
    options
        .organizations(scope)
        .into_iter()
        .map(|org| {
            let ctx = options.context(&org);
            let outcome = reconciler::reconcile(&ctx, sources, cache);
            if let Err(err) = &outcome {
                tracing::error!(org = %org, error = %err, "organization run failed");
            }
            OrgRunResult { org, outcome }
        })
        .collect()
}

/// Compute the plan for one organization without applying it.
pub fn preview(
    options: &RunOptions,
    sources: Sources<'_>,
    cache: &StateCache,
    org: &OrgName,
) -> Result<PreparedRun, SyncError> {
    reconciler::prepare(&options.context(org), sources, cache)
}
