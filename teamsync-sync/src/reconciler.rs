//! Per-organization reconciliation.
//!
//! ## Run protocol
//!
//! 1. Decide the mode from the state cache (or `force_full`).
//! 2. Read desired state: directory mappings and team memberships.
//! 3. Pick onboarding candidates. Full: every desired user passing the
//!    filter. Incremental: only those not yet in the organization.
//! 4. Probe each candidate once with `user_exists`.
//! 5. Snapshot remote teams and the members of every relevant team.
//! 6. Compute the [`ReconciliationPlan`].
//! 7. Apply: create teams, re-fetch the team map once, add members, remove
//!    strays.
//! 8. Full and live only: record the run start time in the state cache.
//!
//! Steps 1 through 6 are [`prepare`]; 7 and 8 are [`apply`].

use std::collections::{BTreeMap, BTreeSet};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;

use teamsync_core::{
    fold_usernames, DesiredState, DirectorySource, OrgName, RemoteOrg, RemoteTeam, SourceError,
    TeamCreation, TeamMembershipSource, TeamMemberships, TeamName, Uid, Username,
};

use crate::error::SyncError;
use crate::mode::{decide_mode, SyncMode};
use crate::mutator::{Mutation, RemoteMutator};
use crate::plan::{self, IntendedMemberships, PlanInput, ReconciliationPlan};
use crate::state_cache::StateCache;

// ---------------------------------------------------------------------------
// Inputs
// ---------------------------------------------------------------------------

/// Everything a single organization run depends on besides its sources.
#[derive(Debug, Clone)]
pub struct ReconcileContext {
    pub org: OrgName,
    pub dry_run: bool,
    pub no_remove: bool,
    pub filter: Option<String>,
    pub fallback_team: TeamName,
    pub full_sync_interval: Duration,
    /// Ignore the state cache and run a full pass.
    pub force_full: bool,
    pub deadline: Option<Instant>,
}

impl ReconcileContext {
    fn filter(&self) -> Option<&str> {
        self.filter.as_deref()
    }

    fn check_deadline(&self) -> Result<(), SyncError> {
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Err(SyncError::Cancelled {
                org: self.org.clone(),
            }),
            _ => Ok(()),
        }
    }
}

/// The three upstreams of a run.
#[derive(Clone, Copy)]
pub struct Sources<'a> {
    pub directory: &'a dyn DirectorySource,
    pub teams: &'a dyn TeamMembershipSource,
    pub remote: &'a dyn RemoteOrg,
}

// ---------------------------------------------------------------------------
// Outputs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum OutcomeStatus {
    Applied,
    /// Dry run: the mutation was only reported.
    WouldApply,
    /// Creation answered "already exists".
    AlreadyExists,
    Skipped { reason: String },
    Failed { error: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MutationOutcome {
    pub mutation: Mutation,
    #[serde(flatten)]
    pub status: OutcomeStatus,
}

/// A user whose probe or mutation failed. The run carried on without them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserFailure {
    pub user: Username,
    pub error: String,
}

/// Plan plus everything learned while reading, before anything is mutated.
#[derive(Debug, Clone)]
pub struct PreparedRun {
    pub org: OrgName,
    pub mode: SyncMode,
    pub started_at: DateTime<Utc>,
    pub plan: ReconciliationPlan,
    pub remote_teams: BTreeMap<TeamName, RemoteTeam>,
    /// Candidates the remote platform does not know (404 on probe).
    pub missing_users: BTreeSet<Username>,
    pub failures: Vec<UserFailure>,
    /// Organization members absent from desired state. Full mode only.
    pub unknown_members: BTreeSet<Username>,
    pub desired_count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReconcileReport {
    pub org: OrgName,
    pub mode: SyncMode,
    pub dry_run: bool,
    pub plan: ReconciliationPlan,
    pub outcomes: Vec<MutationOutcome>,
    pub missing_users: BTreeSet<Username>,
    pub failures: Vec<UserFailure>,
    pub unknown_members: BTreeSet<Username>,
    pub cache_updated: bool,
}

impl ReconcileReport {
    pub fn applied_count(&self) -> usize {
        self.count(|s| matches!(s, OutcomeStatus::Applied | OutcomeStatus::WouldApply))
    }

    pub fn failed_count(&self) -> usize {
        self.count(|s| matches!(s, OutcomeStatus::Failed { .. }))
    }

    fn count(&self, pred: impl Fn(&OutcomeStatus) -> bool) -> usize {
        self.outcomes.iter().filter(|o| pred(&o.status)).count()
    }
}

// ---------------------------------------------------------------------------
// reconcile
// ---------------------------------------------------------------------------

/// Prepare and apply one organization run.
pub fn reconcile(
    ctx: &ReconcileContext,
    sources: Sources<'_>,
    cache: &StateCache,
) -> Result<ReconcileReport, SyncError> {
    let prepared = prepare(ctx, sources, cache)?;
    apply(ctx, sources.remote, cache, prepared)
}

// ---------------------------------------------------------------------------
// prepare
// ---------------------------------------------------------------------------

/// Read every source and compute the plan. Never mutates anything.
pub fn prepare(
    ctx: &ReconcileContext,
    sources: Sources<'_>,
    cache: &StateCache,
) -> Result<PreparedRun, SyncError> {
    let started_at = Utc::now();
    let org = &ctx.org;
    let mode = if ctx.force_full {
        SyncMode::Full
    } else {
        decide_mode(cache.get(org), started_at, ctx.full_sync_interval)
    };
    tracing::info!(org = %org, mode = %mode, "starting run");

    let desired: DesiredState = sources
        .directory
        .list_active_external_mappings()?
        .into_iter()
        .collect();
    let memberships = sources.teams.list_team_memberships()?;
    tracing::debug!(
        org = %org,
        identities = desired.len(),
        uids_with_teams = memberships.uid_count(),
        "desired state loaded"
    );
    ctx.check_deadline()?;

    let org_members = sources.remote.list_org_members(org)?;
    let folded_members = fold_usernames(&org_members);

    let unknown_members = match mode {
        SyncMode::Full => {
            let known = fold_usernames(&desired.known_usernames());
            let unknown: BTreeSet<Username> = org_members
                .iter()
                .filter(|member| !known.contains(&member.folded()))
                .cloned()
                .collect();
            for user in &unknown {
                tracing::warn!(org = %org, user = %user, "organization member has no directory mapping");
            }
            unknown
        }
        SyncMode::Incremental => BTreeSet::new(),
    };

    let candidates: Vec<_> = desired
        .iter()
        .filter(|(user, _)| user.matches_filter(ctx.filter()))
        .filter(|(user, _)| mode == SyncMode::Full || !folded_members.contains(&user.folded()))
        .collect();

    let mut existence: BTreeMap<Username, bool> = BTreeMap::new();
    let mut missing_users = BTreeSet::new();
    let mut failures = Vec::new();
    let mut protected: BTreeSet<Username> = BTreeSet::new();
    for (user, _) in &candidates {
        if existence.contains_key(user) || protected.contains(user) {
            continue;
        }
        ctx.check_deadline()?;
        match sources.remote.user_exists(user) {
            Ok(true) => {
                existence.insert(user.clone(), true);
            }
            Ok(false) => {
                tracing::info!(org = %org, user = %user, "user not found on remote, skipping");
                existence.insert(user.clone(), false);
                missing_users.insert(user.clone());
            }
            Err(err) => {
                tracing::error!(org = %org, user = %user, error = %err, "user probe failed, skipping");
                protected.insert(user.clone());
                failures.push(UserFailure {
                    user: user.clone(),
                    error: err.to_string(),
                });
            }
        }
    }

    let intended = intended_memberships(ctx, mode, &candidates, &existence, &memberships);

    let remote_teams = sources.remote.list_teams(org)?;
    let managed_teams = memberships.managed_teams();
    let relevant: BTreeSet<&TeamName> = match mode {
        SyncMode::Full => intended.keys().chain(managed_teams.iter()).collect(),
        SyncMode::Incremental => intended.keys().collect(),
    };
    let mut team_members = BTreeMap::new();
    for name in relevant {
        let Some(team) = remote_teams.get(name) else {
            continue;
        };
        ctx.check_deadline()?;
        match sources.remote.list_team_members(team) {
            Ok(members) => {
                team_members.insert(name.clone(), members);
            }
            Err(err) => {
                tracing::warn!(org = %org, team = %name, error = %err, "cannot read team members, removals skipped for this team");
            }
        }
    }

    let plan = plan::compute(&PlanInput {
        intended: &intended,
        remote_teams: &remote_teams,
        team_members: &team_members,
        managed_teams: &managed_teams,
        protected: &protected,
        filter: ctx.filter(),
        allow_removals: mode == SyncMode::Full && !ctx.no_remove,
    });
    tracing::info!(
        org = %org,
        create = plan.teams_to_create.len(),
        add = plan.additions.len(),
        remove = plan.removals.len(),
        "plan computed"
    );

    Ok(PreparedRun {
        org: org.clone(),
        mode,
        started_at,
        plan,
        remote_teams,
        missing_users,
        failures,
        unknown_members,
        desired_count: desired.len(),
    })
}

/// Teams each confirmed candidate should be in.
///
/// A user's teams come from the uid of the pair being processed. A uid with no
/// teams lands in the fallback team; in full mode every confirmed user does.
fn intended_memberships(
    ctx: &ReconcileContext,
    mode: SyncMode,
    candidates: &[&(Username, Uid)],
    existence: &BTreeMap<Username, bool>,
    memberships: &TeamMemberships,
) -> IntendedMemberships {
    let mut intended = IntendedMemberships::new();
    for (user, uid) in candidates {
        if existence.get(user) != Some(&true) {
            continue;
        }
        let teams = memberships.teams_of(uid);
        if teams.is_empty() || mode == SyncMode::Full {
            intended
                .entry(ctx.fallback_team.clone())
                .or_default()
                .insert(user.clone());
        }
        for team in teams {
            intended.entry(team).or_default().insert(user.clone());
        }
    }
    intended
}

// ---------------------------------------------------------------------------
// apply
// ---------------------------------------------------------------------------

/// Execute a prepared plan and, for a completed full live run, record it.
pub fn apply(
    ctx: &ReconcileContext,
    remote: &dyn RemoteOrg,
    cache: &StateCache,
    prepared: PreparedRun,
) -> Result<ReconcileReport, SyncError> {
    let PreparedRun {
        org,
        mode,
        started_at,
        plan,
        mut remote_teams,
        missing_users,
        mut failures,
        unknown_members,
        ..
    } = prepared;
    let mutator = RemoteMutator::new(ctx.dry_run);
    let mut outcomes = Vec::with_capacity(plan.mutation_count());

    let mut refetch = false;
    for team in &plan.teams_to_create {
        ctx.check_deadline()?;
        let mutation = Mutation::CreateTeam { team: team.clone() };
        let status = match mutator.ensure_team(remote, &org, team) {
            Ok(TeamCreation::Created(created)) => {
                if mutator.is_dry_run() {
                    remote_teams.insert(team.clone(), created);
                    OutcomeStatus::WouldApply
                } else {
                    tracing::info!(org = %org, team = %team, "team created");
                    refetch = true;
                    OutcomeStatus::Applied
                }
            }
            Ok(TeamCreation::AlreadyExists) => {
                tracing::info!(org = %org, team = %team, "team already exists");
                refetch = true;
                OutcomeStatus::AlreadyExists
            }
            Err(err) => {
                tracing::error!(org = %org, team = %team, error = %err, "team creation failed");
                OutcomeStatus::Failed {
                    error: err.to_string(),
                }
            }
        };
        outcomes.push(MutationOutcome { mutation, status });
    }
    if refetch {
        ctx.check_deadline()?;
        remote_teams = remote.list_teams(&org)?;
    }

    for (team_name, user) in &plan.additions {
        ctx.check_deadline()?;
        let mutation = Mutation::AddMember {
            team: team_name.clone(),
            user: user.clone(),
        };
        let Some(team) = remote_teams.get(team_name) else {
            tracing::warn!(org = %org, team = %team_name, user = %user, "team not found after creation, skipping");
            outcomes.push(MutationOutcome {
                mutation,
                status: OutcomeStatus::Skipped {
                    reason: "team not found on remote".to_owned(),
                },
            });
            continue;
        };
        let status = record(&mut failures, user, mutator, mutator.add_member(remote, &org, team, user));
        outcomes.push(MutationOutcome { mutation, status });
    }

    for (team_name, user) in &plan.removals {
        ctx.check_deadline()?;
        let mutation = Mutation::RemoveMember {
            team: team_name.clone(),
            user: user.clone(),
        };
        let Some(team) = remote_teams.get(team_name) else {
            continue;
        };
        let status = record(
            &mut failures,
            user,
            mutator,
            mutator.remove_member(remote, &org, team, user),
        );
        outcomes.push(MutationOutcome { mutation, status });
    }

    let mut cache_updated = false;
    if mode == SyncMode::Full && !ctx.dry_run {
        ctx.check_deadline()?;
        match cache.set(&org, started_at) {
            Ok(()) => cache_updated = true,
            Err(err) => {
                tracing::error!(org = %org, error = %err, "failed to record full sync");
            }
        }
    }

    let report = ReconcileReport {
        org,
        mode,
        dry_run: ctx.dry_run,
        plan,
        outcomes,
        missing_users,
        failures,
        unknown_members,
        cache_updated,
    };
    tracing::info!(
        org = %report.org,
        mode = %report.mode,
        applied = report.applied_count(),
        failed = report.failed_count(),
        cache_updated = report.cache_updated,
        "run complete"
    );
    Ok(report)
}

fn record(
    failures: &mut Vec<UserFailure>,
    user: &Username,
    mutator: RemoteMutator,
    result: Result<(), SourceError>,
) -> OutcomeStatus {
    match result {
        Ok(()) if mutator.is_dry_run() => OutcomeStatus::WouldApply,
        Ok(()) => OutcomeStatus::Applied,
        Err(err) => {
            tracing::error!(user = %user, error = %err, "membership change failed");
            failures.push(UserFailure {
                user: user.clone(),
                error: err.to_string(),
            });
            OutcomeStatus::Failed {
                error: err.to_string(),
            }
        }
    }
}
