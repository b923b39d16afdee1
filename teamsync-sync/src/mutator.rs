//! Live vs dry-run mutation dispatch.
//!
//! The variant is chosen once per run. The dry-run variant never touches the
//! remote and answers with the same shapes as a successful live call, so the
//! reconciler follows one code path either way.

use serde::Serialize;

use teamsync_core::{OrgName, RemoteOrg, RemoteTeam, SourceError, TeamCreation, TeamName, Username};

/// Id given to teams that only exist in a dry run.
pub const DRY_RUN_TEAM_ID: u64 = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteMutator {
    Live,
    DryRun,
}

/// A single change to the remote platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Mutation {
    CreateTeam { team: TeamName },
    AddMember { team: TeamName, user: Username },
    RemoveMember { team: TeamName, user: Username },
}

impl std::fmt::Display for Mutation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Mutation::CreateTeam { team } => write!(f, "create team {team}"),
            Mutation::AddMember { team, user } => write!(f, "add {user} to {team}"),
            Mutation::RemoveMember { team, user } => write!(f, "remove {user} from {team}"),
        }
    }
}

impl RemoteMutator {
    pub fn new(dry_run: bool) -> Self {
        if dry_run {
            Self::DryRun
        } else {
            Self::Live
        }
    }

    pub fn is_dry_run(self) -> bool {
        matches!(self, Self::DryRun)
    }

    pub fn ensure_team(
        self,
        remote: &dyn RemoteOrg,
        org: &OrgName,
        team: &TeamName,
    ) -> Result<TeamCreation, SourceError> {
        match self {
            Self::Live => remote.ensure_team_exists(org, team),
            Self::DryRun => {
                report(org, &Mutation::CreateTeam { team: team.clone() });
                Ok(TeamCreation::Created(RemoteTeam {
                    id: DRY_RUN_TEAM_ID,
                    name: team.clone(),
                }))
            }
        }
    }

    pub fn add_member(
        self,
        remote: &dyn RemoteOrg,
        org: &OrgName,
        team: &RemoteTeam,
        user: &Username,
    ) -> Result<(), SourceError> {
        match self {
            Self::Live => {
                tracing::info!(org = %org, team = %team.name, user = %user, "adding member");
                remote.add_member(team, user)
            }
            Self::DryRun => {
                report(
                    org,
                    &Mutation::AddMember {
                        team: team.name.clone(),
                        user: user.clone(),
                    },
                );
                Ok(())
            }
        }
    }

    pub fn remove_member(
        self,
        remote: &dyn RemoteOrg,
        org: &OrgName,
        team: &RemoteTeam,
        user: &Username,
    ) -> Result<(), SourceError> {
        match self {
            Self::Live => {
                tracing::info!(org = %org, team = %team.name, user = %user, "removing member");
                remote.remove_member(team, user)
            }
            Self::DryRun => {
                report(
                    org,
                    &Mutation::RemoveMember {
                        team: team.name.clone(),
                        user: user.clone(),
                    },
                );
                Ok(())
            }
        }
    }
}

fn report(org: &OrgName, mutation: &Mutation) {
    tracing::info!(org = %org, "[dry-run] {mutation}");
}
