//! Seams between the reconciler and the outside world.
//!
//! Every call is blocking. Implementations live in `teamsync-clients`; tests use
//! in-memory fakes.

use std::collections::{BTreeMap, BTreeSet};

use crate::error::SourceError;
use crate::types::{OrgName, RemoteTeam, TeamCreation, TeamMemberships, TeamName, Uid, Username};

/// Resolves active internal identities to their remote usernames.
pub trait DirectorySource {
    /// Active `(username, uid)` pairs with profile URLs already reduced to
    /// their final path segment. Fails with [`SourceError::DirectoryUnavailable`].
    fn list_active_external_mappings(&self) -> Result<BTreeSet<(Username, Uid)>, SourceError>;
}

/// Resolves which internal teams each uid belongs to.
pub trait TeamMembershipSource {
    /// A failing per-team detail fetch is skipped; only a failing top-level
    /// listing is an error.
    fn list_team_memberships(&self) -> Result<TeamMemberships, SourceError>;
}

/// Read and write access to one remote platform.
pub trait RemoteOrg {
    /// All teams of `org`, keyed by name, aggregated across every page.
    fn list_teams(&self, org: &OrgName) -> Result<BTreeMap<TeamName, RemoteTeam>, SourceError>;

    /// All members of `org`, aggregated across every page.
    fn list_org_members(&self, org: &OrgName) -> Result<BTreeSet<Username>, SourceError>;

    fn list_team_members(&self, team: &RemoteTeam) -> Result<BTreeSet<Username>, SourceError>;

    /// `Ok(false)` on 404; any status other than 200/404 is an error.
    fn user_exists(&self, user: &Username) -> Result<bool, SourceError>;

    /// Create `name` with the fixed description and admin permission.
    /// An "already exists" answer is [`TeamCreation::AlreadyExists`], not an error.
    fn ensure_team_exists(&self, org: &OrgName, name: &TeamName)
        -> Result<TeamCreation, SourceError>;

    fn add_member(&self, team: &RemoteTeam, user: &Username) -> Result<(), SourceError>;

    fn remove_member(&self, team: &RemoteTeam, user: &Username) -> Result<(), SourceError>;
}
