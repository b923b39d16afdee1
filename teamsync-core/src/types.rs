//! Domain types for team synchronization.
//!
//! Identifiers are newtypes over `String` so an organization name can never be
//! passed where a username is expected. All of them order lexically, which keeps
//! every set and map in the crate deterministic.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

macro_rules! string_newtype {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_owned())
            }
        }
    };
}

string_newtype!(
    /// Internal unique identifier of a person, independent of any platform.
    Uid
);

string_newtype!(
    /// Login of an account on the remote platform.
    Username
);

string_newtype!(
    /// Team name on the remote platform. Internal team ids share this namespace.
    TeamName
);

string_newtype!(
    /// Remote organization the teams live in.
    OrgName
);

impl Username {
    /// Case-insensitive substring match used by the `--filter` option.
    pub fn matches_filter(&self, filter: Option<&str>) -> bool {
        match filter {
            None => true,
            Some(f) => self.folded().contains(&f.to_lowercase()),
        }
    }

    /// Logins are case-insensitive on the remote platform, which reports them
    /// in canonical case regardless of how the directory spells them.
    pub fn folded(&self) -> String {
        self.0.to_lowercase()
    }
}

/// Case-folded view of a set of logins, for membership checks.
pub fn fold_usernames<'a>(users: impl IntoIterator<Item = &'a Username>) -> BTreeSet<String> {
    users.into_iter().map(Username::folded).collect()
}

// ---------------------------------------------------------------------------
// Remote state
// ---------------------------------------------------------------------------

/// A team as it exists on the remote platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteTeam {
    pub id: u64,
    pub name: TeamName,
}

/// Result of asking the remote platform to create a team.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TeamCreation {
    Created(RemoteTeam),
    /// The platform reported the name as taken; treated as success.
    AlreadyExists,
}

// ---------------------------------------------------------------------------
// Desired state
// ---------------------------------------------------------------------------

/// Mapping of uid to the internal team ids the person belongs to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TeamMemberships {
    by_uid: BTreeMap<Uid, BTreeSet<TeamName>>,
}

impl TeamMemberships {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, uid: Uid, team: TeamName) {
        self.by_uid.entry(uid).or_default().insert(team);
    }

    /// Teams of `uid`; empty when the uid has none.
    pub fn teams_of(&self, uid: &Uid) -> BTreeSet<TeamName> {
        self.by_uid.get(uid).cloned().unwrap_or_default()
    }

    /// Every team that has at least one member in the listing. Only these
    /// teams are ever diffed for removals.
    pub fn managed_teams(&self) -> BTreeSet<TeamName> {
        self.by_uid.values().flatten().cloned().collect()
    }

    pub fn uid_count(&self) -> usize {
        self.by_uid.len()
    }
}

impl FromIterator<(Uid, TeamName)> for TeamMemberships {
    fn from_iter<I: IntoIterator<Item = (Uid, TeamName)>>(iter: I) -> Self {
        let mut memberships = Self::new();
        for (uid, team) in iter {
            memberships.insert(uid, team);
        }
        memberships
    }
}

/// De-duplicated `(username, uid)` pairs that should exist on the platform.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DesiredState {
    pairs: BTreeSet<(Username, Uid)>,
}

impl DesiredState {
    pub fn new(pairs: BTreeSet<(Username, Uid)>) -> Self {
        Self { pairs }
    }

    pub fn iter(&self) -> impl Iterator<Item = &(Username, Uid)> {
        self.pairs.iter()
    }

    pub fn known_usernames(&self) -> BTreeSet<Username> {
        self.pairs.iter().map(|(u, _)| u.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

impl FromIterator<(Username, Uid)> for DesiredState {
    fn from_iter<I: IntoIterator<Item = (Username, Uid)>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
