//! Reconciliation plan: the diff between intended and observed memberships.
//!
//! Computed once per run from a snapshot read before any mutation, then
//! applied and discarded.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use teamsync_core::{fold_usernames, RemoteTeam, TeamName, Username};

use crate::mutator::Mutation;

/// Usernames each team should contain after this run, keyed by team name.
pub type IntendedMemberships = BTreeMap<TeamName, BTreeSet<Username>>;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconciliationPlan {
    pub teams_to_create: BTreeSet<TeamName>,
    pub additions: BTreeSet<(TeamName, Username)>,
    pub removals: BTreeSet<(TeamName, Username)>,
}

impl ReconciliationPlan {
    pub fn is_empty(&self) -> bool {
        self.teams_to_create.is_empty() && self.additions.is_empty() && self.removals.is_empty()
    }

    pub fn mutation_count(&self) -> usize {
        self.teams_to_create.len() + self.additions.len() + self.removals.len()
    }

    /// Every entry in application order: creations, additions, removals.
    pub fn mutations(&self) -> Vec<Mutation> {
        let creates = self
            .teams_to_create
            .iter()
            .map(|team| Mutation::CreateTeam { team: team.clone() });
        let adds = self.additions.iter().map(|(team, user)| Mutation::AddMember {
            team: team.clone(),
            user: user.clone(),
        });
        let removes = self.removals.iter().map(|(team, user)| Mutation::RemoveMember {
            team: team.clone(),
            user: user.clone(),
        });
        creates.chain(adds).chain(removes).collect()
    }
}

/// Everything the diff looks at.
#[derive(Debug)]
pub struct PlanInput<'a> {
    pub intended: &'a IntendedMemberships,
    pub remote_teams: &'a BTreeMap<TeamName, RemoteTeam>,
    /// Members of each existing team that could be read. A team missing here
    /// gets every intended addition and no removals.
    pub team_members: &'a BTreeMap<TeamName, BTreeSet<Username>>,
    /// Teams present in the team-membership listing. Only these are diffed
    /// for removals.
    pub managed_teams: &'a BTreeSet<TeamName>,
    /// Users whose state is unknown this run; never removed.
    pub protected: &'a BTreeSet<Username>,
    pub filter: Option<&'a str>,
    pub allow_removals: bool,
}

/// Logins are compared case-insensitively throughout.
pub fn compute(input: &PlanInput<'_>) -> ReconciliationPlan {
    let mut plan = ReconciliationPlan::default();

    for (team, users) in input.intended {
        if !input.remote_teams.contains_key(team) {
            plan.teams_to_create.insert(team.clone());
        }
        let current = input.team_members.get(team).map(fold_usernames);
        for user in users {
            if current.as_ref().is_some_and(|members| members.contains(&user.folded())) {
                continue;
            }
            plan.additions.insert((team.clone(), user.clone()));
        }
    }

    if !input.allow_removals {
        return plan;
    }

    let protected = fold_usernames(input.protected);
    for team in input.managed_teams {
        if !input.remote_teams.contains_key(team) {
            continue;
        }
        let Some(current) = input.team_members.get(team) else {
            continue;
        };
        let intended = input
            .intended
            .get(team)
            .map(fold_usernames)
            .unwrap_or_default();
        for user in current {
            let folded = user.folded();
            if intended.contains(&folded)
                || protected.contains(&folded)
                || !user.matches_filter(input.filter)
            {
                continue;
            }
            plan.removals.insert((team.clone(), user.clone()));
        }
    }

    plan
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(name: &str) -> TeamName {
        TeamName::from(name)
    }
    fn u(name: &str) -> Username {
        Username::from(name)
    }
    fn users(names: &[&str]) -> BTreeSet<Username> {
        names.iter().map(|n| u(n)).collect()
    }
    fn remote(names: &[&str]) -> BTreeMap<TeamName, RemoteTeam> {
        names
            .iter()
            .enumerate()
            .map(|(i, n)| (t(n), RemoteTeam { id: i as u64 + 1, name: t(n) }))
            .collect()
    }

    struct Fixture {
        intended: IntendedMemberships,
        remote_teams: BTreeMap<TeamName, RemoteTeam>,
        team_members: BTreeMap<TeamName, BTreeSet<Username>>,
        managed: BTreeSet<TeamName>,
        protected: BTreeSet<Username>,
    }

    impl Fixture {
        fn plan(&self, filter: Option<&str>, allow_removals: bool) -> ReconciliationPlan {
            compute(&PlanInput {
                intended: &self.intended,
                remote_teams: &self.remote_teams,
                team_members: &self.team_members,
                managed_teams: &self.managed,
                protected: &self.protected,
                filter,
                allow_removals,
            })
        }
    }

    fn fixture() -> Fixture {
        Fixture {
            intended: BTreeMap::from([
                (t("a"), users(&["alice", "bob"])),
                (t("new"), users(&["alice"])),
            ]),
            remote_teams: remote(&["a", "unmanaged"]),
            team_members: BTreeMap::from([
                (t("a"), users(&["alice", "mallory"])),
                (t("unmanaged"), users(&["zed"])),
            ]),
            managed: BTreeSet::from([t("a"), t("new")]),
            protected: BTreeSet::new(),
        }
    }

    #[test]
    fn missing_teams_are_created_and_only_missing_members_added() {
        let plan = fixture().plan(None, true);
        assert_eq!(plan.teams_to_create, BTreeSet::from([t("new")]));
        assert_eq!(
            plan.additions,
            BTreeSet::from([(t("a"), u("bob")), (t("new"), u("alice"))])
        );
    }

    #[test]
    fn removals_only_touch_managed_teams() {
        let plan = fixture().plan(None, true);
        assert_eq!(plan.removals, BTreeSet::from([(t("a"), u("mallory"))]));
        assert!(plan.removals.iter().all(|(team, _)| team != &t("unmanaged")));
    }

    #[test]
    fn intended_members_are_never_removed() {
        let plan = fixture().plan(None, true);
        assert!(!plan.removals.contains(&(t("a"), u("alice"))));
        assert!(!plan.removals.contains(&(t("a"), u("bob"))));
    }

    #[test]
    fn removals_suppressed_when_disallowed() {
        let plan = fixture().plan(None, false);
        assert!(plan.removals.is_empty());
        assert!(!plan.additions.is_empty());
    }

    #[test]
    fn filter_and_protection_shield_members_from_removal() {
        let mut fx = fixture();
        fx.team_members
            .insert(t("a"), users(&["alice", "mallory", "flaky"]));
        fx.protected.insert(u("flaky"));

        assert!(fx.plan(Some("bob"), true).removals.is_empty());
        let plan = fx.plan(None, true);
        assert_eq!(plan.removals, BTreeSet::from([(t("a"), u("mallory"))]));
    }

    #[test]
    fn unreadable_team_gets_additions_but_no_removals() {
        let mut fx = fixture();
        fx.team_members.remove(&t("a"));
        let plan = fx.plan(None, true);
        assert!(plan.additions.contains(&(t("a"), u("alice"))));
        assert!(plan.removals.is_empty());
    }

    #[test]
    fn managed_team_without_intended_members_is_emptied() {
        let mut fx = fixture();
        fx.intended.remove(&t("a"));
        let plan = fx.plan(None, true);
        assert_eq!(
            plan.removals,
            BTreeSet::from([(t("a"), u("alice")), (t("a"), u("mallory"))])
        );
    }

    #[test]
    fn login_case_is_ignored_when_diffing() {
        let fx = Fixture {
            intended: BTreeMap::from([(t("a"), users(&["Alice", "bob"]))]),
            remote_teams: remote(&["a"]),
            team_members: BTreeMap::from([(t("a"), users(&["alice", "Bob", "Flaky"]))]),
            managed: BTreeSet::from([t("a")]),
            protected: users(&["flaky"]),
        };
        let plan = fx.plan(None, true);
        assert!(plan.additions.is_empty(), "additions: {:?}", plan.additions);
        assert!(plan.removals.is_empty(), "removals: {:?}", plan.removals);
    }

    #[test]
    fn converged_state_has_empty_plan() {
        let fx = Fixture {
            intended: BTreeMap::from([(t("a"), users(&["alice"]))]),
            remote_teams: remote(&["a"]),
            team_members: BTreeMap::from([(t("a"), users(&["alice"]))]),
            managed: BTreeSet::from([t("a")]),
            protected: BTreeSet::new(),
        };
        let plan = fx.plan(None, true);
        assert!(plan.is_empty());
        assert_eq!(plan.mutation_count(), 0);
    }

    #[test]
    fn mutations_list_creations_before_membership_changes() {
        let plan = fixture().plan(None, true);
        let mutations = plan.mutations();
        assert_eq!(mutations.len(), plan.mutation_count());
        assert_eq!(mutations[0], Mutation::CreateTeam { team: t("new") });
        assert!(matches!(mutations.last(), Some(Mutation::RemoveMember { .. })));
    }
}
