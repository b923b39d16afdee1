//! GitHub REST client for teams, team memberships and org members.

use std::collections::{BTreeMap, BTreeSet};

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use teamsync_core::{
    OrgName, RemoteOrg, RemoteTeam, SourceError, TeamCreation, TeamName, Username,
};

use crate::http::{decode, has_next_page, join_url, map_error, send, HttpClient, PAGE_SIZE};

/// Error code GitHub puts in `errors[].code` for a taken team name.
pub const ALREADY_EXISTS_CODE: &str = "already_exists";
/// Message GitHub has used for the same condition.
pub const ALREADY_EXISTS_MESSAGE: &str = "Name must be unique for this org";

/// Permission every created team receives.
pub const TEAM_PERMISSION: &str = "admin";

#[derive(Debug, Deserialize)]
struct TeamPayload {
    id: u64,
    name: String,
}

#[derive(Debug, Deserialize)]
struct MemberPayload {
    login: String,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorPayload {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    errors: Vec<ErrorDetail>,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorDetail {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// Blocking GitHub client authenticated with a personal access token.
#[derive(Debug, Clone)]
pub struct GithubClient {
    http: HttpClient,
    base_url: String,
    token: String,
}

impl GithubClient {
    pub fn new(http: HttpClient, base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            token: token.into(),
        }
    }

    fn request(&self, method: &str, path: &str) -> (ureq::Request, String) {
        let url = join_url(&self.base_url, path);
        let label = format!("{method} {url}");
        let request = self
            .http
            .agent()
            .request(method, &url)
            .set("Authorization", &format!("token {}", self.token))
            .set("Accept", "application/vnd.github+json");
        (request, label)
    }

    /// Fetch every page of `path`, following `Link: rel="next"`.
    fn get_paginated<T: DeserializeOwned>(&self, path: &str) -> Result<Vec<T>, SourceError> {
        let mut items = Vec::new();
        let mut page = 1u32;
        loop {
            let (request, label) = self.request("GET", path);
            let request = request
                .query("per_page", PAGE_SIZE)
                .query("page", &page.to_string());
            let response = send(request, &label)?;
            let more = has_next_page(response.header("Link"));
            let batch: Vec<T> = decode(response, &label)?;
            let empty = batch.is_empty();
            items.extend(batch);
            if !more || empty {
                break;
            }
            page += 1;
        }
        Ok(items)
    }
}

impl RemoteOrg for GithubClient {
    fn list_teams(&self, org: &OrgName) -> Result<BTreeMap<TeamName, RemoteTeam>, SourceError> {
        let teams: Vec<TeamPayload> = self.get_paginated(&format!("orgs/{org}/teams"))?;
        Ok(teams
            .into_iter()
            .map(|t| {
                let name = TeamName::from(t.name);
                (name.clone(), RemoteTeam { id: t.id, name })
            })
            .collect())
    }

    fn list_org_members(&self, org: &OrgName) -> Result<BTreeSet<Username>, SourceError> {
        let members: Vec<MemberPayload> = self.get_paginated(&format!("orgs/{org}/members"))?;
        Ok(members.into_iter().map(|m| Username::from(m.login)).collect())
    }

    fn list_team_members(&self, team: &RemoteTeam) -> Result<BTreeSet<Username>, SourceError> {
        let members: Vec<MemberPayload> =
            self.get_paginated(&format!("teams/{}/members", team.id))?;
        Ok(members.into_iter().map(|m| Username::from(m.login)).collect())
    }

    fn user_exists(&self, user: &Username) -> Result<bool, SourceError> {
        let (request, label) = self.request("HEAD", &format!("users/{user}"));
        match request.call() {
            Ok(response) if response.status() == 200 => Ok(true),
            Ok(response) => Err(SourceError::RemoteStatus {
                request: label,
                status: response.status(),
                body: String::new(),
            }),
            Err(ureq::Error::Status(404, _)) => {
                tracing::info!(user = %user, "user not found on GitHub");
                Ok(false)
            }
            Err(err) => Err(map_error(&label, err)),
        }
    }

    fn ensure_team_exists(
        &self,
        org: &OrgName,
        name: &TeamName,
    ) -> Result<TeamCreation, SourceError> {
        let (request, label) = self.request("POST", &format!("orgs/{org}/teams"));
        let body = json!({
            "name": name.as_str(),
            "description": team_description(name),
            "permission": TEAM_PERMISSION,
        });
        match request.send_json(body) {
            Ok(response) => {
                let created: TeamPayload = decode(response, &label)?;
                tracing::info!(org = %org, team = %name, id = created.id, "created team");
                Ok(TeamCreation::Created(RemoteTeam {
                    id: created.id,
                    name: TeamName::from(created.name),
                }))
            }
            Err(ureq::Error::Status(status, response)) => {
                let body = response.into_string().unwrap_or_default();
                if signals_already_exists(&body) {
                    tracing::debug!(org = %org, team = %name, "team already exists");
                    return Ok(TeamCreation::AlreadyExists);
                }
                Err(SourceError::RemoteStatus {
                    request: label,
                    status,
                    body,
                })
            }
            Err(err) => Err(map_error(&label, err)),
        }
    }

    fn add_member(&self, team: &RemoteTeam, user: &Username) -> Result<(), SourceError> {
        let (request, label) =
            self.request("PUT", &format!("teams/{}/memberships/{user}", team.id));
        send(request, &label)?;
        Ok(())
    }

    fn remove_member(&self, team: &RemoteTeam, user: &Username) -> Result<(), SourceError> {
        let (request, label) =
            self.request("DELETE", &format!("teams/{}/memberships/{user}", team.id));
        send(request, &label)?;
        Ok(())
    }
}

/// Description stored on every team this tool creates.
pub fn team_description(name: &TeamName) -> String {
    format!("{name} team")
}

/// Whether an error body reports the team name as taken, by either the
/// `already_exists` code or the uniqueness message.
pub fn signals_already_exists(body: &str) -> bool {
    let payload: ErrorPayload = serde_json::from_str(body).unwrap_or_default();
    let message_matches = |m: &Option<String>| {
        m.as_deref()
            .is_some_and(|m| m.contains(ALREADY_EXISTS_MESSAGE))
    };
    message_matches(&payload.message)
        || payload.errors.iter().any(|e| {
            e.code.as_deref() == Some(ALREADY_EXISTS_CODE) || message_matches(&e.message)
        })
}
