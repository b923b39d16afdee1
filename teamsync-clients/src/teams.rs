//! Team-membership service client.
//!
//! The service lists team stubs at `GET /teams` and serves members per team at
//! `GET /teams/{id}`. A detail fetch that fails is logged and skipped so one
//! broken team cannot hide everyone else's memberships.

use serde::Deserialize;
use serde_json::Value;
use teamsync_core::{SourceError, TeamMembershipSource, TeamMemberships, TeamName, Uid};

use crate::http::{decode, join_url, send, HttpClient};

/// Ids arrive untyped; anything empty, zero, null or boolean is skipped.
#[derive(Debug, Deserialize)]
struct TeamStub {
    #[serde(default)]
    id: Value,
}

#[derive(Debug, Deserialize)]
struct TeamDetail {
    #[serde(default)]
    id: Value,
    #[serde(default)]
    member: Vec<String>,
}

fn team_id(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) if n.as_f64() != Some(0.0) => Some(n.to_string()),
        _ => None,
    }
}

/// Blocking client for the team-membership service.
#[derive(Debug, Clone)]
pub struct TeamServiceClient {
    http: HttpClient,
    base_url: String,
    token: String,
}

impl TeamServiceClient {
    pub fn new(http: HttpClient, base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            token: token.into(),
        }
    }

    fn get<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T, SourceError> {
        let url = join_url(&self.base_url, path);
        let label = format!("GET {url}");
        let request = self
            .http
            .agent()
            .get(&url)
            .set("Authorization", &format!("Bearer {}", self.token));
        let response = send(request, &label)?;
        decode(response, &label)
    }
}

impl TeamMembershipSource for TeamServiceClient {
    fn list_team_memberships(&self) -> Result<TeamMemberships, SourceError> {
        let stubs: Vec<TeamStub> =
            self.get("teams")
                .map_err(|e| SourceError::TeamServiceUnavailable {
                    reason: e.to_string(),
                })?;

        let mut memberships = TeamMemberships::new();
        let mut fetched = 0usize;
        for id in stubs.iter().filter_map(|s| team_id(&s.id)) {
            let detail: TeamDetail = match self.get(&format!("teams/{id}")) {
                Ok(detail) => detail,
                Err(err) => {
                    tracing::warn!(team = %id, error = %err, "skipping team detail");
                    continue;
                }
            };
            fetched += 1;
            let name = team_id(&detail.id).unwrap_or_else(|| id.clone());
            for uid in detail.member {
                memberships.insert(Uid::from(uid), TeamName::from(name.as_str()));
            }
        }

        tracing::info!(
            teams = fetched,
            users = memberships.uid_count(),
            "collected team memberships"
        );
        Ok(memberships)
    }
}
