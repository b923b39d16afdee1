//! Directory (employee) service client.
//!
//! Two reads are joined: `GET /employees` tells which logins are active and
//! `GET /employees?account=<platform>` maps each login to the usernames it
//! registered on the remote platform.

use std::collections::{BTreeMap, BTreeSet};

use serde::Deserialize;
use teamsync_core::{DirectorySource, SourceError, Uid, Username};

use crate::http::{decode, join_url, send, HttpClient};

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct Employee {
    #[serde(default)]
    pub login: Option<String>,
    #[serde(default)]
    pub inactive: Option<bool>,
}

/// Blocking client for the directory service.
#[derive(Debug, Clone)]
pub struct DirectoryClient {
    http: HttpClient,
    base_url: String,
    token: String,
    account: String,
}

impl DirectoryClient {
    pub fn new(
        http: HttpClient,
        base_url: impl Into<String>,
        token: impl Into<String>,
        account: impl Into<String>,
    ) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            token: token.into(),
            account: account.into(),
        }
    }

    fn get<T: serde::de::DeserializeOwned>(
        &self,
        query: Option<(&str, &str)>,
    ) -> Result<T, SourceError> {
        let url = join_url(&self.base_url, "employees");
        let mut request = self
            .http
            .agent()
            .get(&url)
            .set("Authorization", &format!("Bearer {}", self.token));
        if let Some((key, value)) = query {
            request = request.query(key, value);
        }
        let label = format!("GET {url}");
        let response = send(request, &label).map_err(unavailable)?;
        decode(response, &label).map_err(unavailable)
    }
}

impl DirectorySource for DirectoryClient {
    fn list_active_external_mappings(&self) -> Result<BTreeSet<(Username, Uid)>, SourceError> {
        let employees: Vec<Employee> = self.get(None)?;
        let accounts: BTreeMap<String, Vec<String>> =
            self.get(Some(("account", self.account.as_str())))?;
        let mappings = join_active_mappings(&employees, &accounts);
        tracing::info!(
            employees = employees.len(),
            mappings = mappings.len(),
            "resolved directory usernames"
        );
        Ok(mappings)
    }
}

fn unavailable(err: SourceError) -> SourceError {
    SourceError::DirectoryUnavailable {
        reason: err.to_string(),
    }
}

/// Keep only uids that are active and pair each with its normalized usernames.
pub(crate) fn join_active_mappings(
    employees: &[Employee],
    accounts: &BTreeMap<String, Vec<String>>,
) -> BTreeSet<(Username, Uid)> {
    let active: BTreeSet<&str> = employees
        .iter()
        .filter(|e| !e.inactive.unwrap_or(false))
        .filter_map(|e| e.login.as_deref())
        .filter(|login| !login.is_empty())
        .collect();

    let mut pairs = BTreeSet::new();
    for (uid, usernames) in accounts {
        if !active.contains(uid.as_str()) {
            continue;
        }
        for raw in usernames {
            if let Some(username) = normalize_username(raw) {
                pairs.insert((username, Uid::from(uid.as_str())));
            }
        }
    }
    pairs
}

/// Reduce a profile URL such as `https://github.com/alice` to `alice`.
pub fn normalize_username(raw: &str) -> Option<Username> {
    let trimmed = raw.trim().trim_end_matches('/');
    let last = trimmed.rsplit('/').next().unwrap_or(trimmed).trim();
    if last.is_empty() {
        return None;
    }
    Some(Username::from(last))
}
