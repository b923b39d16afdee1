//! Shared blocking HTTP session.
//!
//! One [`HttpClient`] is built per run and handed to every client, so all of
//! them draw from the same per-host connection pool.

use std::time::Duration;

use serde::de::DeserializeOwned;
use teamsync_core::SourceError;

/// Idle connections kept per remote host.
pub const POOL_SIZE_PER_HOST: usize = 20;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Page size requested from paginated endpoints.
pub(crate) const PAGE_SIZE: &str = "100";

/// Cloneable handle over a pooled `ureq::Agent`.
#[derive(Clone)]
pub struct HttpClient {
    agent: ureq::Agent,
}

impl HttpClient {
    pub fn new(timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(timeout)
            .max_idle_connections_per_host(POOL_SIZE_PER_HOST)
            .user_agent(concat!("teamsync/", env!("CARGO_PKG_VERSION")))
            .build();
        Self { agent }
    }

    pub(crate) fn agent(&self) -> &ureq::Agent {
        &self.agent
    }
}

impl Default for HttpClient {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEOUT)
    }
}

impl std::fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpClient").finish_non_exhaustive()
    }
}

/// Send `request` and map every failure into a [`SourceError`] labelled with
/// `label` (e.g. `"GET /orgs/acme/teams"`).
pub(crate) fn send(request: ureq::Request, label: &str) -> Result<ureq::Response, SourceError> {
    request.call().map_err(|e| map_error(label, e))
}

pub(crate) fn map_error(label: &str, err: ureq::Error) -> SourceError {
    match err {
        ureq::Error::Status(status, response) => SourceError::RemoteStatus {
            request: label.to_string(),
            status,
            body: response.into_string().unwrap_or_default(),
        },
        ureq::Error::Transport(transport) => SourceError::RemoteTransport {
            request: label.to_string(),
            reason: transport.to_string(),
        },
    }
}

pub(crate) fn decode<T: DeserializeOwned>(
    response: ureq::Response,
    label: &str,
) -> Result<T, SourceError> {
    response
        .into_json::<T>()
        .map_err(|e| SourceError::RemoteDecode {
            request: label.to_string(),
            reason: e.to_string(),
        })
}

/// Whether an RFC 8288 `Link` header advertises a `rel="next"` page.
pub(crate) fn has_next_page(link: Option<&str>) -> bool {
    let Some(link) = link else {
        return false;
    };
    link.split(',').any(|part| {
        part.split(';')
            .skip(1)
            .any(|param| matches!(param.trim(), r#"rel="next""# | "rel=next"))
    })
}

/// Join `base` and `path` with exactly one slash between them.
pub(crate) fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(None, false)]
    #[case(Some(""), false)]
    #[case(Some(r#"<https://api.github.com/orgs/x/teams?page=2>; rel="next", <https://api.github.com/orgs/x/teams?page=5>; rel="last""#), true)]
    #[case(Some(r#"<https://api.github.com/orgs/x/teams?page=4>; rel="prev", <https://api.github.com/orgs/x/teams?page=1>; rel="first""#), false)]
    #[case(Some(r#"<https://api.github.com/orgs/next/teams?page=1>; rel="first""#), false)]
    fn link_header_next_detection(#[case] link: Option<&str>, #[case] expected: bool) {
        assert_eq!(has_next_page(link), expected);
    }

    #[test]
    fn join_url_normalizes_slashes() {
        assert_eq!(
            join_url("https://api.github.com/", "/orgs/x/teams"),
            "https://api.github.com/orgs/x/teams"
        );
        assert_eq!(join_url("http://h:1", "teams"), "http://h:1/teams");
    }
}
