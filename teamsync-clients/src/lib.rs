//! # teamsync-clients
//!
//! Blocking HTTP implementations of the `teamsync-core` source traits:
//! [`DirectoryClient`], [`TeamServiceClient`] and [`GithubClient`]. All three
//! share one [`HttpClient`] connection pool.

pub mod directory;
pub mod github;
pub mod http;
pub mod teams;

pub use directory::DirectoryClient;
pub use github::GithubClient;
pub use http::HttpClient;
pub use teams::TeamServiceClient;

use teamsync_core::{config, Config, ConfigError};

/// The three clients a run needs, wired from one config.
#[derive(Debug, Clone)]
pub struct Clients {
    pub directory: DirectoryClient,
    pub teams: TeamServiceClient,
    pub github: GithubClient,
}

impl Clients {
    /// Build every client over `http`, reading tokens from the environment
    /// variables the config names.
    pub fn from_config(config: &Config, http: HttpClient) -> Result<Self, ConfigError> {
        let service_token = config::resolve_token(&config.service_token_env)?;
        let github_token = config::resolve_token(&config.github.token_env)?;
        Ok(Self {
            directory: DirectoryClient::new(
                http.clone(),
                config.directory.url.clone(),
                service_token.clone(),
                config.directory.account.clone(),
            ),
            teams: TeamServiceClient::new(http.clone(), config.team_service.url.clone(), service_token),
            github: GithubClient::new(http, config.github.api_url.clone(), github_token),
        })
    }
}
