//! teamsync core library: domain types, client seams, configuration and errors.
//!
//! - [`types`]: newtypes and desired/remote state structs
//! - [`source`]: traits implemented by the HTTP clients and test fakes
//! - [`config`]: load / save / init of `~/.teamsync/config.yaml`
//! - [`error`]: [`ConfigError`] and [`SourceError`]

pub mod config;
pub mod error;
pub mod source;
pub mod types;

pub use config::Config;
pub use error::{ConfigError, SourceError};
pub use source::{DirectorySource, RemoteOrg, TeamMembershipSource};
pub use types::{
    fold_usernames, DesiredState, OrgName, RemoteTeam, TeamCreation, TeamMemberships, TeamName, Uid, Username,
};
