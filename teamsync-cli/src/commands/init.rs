//! `teamsync init --org <org>... --directory-url <url> --team-service-url <url>`

use anyhow::{Context, Result};
use clap::Args;

use teamsync_core::{config, Config, OrgName};

use super::home;

/// Write a starter config.
#[derive(Args, Debug)]
pub struct InitArgs {
    /// GitHub organization to manage. Repeat for several.
    #[arg(long = "org", required = true, value_name = "ORG")]
    pub orgs: Vec<String>,

    /// Base URL of the people directory API.
    #[arg(long, env = "TEAMSYNC_DIRECTORY_URL")]
    pub directory_url: String,

    /// Base URL of the team-membership API.
    #[arg(long, env = "TEAMSYNC_TEAM_SERVICE_URL")]
    pub team_service_url: String,
}

impl InitArgs {
    pub fn run(self) -> Result<()> {
        let home = home()?;
        let path = config::config_path_at(&home);
        let existed = path.exists();

        let starter = Config::new(
            self.orgs.into_iter().map(OrgName::from).collect(),
            self.directory_url,
            self.team_service_url,
        );
        let config = config::init_at(&home, starter)
            .with_context(|| format!("failed to init config at {}", path.display()))?;

        if existed {
            println!("✓ Config already present at {}", path.display());
        } else {
            println!("✓ Wrote {}", path.display());
        }
        let orgs: Vec<&str> = config.organizations.iter().map(OrgName::as_str).collect();
        println!("  organizations: {}", orgs.join(", "));
        println!(
            "  tokens are read from ${} and ${}",
            config.github.token_env, config.service_token_env
        );
        Ok(())
    }
}
