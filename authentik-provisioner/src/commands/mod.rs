pub mod account;
pub mod username;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use crate::config::{self, ServerConfig, TOKEN_VAR, URL_VAR};
use crate::module;

/// Authentik provisioning administration CLI
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose logging for additional debugging information
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Authentik instance URL (defaults to AUTHENTIK_URL)
    #[arg(long, global = true)]
    pub url: Option<String>,

    /// API token (defaults to AUTHENTIK_API_TOKEN)
    #[arg(long, global = true)]
    pub token: Option<String>,

    /// Group new accounts are added to (defaults to AUTHENTIK_GROUP, then "stash")
    #[arg(long, global = true)]
    pub group: Option<String>,

    /// Request timeout in seconds (defaults to AUTHENTIK_TIMEOUT_SECS, then 30)
    #[arg(long, global = true)]
    pub timeout: Option<u64>,

    /// File mapping service ids to usernames (defaults to AUTHENTIK_STATE_FILE)
    #[arg(long, global = true)]
    pub state_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Username generation and lookup
    Username {
        #[command(subcommand)]
        subcommand: username::UsernameCommands,
    },

    /// Drive lifecycle operations for a service
    Account {
        #[command(subcommand)]
        subcommand: account::AccountCommands,
    },

    /// Print the module's configuration options as JSON
    #[command(name = "config-options")]
    ConfigOptions,
}

impl Cli {
    /// Server settings from flags, falling back to the environment
    pub fn server_config(&self) -> Result<ServerConfig> {
        let config = match (&self.url, &self.token) {
            (None, None) => ServerConfig::from_env().context(format!(
                "Set {} and {} in authentik.env or pass --url and --token",
                URL_VAR, TOKEN_VAR
            ))?,
            _ => {
                let url = match &self.url {
                    Some(url) => url.clone(),
                    None => config::get_env_var(URL_VAR)?,
                };
                let token = match &self.token {
                    Some(token) => token.clone(),
                    None => config::get_env_var(TOKEN_VAR)?,
                };
                let mut config = ServerConfig::new(&url, &token)?;
                if let Some(group) = config::get_optional_env_var(config::GROUP_VAR) {
                    config = config.with_group(&group);
                }
                config
            }
        };

        let config = match &self.group {
            Some(group) => config.with_group(group),
            None => config,
        };
        let config = match self.timeout {
            Some(secs) => config.with_timeout(Duration::from_secs(secs)),
            None => config,
        };

        debug!("Using {:?}", config);
        Ok(config)
    }

    pub fn state_file(&self) -> PathBuf {
        self.state_file
            .clone()
            .unwrap_or_else(config::state_file_path)
    }
}

/// Audit events go out at info level, so no default may filter them below that
fn default_filter(verbose: bool) -> &'static str {
    if verbose {
        "debug"
    } else {
        "info,authentik_provisioner=info,authentik::audit=info"
    }
}

fn init_tracing(verbose: bool) {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(default_filter(verbose))),
        )
        .with_writer(std::io::stderr)
        .init();
}

/// Execute the CLI command
pub fn execute() -> Result<()> {
    // Load before parsing so flags that fall back to the environment see the file
    let env_file = config::load_env();

    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match &env_file {
        Ok(path) => debug!("Loaded environment from {}", path),
        Err(e) => debug!("No env file loaded: {:#}", e),
    }

    match &cli.command {
        Commands::Username { subcommand } => {
            username::execute(&cli, subcommand).context("Failed to execute username command")
        }
        Commands::Account { subcommand } => {
            account::execute(&cli, subcommand).context("Failed to execute account command")
        }
        Commands::ConfigOptions => {
            let mut options = serde_json::Map::new();
            for option in module::config_options() {
                options.insert(option.key.to_string(), serde_json::to_value(&option)?);
            }
            println!("{}", serde_json::to_string_pretty(&options)?);
            Ok(())
        }
    }
}
