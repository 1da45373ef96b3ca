use anyhow::{Context, Result};
use clap::Subcommand;
use std::sync::Arc;

use crate::audit::TracingAuditLog;
use crate::client::IdentityClient;
use crate::commands::Cli;
use crate::username::{self, UsernameDirectory};

#[derive(Subcommand, Debug)]
pub enum UsernameCommands {
    /// Generate random usernames without checking Authentik
    Generate {
        /// How many usernames to print
        #[arg(short, long, default_value_t = 1)]
        count: usize,
    },

    /// Check whether a username already exists in Authentik
    Check {
        /// Username to look up
        username: String,
    },

    /// Generate a username that does not exist in Authentik yet
    Unique,
}

pub fn execute(cli: &Cli, command: &UsernameCommands) -> Result<()> {
    match command {
        UsernameCommands::Generate { count } => {
            for _ in 0..*count {
                println!("{}", username::generate());
            }
            Ok(())
        }
        UsernameCommands::Check { username } => check(cli, username),
        UsernameCommands::Unique => unique(cli),
    }
}

fn client(cli: &Cli) -> Result<IdentityClient> {
    let config = cli.server_config()?;
    IdentityClient::new(config, Arc::new(TracingAuditLog)).context("Failed to build HTTP client")
}

fn check(cli: &Cli, name: &str) -> Result<()> {
    if !username::is_valid_username(name) {
        eprintln!(
            "WARNING: {} does not look like a generated username (letters followed by 4-5 digits)",
            name
        );
    }

    let exists = client(cli)?
        .username_exists(name)
        .context(format!("Failed to check username {}", name))?;
    println!("Username exists: {}", if exists { "Yes" } else { "No" });
    Ok(())
}

fn unique(cli: &Cli) -> Result<()> {
    let client = client(cli)?;
    let name = username::allocate_unique(&client).context("Failed to allocate a username")?;
    println!("Generated unique username: {}", name);
    Ok(())
}
