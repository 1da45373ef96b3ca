use anyhow::{Context, Result};
use std::env;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

use crate::error::Error;

/// Environment variable pointing at the env file to load
pub const ENV_FILE_VAR: &str = "AUTHENTIK_ENV_FILE";

/// Default paths to check for an env file
pub const DEFAULT_PATHS: &[&str] = &["./authentik.env", "$HOME/.config/authentik/authentik.env"];

pub const URL_VAR: &str = "AUTHENTIK_URL";
pub const TOKEN_VAR: &str = "AUTHENTIK_API_TOKEN";
pub const GROUP_VAR: &str = "AUTHENTIK_GROUP";
pub const TIMEOUT_VAR: &str = "AUTHENTIK_TIMEOUT_SECS";
pub const STATE_FILE_VAR: &str = "AUTHENTIK_STATE_FILE";

pub const DEFAULT_GROUP: &str = "stash";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Connection settings for one Authentik instance
#[derive(Clone)]
pub struct ServerConfig {
    pub base_url: Url,
    pub api_token: String,
    pub group_name: String,
    pub timeout: Duration,
}

impl ServerConfig {
    pub fn new(base_url: &str, api_token: &str) -> Result<Self, Error> {
        let trimmed = base_url.trim().trim_end_matches('/');
        if trimmed.is_empty() {
            return Err(Error::Config("Authentik URL is not set".to_string()));
        }
        if api_token.is_empty() {
            return Err(Error::Config("API token is not set".to_string()));
        }
        let base_url = Url::parse(trimmed)
            .map_err(|e| Error::Config(format!("Invalid Authentik URL '{}': {}", trimmed, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(Error::Config(format!(
                "Authentik URL '{}' cannot be used as a base URL",
                trimmed
            )));
        }

        Ok(Self {
            base_url,
            api_token: api_token.to_string(),
            group_name: DEFAULT_GROUP.to_string(),
            timeout: DEFAULT_TIMEOUT,
        })
    }

    pub fn with_group(mut self, group_name: &str) -> Self {
        if !group_name.trim().is_empty() {
            self.group_name = group_name.trim().to_string();
        }
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Build a config from `AUTHENTIK_*` environment variables
    pub fn from_env() -> Result<Self> {
        let base_url = get_env_var(URL_VAR)?;
        let api_token = get_env_var(TOKEN_VAR)?;
        let mut config = Self::new(&base_url, &api_token)?;

        if let Some(group) = get_optional_env_var(GROUP_VAR) {
            config = config.with_group(&group);
        }
        if let Some(secs) = get_optional_env_var(TIMEOUT_VAR) {
            let secs: u64 = secs
                .parse()
                .context(format!("{} must be a whole number of seconds", TIMEOUT_VAR))?;
            config = config.with_timeout(Duration::from_secs(secs));
        }

        Ok(config)
    }

    /// Instance URL without a trailing slash, as shown to customers
    pub fn public_url(&self) -> String {
        self.base_url.as_str().trim_end_matches('/').to_string()
    }

    /// Build an API URL below `/api/v3`
    pub fn api_url(&self, path: &str) -> String {
        format!(
            "{}/api/v3/{}",
            self.public_url(),
            path.trim_start_matches('/')
        )
    }
}

impl fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerConfig")
            .field("base_url", &self.base_url.as_str())
            .field("api_token", &"***")
            .field("group_name", &self.group_name)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Load environment variables from an env file, returning the path used
pub fn load_env() -> Result<String> {
    if let Ok(env_file) = env::var(ENV_FILE_VAR) {
        let path = shellexpand::full(&env_file)
            .map(|s| s.into_owned())
            .unwrap_or(env_file);
        load_from_path(&path).context(format!("Failed to load environment from {}", path))?;
        return Ok(path);
    }

    for path in DEFAULT_PATHS {
        let expanded_path = shellexpand::full(path)
            .map(|s| s.into_owned())
            .unwrap_or_else(|_| path.to_string());

        if Path::new(&expanded_path).exists() {
            load_from_path(&expanded_path)
                .context(format!("Failed to load environment from {}", expanded_path))?;
            return Ok(expanded_path);
        }
    }

    Err(anyhow::anyhow!(
        "Could not find an Authentik env file. Set {} or create authentik.env in one of the default locations.",
        ENV_FILE_VAR
    ))
}

fn load_from_path(path: &str) -> Result<()> {
    dotenv::from_path(path).context(format!("Failed to load .env file from {}", path))?;
    Ok(())
}

/// Get a required environment variable
pub fn get_env_var(name: &str) -> Result<String> {
    env::var(name).context(format!("Environment variable {} is not set", name))
}

/// Get an optional environment variable
pub fn get_optional_env_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.is_empty())
}

/// Where the CLI keeps its service-id to username map
pub fn state_file_path() -> PathBuf {
    if let Some(path) = get_optional_env_var(STATE_FILE_VAR) {
        let expanded = shellexpand::full(&path)
            .map(|s| s.into_owned())
            .unwrap_or(path);
        return PathBuf::from(expanded);
    }

    dirs::data_local_dir()
        .map(|dir| dir.join("authentik").join("services.json"))
        .unwrap_or_else(|| PathBuf::from("./authentik-services.json"))
}
