//! Per-service username storage.
//!
//! The billing host owns the service record; these stores only need to keep
//! one username per service id.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::debug;

pub trait ServiceStore {
    fn username(&self, service_id: u64) -> Result<Option<String>>;
    fn set_username(&self, service_id: u64, username: &str) -> Result<()>;
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    usernames: Mutex<BTreeMap<u64, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_username(self, service_id: u64, username: &str) -> Self {
        if let Ok(mut usernames) = self.usernames.lock() {
            usernames.insert(service_id, username.to_string());
        }
        self
    }
}

impl ServiceStore for MemoryStore {
    fn username(&self, service_id: u64) -> Result<Option<String>> {
        let usernames = self
            .usernames
            .lock()
            .map_err(|_| anyhow::anyhow!("username store lock poisoned"))?;
        Ok(usernames.get(&service_id).cloned())
    }

    fn set_username(&self, service_id: u64, username: &str) -> Result<()> {
        let mut usernames = self
            .usernames
            .lock()
            .map_err(|_| anyhow::anyhow!("username store lock poisoned"))?;
        usernames.insert(service_id, username.to_string());
        Ok(())
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StateFile {
    #[serde(default)]
    services: BTreeMap<u64, String>,
}

/// JSON file mapping service ids to usernames, used by the admin CLI
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> Result<StateFile> {
        if !self.path.exists() {
            return Ok(StateFile::default());
        }
        let contents = fs::read_to_string(&self.path)
            .context(format!("Failed to read {}", self.path.display()))?;
        serde_json::from_str(&contents).context(format!("Failed to parse {}", self.path.display()))
    }

    fn write(&self, state: &StateFile) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .context(format!("Failed to create {}", parent.display()))?;
            }
        }

        // Replaced via rename; readers see the old or the new file, never a partial one
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_string_pretty(state)?)
            .context(format!("Failed to write {}", tmp.display()))?;
        fs::rename(&tmp, &self.path)
            .context(format!("Failed to replace {}", self.path.display()))?;
        Ok(())
    }
}

impl ServiceStore for FileStore {
    fn username(&self, service_id: u64) -> Result<Option<String>> {
        Ok(self.read()?.services.get(&service_id).cloned())
    }

    fn set_username(&self, service_id: u64, username: &str) -> Result<()> {
        let mut state = self.read()?;
        state.services.insert(service_id, username.to_string());
        self.write(&state)?;
        debug!(
            "Stored username {} for service {} in {}",
            username,
            service_id,
            self.path.display()
        );
        Ok(())
    }
}
