//! Persisted snapshots of what the last pass saw on the server

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Utc};
use declarative::{RemoteRecord, ResourceKey, Snapshots};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Current on-disk layout
pub const STATE_FORMAT: u32 = 1;

/// State file contents
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct State {
    /// Layout version, bumped on incompatible changes
    pub format: u32,

    /// Last time the state was written
    pub last_updated: DateTime<Utc>,

    /// Records in creation order
    #[serde(default, rename = "resource")]
    pub resources: Vec<RemoteRecord>,
}

impl Default for State {
    fn default() -> Self {
        Self {
            format: STATE_FORMAT,
            last_updated: Utc::now(),
            resources: Vec::new(),
        }
    }
}

impl State {
    /// Load state from disk, or return empty state if the file doesn't exist
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::debug!("State file {} does not exist, starting empty", path.display());
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read state file: {}", path.display()))?;
        let state: State = toml::from_str(&content)
            .with_context(|| format!("Failed to parse state file: {}", path.display()))?;

        if state.format != STATE_FORMAT {
            bail!(
                "State file {} has format {}, this version reads format {}",
                path.display(),
                state.format,
                STATE_FORMAT
            );
        }

        log::debug!(
            "Loaded {} resource(s) from {}",
            state.resources.len(),
            path.display()
        );
        Ok(state)
    }

    /// Stamp and write state to disk, creating parent directories
    pub fn save(&mut self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create state directory: {}", dir.display()))?;
        }

        self.last_updated = Utc::now();
        let content = toml::to_string_pretty(&*self).context("Failed to serialize state to TOML")?;
        fs::write(path, &content)
            .with_context(|| format!("Failed to write state file: {}", path.display()))?;

        log::debug!("Saved state to {}", path.display());
        Ok(())
    }

    /// Records keyed for the reconciler
    pub fn snapshots(&self) -> Snapshots {
        self.resources
            .iter()
            .map(|record| (record.key(), record.clone()))
            .collect()
    }

    /// Replace every record with the result of a pass
    pub fn replace(&mut self, snapshots: &Snapshots) {
        self.resources = snapshots.values().cloned().collect();
    }

    /// Insert or overwrite one record, keeping its position if present
    pub fn upsert(&mut self, record: RemoteRecord) {
        let key = record.key();
        match self.resources.iter_mut().find(|r| r.key() == key) {
            Some(existing) => *existing = record,
            None => self.resources.push(record),
        }
    }

    pub fn get(&self, key: &ResourceKey) -> Option<&RemoteRecord> {
        self.resources.iter().find(|r| r.key() == *key)
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}
