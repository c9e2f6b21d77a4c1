//! Persisted state
//!
//! The only thing that survives between runs is the trust password
//! verification hash of each managed server, keyed by its server path.
//! The file is read and written without locking; concurrent runs against
//! the same server path are not safe.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::password;

// ============================================================================
// State Structures
// ============================================================================

/// Main state structure
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SlingState {
    /// State for each managed server, keyed by server path
    #[serde(default)]
    pub servers: BTreeMap<String, ServerState>,

    /// Last time the state was updated
    pub last_updated: DateTime<Utc>,
}

/// State for a single LXD server
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct ServerState {
    /// `hex(pbkdf2)` + `hex(salt)` of the last trust password we set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trust_password: Option<String>,
}

impl SlingState {
    /// Load state from disk, or return default if file doesn't exist
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::debug!("State file does not exist, using default state");
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read state file: {}", path.display()))?;

        let state: SlingState = toml::from_str(&content)
            .with_context(|| format!("Failed to parse state file: {}", path.display()))?;

        log::debug!("Loaded state from {}", path.display());
        Ok(state)
    }

    /// Save state to disk
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create state directory: {}", dir.display()))?;
        }

        let content = toml::to_string_pretty(&self).context("Failed to serialize state to TOML")?;

        fs::write(path, &content)
            .with_context(|| format!("Failed to write state file: {}", path.display()))?;

        log::debug!("Saved state to {}", path.display());
        Ok(())
    }

    /// Update the last_updated timestamp and save
    pub fn touch(&mut self, path: &Path) -> Result<()> {
        self.last_updated = Utc::now();
        self.save(path)
    }

    // ========================================================================
    // Trust Password Helpers
    // ========================================================================

    /// Check a password against the stored hash for a server
    pub fn password_matches(&self, server_path: &str, password: &str) -> bool {
        self.servers
            .get(server_path)
            .and_then(|s| s.trust_password.as_deref())
            .is_some_and(|hash| password::verify_password(password, hash))
    }

    /// Remember a freshly set password for a server
    pub fn record_password(&mut self, server_path: &str, password: &str) {
        self.servers
            .entry(server_path.to_string())
            .or_default()
            .trust_password = Some(password::hash_password(password));
    }
}

impl Default for SlingState {
    fn default() -> Self {
        Self {
            servers: BTreeMap::new(),
            last_updated: Utc::now(),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_state() {
        let state = SlingState::default();
        assert!(state.servers.is_empty());
        assert!(!state.password_matches("/var/lib/lxd", "anything"));
    }

    #[test]
    fn test_password_record_is_per_server() {
        let mut state = SlingState::default();
        state.record_password("/var/lib/lxd", "s3cret");

        assert!(state.password_matches("/var/lib/lxd", "s3cret"));
        assert!(!state.password_matches("/var/lib/lxd", "other"));
        assert!(!state.password_matches("/srv/lxd", "s3cret"));
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("state.toml");

        let mut state = SlingState::default();
        state.record_password("/var/lib/lxd", "s3cret");
        state.touch(&path).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert!(content.contains("[servers.\"/var/lib/lxd\"]"));

        let loaded = SlingState::load(&path).unwrap();
        assert!(loaded.password_matches("/var/lib/lxd", "s3cret"));
    }

    #[test]
    fn test_missing_file_is_empty_state() {
        let dir = tempfile::tempdir().unwrap();
        let state = SlingState::load(&dir.path().join("absent.toml")).unwrap();
        assert!(state.servers.is_empty());
    }
}
