//! Path resolution for lxd-sling
//!
//! # Environment Variables
//!
//! - `LXD_SLING_CONFIG_DIR` - Override config directory
//! - `LXD_SLING_STATE_DIR` - Override state directory
//!
//! # Path Resolution Priority
//!
//! For config_dir():
//! 1. `LXD_SLING_CONFIG_DIR` environment variable
//! 2. `XDG_CONFIG_HOME/lxd-sling` (if set)
//! 3. `~/.config/lxd-sling`
//!
//! For state_dir():
//! 1. `LXD_SLING_STATE_DIR` environment variable
//! 2. `XDG_STATE_HOME/lxd-sling` (if set)
//! 3. `~/.local/state/lxd-sling`

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

const APP_NAME: &str = "lxd-sling";

/// Environment variable for config directory override
pub const ENV_CONFIG_DIR: &str = "LXD_SLING_CONFIG_DIR";

/// Environment variable for state directory override
pub const ENV_STATE_DIR: &str = "LXD_SLING_STATE_DIR";

/// Get the lxd-sling config directory path
pub fn config_dir() -> Result<PathBuf> {
    let path = resolve(
        std::env::var(ENV_CONFIG_DIR).ok().as_deref(),
        std::env::var("XDG_CONFIG_HOME").ok().as_deref(),
        &home_dir()?,
        &[".config"],
    );
    log::debug!("Using config dir: {}", path.display());
    Ok(path)
}

/// Get the lxd-sling state directory path
pub fn state_dir() -> Result<PathBuf> {
    let path = resolve(
        std::env::var(ENV_STATE_DIR).ok().as_deref(),
        std::env::var("XDG_STATE_HOME").ok().as_deref(),
        &home_dir()?,
        &[".local", "state"],
    );
    log::debug!("Using state dir: {}", path.display());
    Ok(path)
}

/// Default desired-state file
pub fn config_file() -> Result<PathBuf> {
    Ok(config_dir()?.join("config.toml"))
}

fn home_dir() -> Result<PathBuf> {
    dirs::home_dir().context("Could not determine home directory")
}

/// Override, then XDG base, then the default under home
fn resolve(override_dir: Option<&str>, xdg_base: Option<&str>, home: &Path, default: &[&str]) -> PathBuf {
    if let Some(dir) = override_dir.filter(|d| !d.is_empty()) {
        return expand(dir);
    }
    if let Some(base) = xdg_base.filter(|d| !d.is_empty()) {
        return PathBuf::from(base).join(APP_NAME);
    }
    default
        .iter()
        .fold(home.to_path_buf(), |path, part| path.join(part))
        .join(APP_NAME)
}

/// Expand ~ and environment variables in a path string.
///
/// Unknown variables are left as written.
pub fn expand(path: &str) -> PathBuf {
    let expanded = shellexpand::full(path).unwrap_or(std::borrow::Cow::Borrowed(path));
    PathBuf::from(expanded.as_ref())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_override_wins() {
        let path = resolve(Some("/custom/config"), Some("/xdg"), Path::new("/home/u"), &[".config"]);
        assert_eq!(path, PathBuf::from("/custom/config"));
    }

    #[test]
    fn test_override_with_tilde() {
        let home = dirs::home_dir().unwrap();
        let path = resolve(Some("~/dotfiles/sling"), None, Path::new("/home/u"), &[".config"]);
        assert_eq!(path, home.join("dotfiles").join("sling"));
    }

    #[test]
    fn test_xdg_base() {
        let path = resolve(None, Some("/tmp/xdg-state"), Path::new("/home/u"), &[".local", "state"]);
        assert_eq!(path, PathBuf::from("/tmp/xdg-state/lxd-sling"));
    }

    #[test]
    fn test_empty_values_are_ignored() {
        let path = resolve(Some(""), Some(""), Path::new("/home/u"), &[".local", "state"]);
        assert_eq!(path, PathBuf::from("/home/u/.local/state/lxd-sling"));
    }

    #[test]
    fn test_expand_absolute() {
        assert_eq!(expand("/absolute/path"), PathBuf::from("/absolute/path"));
    }

    #[test]
    fn test_expand_unknown_env_var_unchanged() {
        let result = expand("/path/$NONEXISTENT_VAR_12345/file");
        assert_eq!(result, PathBuf::from("/path/$NONEXISTENT_VAR_12345/file"));
    }
}
