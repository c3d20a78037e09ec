//! Centralized path resolution for pipewright
//!
//! # Environment Variables
//!
//! - `PIPEWRIGHT_CONFIG_DIR` - Override config directory (holds `pipewright.toml`)
//! - `PIPEWRIGHT_STATE_DIR` - Override state directory (holds `state.toml`)
//!
//! # Path Resolution Priority
//!
//! For config_dir():
//! 1. `PIPEWRIGHT_CONFIG_DIR` environment variable
//! 2. `XDG_CONFIG_HOME/pipewright` (if set)
//! 3. `~/.config/pipewright`
//!
//! For state_dir():
//! 1. `PIPEWRIGHT_STATE_DIR` environment variable
//! 2. `XDG_STATE_HOME/pipewright` (if set)
//! 3. `~/.local/state/pipewright`

use anyhow::{Context, Result};
use std::path::PathBuf;

/// Environment variable for config directory override
pub const ENV_CONFIG_DIR: &str = "PIPEWRIGHT_CONFIG_DIR";

/// Environment variable for state directory override
pub const ENV_STATE_DIR: &str = "PIPEWRIGHT_STATE_DIR";

/// Provider settings file inside the config directory
pub const PROVIDER_FILE: &str = "pipewright.toml";

/// Default state file inside the state directory
pub const STATE_FILE: &str = "state.toml";

/// Get the pipewright config directory path
pub fn config_dir() -> Result<PathBuf> {
    resolve_config_dir(|key| std::env::var(key).ok())
}

/// Get the pipewright state directory path
pub fn state_dir() -> Result<PathBuf> {
    resolve_state_dir(|key| std::env::var(key).ok())
}

fn resolve_config_dir(var: impl Fn(&str) -> Option<String>) -> Result<PathBuf> {
    if let Some(dir) = var(ENV_CONFIG_DIR) {
        let path = expand(&dir);
        log::debug!("Using config dir from {}: {}", ENV_CONFIG_DIR, path.display());
        return Ok(path);
    }

    if let Some(xdg_config) = var("XDG_CONFIG_HOME") {
        let path = PathBuf::from(xdg_config).join("pipewright");
        log::debug!("Using XDG_CONFIG_HOME: {}", path.display());
        return Ok(path);
    }

    let home = dirs::home_dir().context("Could not determine home directory")?;
    let path = home.join(".config").join("pipewright");
    log::debug!("Using default config dir: {}", path.display());
    Ok(path)
}

fn resolve_state_dir(var: impl Fn(&str) -> Option<String>) -> Result<PathBuf> {
    if let Some(dir) = var(ENV_STATE_DIR) {
        let path = expand(&dir);
        log::debug!("Using state dir from {}: {}", ENV_STATE_DIR, path.display());
        return Ok(path);
    }

    if let Some(xdg_state) = var("XDG_STATE_HOME") {
        let path = PathBuf::from(xdg_state).join("pipewright");
        log::debug!("Using XDG_STATE_HOME: {}", path.display());
        return Ok(path);
    }

    let home = dirs::home_dir().context("Could not determine home directory")?;
    let path = home.join(".local").join("state").join("pipewright");
    log::debug!("Using default state dir: {}", path.display());
    Ok(path)
}

/// Provider settings file, `<config dir>/pipewright.toml`
pub fn provider_file() -> Result<PathBuf> {
    Ok(config_dir()?.join(PROVIDER_FILE))
}

/// State file to use: an explicit `--state` path, else `<state dir>/state.toml`
pub fn state_file(explicit: Option<&str>) -> Result<PathBuf> {
    match explicit {
        Some(path) => Ok(expand(path)),
        None => Ok(state_dir()?.join(STATE_FILE)),
    }
}

/// Expand ~ and environment variables in a path string.
///
/// Unknown variables are left as written.
pub fn expand(path: &str) -> PathBuf {
    let expanded = shellexpand::full(path).unwrap_or(std::borrow::Cow::Borrowed(path));
    PathBuf::from(expanded.as_ref())
}
