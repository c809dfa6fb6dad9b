//! Centralized path resolution for conditor
//!
//! # Environment Variables
//!
//! - `CONDITOR_CONFIG_DIR` - Override config directory
//! - `CONDITOR_STATE_DIR` - Override state directory (execution state,
//!   resource maps, sandbox targets)
//!
//! # Path Resolution Priority
//!
//! For config_dir():
//! 1. `CONDITOR_CONFIG_DIR` environment variable
//! 2. `XDG_CONFIG_HOME/conditor` (if set)
//! 3. Platform default:
//!    - Windows: `%APPDATA%\conditor`
//!    - macOS/Linux: `~/.config/conditor`
//!
//! For state_dir():
//! 1. `CONDITOR_STATE_DIR` environment variable
//! 2. `XDG_STATE_HOME/conditor` (if set)
//! 3. Platform default:
//!    - Windows: `%LOCALAPPDATA%\conditor`
//!    - macOS/Linux: `~/.local/state/conditor`

use anyhow::{Context, Result};
use std::path::PathBuf;

/// Environment variable for config directory override
pub const ENV_CONFIG_DIR: &str = "CONDITOR_CONFIG_DIR";

/// Environment variable for state directory override
pub const ENV_STATE_DIR: &str = "CONDITOR_STATE_DIR";

const APP: &str = "conditor";

/// Get the conditor config directory path
pub fn config_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var(ENV_CONFIG_DIR) {
        let path = expand(&dir);
        log::debug!("Using config dir from {}: {}", ENV_CONFIG_DIR, path.display());
        return Ok(path);
    }

    if let Ok(xdg_config) = std::env::var("XDG_CONFIG_HOME") {
        let path = PathBuf::from(xdg_config).join(APP);
        log::debug!("Using XDG_CONFIG_HOME: {}", path.display());
        return Ok(path);
    }

    #[cfg(windows)]
    {
        if let Some(app_data) = dirs::config_dir() {
            return Ok(app_data.join(APP));
        }
    }

    let home = dirs::home_dir().context("Could not determine home directory")?;
    let path = home.join(".config").join(APP);
    log::debug!("Using default config dir: {}", path.display());
    Ok(path)
}

/// Get the conditor state directory path
pub fn state_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var(ENV_STATE_DIR) {
        let path = expand(&dir);
        log::debug!("Using state dir from {}: {}", ENV_STATE_DIR, path.display());
        return Ok(path);
    }

    if let Ok(xdg_state) = std::env::var("XDG_STATE_HOME") {
        let path = PathBuf::from(xdg_state).join(APP);
        log::debug!("Using XDG_STATE_HOME: {}", path.display());
        return Ok(path);
    }

    #[cfg(windows)]
    {
        if let Some(local_app_data) = dirs::data_local_dir() {
            return Ok(local_app_data.join(APP));
        }
    }

    let home = dirs::home_dir().context("Could not determine home directory")?;
    let path = home.join(".local").join("state").join(APP);
    log::debug!("Using default state dir: {}", path.display());
    Ok(path)
}

/// Expand ~ and environment variables in a path string.
///
/// Unknown variables are left as written.
pub fn expand(path: &str) -> PathBuf {
    let expanded = shellexpand::full(path).unwrap_or(std::borrow::Cow::Borrowed(path));
    PathBuf::from(expanded.as_ref())
}
