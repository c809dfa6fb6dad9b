//! Durable execution state, one JSON file per plan
//!
//! Unreadable state is treated as empty so a run can continue, but the
//! bad file is moved aside to `<file>.corrupt` and a warning is logged.

use crate::error::{Error, Result};
use crate::types::ExecutionState;
use std::fs;
use std::path::{Path, PathBuf};

/// Reads and writes `plan_state_<name>.json` files in one directory
#[derive(Debug, Clone)]
pub struct StateStore {
    dir: PathBuf,
}

impl StateStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// State file for a plan name
    pub fn path_for(&self, plan_name: &str) -> PathBuf {
        let name = sanitize_name(plan_name).unwrap_or_else(|| "plan".to_string());
        self.dir.join(format!("plan_state_{name}.json"))
    }

    /// Load persisted state; missing or unreadable state yields an empty one
    pub fn load(&self, plan_name: &str) -> ExecutionState {
        let path = self.path_for(plan_name);
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return ExecutionState::default();
            }
            Err(e) => {
                log::warn!("Cannot read {}: {e}; starting from scratch", path.display());
                return ExecutionState::default();
            }
        };

        match serde_json::from_str(&content) {
            Ok(state) => {
                log::debug!("Loaded execution state from {}", path.display());
                state
            }
            Err(e) => {
                log::warn!(
                    "Execution state {} is corrupt ({e}); previously completed steps may run again",
                    path.display()
                );
                set_aside(&path);
                ExecutionState::default()
            }
        }
    }

    /// Persist state atomically
    pub fn save(&self, plan_name: &str, state: &ExecutionState) -> Result<()> {
        let content = serde_json::to_string_pretty(state)?;
        write_atomic(&self.path_for(plan_name), &content)
    }

    /// Delete persisted state; returns whether a file existed
    pub fn reset(&self, plan_name: &str) -> Result<bool> {
        let path = self.path_for(plan_name);
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(Error::file(path, e)),
        }
    }
}

/// Make a name filesystem-safe: ASCII alphanumerics, `_` and `-` are kept,
/// whitespace becomes `_`, anything else is dropped. `None` if nothing remains.
pub fn sanitize_name(raw: &str) -> Option<String> {
    let cleaned: String = raw
        .trim()
        .chars()
        .filter_map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                Some(c)
            } else if c.is_whitespace() {
                Some('_')
            } else {
                None
            }
        })
        .collect();
    if cleaned.is_empty() { None } else { Some(cleaned) }
}

/// Write through a sibling temp file and rename, so readers never see a
/// half-written file.
pub fn write_atomic(path: &Path, content: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| Error::file(parent, e))?;
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    fs::write(&tmp, content).map_err(|e| Error::file(&tmp, e))?;
    fs::rename(&tmp, path).map_err(|e| Error::file(path, e))?;
    Ok(())
}

/// Move an unreadable file to `<file>.corrupt`
pub fn set_aside(path: &Path) {
    let mut target = path.as_os_str().to_owned();
    target.push(".corrupt");
    let target = PathBuf::from(target);
    match fs::rename(path, &target) {
        Ok(()) => log::warn!("Moved unreadable file to {}", target.display()),
        Err(e) => log::warn!("Could not move {} aside: {e}", path.display()),
    }
}
