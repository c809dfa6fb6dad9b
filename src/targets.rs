//! Resolving target guild ids to service connections

use anyhow::{Context, Result};
use async_trait::async_trait;
use guildkit::{GuildService, SimulatedGuild, TargetId};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

/// Source of [`GuildService`] connections
#[async_trait]
pub trait TargetProvider: Send + Sync {
    async fn connect(&self, target: TargetId) -> Result<Arc<dyn GuildService>>;
}

/// Local sandbox guilds persisted as `<dir>/target_<id>.json`.
///
/// Connections are cached so every job against a target shares one guild.
pub struct SandboxTargets {
    dir: PathBuf,
    open: Mutex<HashMap<TargetId, Arc<SimulatedGuild>>>,
}

impl SandboxTargets {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            open: Mutex::new(HashMap::new()),
        }
    }

    pub fn path_for(&self, target: TargetId) -> PathBuf {
        self.dir.join(format!("target_{target}.json"))
    }

    pub fn guild(&self, target: TargetId) -> Result<Arc<SimulatedGuild>> {
        let mut open = self.open.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(guild) = open.get(&target) {
            return Ok(Arc::clone(guild));
        }
        let path = self.path_for(target);
        let guild = SimulatedGuild::open(&path, target)
            .with_context(|| format!("Failed to open sandbox target {}", path.display()))?;
        let guild = Arc::new(guild);
        open.insert(target, Arc::clone(&guild));
        Ok(guild)
    }
}

#[async_trait]
impl TargetProvider for SandboxTargets {
    async fn connect(&self, target: TargetId) -> Result<Arc<dyn GuildService>> {
        let guild: Arc<dyn GuildService> = self.guild(target)?;
        Ok(guild)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use guildkit::ResourceKind;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_sandbox_connections_are_shared_and_persisted() {
        let temp = TempDir::new().unwrap();
        let targets = SandboxTargets::new(temp.path());

        let first = targets.connect(5).await.unwrap();
        first.create_category("Info").await.unwrap();
        let second = targets.connect(5).await.unwrap();
        assert_eq!(second.list_existing(ResourceKind::Categories).await.unwrap().len(), 1);
        assert!(targets.path_for(5).exists());

        let reopened = SandboxTargets::new(temp.path());
        let guild = reopened.connect(5).await.unwrap();
        assert_eq!(guild.target_name(), "sandbox-5");
        assert_eq!(guild.list_existing(ResourceKind::Categories).await.unwrap().len(), 1);
    }
}
