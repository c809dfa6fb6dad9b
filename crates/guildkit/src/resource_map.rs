//! Durable step-id to resource mapping, the idempotency ledger.
//!
//! A step id present in the map means the resource was already created;
//! the handler trusts this without asking the service.

use crate::error::Result;
use crate::permissions::format_color;
use crate::types::{RemoteResource, ResourceId, TargetId};
use buildplan::state::{sanitize_name, set_aside, write_atomic};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Which section of the map an entry lives in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceCategory {
    Roles,
    Categories,
    Channels,
}

/// Stored identity of a created resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceRecord {
    pub id: ResourceId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    /// Permission bits of a role
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permissions: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    /// Overwrite policy as written in the plan
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overwrites: Option<Value>,
}

impl ResourceRecord {
    /// Minimal record: id and name only
    pub fn new(id: ResourceId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            color: None,
            permissions: None,
            kind: None,
            topic: None,
            overwrites: None,
        }
    }

    pub fn role(role: &RemoteResource) -> Self {
        Self {
            color: role.color.map(format_color),
            permissions: Some(role.permissions.bits()),
            ..Self::new(role.id, &role.name)
        }
    }

    pub fn channel(channel: &RemoteResource, overwrites: Option<Value>) -> Self {
        Self {
            kind: channel.channel_kind.map(|k| k.as_str().to_string()),
            topic: channel.topic.clone(),
            overwrites,
            ..Self::new(channel.id, &channel.name)
        }
    }
}

/// On-disk layout of a resource map file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceMap {
    #[serde(default)]
    pub roles: BTreeMap<String, ResourceRecord>,
    #[serde(default)]
    pub categories: BTreeMap<String, ResourceRecord>,
    #[serde(default)]
    pub channels: BTreeMap<String, ResourceRecord>,
}

impl ResourceMap {
    pub fn section(&self, category: ResourceCategory) -> &BTreeMap<String, ResourceRecord> {
        match category {
            ResourceCategory::Roles => &self.roles,
            ResourceCategory::Categories => &self.categories,
            ResourceCategory::Channels => &self.channels,
        }
    }

    fn section_mut(&mut self, category: ResourceCategory) -> &mut BTreeMap<String, ResourceRecord> {
        match category {
            ResourceCategory::Roles => &mut self.roles,
            ResourceCategory::Categories => &mut self.categories,
            ResourceCategory::Channels => &mut self.channels,
        }
    }

    pub fn len(&self) -> usize {
        self.roles.len() + self.categories.len() + self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Narrow store interface the handler depends on
pub trait ResourceStore: Send {
    fn get(&self, category: ResourceCategory, step_id: &str) -> Option<ResourceRecord>;

    fn put(&mut self, category: ResourceCategory, step_id: &str, record: ResourceRecord) -> Result<()>;
}

/// In-memory store, for tests and dry runs
#[derive(Debug, Clone, Default)]
pub struct MemoryResourceStore {
    map: ResourceMap,
}

impl MemoryResourceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn map(&self) -> &ResourceMap {
        &self.map
    }
}

impl ResourceStore for MemoryResourceStore {
    fn get(&self, category: ResourceCategory, step_id: &str) -> Option<ResourceRecord> {
        self.map.section(category).get(step_id).cloned()
    }

    fn put(&mut self, category: ResourceCategory, step_id: &str, record: ResourceRecord) -> Result<()> {
        self.map.section_mut(category).insert(step_id.to_string(), record);
        Ok(())
    }
}

/// File-backed store, rewritten after every put
#[derive(Debug, Clone)]
pub struct FileResourceStore {
    path: PathBuf,
    map: ResourceMap,
}

impl FileResourceStore {
    /// `resource_map_<target>[_<namespace>].json` under `dir`
    pub fn path_for(dir: &Path, target: TargetId, namespace: Option<&str>) -> PathBuf {
        let file = match namespace.and_then(sanitize_name) {
            Some(ns) => format!("resource_map_{target}_{ns}.json"),
            None => format!("resource_map_{target}.json"),
        };
        dir.join(file)
    }

    /// Open the map for a (target, namespace) pair.
    ///
    /// A missing file is an empty map. A corrupt file is set aside and also
    /// treated as empty, which drops its idempotency guarantees; this is
    /// logged as a warning.
    pub fn open(dir: &Path, target: TargetId, namespace: Option<&str>) -> Self {
        let path = Self::path_for(dir, target, namespace);
        let map = match std::fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(map) => map,
                Err(e) => {
                    log::warn!(
                        "Resource map {} is corrupt ({e}); resources may be created again",
                        path.display()
                    );
                    set_aside(&path);
                    ResourceMap::default()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => ResourceMap::default(),
            Err(e) => {
                log::warn!("Cannot read resource map {}: {e}", path.display());
                ResourceMap::default()
            }
        };
        log::debug!("Opened resource map {} ({} entries)", path.display(), map.len());
        Self { path, map }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn map(&self) -> &ResourceMap {
        &self.map
    }
}

impl ResourceStore for FileResourceStore {
    fn get(&self, category: ResourceCategory, step_id: &str) -> Option<ResourceRecord> {
        self.map.section(category).get(step_id).cloned()
    }

    fn put(&mut self, category: ResourceCategory, step_id: &str, record: ResourceRecord) -> Result<()> {
        self.map.section_mut(category).insert(step_id.to_string(), record);
        write_atomic(&self.path, &serde_json::to_string_pretty(&self.map)?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_path_for() {
        let dir = Path::new("/state");
        assert_eq!(
            FileResourceStore::path_for(dir, 5, None),
            PathBuf::from("/state/resource_map_5.json")
        );
        assert_eq!(
            FileResourceStore::path_for(dir, 5, Some("build gaming")),
            PathBuf::from("/state/resource_map_5_build_gaming.json")
        );
        assert_eq!(
            FileResourceStore::path_for(dir, 5, Some("???")),
            PathBuf::from("/state/resource_map_5.json")
        );
    }

    #[test]
    fn test_file_store_survives_reopen() {
        let temp = TempDir::new().unwrap();
        let mut store = FileResourceStore::open(temp.path(), 1, Some("p"));
        assert!(store.map().is_empty());

        let mut record = ResourceRecord::new(10, "general");
        record.overwrites = Some(json!({"@everyone": {"deny": ["send_messages"]}}));
        store.put(ResourceCategory::Channels, "chan-general", record.clone()).unwrap();

        let reopened = FileResourceStore::open(temp.path(), 1, Some("p"));
        assert_eq!(reopened.get(ResourceCategory::Channels, "chan-general"), Some(record));
        assert_eq!(reopened.get(ResourceCategory::Roles, "chan-general"), None);
    }

    #[test]
    fn test_corrupt_map_is_set_aside() {
        let temp = TempDir::new().unwrap();
        let path = FileResourceStore::path_for(temp.path(), 1, None);
        std::fs::write(&path, "not json").unwrap();

        let store = FileResourceStore::open(temp.path(), 1, None);
        assert!(store.map().is_empty());
        assert!(temp.path().join("resource_map_1.json.corrupt").exists());
    }

    #[test]
    fn test_memory_store() {
        let mut store = MemoryResourceStore::new();
        store
            .put(ResourceCategory::Roles, "role-admin", ResourceRecord::new(3, "Admin"))
            .unwrap();
        assert_eq!(store.get(ResourceCategory::Roles, "role-admin").unwrap().id, 3);
        assert_eq!(store.map().len(), 1);
    }
}
