//! Named template blobs stored as `<dir>/<name>.json`

use anyhow::{Context, Result, bail};
use buildplan::sanitize_name;
use buildplan::state::write_atomic;
use serde_json::Value;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

pub struct TemplateStore {
    dir: PathBuf,
}

impl TemplateStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, name: &str) -> Result<PathBuf> {
        match sanitize_name(name) {
            Some(clean) if clean == name => Ok(self.dir.join(format!("{name}.json"))),
            _ => bail!("Invalid template name '{name}' (use letters, digits, '-' and '_')"),
        }
    }

    /// Stored template names, sorted
    pub fn list(&self) -> Vec<String> {
        if !self.dir.exists() {
            return Vec::new();
        }
        let mut names: Vec<String> = WalkDir::new(&self.dir)
            .min_depth(1)
            .max_depth(1)
            .into_iter()
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(e) => {
                    log::warn!("Skipping unreadable template entry: {e}");
                    None
                }
            })
            .filter(|e| e.file_type().is_file())
            .filter(|e| e.path().extension().is_some_and(|ext| ext == "json"))
            .filter_map(|e| e.path().file_stem()?.to_str().map(str::to_string))
            .collect();
        names.sort();
        names
    }

    pub fn get(&self, name: &str) -> Result<Option<Value>> {
        let path = self.path_for(name)?;
        if !path.exists() {
            return Ok(None);
        }
        read_json(&path).map(Some)
    }

    /// Store a template, replacing any existing one
    pub fn save(&self, name: &str, template: &Value) -> Result<PathBuf> {
        if !template.is_object() {
            bail!("Template '{name}' must be a JSON object");
        }
        let path = self.path_for(name)?;
        write_atomic(&path, &serde_json::to_string_pretty(template)?)
            .with_context(|| format!("Failed to save template '{name}'"))?;
        log::info!("Saved template '{name}' to {}", path.display());
        Ok(path)
    }

    /// Returns false when nothing was stored under `name`
    pub fn remove(&self, name: &str) -> Result<bool> {
        let path = self.path_for(name)?;
        if !path.exists() {
            return Ok(false);
        }
        std::fs::remove_file(&path).with_context(|| format!("Failed to remove {}", path.display()))?;
        Ok(true)
    }

    /// Load a template from a file path if one exists there, else by name
    pub fn resolve(&self, name_or_path: &str) -> Result<Value> {
        let as_path = Path::new(name_or_path);
        if as_path.is_file() {
            return read_json(as_path);
        }
        self.get(name_or_path)?
            .with_context(|| format!("No template named '{name_or_path}' in {}", self.dir.display()))
    }
}

fn read_json(path: &Path) -> Result<Value> {
    let content =
        std::fs::read_to_string(path).with_context(|| format!("Could not read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Invalid JSON in {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_save_list_get_remove() {
        let temp = TempDir::new().unwrap();
        let store = TemplateStore::new(temp.path().join("templates"));
        assert!(store.list().is_empty());

        store.save("official", &json!({"meta": {"official_style": true}})).unwrap();
        store.save("basic", &json!({})).unwrap();
        assert_eq!(store.list(), vec!["basic", "official"]);
        assert_eq!(
            store.get("official").unwrap().unwrap()["meta"]["official_style"],
            true
        );

        assert!(store.remove("basic").unwrap());
        assert!(!store.remove("basic").unwrap());
        assert_eq!(store.get("basic").unwrap(), None);
    }

    #[test]
    fn test_rejects_bad_names_and_shapes() {
        let temp = TempDir::new().unwrap();
        let store = TemplateStore::new(temp.path());
        assert!(store.save("../escape", &json!({})).is_err());
        assert!(store.save("ok", &json!([1, 2])).is_err());
    }

    #[test]
    fn test_resolve_path_or_name() {
        let temp = TempDir::new().unwrap();
        let store = TemplateStore::new(temp.path().join("templates"));
        store.save("stored", &json!({"meta": {"name": "stored"}})).unwrap();

        let file = temp.path().join("loose.json");
        std::fs::write(&file, r#"{"meta": {"name": "loose"}}"#).unwrap();

        assert_eq!(store.resolve(file.to_str().unwrap()).unwrap()["meta"]["name"], "loose");
        assert_eq!(store.resolve("stored").unwrap()["meta"]["name"], "stored");
        assert!(store.resolve("absent").is_err());
    }
}
