//! Specification model: normalized community intent plus discovery/merge
//!
//! A [`Specification`] is built once, either directly or by merging
//! questionnaire files found under a base directory, and then consumed
//! read-only by the compiler. Template blobs discovered alongside the
//! questionnaires are appended to `extras["templates"]`.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Questionnaire keys that feed typed fields, in alias-priority order
const COMMUNITY_KEYS: &[&str] = &["community_type", "type", "community"];
const MODERATION_KEYS: &[&str] = &["moderation", "moderation_strictness", "moderation_level"];
const LANGUAGE_KEYS: &[&str] = &["language", "lang"];
const SIZE_KEYS: &[&str] = &["size", "size_expectation"];

/// Extras key holding attached template blobs
pub const TEMPLATES_KEY: &str = "templates";

/// Normalized description of the desired community
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Specification {
    #[serde(default)]
    pub community_type: String,
    #[serde(default)]
    pub games: Vec<String>,
    #[serde(default)]
    pub moderation: String,
    #[serde(default)]
    pub language: String,
    #[serde(default)]
    pub size: String,
    #[serde(default)]
    pub extras: Map<String, Value>,
}

impl Specification {
    /// Build a specification from one questionnaire answer blob.
    ///
    /// Alias keys are resolved first-non-empty-wins. Keys that do not feed a
    /// typed field land in `extras`.
    pub fn from_questionnaire(data: &Value) -> Result<Self> {
        let Some(obj) = data.as_object() else {
            return Err(Error::Compile(
                "questionnaire must be a JSON object".to_string(),
            ));
        };

        let games = obj
            .get("games")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .filter(|g| !g.trim().is_empty())
                    .map(|g| g.trim().to_string())
                    .collect()
            })
            .unwrap_or_default();

        let typed: Vec<&str> = COMMUNITY_KEYS
            .iter()
            .chain(MODERATION_KEYS)
            .chain(LANGUAGE_KEYS)
            .chain(SIZE_KEYS)
            .copied()
            .chain(std::iter::once("games"))
            .collect();
        let extras = obj
            .iter()
            .filter(|(k, _)| !typed.contains(&k.as_str()))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        Ok(Self {
            community_type: first_non_empty(obj, COMMUNITY_KEYS),
            games,
            moderation: first_non_empty(obj, MODERATION_KEYS),
            language: first_non_empty(obj, LANGUAGE_KEYS),
            size: first_non_empty(obj, SIZE_KEYS),
            extras,
        })
    }

    /// Merge another source into this one.
    ///
    /// Scalar fields and games keep the first non-empty value; extras are
    /// overwritten key by key, so later sources win there.
    pub fn merge(&mut self, other: Self) {
        fill(&mut self.community_type, other.community_type);
        fill(&mut self.moderation, other.moderation);
        fill(&mut self.language, other.language);
        fill(&mut self.size, other.size);
        if self.games.is_empty() {
            self.games = other.games;
        }
        self.extras.extend(other.extras);
    }

    /// Merge a sequence of sources in order
    pub fn merge_all(sources: impl IntoIterator<Item = Self>) -> Self {
        sources.into_iter().fold(Self::default(), |mut acc, next| {
            acc.merge(next);
            acc
        })
    }

    /// Append a template blob to `extras["templates"]`
    pub fn attach_template(&mut self, template: Value) {
        let slot = self
            .extras
            .entry(TEMPLATES_KEY)
            .or_insert_with(|| Value::Array(Vec::new()));
        if !slot.is_array() {
            *slot = Value::Array(Vec::new());
        }
        if let Value::Array(items) = slot {
            items.push(template);
        }
    }

    /// Templates attached to this specification
    pub fn templates(&self) -> &[Value] {
        self.extras
            .get(TEMPLATES_KEY)
            .and_then(Value::as_array)
            .map_or(&[], Vec::as_slice)
    }

    /// Merge explicit questionnaire files, then attach explicit template files.
    ///
    /// Unreadable or malformed files are skipped with a warning.
    pub fn from_files(questionnaires: &[PathBuf], templates: &[PathBuf]) -> Self {
        let sources = questionnaires.iter().filter_map(|path| {
            let data = read_json(path)?;
            match Self::from_questionnaire(&data) {
                Ok(spec) => Some(spec),
                Err(e) => {
                    log::warn!("Skipping questionnaire {}: {e}", path.display());
                    None
                }
            }
        });
        let mut spec = Self::merge_all(sources.collect::<Vec<_>>());
        for path in templates {
            if let Some(template) = read_json(path) {
                spec.attach_template(template);
            }
        }
        spec
    }

    /// Discover `data/questionnaire/*.json` and `data/templates/*.json`
    /// under `base` and merge them in file-name order.
    pub fn discover(base: &Path) -> Self {
        let questionnaires = json_files(&base.join("data").join("questionnaire"));
        let templates = json_files(&base.join("data").join("templates"));
        log::debug!(
            "Discovered {} questionnaire(s) and {} template(s) under {}",
            questionnaires.len(),
            templates.len(),
            base.display()
        );
        Self::from_files(&questionnaires, &templates)
    }
}

fn first_non_empty(obj: &Map<String, Value>, keys: &[&str]) -> String {
    keys.iter()
        .filter_map(|k| obj.get(*k).and_then(Value::as_str))
        .map(str::trim)
        .find(|v| !v.is_empty())
        .unwrap_or_default()
        .to_string()
}

fn fill(slot: &mut String, candidate: String) {
    if slot.is_empty() && !candidate.is_empty() {
        *slot = candidate;
    }
}

/// `*.json` files directly inside `dir`, sorted by name
fn json_files(dir: &Path) -> Vec<PathBuf> {
    if !dir.is_dir() {
        return Vec::new();
    }
    WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                log::warn!("Skipping unreadable entry in {}: {e}", dir.display());
                None
            }
        })
        .filter(|entry| entry.file_type().is_file())
        .map(walkdir::DirEntry::into_path)
        .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
        .collect()
}

fn read_json(path: &Path) -> Option<Value> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            log::warn!("Skipping {}: {e}", path.display());
            return None;
        }
    };
    match serde_json::from_str(&content) {
        Ok(value) => Some(value),
        Err(e) => {
            log::warn!("Skipping {}: invalid JSON: {e}", path.display());
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_questionnaire_aliases() {
        let spec = Specification::from_questionnaire(&json!({
            "type": "gaming",
            "moderation_level": "strict",
            "lang": "en",
            "size_expectation": "large",
            "games": ["chess", "", 7],
            "theme": "dark"
        }))
        .unwrap();

        assert_eq!(spec.community_type, "gaming");
        assert_eq!(spec.moderation, "strict");
        assert_eq!(spec.language, "en");
        assert_eq!(spec.size, "large");
        assert_eq!(spec.games, vec!["chess".to_string()]);
        assert_eq!(spec.extras.get("theme"), Some(&json!("dark")));
        assert!(!spec.extras.contains_key("lang"));
    }

    #[test]
    fn test_questionnaire_must_be_object() {
        assert!(Specification::from_questionnaire(&json!(["nope"])).is_err());
    }

    #[test]
    fn test_merge_first_non_empty_wins() {
        let first = Specification {
            community_type: "gaming".into(),
            extras: Map::from_iter([("a".to_string(), json!(1))]),
            ..Default::default()
        };
        let second = Specification {
            community_type: "study".into(),
            moderation: "relaxed".into(),
            games: vec!["go".into()],
            extras: Map::from_iter([("a".to_string(), json!(2))]),
            ..Default::default()
        };

        let merged = Specification::merge_all([first, second]);
        assert_eq!(merged.community_type, "gaming");
        assert_eq!(merged.moderation, "relaxed");
        assert_eq!(merged.games, vec!["go".to_string()]);
        assert_eq!(merged.extras.get("a"), Some(&json!(2)));
    }

    #[test]
    fn test_attach_template_appends() {
        let mut spec = Specification::default();
        spec.attach_template(json!({"meta": {"name": "one"}}));
        spec.attach_template(json!({"meta": {"name": "two"}}));
        assert_eq!(spec.templates().len(), 2);
        assert_eq!(spec.templates()[1]["meta"]["name"], "two");
    }

    #[test]
    fn test_discover_skips_bad_files() {
        let temp = TempDir::new().unwrap();
        let questionnaire = temp.path().join("data/questionnaire");
        let templates = temp.path().join("data/templates");
        std::fs::create_dir_all(&questionnaire).unwrap();
        std::fs::create_dir_all(&templates).unwrap();

        std::fs::write(questionnaire.join("a.json"), r#"{"community": "gaming"}"#).unwrap();
        std::fs::write(questionnaire.join("b.json"), "{not json").unwrap();
        std::fs::write(questionnaire.join("c.json"), r#"{"games": ["chess"], "size": "large"}"#)
            .unwrap();
        std::fs::write(questionnaire.join("notes.txt"), "ignored").unwrap();
        std::fs::write(templates.join("t.json"), r#"{"meta": {"official_style": true}}"#).unwrap();

        let spec = Specification::discover(temp.path());
        assert_eq!(spec.community_type, "gaming");
        assert_eq!(spec.games, vec!["chess".to_string()]);
        assert_eq!(spec.size, "large");
        assert_eq!(spec.templates().len(), 1);
    }

    #[test]
    fn test_discover_missing_dirs_is_empty() {
        let temp = TempDir::new().unwrap();
        let spec = Specification::discover(temp.path());
        assert_eq!(spec, Specification::default());
    }
}
