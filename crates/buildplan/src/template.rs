//! Template override blobs
//!
//! Templates are stored as loose JSON (`{meta, overrides}`), so selection
//! works on raw values and only the chosen template is parsed into the
//! typed [`Overrides`] shape. A shape mismatch there is a compile error.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Parsed template: raw metadata plus typed overrides
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Template {
    pub meta: Map<String, Value>,
    pub overrides: Overrides,
}

/// Explicit structure that replaces the compiler's heuristic defaults
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Overrides {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub roles: Option<Vec<RoleDef>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub categories: Option<Vec<CategoryDef>>,
    /// Used verbatim as the permission step payload
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permissions: Option<Map<String, Value>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RoleDef {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permissions: Option<Vec<String>>,
}

impl RoleDef {
    pub fn new(name: impl Into<String>, profile: Option<&str>, position: i64) -> Self {
        Self {
            name: name.into(),
            profile: profile.map(str::to_string),
            position: Some(position),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CategoryDef {
    pub name: String,
    #[serde(default)]
    pub channels: Vec<ChannelDef>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelDef {
    pub name: String,
    #[serde(rename = "type", default = "default_channel_kind")]
    pub kind: String,
    /// Seed message posted right after the channel is created
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub starter: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overwrites: Option<Value>,
}

fn default_channel_kind() -> String {
    "text".to_string()
}

impl ChannelDef {
    pub fn new(name: impl Into<String>, kind: &str, starter: Option<&str>) -> Self {
        Self {
            name: name.into(),
            kind: kind.to_string(),
            starter: starter.map(str::to_string),
            topic: None,
            overwrites: None,
        }
    }
}

impl Template {
    /// Parse a raw template blob
    pub fn from_value(raw: &Value) -> Result<Self> {
        let Some(obj) = raw.as_object() else {
            return Err(Error::Compile("template must be a JSON object".to_string()));
        };
        let meta = match obj.get("meta") {
            None | Some(Value::Null) => Map::new(),
            Some(Value::Object(meta)) => meta.clone(),
            Some(_) => return Err(Error::Compile("template meta must be an object".to_string())),
        };
        let overrides = match obj.get("overrides") {
            None | Some(Value::Null) => Overrides::default(),
            Some(value) => serde_json::from_value(value.clone())
                .map_err(|e| Error::Compile(format!("malformed template overrides: {e}")))?,
        };
        Ok(Self { meta, overrides })
    }

    /// Whether this template asks for the richer "official style" defaults
    pub fn is_official(&self) -> bool {
        self.meta.get("official_style").is_some_and(is_truthy)
    }

    /// Display name from metadata, if any
    pub fn name(&self) -> Option<&str> {
        self.meta
            .get("name")
            .and_then(Value::as_str)
            .filter(|n| !n.is_empty())
    }
}

/// Pick the template to compile with: the first flagged official style,
/// else the first one present.
pub fn choose(templates: &[Value]) -> Option<&Value> {
    templates
        .iter()
        .find(|t| {
            t.get("meta")
                .and_then(|m| m.get("official_style"))
                .is_some_and(is_truthy)
        })
        .or_else(|| templates.first())
}

/// Loose truthiness for hand-written JSON flags
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_choose_prefers_official() {
        let templates = vec![
            json!({"meta": {"name": "plain"}}),
            json!({"meta": {"name": "fancy", "official_style": "yes"}}),
        ];
        assert_eq!(choose(&templates).unwrap()["meta"]["name"], "fancy");
    }

    #[test]
    fn test_choose_falls_back_to_first() {
        let templates = vec![json!({"meta": {"name": "a"}}), json!({"meta": {"name": "b"}})];
        assert_eq!(choose(&templates).unwrap()["meta"]["name"], "a");
        assert!(choose(&[]).is_none());
    }

    #[test]
    fn test_parse_overrides() {
        let template = Template::from_value(&json!({
            "meta": {"name": "t"},
            "overrides": {
                "roles": [{"name": "Captain", "position": 5}],
                "categories": [{"name": "Deck", "channels": [{"name": "bridge"}]}]
            }
        }))
        .unwrap();

        assert_eq!(template.name(), Some("t"));
        assert!(!template.is_official());
        let roles = template.overrides.roles.unwrap();
        assert_eq!(roles[0].name, "Captain");
        let categories = template.overrides.categories.unwrap();
        assert_eq!(categories[0].channels[0].kind, "text");
    }

    #[test]
    fn test_malformed_overrides_fail() {
        let err = Template::from_value(&json!({"overrides": {"roles": "everyone"}}));
        assert!(matches!(err, Err(Error::Compile(_))));

        let err = Template::from_value(&json!({"overrides": {"roles": [{"position": 1}]}}));
        assert!(matches!(err, Err(Error::Compile(_))));
    }

    #[test]
    fn test_truthiness() {
        assert!(is_truthy(&json!(true)));
        assert!(is_truthy(&json!(1)));
        assert!(!is_truthy(&json!(0)));
        assert!(!is_truthy(&json!("")));
        assert!(!is_truthy(&Value::Null));
    }
}
