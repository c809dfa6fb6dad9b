//! Plan file export/import
//!
//! The plan file is the canonical wire form shared by compile output,
//! imports and backup snapshots:
//! `{name, steps: [{id, type, payload, retry_policy, estimated_delay}]}`.

use crate::error::{Error, Result};
use crate::state::write_atomic;
use crate::types::BuildPlan;
use std::path::Path;

/// Serialize a plan to pretty JSON
pub fn to_json(plan: &BuildPlan) -> Result<String> {
    Ok(serde_json::to_string_pretty(plan)?)
}

/// Parse a plan from JSON. Missing fields take their defaults.
pub fn from_json(content: &str) -> Result<BuildPlan> {
    Ok(serde_json::from_str(content)?)
}

/// Write a plan file, creating parent directories
pub fn export_plan(plan: &BuildPlan, path: &Path) -> Result<()> {
    write_atomic(path, &to_json(plan)?)?;
    log::info!("Exported plan '{}' ({} steps) to {}", plan.name, plan.len(), path.display());
    Ok(())
}

/// Read a plan file
pub fn import_plan(path: &Path) -> Result<BuildPlan> {
    let content = std::fs::read_to_string(path).map_err(|e| Error::file(path, e))?;
    let plan = from_json(&content)?;
    log::debug!("Imported plan '{}' ({} steps) from {}", plan.name, plan.len(), path.display());
    Ok(plan)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::compile;
    use crate::spec::Specification;
    use crate::types::{RetryPolicy, StepType};
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_export_import_preserves_compiled_plan() {
        let temp = TempDir::new().unwrap();
        let mut spec = Specification {
            community_type: "gaming".into(),
            games: vec!["chess".into()],
            ..Default::default()
        };
        spec.attach_template(json!({"meta": {"official_style": true}}));
        let plan = compile(&spec, None, "round trip").unwrap();

        let path = temp.path().join("plans/out.json");
        export_plan(&plan, &path).unwrap();
        let imported = import_plan(&path).unwrap();

        assert_eq!(imported, plan);
    }

    #[test]
    fn test_import_applies_defaults() {
        let plan = from_json(
            r#"{"steps": [
                {"id": "r", "type": "create_role", "payload": {"name": "Admin"}},
                {"id": "p", "type": "apply_permissions"}
            ]}"#,
        )
        .unwrap();

        assert_eq!(plan.name, "imported");
        assert_eq!(plan.steps[0].step_type, StepType::CreateGroupRole);
        assert_eq!(plan.steps[0].retry_policy, RetryPolicy::default());
        assert!(plan.steps[0].estimated_delay.abs() < f64::EPSILON);
        assert_eq!(plan.steps[1].step_type, StepType::ApplyPermissionOverwrites);
        assert!(plan.steps[1].payload.is_empty());
    }

    #[test]
    fn test_import_missing_file() {
        let temp = TempDir::new().unwrap();
        let err = import_plan(&temp.path().join("absent.json")).unwrap_err();
        assert!(matches!(err, Error::File { .. }));
    }

    #[test]
    fn test_import_garbage() {
        assert!(matches!(from_json("[1, 2"), Err(Error::Json(_))));
    }
}
