//! Pre-execution plan checks
//!
//! Both checks are pure. Callers that execute plans gate on
//! [`validate_all`]; callers that only display plans may just report.

use crate::error::{Error, Result};
use crate::types::{BuildPlan, StepType};
use serde_json::Value;
use std::collections::HashSet;

/// Outcome of a validation pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationReport {
    pub errors: Vec<String>,
}

impl ValidationReport {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    /// Fold another report's errors into this one
    pub fn extend(&mut self, other: Self) {
        self.errors.extend(other.errors);
    }

    /// Turn a failed report into an [`Error::InvalidPlan`]
    pub fn into_result(self, plan: &str) -> Result<()> {
        if self.is_ok() {
            Ok(())
        } else {
            Err(Error::InvalidPlan {
                plan: plan.to_string(),
                errors: self.errors,
            })
        }
    }
}

/// Structural checks: non-empty, categories exist when channels do,
/// unique step ids, known step types.
pub fn validate(plan: &BuildPlan) -> ValidationReport {
    let mut report = ValidationReport::default();
    if plan.is_empty() {
        report.errors.push("Plan has no steps".to_string());
        return report;
    }

    let has = |t: &StepType| plan.steps.iter().any(|s| &s.step_type == t);
    if has(&StepType::CreateChannel) && !has(&StepType::CreateCategory) {
        report
            .errors
            .push("Channels are created but no categories exist".to_string());
    }

    let mut seen = HashSet::new();
    let mut reported = HashSet::new();
    for step in &plan.steps {
        if !seen.insert(step.id.as_str()) && reported.insert(step.id.as_str()) {
            report.errors.push(format!("Duplicate step id: {}", step.id));
        }
    }

    for step in &plan.steps {
        if !step.step_type.is_known() {
            report
                .errors
                .push(format!("Unknown step type '{}' in step {}", step.step_type, step.id));
        }
    }

    report
}

/// Flag any permission step that grants administrator to the default role
pub fn permission_sanity_check(plan: &BuildPlan) -> ValidationReport {
    let mut report = ValidationReport::default();
    for step in plan
        .steps
        .iter()
        .filter(|s| s.step_type == StepType::ApplyPermissionOverwrites)
    {
        let Some(overwrites) = step.payload.get("overwrites") else {
            continue;
        };
        for (role, entry) in overwrite_entries(overwrites) {
            if is_default_role(&role) && grants_administrator(entry) {
                report.errors.push(format!(
                    "Step {} grants administrator to the default role ({role})",
                    step.id
                ));
            }
        }
    }
    report
}

/// Run both checks
pub fn validate_all(plan: &BuildPlan) -> ValidationReport {
    let mut report = validate(plan);
    report.extend(permission_sanity_check(plan));
    report
}

/// `@everyone`, also accepted without the sigil, any case
pub fn is_default_role(role: &str) -> bool {
    let role = role.trim();
    role.eq_ignore_ascii_case("@everyone") || role.eq_ignore_ascii_case("everyone")
}

/// Flatten either overwrite shape into `(role key, entry)` pairs:
/// a map of `role -> {allow, deny}` or a list of `{role, allow, deny}`.
pub fn overwrite_entries(overwrites: &Value) -> Vec<(String, &Value)> {
    match overwrites {
        Value::Object(map) => map.iter().map(|(role, entry)| (role.clone(), entry)).collect(),
        Value::Array(items) => items
            .iter()
            .filter_map(|entry| {
                let role = entry.get("role").or_else(|| entry.get("target"))?;
                let role = match role {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                Some((role, entry))
            })
            .collect(),
        _ => Vec::new(),
    }
}

fn grants_administrator(entry: &Value) -> bool {
    entry
        .get("allow")
        .and_then(Value::as_array)
        .is_some_and(|allow| {
            allow
                .iter()
                .filter_map(Value::as_str)
                .any(|p| p.eq_ignore_ascii_case("administrator"))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BuildStep;
    use serde_json::{Map, json};

    fn step(id: &str, step_type: &str) -> BuildStep {
        BuildStep::new(id, step_type, Map::new())
    }

    fn perm_step(id: &str, overwrites: Value) -> BuildStep {
        let mut payload = Map::new();
        payload.insert("overwrites".into(), overwrites);
        BuildStep::new(id, StepType::ApplyPermissionOverwrites, payload)
    }

    #[test]
    fn test_empty_plan() {
        let report = validate(&BuildPlan::new("empty"));
        assert!(!report.is_ok());
        assert_eq!(report.errors, vec!["Plan has no steps".to_string()]);
    }

    #[test]
    fn test_channels_without_categories() {
        let mut plan = BuildPlan::new("p");
        plan.add_step(step("c", "create_channel"));
        let report = validate(&plan);
        assert_eq!(report.errors.len(), 1);
        assert!(report.errors[0].contains("no categories"));
    }

    #[test]
    fn test_duplicate_ids_reported_once() {
        let mut plan = BuildPlan::new("p");
        for _ in 0..3 {
            plan.add_step(step("same", "create_category"));
        }
        let report = validate(&plan);
        assert_eq!(report.errors, vec!["Duplicate step id: same".to_string()]);
    }

    #[test]
    fn test_unknown_type() {
        let mut plan = BuildPlan::new("p");
        plan.add_step(step("x", "delete_everything"));
        let report = validate(&plan);
        assert!(report.errors[0].contains("delete_everything"));
    }

    #[test]
    fn test_valid_plan() {
        let mut plan = BuildPlan::new("p");
        plan.add_step(step("cat", "create_category"));
        plan.add_step(step("chan", "create_channel"));
        assert!(validate_all(&plan).is_ok());
        assert!(validate_all(&plan).into_result("p").is_ok());
    }

    #[test]
    fn test_admin_to_everyone_map_shape() {
        let mut plan = BuildPlan::new("p");
        plan.add_step(perm_step(
            "perm",
            json!({"@everyone": {"allow": ["Administrator"], "deny": []}}),
        ));
        let report = permission_sanity_check(&plan);
        assert!(!report.is_ok());
        assert!(report.errors[0].contains("perm"));
    }

    #[test]
    fn test_admin_to_everyone_list_shape() {
        let mut plan = BuildPlan::new("p");
        plan.add_step(perm_step(
            "perm",
            json!([{"role": "everyone", "allow": ["administrator"]}]),
        ));
        assert!(!permission_sanity_check(&plan).is_ok());
    }

    #[test]
    fn test_admin_to_named_role_is_fine() {
        let mut plan = BuildPlan::new("p");
        plan.add_step(perm_step(
            "perm",
            json!({"Admin": {"allow": ["administrator"]}, "@everyone": {"deny": ["send_messages"]}}),
        ));
        assert!(permission_sanity_check(&plan).is_ok());
    }

    #[test]
    fn test_invalid_report_into_error() {
        let err = validate(&BuildPlan::new("empty")).into_result("empty").unwrap_err();
        assert!(err.to_string().contains("Plan has no steps"));
    }
}
