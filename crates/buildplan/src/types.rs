//! Core types for build plans and their execution bookkeeping

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

/// Kind of operation a build step performs
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum StepType {
    CreateGroupRole,
    CreateCategory,
    CreateChannel,
    ApplyPermissionOverwrites,
    PostMessage,
    RegisterMetadata,
    /// A type name this build does not recognize. Kept verbatim so
    /// validation can reject it instead of failing at parse time.
    Unknown(String),
}

impl StepType {
    /// Every recognized step type, in wire order
    pub const KNOWN: [Self; 6] = [
        Self::CreateGroupRole,
        Self::CreateCategory,
        Self::CreateChannel,
        Self::ApplyPermissionOverwrites,
        Self::PostMessage,
        Self::RegisterMetadata,
    ];

    /// Wire name of this step type
    pub fn as_str(&self) -> &str {
        match self {
            Self::CreateGroupRole => "create_group_role",
            Self::CreateCategory => "create_category",
            Self::CreateChannel => "create_channel",
            Self::ApplyPermissionOverwrites => "apply_permission_overwrites",
            Self::PostMessage => "post_message",
            Self::RegisterMetadata => "register_metadata",
            Self::Unknown(raw) => raw,
        }
    }

    /// Check if this is one of the recognized step types
    pub fn is_known(&self) -> bool {
        !matches!(self, Self::Unknown(_))
    }

    /// Default pacing delay (seconds) applied after a step of this type
    pub fn default_delay(&self) -> f64 {
        match self {
            Self::CreateGroupRole | Self::CreateChannel => 0.25,
            Self::CreateCategory => 0.35,
            Self::ApplyPermissionOverwrites => 0.1,
            Self::PostMessage => 0.05,
            Self::RegisterMetadata | Self::Unknown(_) => 0.0,
        }
    }
}

impl From<String> for StepType {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            "create_group_role" | "create_role" => Self::CreateGroupRole,
            "create_category" => Self::CreateCategory,
            "create_channel" => Self::CreateChannel,
            "apply_permission_overwrites" | "apply_permissions" => Self::ApplyPermissionOverwrites,
            "post_message" => Self::PostMessage,
            "register_metadata" => Self::RegisterMetadata,
            _ => Self::Unknown(raw),
        }
    }
}

impl From<&str> for StepType {
    fn from(raw: &str) -> Self {
        Self::from(raw.to_string())
    }
}

impl From<StepType> for String {
    fn from(step_type: StepType) -> Self {
        match step_type {
            StepType::Unknown(raw) => raw,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for StepType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Retry behavior for a single step
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    #[serde(default = "default_retries")]
    pub retries: u32,
    /// Exponential base; the wait after failed attempt `n` is `backoff^n` seconds
    #[serde(default = "default_backoff")]
    pub backoff: f64,
}

fn default_retries() -> u32 {
    3
}

fn default_backoff() -> f64 {
    2.0
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retries: default_retries(),
            backoff: default_backoff(),
        }
    }
}

impl RetryPolicy {
    /// Policy that never retries
    pub fn none() -> Self {
        Self {
            retries: 0,
            backoff: 0.0,
        }
    }

    /// Wait before the next attempt, given the number of failed attempts so far
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        seconds(self.backoff.powi(exponent))
    }
}

/// Convert fractional seconds to a duration, clamping anything that is not
/// a finite positive number to zero.
pub fn seconds(value: f64) -> Duration {
    if value.is_finite() && value > 0.0 {
        Duration::try_from_secs_f64(value).unwrap_or(Duration::MAX)
    } else {
        Duration::ZERO
    }
}

/// One atomic, idempotent operation in a build plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildStep {
    /// Unique within a plan; used for resume and resource-map lookups
    pub id: String,
    #[serde(rename = "type")]
    pub step_type: StepType,
    #[serde(default)]
    pub payload: Map<String, Value>,
    #[serde(default)]
    pub retry_policy: RetryPolicy,
    /// Pacing delay in seconds applied after the step completes
    #[serde(default)]
    pub estimated_delay: f64,
}

impl BuildStep {
    /// Create a step with the default retry policy and no pacing delay
    pub fn new(id: impl Into<String>, step_type: impl Into<StepType>, payload: Map<String, Value>) -> Self {
        Self {
            id: id.into(),
            step_type: step_type.into(),
            payload,
            retry_policy: RetryPolicy::default(),
            estimated_delay: 0.0,
        }
    }

    /// Set the pacing delay
    #[must_use]
    pub fn with_delay(mut self, seconds: f64) -> Self {
        self.estimated_delay = seconds;
        self
    }

    /// Set the retry policy
    #[must_use]
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    /// String payload field, if present
    pub fn payload_str(&self, key: &str) -> Option<&str> {
        self.payload.get(key).and_then(Value::as_str)
    }

    /// Boolean payload field, defaulting to false
    pub fn payload_flag(&self, key: &str) -> bool {
        self.payload.get(key).and_then(Value::as_bool).unwrap_or(false)
    }

    /// Pacing delay as a duration
    pub fn pacing(&self) -> Duration {
        seconds(self.estimated_delay)
    }
}

/// Ordered, named sequence of build steps
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildPlan {
    #[serde(default = "default_plan_name")]
    pub name: String,
    #[serde(default)]
    pub steps: Vec<BuildStep>,
}

fn default_plan_name() -> String {
    "imported".to_string()
}

impl BuildPlan {
    /// Create an empty plan
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            steps: Vec::new(),
        }
    }

    /// Append a step
    pub fn add_step(&mut self, step: BuildStep) {
        self.steps.push(step);
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Look up a step by id
    pub fn step(&self, id: &str) -> Option<&BuildStep> {
        self.steps.iter().find(|s| s.id == id)
    }

    /// Count steps per type, in first-seen order
    pub fn type_counts(&self) -> Vec<(StepType, usize)> {
        let mut counts: Vec<(StepType, usize)> = Vec::new();
        for step in &self.steps {
            match counts.iter_mut().find(|(t, _)| *t == step.step_type) {
                Some((_, n)) => *n += 1,
                None => counts.push((step.step_type.clone(), 1)),
            }
        }
        counts
    }

    /// One human-readable line per step
    pub fn preview_lines(&self) -> Vec<String> {
        self.steps
            .iter()
            .enumerate()
            .map(|(i, step)| {
                let label = step
                    .payload_str("name")
                    .or_else(|| step.payload_str("channel"))
                    .unwrap_or("");
                if label.is_empty() {
                    format!("{:>3}. {} [{}]", i + 1, step.step_type, step.id)
                } else {
                    format!("{:>3}. {} {} [{}]", i + 1, step.step_type, label, step.id)
                }
            })
            .collect()
    }
}

/// Outcome recorded for a step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Success,
    Failed,
}

/// Persisted record of a step's last outcome
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    pub status: StepStatus,
    pub attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StepRecord {
    pub fn is_success(&self) -> bool {
        self.status == StepStatus::Success
    }
}

/// Durable progress of one plan
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionState {
    /// Next step position to consider. Never decreases within a run.
    #[serde(default)]
    pub index: usize,
    #[serde(default)]
    pub steps: BTreeMap<String, StepRecord>,
}

impl ExecutionState {
    /// Check if a step has already succeeded
    pub fn is_success(&self, step_id: &str) -> bool {
        self.steps.get(step_id).is_some_and(StepRecord::is_success)
    }

    pub fn record(&self, step_id: &str) -> Option<&StepRecord> {
        self.steps.get(step_id)
    }

    pub fn record_success(&mut self, step_id: &str, attempts: u32, result: Value) {
        self.steps.insert(
            step_id.to_string(),
            StepRecord {
                status: StepStatus::Success,
                attempts,
                result: Some(result),
                error: None,
            },
        );
    }

    pub fn record_failure(&mut self, step_id: &str, attempts: u32, error: String) {
        self.steps.insert(
            step_id.to_string(),
            StepRecord {
                status: StepStatus::Failed,
                attempts,
                result: None,
                error: Some(error),
            },
        );
    }

    /// Move the index forward; a smaller value is ignored
    pub fn advance_to(&mut self, next: usize) {
        self.index = self.index.max(next);
    }

    /// Summarize against a plan. Steps with no record count as pending.
    pub fn summary(&self, plan: &BuildPlan) -> ExecuteSummary {
        let mut summary = ExecuteSummary::default();
        for step in &plan.steps {
            match self.steps.get(&step.id) {
                Some(record) if record.is_success() => summary.succeeded += 1,
                Some(_) => {
                    summary.failed += 1;
                    summary.failed_ids.push(step.id.clone());
                }
                None => summary.pending += 1,
            }
        }
        summary
    }
}

/// Summary of execution results
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecuteSummary {
    pub succeeded: usize,
    pub failed: usize,
    pub pending: usize,
    pub failed_ids: Vec<String>,
}

impl ExecuteSummary {
    /// Total steps accounted for
    pub fn total(&self) -> usize {
        self.succeeded + self.failed + self.pending
    }

    /// True when every step succeeded
    pub fn is_success(&self) -> bool {
        self.failed == 0 && self.pending == 0
    }
}
