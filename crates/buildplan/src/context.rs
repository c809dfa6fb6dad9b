//! Step handler and observer traits
//!
//! These traits keep the executor independent of whatever actually
//! performs a step (a live service, a sandbox, a dry run) and of how
//! progress is shown.

use crate::types::{BuildPlan, BuildStep, ExecutionState, StepRecord};
use anyhow::Result;
use async_trait::async_trait;
use serde_json::{Value, json};
use std::future::Future;
use std::time::Duration;

/// Capability that performs one build step.
///
/// Errors are retried by the executor according to the step's retry
/// policy; the handler itself should not retry.
#[async_trait]
pub trait StepHandler: Send + Sync {
    async fn handle(&self, step: &BuildStep) -> Result<Value>;
}

/// Handler that performs nothing and echoes `{ok, id, type}`
pub struct NoopHandler;

#[async_trait]
impl StepHandler for NoopHandler {
    async fn handle(&self, step: &BuildStep) -> Result<Value> {
        Ok(json!({"ok": true, "id": step.id, "type": step.step_type.as_str()}))
    }
}

/// Adapter turning an async closure into a [`StepHandler`]
pub struct FnHandler<F>(F);

/// Wrap a closure as a step handler.
///
/// The returned future must not borrow the step; clone what it needs.
pub fn handler_fn<F, Fut>(f: F) -> FnHandler<F>
where
    F: Fn(&BuildStep) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value>> + Send,
{
    FnHandler(f)
}

#[async_trait]
impl<F, Fut> StepHandler for FnHandler<F>
where
    F: Fn(&BuildStep) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value>> + Send,
{
    async fn handle(&self, step: &BuildStep) -> Result<Value> {
        (self.0)(step).await
    }
}

/// Progress callback for plan execution
///
/// Every method has an empty default so observers only implement what
/// they display.
pub trait ExecutionObserver: Send {
    /// Called once before the first step, with the resume position
    fn on_plan_start(&mut self, _plan: &BuildPlan, _start_index: usize) {}

    /// Called before each handler attempt (1-based)
    fn on_step_start(&mut self, _step: &BuildStep, _attempt: u32) {}

    /// Called after a failed attempt that will be retried
    fn on_step_retry(&mut self, _step: &BuildStep, _attempt: u32, _error: &anyhow::Error, _wait: Duration) {
    }

    /// Called when a step is skipped because it already succeeded
    fn on_step_skipped(&mut self, _step: &BuildStep) {}

    /// Called once the step's outcome has been persisted
    fn on_step_complete(&mut self, _step: &BuildStep, _record: &StepRecord) {}

    /// Called after the last step
    fn on_plan_complete(&mut self, _plan: &BuildPlan, _state: &ExecutionState) {}
}

/// No-op observer
pub struct NoProgress;

impl ExecutionObserver for NoProgress {}
