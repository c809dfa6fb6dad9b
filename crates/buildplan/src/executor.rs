//! Durable step executor
//!
//! Walks a plan strictly in order. Each step is tried up to
//! `1 + retries` times with `backoff^attempt` second waits between
//! attempts. Progress is persisted after every step so a restart resumes
//! where the last run stopped. A step that exhausts its retries is marked
//! failed and the walk continues with the next step.

use crate::context::{ExecutionObserver, NoProgress, StepHandler};
use crate::error::Result;
use crate::state::StateStore;
use crate::types::{BuildPlan, BuildStep, ExecutionState};
use std::path::PathBuf;

/// Runs plans and owns their persisted execution state
#[derive(Debug, Clone)]
pub struct Executor {
    store: StateStore,
}

impl Executor {
    /// Create an executor persisting state under `state_dir`
    pub fn new(state_dir: impl Into<PathBuf>) -> Self {
        Self {
            store: StateStore::new(state_dir),
        }
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    /// Run a plan without progress reporting
    pub async fn run_plan(
        &self,
        plan: &BuildPlan,
        handler: &dyn StepHandler,
        resume: bool,
    ) -> Result<ExecutionState> {
        self.run_plan_with(plan, handler, resume, &mut NoProgress).await
    }

    /// Run a plan, reporting progress to `observer`.
    ///
    /// Step failures never abort the run; only failing to persist state
    /// returns an error.
    pub async fn run_plan_with(
        &self,
        plan: &BuildPlan,
        handler: &dyn StepHandler,
        resume: bool,
        observer: &mut dyn ExecutionObserver,
    ) -> Result<ExecutionState> {
        let mut state = if resume {
            self.store.load(&plan.name)
        } else {
            ExecutionState::default()
        };
        let start = state.index.min(plan.len());
        log::info!(
            "Running plan '{}': {} steps, starting at index {start}",
            plan.name,
            plan.len()
        );
        observer.on_plan_start(plan, start);

        for (position, step) in plan.steps.iter().enumerate().skip(start) {
            if state.is_success(&step.id) {
                log::debug!("Step {} already succeeded, skipping", step.id);
                state.advance_to(position + 1);
                self.store.save(&plan.name, &state)?;
                observer.on_step_skipped(step);
                continue;
            }

            self.attempt_step(step, handler, &mut state, observer).await;
            state.advance_to(position + 1);
            self.store.save(&plan.name, &state)?;
            if let Some(record) = state.record(&step.id) {
                observer.on_step_complete(step, record);
            }

            let pacing = step.pacing();
            if !pacing.is_zero() {
                tokio::time::sleep(pacing).await;
            }
        }

        let summary = state.summary(plan);
        log::info!(
            "Plan '{}' finished: {} succeeded, {} failed, {} pending",
            plan.name,
            summary.succeeded,
            summary.failed,
            summary.pending
        );
        observer.on_plan_complete(plan, &state);
        Ok(state)
    }

    async fn attempt_step(
        &self,
        step: &BuildStep,
        handler: &dyn StepHandler,
        state: &mut ExecutionState,
        observer: &mut dyn ExecutionObserver,
    ) {
        let retries = step.retry_policy.retries;
        let mut attempt: u32 = 0;
        loop {
            observer.on_step_start(step, attempt + 1);
            match handler.handle(step).await {
                Ok(result) => {
                    attempt += 1;
                    log::debug!("Step {} ({}) succeeded on attempt {attempt}", step.id, step.step_type);
                    state.record_success(&step.id, attempt, result);
                    return;
                }
                Err(e) => {
                    attempt += 1;
                    if attempt > retries {
                        log::error!(
                            "Step {} ({}) failed after {attempt} attempt(s): {e:#}",
                            step.id,
                            step.step_type
                        );
                        state.record_failure(&step.id, attempt, format!("{e:#}"));
                        return;
                    }
                    let wait = step.retry_policy.delay_for_attempt(attempt);
                    log::warn!(
                        "Step {} attempt {attempt}/{} failed: {e:#}; retrying in {wait:?}",
                        step.id,
                        retries + 1
                    );
                    observer.on_step_retry(step, attempt, &e, wait);
                    tokio::time::sleep(wait).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::handler_fn;
    use crate::types::{RetryPolicy, StepStatus, StepType};
    use serde_json::{Map, Value, json};
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tempfile::TempDir;

    fn fast_policy(retries: u32) -> RetryPolicy {
        RetryPolicy {
            retries,
            backoff: 0.001,
        }
    }

    fn plan(ids: &[&str]) -> BuildPlan {
        let mut plan = BuildPlan::new("test plan");
        for id in ids {
            plan.add_step(
                BuildStep::new(*id, StepType::CreateCategory, Map::new()).with_retry_policy(fast_policy(2)),
            );
        }
        plan
    }

    type Calls = Arc<Mutex<HashMap<String, u32>>>;

    /// Handler that fails every attempt for ids in `failing`
    fn counting_handler(
        calls: &Calls,
        failing: &'static [&'static str],
    ) -> impl StepHandler + use<> {
        let calls = Arc::clone(calls);
        handler_fn(move |step: &BuildStep| {
            let calls = Arc::clone(&calls);
            let id = step.id.clone();
            async move {
                *calls.lock().unwrap().entry(id.clone()).or_default() += 1;
                if failing.contains(&id.as_str()) {
                    anyhow::bail!("step {id} is broken");
                }
                Ok(json!({ "done": id }))
            }
        })
    }

    fn count(calls: &Calls, id: &str) -> u32 {
        calls.lock().unwrap().get(id).copied().unwrap_or(0)
    }

    #[tokio::test]
    async fn test_runs_all_steps_in_order() {
        let temp = TempDir::new().unwrap();
        let executor = Executor::new(temp.path());
        let order = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&order);
        let handler = handler_fn(move |step: &BuildStep| {
            seen.lock().unwrap().push(step.id.clone());
            async { Ok::<_, anyhow::Error>(Value::Null) }
        });

        let plan = plan(&["a", "b", "c"]);
        let state = executor.run_plan(&plan, &handler, false).await.unwrap();

        assert_eq!(*order.lock().unwrap(), vec!["a", "b", "c"]);
        assert_eq!(state.index, 3);
        assert!(state.summary(&plan).is_success());
    }

    #[tokio::test]
    async fn test_resume_is_idempotent() {
        let temp = TempDir::new().unwrap();
        let executor = Executor::new(temp.path());
        let calls: Calls = Arc::default();
        let handler = counting_handler(&calls, &[]);
        let plan = plan(&["a", "b", "c"]);

        executor.run_plan(&plan, &handler, true).await.unwrap();
        executor.run_plan(&plan, &handler, true).await.unwrap();

        for id in ["a", "b", "c"] {
            assert_eq!(count(&calls, id), 1, "step {id} ran more than once");
        }
    }

    #[tokio::test]
    async fn test_success_skipped_even_with_stale_index() {
        let temp = TempDir::new().unwrap();
        let executor = Executor::new(temp.path());
        let plan = plan(&["a", "b"]);

        let mut stale = ExecutionState::default();
        stale.record_success("b", 1, json!({}));
        executor.store().save(&plan.name, &stale).unwrap();

        let calls: Calls = Arc::default();
        let handler = counting_handler(&calls, &[]);
        let state = executor.run_plan(&plan, &handler, true).await.unwrap();

        assert_eq!(count(&calls, "a"), 1);
        assert_eq!(count(&calls, "b"), 0);
        assert_eq!(state.index, 2);
    }

    #[tokio::test]
    async fn test_failure_is_isolated() {
        let temp = TempDir::new().unwrap();
        let executor = Executor::new(temp.path());
        let calls: Calls = Arc::default();
        let handler = counting_handler(&calls, &["a"]);
        let plan = plan(&["a", "b"]);

        let state = executor.run_plan(&plan, &handler, false).await.unwrap();

        let a = state.record("a").unwrap();
        assert_eq!(a.status, StepStatus::Failed);
        assert_eq!(a.attempts, 3);
        assert!(a.error.as_deref().unwrap().contains("broken"));
        assert_eq!(count(&calls, "a"), 3);

        let b = state.record("b").unwrap();
        assert_eq!(b.status, StepStatus::Success);
        assert_eq!(b.result, Some(json!({"done": "b"})));
    }

    #[tokio::test]
    async fn test_retry_then_succeed_counts_attempts() {
        let temp = TempDir::new().unwrap();
        let executor = Executor::new(temp.path());
        let attempts = Arc::new(Mutex::new(0u32));
        let shared = Arc::clone(&attempts);
        let handler = handler_fn(move |_step: &BuildStep| {
            let shared = Arc::clone(&shared);
            async move {
                let mut n = shared.lock().unwrap();
                *n += 1;
                if *n < 3 {
                    anyhow::bail!("flaky");
                }
                Ok(json!("ok"))
            }
        });

        let state = executor.run_plan(&plan(&["a"]), &handler, false).await.unwrap();
        let record = state.record("a").unwrap();
        assert!(record.is_success());
        assert_eq!(record.attempts, 3);
    }

    #[tokio::test]
    async fn test_index_persisted_and_monotonic() {
        let temp = TempDir::new().unwrap();
        let executor = Executor::new(temp.path());
        let calls: Calls = Arc::default();
        let handler = counting_handler(&calls, &["b"]);
        let plan = plan(&["a", "b", "c"]);

        executor.run_plan(&plan, &handler, true).await.unwrap();
        let persisted = executor.store().load(&plan.name);
        assert_eq!(persisted.index, 3);

        // A resumed run starts past the end and does nothing.
        let state = executor.run_plan(&plan, &handler, true).await.unwrap();
        assert_eq!(state.index, 3);
        assert_eq!(count(&calls, "b"), 3);
    }

    #[tokio::test]
    async fn test_fresh_run_ignores_persisted_state() {
        let temp = TempDir::new().unwrap();
        let executor = Executor::new(temp.path());
        let calls: Calls = Arc::default();
        let handler = counting_handler(&calls, &[]);
        let plan = plan(&["a"]);

        executor.run_plan(&plan, &handler, true).await.unwrap();
        executor.run_plan(&plan, &handler, false).await.unwrap();
        assert_eq!(count(&calls, "a"), 2);
    }

    #[tokio::test]
    async fn test_observer_sees_retries_and_skips() {
        #[derive(Default)]
        struct Recorder {
            events: Vec<String>,
        }

        impl ExecutionObserver for Recorder {
            fn on_step_retry(&mut self, step: &BuildStep, attempt: u32, _e: &anyhow::Error, _w: std::time::Duration) {
                self.events.push(format!("retry {} {attempt}", step.id));
            }
            fn on_step_skipped(&mut self, step: &BuildStep) {
                self.events.push(format!("skip {}", step.id));
            }
            fn on_step_complete(&mut self, step: &BuildStep, record: &crate::types::StepRecord) {
                self.events.push(format!("done {} {:?}", step.id, record.status));
            }
        }

        let temp = TempDir::new().unwrap();
        let executor = Executor::new(temp.path());
        let calls: Calls = Arc::default();
        let handler = counting_handler(&calls, &["b"]);
        let plan = plan(&["a", "b"]);

        let mut seeded = ExecutionState::default();
        seeded.record_success("a", 1, json!({}));
        executor.store().save(&plan.name, &seeded).unwrap();

        let mut recorder = Recorder::default();
        executor
            .run_plan_with(&plan, &handler, true, &mut recorder)
            .await
            .unwrap();

        assert_eq!(
            recorder.events,
            vec![
                "skip a".to_string(),
                "retry b 1".to_string(),
                "retry b 2".to_string(),
                "done b Failed".to_string(),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_and_pacing_follow_the_plan() {
        let temp = TempDir::new().unwrap();
        let executor = Executor::new(temp.path());
        let policy = RetryPolicy {
            retries: 2,
            backoff: 2.0,
        };
        let mut plan = BuildPlan::new("timed");
        plan.add_step(
            BuildStep::new("broken", StepType::CreateCategory, Map::new())
                .with_retry_policy(policy)
                .with_delay(1.0),
        );
        plan.add_step(
            BuildStep::new("fine", StepType::CreateCategory, Map::new())
                .with_retry_policy(policy)
                .with_delay(0.5),
        );

        let start = tokio::time::Instant::now();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let timeline = Arc::clone(&seen);
        let handler = handler_fn(move |step: &BuildStep| {
            timeline.lock().unwrap().push((step.id.clone(), start.elapsed()));
            let broken = step.id == "broken";
            async move {
                if broken {
                    anyhow::bail!("always fails");
                }
                Ok(Value::Null)
            }
        });

        let state = executor.run_plan(&plan, &handler, false).await.unwrap();
        let elapsed = start.elapsed();

        // Attempts at 0s, 2s (2^1) and 6s (+2^2); the step's 1s pacing
        // runs even though it failed, so "fine" starts at 7s.
        let seen = seen.lock().unwrap();
        let expected = [("broken", 0.0), ("broken", 2.0), ("broken", 6.0), ("fine", 7.0)];
        assert_eq!(seen.len(), expected.len());
        for ((id, at), (want_id, want_at)) in seen.iter().zip(expected) {
            assert_eq!(id, want_id);
            assert!((at.as_secs_f64() - want_at).abs() < 0.01, "{id} ran at {at:?}");
        }
        assert!(elapsed >= Duration::from_secs_f64(7.5), "{elapsed:?}");
        assert!(elapsed < Duration::from_secs(8), "{elapsed:?}");
        assert_eq!(state.record("broken").unwrap().status, StepStatus::Failed);
        assert_eq!(state.record("fine").unwrap().status, StepStatus::Success);
    }
}
