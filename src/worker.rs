//! Single background worker consuming build jobs from a queue.
//!
//! Jobs run strictly one after another. Each is validated (structure and
//! permission sanity) before anything touches a target; dry runs execute
//! through the no-op handler, real jobs through the resource-mapping
//! handler with the plan name as resource-map namespace. Runs always
//! resume from persisted state.

use crate::targets::TargetProvider;
use buildplan::{
    BuildPlan, ExecuteSummary, ExecutionObserver, ExecutionState, Executor, NoopHandler,
    validate_all,
};
use guildkit::{RateLimiter, ResourceMappingHandler, TargetId};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Jobs buffered before `send` waits
const QUEUE_CAPACITY: usize = 32;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BuildJob {
    Plan {
        plan: BuildPlan,
        #[serde(default)]
        dry_run: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        target_id: Option<TargetId>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Completed { summary: ExecuteSummary },
    /// Validation failed; nothing was executed
    Rejected { errors: Vec<String> },
    Errored { message: String },
}

#[derive(Debug, Clone)]
pub struct JobReport {
    pub plan: String,
    pub target_id: Option<TargetId>,
    pub dry_run: bool,
    pub outcome: JobOutcome,
}

impl JobReport {
    pub fn is_success(&self) -> bool {
        matches!(&self.outcome, JobOutcome::Completed { summary } if summary.is_success())
    }
}

pub struct WorkerContext {
    pub state_dir: PathBuf,
    pub limiter: Arc<RateLimiter>,
    pub targets: Arc<dyn TargetProvider>,
    pub observer: Box<dyn ExecutionObserver>,
}

pub fn queue() -> (mpsc::Sender<BuildJob>, mpsc::Receiver<BuildJob>) {
    mpsc::channel(QUEUE_CAPACITY)
}

/// Where execution state for a target (or dry runs) lives
pub fn executor_dir(state_dir: &Path, target: Option<TargetId>) -> PathBuf {
    let runtime = state_dir.join("runtime");
    match target {
        Some(id) => runtime.join(id.to_string()),
        None => runtime.join("dry-run"),
    }
}

/// Where resource maps live
pub fn resource_map_dir(state_dir: &Path) -> PathBuf {
    state_dir.join("runtime")
}

/// Consume jobs until every sender is dropped
pub async fn run_worker(mut ctx: WorkerContext, mut jobs: mpsc::Receiver<BuildJob>) -> Vec<JobReport> {
    let mut reports = Vec::new();
    while let Some(job) = jobs.recv().await {
        let report = process(&mut ctx, job).await;
        match &report.outcome {
            JobOutcome::Completed { summary } => log::info!(
                "Job '{}' completed: {}/{} steps succeeded",
                report.plan,
                summary.succeeded,
                summary.total()
            ),
            JobOutcome::Rejected { errors } => {
                log::warn!("Job '{}' rejected: {}", report.plan, errors.join("; "));
            }
            JobOutcome::Errored { message } => log::error!("Job '{}' errored: {message}", report.plan),
        }
        reports.push(report);
    }
    log::debug!("Build queue closed after {} job(s)", reports.len());
    reports
}

async fn process(ctx: &mut WorkerContext, job: BuildJob) -> JobReport {
    let BuildJob::Plan {
        plan,
        dry_run,
        target_id,
    } = job;
    let outcome = execute(ctx, &plan, dry_run, target_id).await;
    JobReport {
        plan: plan.name,
        target_id,
        dry_run,
        outcome,
    }
}

async fn execute(
    ctx: &mut WorkerContext,
    plan: &BuildPlan,
    dry_run: bool,
    target_id: Option<TargetId>,
) -> JobOutcome {
    let report = validate_all(plan);
    if !report.is_ok() {
        return JobOutcome::Rejected { errors: report.errors };
    }

    let result = if dry_run {
        let executor = Executor::new(executor_dir(&ctx.state_dir, None));
        executor
            .run_plan_with(plan, &NoopHandler, true, ctx.observer.as_mut())
            .await
    } else {
        let Some(target) = target_id else {
            return JobOutcome::Errored {
                message: "a target id is required unless dry_run is set".to_string(),
            };
        };
        let service = match ctx.targets.connect(target).await {
            Ok(service) => service,
            Err(e) => {
                return JobOutcome::Errored {
                    message: format!("{e:#}"),
                };
            }
        };
        let handler = ResourceMappingHandler::open(
            service,
            Arc::clone(&ctx.limiter),
            &resource_map_dir(&ctx.state_dir),
            Some(plan.name.as_str()),
        );
        let executor = Executor::new(executor_dir(&ctx.state_dir, Some(target)));
        executor
            .run_plan_with(plan, &handler, true, ctx.observer.as_mut())
            .await
    };

    match result {
        Ok(state) => completed(plan, &state),
        Err(e) => JobOutcome::Errored {
            message: e.to_string(),
        },
    }
}

fn completed(plan: &BuildPlan, state: &ExecutionState) -> JobOutcome {
    JobOutcome::Completed {
        summary: state.summary(plan),
    }
}
