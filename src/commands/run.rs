use anyhow::{Context as _, Result, anyhow, bail};
use buildplan::{BuildPlan, Executor, import_plan};
use guildkit::{RateLimiter, TargetId};
use std::sync::Arc;

use crate::Context;
use crate::cli::RunArgs;
use crate::progress::ConsoleProgress;
use crate::targets::SandboxTargets;
use crate::ui;
use crate::worker::{self, BuildJob, JobOutcome, JobReport, WorkerContext};

pub async fn run(ctx: &Context, args: RunArgs) -> Result<()> {
    let plans = args
        .plans
        .iter()
        .map(|path| import_plan(path).with_context(|| format!("Failed to load {}", path.display())))
        .collect::<Result<Vec<BuildPlan>>>()?;
    let target = if args.dry_run { None } else { args.target };
    let state_dir = ctx.config.state_dir()?;

    if !ctx.quiet {
        match target {
            Some(id) => ui::header(&format!("Run on target {id}")),
            None => ui::header("Dry run"),
        }
        for plan in &plans {
            ui::kv(&plan.name, &format!("{} steps", plan.len()));
        }
        println!();
    }

    if target.is_some() && !args.yes && !confirm_proceed()? {
        ui::info("Aborted");
        return Ok(());
    }

    if args.fresh {
        let executor = Executor::new(worker::executor_dir(&state_dir, target));
        for plan in &plans {
            if executor.store().reset(&plan.name)? {
                ui::dim(&format!("Discarded saved progress of '{}'", plan.name));
            }
        }
    }

    let (jobs, queue) = worker::queue();
    let context = WorkerContext {
        state_dir: state_dir.clone(),
        limiter: Arc::new(RateLimiter::new(ctx.config.rate_limit())),
        targets: Arc::new(SandboxTargets::new(state_dir.join("targets"))),
        observer: Box::new(ConsoleProgress::new(ctx.quiet)),
    };
    let handle = tokio::spawn(worker::run_worker(context, queue));

    for plan in plans {
        jobs.send(BuildJob::Plan {
            plan,
            dry_run: args.dry_run,
            target_id: target,
        })
        .await
        .map_err(|_| anyhow!("Build worker stopped unexpectedly"))?;
    }
    drop(jobs);

    let reports = handle.await.context("Build worker panicked")?;
    let failed = reports.iter().filter(|r| !r.is_success()).count();
    for report in &reports {
        print_report(report, target);
    }

    if failed > 0 {
        bail!("{failed} of {} plan(s) did not complete", reports.len());
    }
    Ok(())
}

fn print_report(report: &JobReport, target: Option<TargetId>) {
    match &report.outcome {
        JobOutcome::Completed { summary } => {
            if summary.is_success() {
                ui::success(&format!("'{}': {} steps done", report.plan, summary.succeeded));
            } else {
                ui::warn(&format!("'{}' finished with problems", report.plan));
                ui::summary(summary);
                let hint = match target {
                    Some(id) => format!("conditor status {} --target {id}", report.plan),
                    None => format!("conditor status {} --dry-run", report.plan),
                };
                ui::dim(&format!("Inspect with: {hint}; rerun with --fresh to retry failed steps"));
            }
        }
        JobOutcome::Rejected { errors } => {
            ui::error(&format!("'{}' rejected by validation", report.plan));
            for error in errors {
                ui::dim(error);
            }
        }
        JobOutcome::Errored { message } => ui::error(&format!("'{}': {message}", report.plan)),
    }
}

fn confirm_proceed() -> Result<bool> {
    use dialoguer::Confirm;

    let confirmed = Confirm::new()
        .with_prompt("Continue?")
        .default(false)
        .interact()?;

    Ok(confirmed)
}
