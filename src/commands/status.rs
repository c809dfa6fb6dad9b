use anyhow::{Context as _, Result};
use buildplan::{ExecutionState, StateStore, StepStatus, import_plan};
use colored::Colorize;
use std::path::Path;

use crate::Context;
use crate::cli::StatusArgs;
use crate::ui;
use crate::worker::executor_dir;

pub fn run(ctx: &Context, args: StatusArgs) -> Result<()> {
    let as_path = Path::new(&args.plan);
    let plan = if as_path.is_file() {
        Some(import_plan(as_path).with_context(|| format!("Failed to load {}", as_path.display()))?)
    } else {
        None
    };
    let name = plan.as_ref().map_or(args.plan.as_str(), |p| p.name.as_str());
    let target = if args.dry_run { None } else { args.target };
    let store = StateStore::new(executor_dir(&ctx.config.state_dir()?, target));

    if args.reset {
        if store.reset(name)? {
            ui::success(&format!("Discarded saved progress of '{name}'"));
        } else {
            ui::info(&format!("No saved progress for '{name}'"));
        }
        return Ok(());
    }

    let state = store.load(name);
    ui::header(&format!("Plan: {name}"));
    ui::kv("state file", &store.path_for(name).display().to_string());
    ui::kv("next index", &state.index.to_string());

    match &plan {
        Some(plan) => {
            ui::kv("steps", &plan.len().to_string());
            ui::summary(&state.summary(plan));
        }
        None => {
            let (succeeded, failed) = record_counts(&state);
            ui::kv("succeeded", &succeeded.to_string());
            ui::kv("failed", &failed.to_string());
        }
    }

    let failures: Vec<_> = state
        .steps
        .iter()
        .filter(|(_, record)| record.status == StepStatus::Failed)
        .collect();
    if !failures.is_empty() {
        ui::section("Failed steps");
        for (id, record) in failures {
            println!(
                "  {} {} {}",
                "✗".red(),
                id,
                format!(
                    "({} attempt(s)): {}",
                    record.attempts,
                    record.error.as_deref().unwrap_or("unknown error")
                )
                .dimmed()
            );
        }
    }
    Ok(())
}

/// (succeeded, failed) across recorded steps
fn record_counts(state: &ExecutionState) -> (usize, usize) {
    state
        .steps
        .values()
        .fold((0, 0), |(ok, bad), record| match record.status {
            StepStatus::Success => (ok + 1, bad),
            StepStatus::Failed => (ok, bad + 1),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use serde_json::json;
    use tempfile::TempDir;

    fn ctx(temp: &TempDir) -> Context {
        Context {
            verbose: 0,
            quiet: true,
            config: Config {
                state_dir: Some(temp.path().display().to_string()),
                ..Default::default()
            },
        }
    }

    #[test]
    fn test_record_counts() {
        let mut state = ExecutionState::default();
        state.record_success("a", 1, json!({}));
        state.record_success("b", 2, json!({}));
        state.record_failure("c", 4, "boom".into());
        assert_eq!(record_counts(&state), (2, 1));
    }

    #[test]
    fn test_reset_removes_saved_progress() {
        let temp = TempDir::new().unwrap();
        let store = StateStore::new(executor_dir(temp.path(), Some(8)));
        let mut state = ExecutionState::default();
        state.record_success("a", 1, json!({}));
        store.save("build", &state).unwrap();

        let args = |reset| StatusArgs {
            plan: "build".into(),
            target: Some(8),
            dry_run: false,
            reset,
        };
        run(&ctx(&temp), args(false)).unwrap();
        assert!(store.path_for("build").exists());
        run(&ctx(&temp), args(true)).unwrap();
        assert!(!store.path_for("build").exists());
    }
}
