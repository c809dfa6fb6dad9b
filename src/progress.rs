//! Terminal progress for plan execution

use buildplan::{BuildPlan, BuildStep, ExecutionObserver, ExecutionState, StepRecord};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// Progress bar observer, one bar per plan
pub struct ConsoleProgress {
    bar: Option<ProgressBar>,
    hidden: bool,
}

impl ConsoleProgress {
    pub fn new(quiet: bool) -> Self {
        Self { bar: None, hidden: quiet }
    }

    fn bar(&self) -> Option<&ProgressBar> {
        self.bar.as_ref()
    }
}

impl ExecutionObserver for ConsoleProgress {
    fn on_plan_start(&mut self, plan: &BuildPlan, start_index: usize) {
        let bar = if self.hidden {
            ProgressBar::hidden()
        } else {
            ProgressBar::new(plan.len() as u64)
        };
        if let Ok(style) =
            ProgressStyle::default_bar().template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        {
            bar.set_style(style.progress_chars("=>-"));
        }
        bar.set_position(start_index as u64);
        if start_index > 0 {
            bar.println(format!("  {} resuming '{}' at step {}", "↻".cyan(), plan.name, start_index + 1));
        }
        self.bar = Some(bar);
    }

    fn on_step_start(&mut self, step: &BuildStep, attempt: u32) {
        if let Some(bar) = self.bar() {
            if attempt > 1 {
                bar.set_message(format!("{} (attempt {attempt})", step.id));
            } else {
                bar.set_message(step.id.clone());
            }
        }
    }

    fn on_step_retry(&mut self, step: &BuildStep, attempt: u32, error: &anyhow::Error, wait: Duration) {
        if let Some(bar) = self.bar() {
            bar.println(format!(
                "  {} {} attempt {attempt} failed: {error}; retrying in {:.1}s",
                "⚠".yellow(),
                step.id,
                wait.as_secs_f64()
            ));
        }
    }

    fn on_step_skipped(&mut self, _step: &BuildStep) {
        if let Some(bar) = self.bar() {
            bar.inc(1);
        }
    }

    fn on_step_complete(&mut self, step: &BuildStep, record: &StepRecord) {
        if let Some(bar) = self.bar() {
            if !record.is_success() {
                bar.println(format!(
                    "  {} {} failed after {} attempt(s): {}",
                    "✗".red(),
                    step.id,
                    record.attempts,
                    record.error.as_deref().unwrap_or("unknown error")
                ));
            }
            bar.inc(1);
        }
    }

    fn on_plan_complete(&mut self, _plan: &BuildPlan, _state: &ExecutionState) {
        if let Some(bar) = self.bar.take() {
            bar.finish_and_clear();
        }
    }
}
