use anyhow::{Context as _, Result, bail};
use buildplan::{import_plan, validate_all};
use std::path::Path;

use crate::Context;
use crate::ui;

pub fn run(ctx: &Context, path: &Path) -> Result<()> {
    let plan = import_plan(path).with_context(|| format!("Failed to load {}", path.display()))?;
    if !ctx.quiet {
        ui::header(&format!("Plan: {} ({} steps)", plan.name, plan.len()));
        ui::plan_counts(&plan);
        println!();
    }
    let report = validate_all(&plan);
    if !ui::validation(&report) {
        bail!("{} validation error(s) in {}", report.errors.len(), path.display());
    }
    Ok(())
}
