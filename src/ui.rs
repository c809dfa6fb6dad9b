use buildplan::{BuildPlan, ExecuteSummary, ValidationReport};
use colored::Colorize;

/// Print an info message
pub fn info(msg: &str) {
    println!("{} {}", "ℹ".blue(), msg);
}

/// Print a success message
pub fn success(msg: &str) {
    println!("{} {}", "✓".green(), msg);
}

/// Print a warning message
pub fn warn(msg: &str) {
    println!("{} {}", "⚠".yellow(), msg);
}

/// Print an error message
pub fn error(msg: &str) {
    eprintln!("{} {}", "✗".red(), msg);
}

/// Print a dim/muted message
pub fn dim(msg: &str) {
    println!("  {}", msg.dimmed());
}

/// Print a header/title
pub fn header(title: &str) {
    println!();
    println!("{}", title.bold());
    println!("{}", "─".repeat(title.chars().count()).dimmed());
}

/// Print a section header
pub fn section(title: &str) {
    println!();
    println!("{}", title.cyan().bold());
}

/// Print a key-value pair
pub fn kv(key: &str, value: &str) {
    println!("  {}: {}", key.dimmed(), value);
}

/// Numbered `type -> payload` listing of a plan
pub fn plan_preview(plan: &BuildPlan) {
    header(&format!("Plan: {} ({} steps)", plan.name, plan.len()));
    for line in plan.preview_lines() {
        println!("  {line}");
    }
}

/// Step counts by type
pub fn plan_counts(plan: &BuildPlan) {
    for (step_type, count) in plan.type_counts() {
        kv(step_type.as_str(), &count.to_string());
    }
}

/// Print validation errors; returns whether the report was clean
pub fn validation(report: &ValidationReport) -> bool {
    if report.is_ok() {
        success("Plan is valid");
        return true;
    }
    for message in &report.errors {
        error(message);
    }
    false
}

/// Print an execution summary
pub fn summary(summary: &ExecuteSummary) {
    section("Summary");
    kv("succeeded", &summary.succeeded.to_string().green().to_string());
    if summary.failed > 0 {
        kv("failed", &summary.failed.to_string().red().to_string());
        for id in &summary.failed_ids {
            dim(&format!("✗ {id}"));
        }
    }
    if summary.pending > 0 {
        kv("pending", &summary.pending.to_string().yellow().to_string());
    }
}
