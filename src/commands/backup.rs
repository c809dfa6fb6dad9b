use anyhow::{Context as _, Result};
use buildplan::export_plan;
use chrono::Local;
use guildkit::{RateLimiter, SnapshotOptions, snapshot_target};
use std::path::PathBuf;

use crate::Context;
use crate::cli::BackupArgs;
use crate::targets::{SandboxTargets, TargetProvider};
use crate::ui;

pub async fn run(ctx: &Context, args: BackupArgs) -> Result<PathBuf> {
    let state_dir = ctx.config.state_dir()?;
    let targets = SandboxTargets::new(state_dir.join("targets"));
    let service = targets.connect(args.target).await?;
    let limiter = RateLimiter::new(ctx.config.rate_limit());

    let options = SnapshotOptions {
        name: args.name,
        messages_per_channel: args
            .messages
            .unwrap_or(ctx.config.backup.messages_per_channel),
    };
    let plan = snapshot_target(service.as_ref(), &limiter, &options)
        .await
        .with_context(|| format!("Failed to snapshot target {}", args.target))?;

    let out = args.out.unwrap_or_else(|| {
        let stamp = Local::now().format("%Y%m%d-%H%M%S");
        PathBuf::from(format!("backup-{}-{stamp}.json", args.target))
    });
    export_plan(&plan, &out).with_context(|| format!("Failed to write {}", out.display()))?;
    ui::success(&format!(
        "Backed up target {} to {} ({} steps)",
        args.target,
        out.display(),
        plan.len()
    ));
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use buildplan::import_plan;
    use guildkit::GuildService;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_backup_writes_replayable_plan() {
        let temp = TempDir::new().unwrap();
        let ctx = Context {
            verbose: 0,
            quiet: true,
            config: Config {
                state_dir: Some(temp.path().display().to_string()),
                ..Default::default()
            },
        };
        {
            let targets = SandboxTargets::new(temp.path().join("targets"));
            targets.guild(3).unwrap().create_category("Info").await.unwrap();
        }

        let out = temp.path().join("backup.json");
        run(
            &ctx,
            BackupArgs {
                target: 3,
                name: None,
                messages: Some(0),
                out: Some(out.clone()),
            },
        )
        .await
        .unwrap();

        let plan = import_plan(&out).unwrap();
        assert_eq!(plan.name, "backup-3");
        assert_eq!(plan.len(), 2);
        assert_eq!(plan.steps[1].id, "meta-3");
    }
}
