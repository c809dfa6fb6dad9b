use anyhow::{Context as _, Result};
use buildplan::{Specification, compile, export_plan, validate_all};
use std::path::PathBuf;

use crate::Context;
use crate::cli::CompileArgs;
use crate::templates::TemplateStore;
use crate::ui;

pub fn run(ctx: &Context, args: CompileArgs) -> Result<PathBuf> {
    let spec = if args.answers.is_empty() {
        Specification::discover(&args.base)
    } else {
        Specification::from_files(&args.answers, &[])
    };
    if spec == Specification::default() {
        ui::warn("No questionnaire answers found; compiling defaults");
    }

    let overrides = match &args.template {
        Some(name) => Some(TemplateStore::new(ctx.config.templates_dir()?).resolve(name)?),
        None => None,
    };

    let plan = compile(&spec, overrides.as_ref(), &args.name)
        .with_context(|| format!("Failed to compile plan '{}'", args.name))?;

    if !ctx.quiet {
        ui::plan_preview(&plan);
        ui::section("Steps by type");
        ui::plan_counts(&plan);
        println!();
    }
    // Reported, not enforced: the plan is still written for inspection.
    ui::validation(&validate_all(&plan));

    let out = args
        .out
        .unwrap_or_else(|| PathBuf::from(format!("{}.json", args.name)));
    export_plan(&plan, &out).with_context(|| format!("Failed to write {}", out.display()))?;
    ui::success(&format!("Wrote {} ({} steps)", out.display(), plan.len()));
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use buildplan::import_plan;
    use serde_json::json;
    use tempfile::TempDir;

    fn ctx(temp: &TempDir) -> Context {
        Context {
            verbose: 0,
            quiet: true,
            config: Config {
                templates_dir: Some(temp.path().join("templates").display().to_string()),
                ..Default::default()
            },
        }
    }

    #[test]
    fn test_compile_discovers_answers_and_writes_plan() {
        let temp = TempDir::new().unwrap();
        let answers = temp.path().join("data").join("questionnaire");
        std::fs::create_dir_all(&answers).unwrap();
        std::fs::write(
            answers.join("a.json"),
            json!({"type": "gaming", "games": ["Chess"], "size": "large"}).to_string(),
        )
        .unwrap();

        let out = temp.path().join("plan.json");
        let written = run(
            &ctx(&temp),
            CompileArgs {
                base: temp.path().to_path_buf(),
                answers: Vec::new(),
                template: None,
                name: "gaming".into(),
                out: Some(out.clone()),
            },
        )
        .unwrap();

        assert_eq!(written, out);
        let plan = import_plan(&out).unwrap();
        assert_eq!(plan.name, "gaming");
        assert!(plan.step("role-gaming").is_some());
        assert!(plan.step("cat-chess").is_some());
    }

    #[test]
    fn test_compile_with_stored_template() {
        let temp = TempDir::new().unwrap();
        let context = ctx(&temp);
        TemplateStore::new(context.config.templates_dir().unwrap())
            .save("official", &json!({"meta": {"official_style": true}}))
            .unwrap();

        let out = temp.path().join("official.json");
        run(
            &context,
            CompileArgs {
                base: temp.path().to_path_buf(),
                answers: Vec::new(),
                template: Some("official".into()),
                name: "official".into(),
                out: Some(out.clone()),
            },
        )
        .unwrap();

        let plan = import_plan(&out).unwrap();
        assert!(plan.step("chan-information-welcome").is_some());
        assert!(plan.step("perm-announcements").is_some());
    }
}
