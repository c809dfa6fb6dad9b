use anyhow::{Context as _, Result, bail};
use buildplan::Template;
use colored::Colorize;

use crate::Context;
use crate::cli::TemplateCommand;
use crate::templates::TemplateStore;
use crate::ui;

pub fn run(ctx: &Context, cmd: TemplateCommand) -> Result<()> {
    let store = TemplateStore::new(ctx.config.templates_dir()?);
    match cmd {
        TemplateCommand::List => list(&store),
        TemplateCommand::Show { name } => {
            let template = store
                .get(&name)?
                .with_context(|| format!("No template named '{name}'"))?;
            println!("{}", serde_json::to_string_pretty(&template)?);
            Ok(())
        }
        TemplateCommand::Save { name, file } => {
            let content = std::fs::read_to_string(&file)
                .with_context(|| format!("Could not read {}", file.display()))?;
            let template = serde_json::from_str(&content)
                .with_context(|| format!("Invalid JSON in {}", file.display()))?;
            let path = store.save(&name, &template)?;
            ui::success(&format!("Saved template '{name}' to {}", path.display()));
            Ok(())
        }
        TemplateCommand::Remove { name } => {
            if !store.remove(&name)? {
                bail!("No template named '{name}'");
            }
            ui::success(&format!("Removed template '{name}'"));
            Ok(())
        }
    }
}

fn list(store: &TemplateStore) -> Result<()> {
    let names = store.list();
    if names.is_empty() {
        ui::info(&format!("No templates in {}", store.dir().display()));
        return Ok(());
    }
    ui::header("Templates");
    for name in names {
        let official = store
            .get(&name)
            .ok()
            .flatten()
            .and_then(|t| Template::from_value(&t).ok())
            .is_some_and(|t| t.is_official());
        if official {
            println!("  {} {}", name, "(official style)".dimmed());
        } else {
            println!("  {name}");
        }
    }
    Ok(())
}
