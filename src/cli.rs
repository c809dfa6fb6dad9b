use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "conditor")]
#[command(author = "Alberto Cavalcante")]
#[command(version)]
#[command(about = "Compile community specifications into build plans and apply them", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Compile questionnaire answers (and a template) into a plan file
    Compile(CompileArgs),

    /// Check a plan file for structural and permission problems
    Validate {
        /// Plan file
        plan: PathBuf,
    },

    /// Execute plan files against a target
    Run(RunArgs),

    /// Snapshot a target into a replayable plan file
    Backup(BackupArgs),

    /// Show persisted execution progress for a plan
    Status(StatusArgs),

    /// Manage stored templates
    #[command(subcommand)]
    Template(TemplateCommand),

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

// ============================================================================
// Compile
// ============================================================================

#[derive(Args)]
pub struct CompileArgs {
    /// Base directory holding data/questionnaire and data/templates
    #[arg(short, long, default_value = ".")]
    pub base: PathBuf,

    /// Questionnaire files to merge instead of discovering them (repeatable)
    #[arg(long = "answers", value_name = "FILE")]
    pub answers: Vec<PathBuf>,

    /// Template name from the store, or a path to a template file
    #[arg(short, long)]
    pub template: Option<String>,

    /// Plan name
    #[arg(short, long, default_value = "build")]
    pub name: String,

    /// Output file (defaults to <name>.json)
    #[arg(short, long)]
    pub out: Option<PathBuf>,
}

// ============================================================================
// Run
// ============================================================================

#[derive(Args)]
pub struct RunArgs {
    /// Plan files, executed in order
    #[arg(required = true)]
    pub plans: Vec<PathBuf>,

    /// Target guild id
    #[arg(short, long, required_unless_present = "dry_run")]
    pub target: Option<u64>,

    /// Walk the plan without touching any target
    #[arg(short = 'n', long)]
    pub dry_run: bool,

    /// Discard persisted progress and start from the first step
    #[arg(long)]
    pub fresh: bool,

    /// Skip the confirmation prompt
    #[arg(short, long)]
    pub yes: bool,
}

// ============================================================================
// Backup
// ============================================================================

#[derive(Args)]
pub struct BackupArgs {
    /// Target guild id
    #[arg(short, long)]
    pub target: u64,

    /// Plan name (defaults to backup-<target>)
    #[arg(long)]
    pub name: Option<String>,

    /// Recent messages to capture per text channel
    #[arg(short, long)]
    pub messages: Option<usize>,

    /// Output file (defaults to backup-<target>-<timestamp>.json)
    #[arg(short, long)]
    pub out: Option<PathBuf>,
}

// ============================================================================
// Status
// ============================================================================

#[derive(Args)]
pub struct StatusArgs {
    /// Plan file, or a plan name
    pub plan: String,

    /// Target guild id
    #[arg(short, long, conflicts_with = "dry_run", required_unless_present = "dry_run")]
    pub target: Option<u64>,

    /// Show dry-run progress instead
    #[arg(short = 'n', long)]
    pub dry_run: bool,

    /// Delete the persisted progress
    #[arg(long)]
    pub reset: bool,
}

// ============================================================================
// Templates
// ============================================================================

#[derive(Subcommand)]
pub enum TemplateCommand {
    /// List stored templates
    List,

    /// Print a stored template
    Show {
        name: String,
    },

    /// Store a template file under a name
    Save {
        name: String,

        /// Template JSON file
        file: PathBuf,
    },

    /// Remove a stored template
    #[command(alias = "rm")]
    Remove {
        name: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_run_requires_target_or_dry_run() {
        assert!(Cli::try_parse_from(["conditor", "run", "plan.json"]).is_err());
        assert!(Cli::try_parse_from(["conditor", "run", "plan.json", "--dry-run"]).is_ok());

        let cli = Cli::try_parse_from(["conditor", "run", "a.json", "b.json", "-t", "42", "--fresh"]).unwrap();
        let Command::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.plans.len(), 2);
        assert_eq!(args.target, Some(42));
        assert!(args.fresh);
    }

    #[test]
    fn test_status_target_conflicts_with_dry_run() {
        assert!(Cli::try_parse_from(["conditor", "status", "p", "-t", "1", "-n"]).is_err());
        assert!(Cli::try_parse_from(["conditor", "status", "p", "-t", "1"]).is_ok());
    }
}
