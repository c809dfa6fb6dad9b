mod cli;
mod commands;
mod config;
mod paths;
mod progress;
mod targets;
mod templates;
mod ui;
mod worker;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use cli::{Cli, Command};
use config::Config;
use std::io;

/// Global context for the application
pub struct Context {
    pub verbose: u8,
    pub quiet: bool,
    pub config: Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    let log_level = match cli.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    env_logger::Builder::new()
        .filter_level(if cli.quiet {
            log::LevelFilter::Error
        } else {
            log_level
        })
        .format_timestamp(None)
        .init();

    let ctx = Context {
        verbose: cli.verbose,
        quiet: cli.quiet,
        config: Config::load()?,
    };
    log::trace!("Verbosity {}", ctx.verbose);

    match cli.command {
        Command::Compile(args) => commands::compile::run(&ctx, args).map(drop),
        Command::Validate { plan } => commands::validate::run(&ctx, &plan),
        Command::Run(args) => commands::run::run(&ctx, args).await,
        Command::Backup(args) => commands::backup::run(&ctx, args).await.map(drop),
        Command::Status(args) => commands::status::run(&ctx, args),
        Command::Template(cmd) => commands::template::run(&ctx, cmd),
        Command::Completions { shell } => {
            let mut cmd = Cli::command();
            generate(shell, &mut cmd, "conditor", &mut io::stdout());
            Ok(())
        }
    }
}
