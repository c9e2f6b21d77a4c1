mod cli;
mod commands;
mod config;
mod engine;
mod gateway;
mod lxd;
mod password;
mod paths;
mod state;
mod ui;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use cli::{Cli, Command};
use std::io;
use std::path::PathBuf;

/// Global context for the application
pub struct Context {
    pub verbose: u8,
    pub quiet: bool,
    pub config: Option<PathBuf>,
}

fn main() -> Result<()> {
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
        config: cli.config,
    };

    match cli.command {
        Command::Apply(args) => {
            commands::converge::apply(&ctx, args.target.as_deref(), args.dry_run, args.yes)
        }
        Command::Diff(args) => commands::converge::diff(&ctx, args.target.as_deref()),
        Command::Info(args) => commands::info::run(&ctx, args.json),
        Command::Completions { shell } => {
            generate(shell, &mut Cli::command(), "lxd-sling", &mut io::stdout());
            Ok(())
        }
    }
}
