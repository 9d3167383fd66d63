mod cli;
mod commands;
mod config;
mod paths;
mod state;
mod ui;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use cli::{Cli, Command};
use std::io;
use std::process::ExitCode;

/// Global context for the application
pub struct Context {
    pub quiet: bool,
    pub cache_token: bool,
}

fn main() -> Result<ExitCode> {
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
        quiet: cli.quiet,
        cache_token: cli.cache_token,
    };

    match cli.command {
        Command::Apply(args) => commands::apply::run(&ctx, &cli.connection, args),
        Command::Show(target) => commands::show::run(&ctx, &cli.connection, target),
        Command::Types => {
            commands::types::run();
            Ok(ExitCode::SUCCESS)
        }
        Command::Auth(args) => commands::auth::run(&ctx, &cli.connection, args),
        Command::Completions { shell } => {
            let mut cmd = Cli::command();
            generate(shell, &mut cmd, "scmctl", &mut io::stdout());
            Ok(ExitCode::SUCCESS)
        }
    }
}
