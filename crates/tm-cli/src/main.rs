//! Tidemark CLI - versioned schema migrations for DuckDB

use anyhow::Result;
use clap::Parser;

mod cli;
mod commands;
mod context;
mod logging;

use cli::Cli;
use commands::common::ExitCode;
use commands::{down, new, repair, status, unlock, up};

fn main() {
    let cli = Cli::parse();
    logging::init(cli.global.verbose);

    let result: Result<()> = match &cli.command {
        cli::Commands::Up(args) => up::execute(args, &cli.global),
        cli::Commands::Down(args) => down::execute(args, &cli.global),
        cli::Commands::Status(args) => status::execute(args, &cli.global),
        cli::Commands::Repair(args) => repair::execute(args, &cli.global),
        cli::Commands::New(args) => new::execute(args, &cli.global),
        cli::Commands::Unlock => unlock::execute(&cli.global),
    };

    if let Err(err) = result {
        if let Some(code) = err.downcast_ref::<ExitCode>() {
            std::process::exit(code.0);
        }
        eprintln!("Error: {err:#}");
        std::process::exit(1);
    }
}
