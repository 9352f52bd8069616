//! `pjtk` command-line entry point.
//!
//! # Responsibility
//! - Load layered configuration, start logging and open the database.
//! - Print each command's result as pretty JSON on stdout.

mod cli;
mod commands;

use clap::Parser;
use cli::Cli;
use commands::{dispatch, CliResult};
use log::error;
use pjtk_core::{init_logging, open_db, AppConfig};
use std::process::ExitCode;

fn main() -> ExitCode {
    match run(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("event=cli_command module=cli status=error error={err}");
            eprintln!("pjtk error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> CliResult<()> {
    let config = AppConfig::load_from(cli.config.as_deref())?;
    let level = if cli.verbose {
        "debug"
    } else {
        config.log_level.as_str()
    };
    init_logging(level, &config.log_dir, cli.verbose)?;

    let db_path = cli.db.unwrap_or(config.database_path);
    let conn = open_db(&db_path)?;
    let output = dispatch(cli.command, &conn, cli.actor.as_deref())?;
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
