//! God's Acre CLI - cemetery register imports in your terminal

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;
mod output;

use commands::{import, logs, status};

/// God's Acre - import and reconcile cemetery register spreadsheets
#[derive(Parser)]
#[command(name = "ga", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show entity counts in the register
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Import a register workbook, csv file or directory of csv files
    Import {
        /// Path to the document
        file: PathBuf,
        /// Delete all existing register data before importing
        #[arg(long)]
        wipe: bool,
        /// Skip the wipe confirmation prompt
        #[arg(long, short)]
        force: bool,
        /// Only list rows that failed
        #[arg(long)]
        failures_only: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// View and manage the event log
    Logs {
        #[command(subcommand)]
        command: logs::LogsCommands,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let result = run(cli);

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            output::error(&format!("{:#}", e));
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Status { json } => status::run(json),
        Commands::Import {
            file,
            wipe,
            force,
            failures_only,
            json,
        } => import::run(&file, wipe, force, failures_only, json),
        Commands::Logs { command } => logs::run(command),
    }
}
