//! Reportmail CLI - ingest spreadsheet reports from a shared mailbox

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;
mod output;

use commands::{directory, ingest, logs, run, status};

/// Reportmail - turn report e-mails into database rows
#[derive(Parser)]
#[command(name = "reportmail", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Poll the configured mailbox until interrupted
    Run {
        /// Run a single cycle and exit
        #[arg(long)]
        once: bool,
        /// Output as JSON (with --once)
        #[arg(long)]
        json: bool,
    },

    /// Ingest a local spreadsheet as if it arrived by mail
    Ingest {
        /// Path to the workbook (.xlsx, .xls, .xlsb, .ods)
        file: PathBuf,
        /// Subject line used for classification hints
        #[arg(long, default_value = "")]
        subject: String,
        /// Message id recorded as the source (defaults to a content hash)
        #[arg(long)]
        message_id: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show row counts per report table
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Manage the dealer and user directory
    Directory {
        #[command(subcommand)]
        command: directory::DirectoryCommands,
    },

    /// View and manage the ingestion event log
    Logs {
        #[command(subcommand)]
        command: logs::LogsCommands,
    },
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();
}

fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    match dispatch(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            output::error(&format!("{:#}", e));
            ExitCode::FAILURE
        }
    }
}

fn dispatch(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Run { once, json } => run::run(once, json),
        Commands::Ingest { file, subject, message_id, json } => {
            ingest::run(&file, &subject, message_id.as_deref(), json)
        }
        Commands::Status { json } => status::run(json),
        Commands::Directory { command } => directory::run(command),
        Commands::Logs { command } => logs::run(command),
    }
}
