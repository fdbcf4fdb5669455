//! CLI argument parsing for the agro-worker binary.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "agro-worker", about = "Field survey ingestion and bulk job worker")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Start the worker server (default if no subcommand given)
    Serve,
    /// Run database migrations and exit
    Migrate,
    /// Parse a survey CSV without touching the database
    CheckCsv {
        /// Path to the CSV file
        file: PathBuf,
    },
    /// Ingest a survey CSV into the database
    Ingest {
        /// Path to the CSV file
        file: PathBuf,
    },
}
