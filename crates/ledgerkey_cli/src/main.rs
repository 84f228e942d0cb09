//! LedgerKey CLI
//!
//! Command-line tools for LedgerKey audit ledger journals.
//!
//! # Commands
//!
//! - `dump` - Print ledger entries in journal order
//! - `inspect` - Display journal statistics
//! - `verify` - Check frame checksums and ledger continuity

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// LedgerKey command-line journal tools.
#[derive(Parser)]
#[command(name = "ledgerkey")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the ledger journal file
    #[arg(global = true, short, long)]
    journal: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print ledger entries in journal order
    Dump {
        /// Maximum number of entries to print
        #[arg(short, long)]
        limit: Option<usize>,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Display journal statistics
    Inspect {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Check frame checksums and ledger continuity
    Verify,

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("warn")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Dump { limit, format } => {
            let path = cli.journal.ok_or("Journal path required for dump")?;
            commands::dump::run(&path, limit, &format)?;
        }
        Commands::Inspect { format } => {
            let path = cli.journal.ok_or("Journal path required for inspect")?;
            commands::inspect::run(&path, &format)?;
        }
        Commands::Verify => {
            let path = cli.journal.ok_or("Journal path required for verify")?;
            commands::verify::run(&path)?;
        }
        Commands::Version => {
            println!("LedgerKey CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("LedgerKey Core v{}", ledgerkey_core::VERSION);
        }
    }

    Ok(())
}
