//! Tabula CLI
//!
//! Command-line tools for inspecting how change batches propagate.
//!
//! # Commands
//!
//! - `replay` - Apply change batches to a document and print notifications
//! - `diff` - Print the dirty-path tree of each batch

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Tabula command-line tools.
#[derive(Parser)]
#[command(name = "tabula")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply change batches and print the notifications they fire
    Replay {
        /// JSON file holding the initial document
        #[arg(short, long)]
        document: PathBuf,

        /// JSON file holding an array of change batches
        #[arg(short, long)]
        batches: PathBuf,

        /// Watch `<kind>:<id>:<key>` instead of every model key
        #[arg(short, long)]
        watch: Vec<String>,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Print the dirty-path tree of each batch
    Diff {
        /// JSON file holding the initial document
        #[arg(short, long)]
        document: PathBuf,

        /// JSON file holding an array of change batches
        #[arg(short, long)]
        batches: PathBuf,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Replay {
            document,
            batches,
            watch,
            format,
        } => {
            commands::replay::run(&document, &batches, &watch, &format)?;
        }
        Commands::Diff { document, batches } => {
            commands::diff::run(&document, &batches)?;
        }
        Commands::Version => {
            println!("Tabula CLI v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
