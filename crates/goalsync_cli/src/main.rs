//! goalsync CLI
//!
//! Command-line tools for goalsync stores.
//!
//! # Commands
//!
//! - `inspect` - Display a store file's entities, checkpoints and pending work
//! - `simulate` - Run two devices against an in-memory cloud and show the result
//! - `version` - Show version information

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// goalsync command-line tools.
#[derive(Parser)]
#[command(name = "goalsync")]
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
    /// Display a store file's sync state
    Inspect {
        /// Path to the store file
        path: PathBuf,

        /// List every entity, not only dirty ones
        #[arg(short, long)]
        all: bool,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Simulate two devices syncing through an in-memory cloud
    Simulate {
        /// Account the devices sign in with
        #[arg(short, long, default_value = "_acct42")]
        account: String,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Inspect { path, all, format } => {
            commands::inspect::run(&path, all, &format)?;
        }
        Commands::Simulate { account, format } => {
            commands::simulate::run(&account, &format)?;
        }
        Commands::Version => {
            println!("goalsync CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("goalsync core v{}", goalsync_core::VERSION);
        }
    }

    Ok(())
}
