//! Command-line interface definitions and parsing

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Configuration file path
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Data directory for the state store and lock file
    #[arg(short, long)]
    pub state_dir: Option<PathBuf>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Run the companion until interrupted (SIGHUP re-validates preferences)
    Run,
    /// Authenticate once with the configured preferences and print the verdict
    Validate,
    /// Show persisted authentication and preference state
    Status,
    /// Print an example configuration file
    ExampleConfig,
}
