//! CLI interface for poly-mirror
//!
//! Provides subcommands for:
//! - `run`: Start the replication engine
//! - `config`: Show the effective configuration

mod run;

pub use run::RunArgs;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "poly-mirror")]
#[command(about = "Proportional copy-trading engine for Polymarket")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    pub config: String,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the replication engine
    Run(RunArgs),
    /// Show the effective configuration
    Config,
}
