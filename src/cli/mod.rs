//! Command-line interface

pub mod commands;
pub mod output;
pub mod runner;

use clap::{Parser, Subcommand};
use commands::{CheckCommand, ConfigCommand, RunCommand};
use std::ffi::OsString;
use std::path::PathBuf;

/// Discover, export and run steps
#[derive(Debug, Parser, Clone)]
#[command(name = "bridge")]
#[command(version = "0.1.0")]
#[command(about = "Discover step modules, export their descriptor document and run single steps", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Project directory holding bridge.yaml (defaults to the working directory)
    #[arg(short = 'C', long, global = true)]
    pub project_dir: Option<PathBuf>,
}

/// Available commands
#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Validate project setup
    Check(CheckCommand),

    /// Configuration commands
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },

    /// Run a single step
    Run(RunCommand),
}

impl Cli {
    /// Parse CLI arguments from environment
    pub fn from_args() -> Self {
        Self::parse()
    }

    /// Parse CLI arguments from a slice
    pub fn try_parse_from<I, T>(itr: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        <Self as Parser>::try_parse_from(itr)
    }
}
