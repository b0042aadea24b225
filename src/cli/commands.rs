//! CLI command definitions

use clap::{ArgGroup, Args, Subcommand};
use std::path::PathBuf;

/// Validate project setup
#[derive(Debug, Args, Clone, Default)]
pub struct CheckCommand {}

/// Configuration commands
#[derive(Debug, Subcommand, Clone)]
pub enum ConfigCommand {
    /// Export the descriptor document for the discovered steps and pipelines
    GetDsl(GetDslCommand),
}

#[derive(Debug, Args, Clone, Default)]
pub struct GetDslCommand {
    /// Module paths to discover steps from (overrides bridge.yaml)
    #[arg(long, num_args = 1..)]
    pub modules: Vec<String>,

    /// Where to write the document (defaults to bridge.yaml's output_file, then the cache dir)
    #[arg(long)]
    pub output_file: Option<PathBuf>,
}

/// Run a single step
#[derive(Debug, Args, Clone)]
#[command(group(
    ArgGroup::new("cached_results")
        .required(true)
        .args(["results", "results_file"])
))]
pub struct RunCommand {
    /// Name of the step to run
    #[arg(long)]
    pub step: String,

    /// JSON input to the step
    #[arg(long)]
    pub input: String,

    /// JSON object of cached results, keyed by step name
    #[arg(long)]
    pub results: Option<String>,

    /// Path to a JSON file of cached results
    #[arg(long)]
    pub results_file: Option<PathBuf>,

    /// Module paths to discover steps from (overrides bridge.yaml)
    #[arg(long, num_args = 1..)]
    pub modules: Vec<String>,

    /// Path to write the step result to
    #[arg(long)]
    pub output_file: Option<PathBuf>,
}

impl RunCommand {
    pub fn new(step: impl Into<String>, input: impl Into<String>) -> Self {
        Self {
            step: step.into(),
            input: input.into(),
            results: None,
            results_file: None,
            modules: Vec::new(),
            output_file: None,
        }
    }
}
