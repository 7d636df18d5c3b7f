//! CLI command definitions.
//!
//! Mirrors the teacher's `cli::Cli` + `clap::Parser`/`Subcommand` shape: a
//! thin shim over [`crate::orchestrator::Orchestrator`] that owns no
//! pipeline logic of its own, exactly as the teacher's `main.rs` owns no
//! database logic and only wires components together.

pub mod replicate;
pub mod validate;

use clap::{Parser, Subcommand};
use replicate::ReplicateArgs;
use validate::ValidateArgs;

/// Replicates a tag configuration from a source workspace into a target.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to a YAML configuration file.
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Enable verbose (debug-level) logging.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Logging output: 0/off, 1/stdout, 2/stderr (default)
    #[arg(short, long, default_value = "2", global = true)]
    pub log: String,

    #[command(subcommand)]
    pub command: Command,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Replicate a source workspace's tags, triggers, variables, and templates into a target.
    Replicate(ReplicateArgs),

    /// Run a standalone completeness/reference-integrity check against a target snapshot.
    Validate(ValidateArgs),
}
