//! CLI command definitions and subcommands

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Plan Orchestrator - dependency-driven inference scheduling
#[derive(Parser)]
#[command(
    name = "po",
    about = "Plan orchestrator: deploy compiled plans and drive runs to completion",
    version
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true, help = "Enable verbose output")]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands
#[derive(Subcommand)]
pub enum Command {
    /// Start the HTTP server hosting deployed plans and runs
    Serve,

    /// Deploy a plan package (zip or unpacked directory) and print its id
    Deploy {
        /// Path to the package zip or directory
        package: PathBuf,
    },

    /// Run a plan package to completion in the foreground
    Run {
        /// Path to the package zip or directory
        package: PathBuf,

        /// Ground inputs as inline JSON or @file.json
        #[arg(short, long)]
        inputs: Option<String>,

        /// Route LLM calls to the deterministic mock client
        #[arg(long)]
        mock: bool,

        /// Override the cycle budget
        #[arg(long)]
        max_cycles: Option<u64>,
    },

    /// Resume an interrupted run from its latest (or a chosen) checkpoint
    Resume {
        /// Run id to resume
        run_id: String,

        /// Checkpoint cycle (defaults to the latest)
        #[arg(long)]
        cycle: Option<u64>,
    },

    /// Fork a run at a checkpoint into a new run
    Fork {
        /// Source run id
        run_id: String,

        /// Checkpoint cycle to fork at
        #[arg(long)]
        cycle: u64,

        /// New run id (generated when omitted)
        #[arg(long)]
        new_run_id: Option<String>,

        /// Ground-input overrides as inline JSON or @file.json
        #[arg(short, long)]
        inputs: Option<String>,
    },

    /// List runs, including interrupted ones found on disk
    Runs,

    /// List checkpoints of a run
    Checkpoints {
        /// Run id
        run_id: String,
    },
}

/// Process exit codes for the one-shot runner
pub mod exit_codes {
    pub const OK: i32 = 0;
    pub const CONFIG_ERROR: i32 = 2;
    pub const DEPLOY_ERROR: i32 = 3;
    pub const RUN_FAILED: i32 = 4;
    pub const BUDGET_EXHAUSTED: i32 = 5;
    pub const DEADLOCK: i32 = 6;
}

/// Map a terminal run outcome kind onto the exit code contract
pub fn exit_code_for(kind: &str) -> i32 {
    match kind {
        "completed" => exit_codes::OK,
        "budget_exhausted" => exit_codes::BUDGET_EXHAUSTED,
        "deadlock" => exit_codes::DEADLOCK,
        _ => exit_codes::RUN_FAILED,
    }
}
