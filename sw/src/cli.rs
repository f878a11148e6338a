//! CLI command definitions

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// sw - parameter sweep runner
#[derive(Debug, Parser)]
#[command(
    name = "sw",
    about = "Enumerate and execute parameter sweeps against a target",
    version
)]
pub struct Cli {
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    #[arg(
        short = 'l',
        long = "log-level",
        global = true,
        help = "Log level (TRACE, DEBUG, INFO, WARN, ERROR)"
    )]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Show the total number of combinations and each parameter's cardinality
    Count {
        /// Recipe file (YAML)
        recipe: PathBuf,
    },

    /// Show the combination at an index
    Show {
        recipe: PathBuf,

        index: u64,
    },

    /// List the values a recipe generates
    Values {
        recipe: PathBuf,

        /// Only this parameter
        name: Option<String>,
    },

    /// Run a sweep against the simulated target
    Run {
        recipe: PathBuf,

        /// First index to process
        #[arg(long)]
        start_index: Option<u64>,

        /// Correlation id; a fresh one is generated when omitted
        #[arg(long)]
        run_id: Option<String>,

        /// Simulated processing time per combination
        #[arg(long)]
        latency_ms: Option<u64>,

        /// Seed for the simulated target
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Continue an interrupted run from its event log
    Resume {
        recipe: PathBuf,

        run_id: String,

        #[arg(long)]
        latency_ms: Option<u64>,

        #[arg(long)]
        seed: Option<u64>,
    },

    /// Print a run's event log
    Events {
        run_id: String,
    },
}
