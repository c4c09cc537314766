// locus_sim/src/cli.rs

use clap::{ArgAction, ArgGroup, Parser};
use std::path::PathBuf;

/// Locus: deterministic scenario runner for the locus_core Kalman filters.
///
/// Runs one scenario file, or every scenario under a directory, against
/// synthetic sensor streams and prints a consistency report.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(group(ArgGroup::new("input").required(true).args(["scenario", "scenario_dir"])))]
pub struct Cli {
    /// The path to the scenario TOML file to run.
    #[arg(short, long)]
    pub scenario: Option<PathBuf>,

    /// Run every `.toml` scenario found (recursively) under this directory.
    #[arg(long)]
    pub scenario_dir: Option<PathBuf>,

    /// Overrides the seed given in the scenario file.
    #[arg(long)]
    pub seed: Option<u64>,

    /// Write the run report(s) to this TOML file.
    #[arg(short, long)]
    pub report: Option<PathBuf>,

    /// Raise the log level (-v debug, -vv trace). `RUST_LOG` takes precedence.
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,
}
