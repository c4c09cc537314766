// locus_sim/src/main.rs

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use locus_sim::prelude::*;

fn init_tracing(verbosity: u8) {
    let default_level = match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn scenario_paths(cli: &Cli) -> Result<Vec<PathBuf>> {
    if let Some(dir) = &cli.scenario_dir {
        let catalog = discover_scenarios(dir)
            .with_context(|| format!("discovering scenarios in {}", dir.display()))?;
        anyhow::ensure!(!catalog.is_empty(), "no scenarios found in {}", dir.display());
        return Ok(catalog.iter().map(|(_, path)| path.clone()).collect());
    }
    Ok(cli.scenario.iter().cloned().collect())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let mut batch = BatchReport::default();
    for path in scenario_paths(&cli)? {
        let config = load_scenario(&path).with_context(|| format!("loading {}", path.display()))?;
        let report = run_scenario(&config, cli.seed).with_context(|| format!("running {}", path.display()))?;
        report.log_summary();
        batch.runs.push(report);
    }

    if let Some(path) = &cli.report {
        batch.write_toml(path)?;
    }
    Ok(())
}
