// locus_sim/src/prelude.rs

// Re-export the entire locus_core prelude so binaries see the filter types.
pub use locus_core::prelude::*;

// Re-export common simulation-specific types.
pub use crate::cli::Cli;
pub use crate::simulation::config::{
    discover_scenarios, load_scenario, parse_scenario, ModelKind, ScenarioCatalog, ScenarioConfig,
};
pub use crate::simulation::error::{ConfigError, ReportError};
pub use crate::simulation::report::{BatchReport, RunReport};
pub use crate::simulation::runner::run_scenario;
