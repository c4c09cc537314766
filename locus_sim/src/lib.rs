// locus_sim/src/lib.rs

//! Scenario runner for the `locus_core` filters: loads TOML scenarios, drives
//! a filter against a simulated truth with seeded synthetic sensors, and
//! reports how consistent the estimate was.

// This prelude is for convenience for other files WITHIN the locus_sim crate.
pub mod prelude;

pub mod cli;
pub mod simulation;
