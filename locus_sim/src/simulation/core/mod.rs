// locus_sim/src/simulation/core/mod.rs

pub mod prng;
pub mod sensors;
pub mod truth;
