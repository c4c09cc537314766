// locus_core/src/estimation/filters/mod.rs

pub mod eskf;

pub use eskf::{CarFilter, ErrorStateKalmanFilter, LiveFilter};
