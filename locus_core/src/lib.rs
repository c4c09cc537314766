// locus_core/src/lib.rs

//! An error-state extended Kalman filter engine with two model instances: a
//! vehicle lateral-dynamics estimator ("car") and an ECEF device-pose estimator
//! ("live").
//!
//! The engine is pure computation. It performs no I/O, installs no logging
//! subscriber and holds no global state; every filter owns its own estimate and
//! its own model parameters.

pub mod error;
pub mod estimate;
pub mod estimation;
pub mod messages;
pub mod models;
pub mod prelude;
pub mod types;
pub mod utils;
