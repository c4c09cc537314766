// locus_core/src/types.rs

use nalgebra::{DMatrix, DVector};

// --- Core Type Aliases ---
/// The full (possibly redundant) state vector `x`.
pub type State = DVector<f64>;
/// A perturbation expressed in the reduced error-state basis `δx`.
pub type ErrorState = DVector<f64>;
/// A covariance over the error state. Always `ERROR_DIM x ERROR_DIM`.
pub type Covariance = DMatrix<f64>;
/// A Jacobian or any other dense matrix the engine passes around.
pub type Jacobian = DMatrix<f64>;
/// A measurement vector `z` or a predicted measurement `h(x)`.
pub type Observation = DVector<f64>;
