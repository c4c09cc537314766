// locus_core/src/estimation/mod.rs

use crate::error::EkfResult;
use crate::estimate::Estimate;
use crate::messages::{FilterInput, FilterSnapshot};
use crate::models::ObservationKind;

pub mod ekf;
pub mod filters;
pub mod gating;

pub use ekf::UpdateReport;

/// What a call to [`StateEstimator::process`] did.
#[derive(Debug, Clone, PartialEq)]
pub enum Processed<K> {
    /// The filter was advanced (or only stamped with its first time).
    Advanced,
    /// The observation was fused.
    Updated(UpdateReport<K>),
}

/// The contract for any algorithm that performs the "State Estimator" role.
/// Its sole responsibility is to estimate the state of one system.
pub trait StateEstimator: Send + Sync {
    type Kind: ObservationKind;

    /// The single, unified method for processing all types of input data.
    ///
    /// Inputs must arrive in time order; a rejected input leaves the estimate
    /// untouched.
    fn process(&mut self, input: &FilterInput) -> EkfResult<Processed<Self::Kind>>;

    /// The current best estimate.
    fn estimate(&self) -> &Estimate;

    /// An owned, serializable copy of the current estimate.
    fn snapshot(&self) -> FilterSnapshot;
}
