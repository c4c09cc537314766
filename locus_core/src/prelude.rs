// locus_core/src/prelude.rs

// --- Core Abstractions (The main contracts of the library) ---
pub use crate::estimation::StateEstimator;
pub use crate::models::{
    ErrorStateMap, FilterModel, MeasurementModel, ObservationKind, ProcessModel,
};

// --- Core Data Structures (The "nouns" of the library) ---
pub use crate::error::{EkfError, EkfResult};
pub use crate::estimate::Estimate;
pub use crate::messages::{BlockSnapshot, FilterInput, FilterSnapshot};
pub use crate::models::layout::StateBlock;
pub use crate::types::{Covariance, ErrorState, Jacobian, Observation, State};

// --- Estimation Algorithms ---
pub use crate::estimation::ekf::UpdateReport;
pub use crate::estimation::filters::{CarFilter, ErrorStateKalmanFilter, LiveFilter};
pub use crate::estimation::gating::{chi_square_quantile, GateConfig, GateProbability};
pub use crate::estimation::Processed;

// --- Concrete Model Implementations ---
pub use crate::models::car::{CarModel, CarObservation, CarParams};
pub use crate::models::live::{LiveModel, LiveObservation};
