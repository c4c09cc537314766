// locus_core/src/error.rs

use thiserror::Error;

/// Everything that can make the engine refuse a call.
///
/// Every variant is recoverable: when a call returns one of these, the filter's
/// mean and covariance are exactly what they were before the call.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EkfError {
    /// A vector or matrix argument has the wrong shape.
    #[error("dimension mismatch for {what}: expected {expected:?}, got {actual:?}")]
    DimensionMismatch {
        what: &'static str,
        expected: (usize, usize),
        actual: (usize, usize),
    },

    /// A raw observation tag is not part of the model's closed set of kinds.
    #[error("unknown observation kind {tag} for model `{model}`")]
    UnknownKind { model: &'static str, tag: u8 },

    /// `S = H P Hᵀ + R` cannot be factored, or is too ill-conditioned to trust.
    #[error("innovation covariance for `{kind}` is singular or not positive definite")]
    SingularInnovationCovariance { kind: &'static str },

    /// A physical parameter setter was given a value outside its domain.
    #[error("invalid value {value} for parameter `{name}`")]
    InvalidParameter { name: &'static str, value: f64 },

    /// A negative `dt`, or a NaN/inf somewhere in `x`, `P`, `Q`, `z` or `R`.
    #[error("invalid or non-finite input: {what}")]
    NonFiniteInput { what: &'static str },

    /// The squared Mahalanobis distance of the innovation exceeded the gate.
    #[error("`{kind}` rejected by innovation gate: d² = {distance:.3} > {threshold:.3}")]
    InnovationGated {
        kind: &'static str,
        distance: f64,
        threshold: f64,
    },

    /// A timestamped call arrived for a time before the current filter time.
    #[error("timestamp {timestamp} is older than filter time {filter_time}")]
    StaleTimestamp { timestamp: f64, filter_time: f64 },

    /// The arithmetic itself blew up even though every input was finite.
    #[error("{stage} produced a non-finite estimate")]
    NonFiniteResult { stage: &'static str },
}

impl EkfError {
    pub(crate) fn shape(what: &'static str, expected: (usize, usize), actual: (usize, usize)) -> Self {
        EkfError::DimensionMismatch {
            what,
            expected,
            actual,
        }
    }
}

pub type EkfResult<T> = Result<T, EkfError>;
