// locus_sim/src/simulation/error.rs

use locus_core::prelude::EkfError;
use thiserror::Error;

/// Everything that can go wrong between reading a scenario file and starting a run.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load scenario: {0}")]
    Load(#[from] Box<figment::Error>),

    #[error("invalid value for `{field}`: {reason}")]
    InvalidValue { field: String, reason: String },

    /// The scenario asked the filter for something it refuses (unknown kind tag,
    /// bad parameter, wrong dimension).
    #[error("scenario rejected by the filter: {0}")]
    Filter(#[from] EkfError),

    #[error("failed to read scenario directory: {0}")]
    Walk(#[from] walkdir::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        ConfigError::Load(Box::new(err))
    }
}

impl ConfigError {
    pub(crate) fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        ConfigError::InvalidValue {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Failures while writing a run report.
#[derive(Debug, Error)]
pub enum ReportError {
    #[error("failed to serialize report: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("failed to write report: {0}")]
    Io(#[from] std::io::Error),
}
