// locus_core/src/messages.rs

use serde::{Deserialize, Serialize};

use crate::types::{Covariance, Observation};

/// The universal input packet for all `StateEstimator` implementations.
#[derive(Debug, Clone, Copy)]
pub enum FilterInput<'a> {
    /// Advance the filter to `timestamp` without observing anything.
    Advance { timestamp: f64 },
    /// An observation tagged with its raw wire kind.
    Observation {
        timestamp: f64,
        tag: u8,
        z: &'a Observation,
        /// Sensor-reported noise; the model's default is used when absent.
        r: Option<&'a Covariance>,
    },
}

impl FilterInput<'_> {
    pub fn timestamp(&self) -> f64 {
        match self {
            FilterInput::Advance { timestamp } | FilterInput::Observation { timestamp, .. } => {
                *timestamp
            }
        }
    }
}

/// One named state block as seen in a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockSnapshot {
    pub name: String,
    pub values: Vec<f64>,
    /// Standard deviations in the error basis.
    pub std_dev: Vec<f64>,
}

/// An owned, serializable copy of a filter's estimate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterSnapshot {
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter_time: Option<f64>,
    pub state: Vec<f64>,
    pub covariance_diagonal: Vec<f64>,
    pub blocks: Vec<BlockSnapshot>,
}

impl FilterSnapshot {
    pub fn block(&self, name: &str) -> Option<&BlockSnapshot> {
        self.blocks.iter().find(|b| b.name == name)
    }
}
