// locus_sim/src/simulation/config/structs.rs

use locus_core::prelude::{CarModel, CarParams, ErrorStateMap, GateProbability, LiveModel};
use serde::{Deserialize, Serialize};

// =========================================================================
// == Top-Level Configuration ==
// =========================================================================

/// # ScenarioConfig
/// The root of the data parsed from a `scenario.toml` file.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)] // Fail if the TOML has fields not in our struct
pub struct ScenarioConfig {
    /// Human-readable name used in logs and reports; defaults to the file stem.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default)] // Use default if the [simulation] section is missing
    pub simulation: Simulation,

    #[serde(default)]
    pub filter: FilterSection,

    /// Only meaningful for `model = "car"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub car_params: Option<CarParams>,

    #[serde(default)]
    pub truth: Truth,

    // The TOML has `[[sensors]]`, which becomes a Vec of SensorConfig structs.
    #[serde(default)]
    pub sensors: Vec<SensorConfig>,
}

// =========================================================================
// == Configuration Sub-Structs ==
// =========================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Simulation {
    /// Optional seed for the pseudo-random number generator for determinism.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    /// Duration of the simulation in seconds.
    pub duration_seconds: f64,
    /// Rate of the fixed predict timer.
    pub predict_rate_hz: f64,
}

impl Default for Simulation {
    fn default() -> Self {
        Self {
            seed: None,
            duration_seconds: 10.0,
            predict_rate_hz: 100.0,
        }
    }
}

/// Which filter model a scenario runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelKind {
    #[default]
    Car,
    Live,
}

impl ModelKind {
    pub fn name(self) -> &'static str {
        match self {
            ModelKind::Car => "car",
            ModelKind::Live => "live",
        }
    }

    /// `(state dimension, error-state dimension)` of the model.
    pub fn dims(self) -> (usize, usize) {
        match self {
            ModelKind::Car => (CarModel::STATE_DIM, CarModel::ERROR_DIM),
            ModelKind::Live => (LiveModel::STATE_DIM, LiveModel::ERROR_DIM),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FilterSection {
    #[serde(default)]
    pub model: ModelKind,
    /// Overrides the model's initial state.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial_state: Option<Vec<f64>>,
    /// Overrides the model's initial covariance with a diagonal one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial_covariance_diagonal: Option<Vec<f64>>,
    /// Overrides the model's per-unit-time process noise with a diagonal one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub process_noise_diagonal: Option<Vec<f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gate: Option<GateSection>,
}

/// Innovation gating, with kinds given as raw wire tags.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GateSection {
    #[serde(default)]
    pub probability: GateProbability,
    /// Tags of the gated kinds. Empty gates every kind of the model.
    #[serde(default)]
    pub kinds: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Truth {
    /// Initial true state; defaults to the filter's initial state.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial_state: Option<Vec<f64>>,
    /// Scale on the model's process noise used to disturb the truth. Zero keeps
    /// the truth on the noiseless model trajectory.
    #[serde(default)]
    pub process_noise_scale: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SensorConfig {
    pub name: String,
    /// The raw observation-kind tag the sensor produces.
    pub kind: u8,
    pub rate_hz: f64,
    /// Per-axis noise standard deviation. Defaults to the model's nominal noise.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub noise_std: Option<f64>,
    /// Time of the first sample.
    #[serde(default)]
    pub start_seconds: f64,
}
