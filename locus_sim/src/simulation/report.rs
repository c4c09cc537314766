// locus_sim/src/simulation/report.rs

use locus_core::prelude::{EkfError, EkfResult, FilterSnapshot, Processed};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

use crate::simulation::error::ReportError;

/// Per-sensor bookkeeping of what the filter did with its samples.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorReport {
    pub name: String,
    pub kind: u8,
    pub samples: u64,
    pub accepted: u64,
    /// Refused by the innovation gate.
    pub gated: u64,
    /// Refused for any other reason.
    pub rejected: u64,
    /// Mean NIS over accepted updates; the observation dimension when consistent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mean_nis: Option<f64>,
    pub expected_nis: f64,
    #[serde(skip)]
    nis_sum: f64,
}

impl SensorReport {
    pub fn new(name: &str, kind: u8, dim: usize) -> Self {
        Self {
            name: name.to_string(),
            kind,
            samples: 0,
            accepted: 0,
            gated: 0,
            rejected: 0,
            mean_nis: None,
            expected_nis: dim as f64,
            nis_sum: 0.0,
        }
    }

    pub fn record<K>(&mut self, result: &EkfResult<Processed<K>>) {
        self.samples += 1;
        match result {
            Ok(Processed::Updated(report)) => {
                self.accepted += 1;
                self.nis_sum += report.mahalanobis;
                self.mean_nis = Some(self.nis_sum / self.accepted as f64);
            }
            Ok(Processed::Advanced) => {}
            Err(EkfError::InnovationGated { .. }) => self.gated += 1,
            Err(_) => self.rejected += 1,
        }
    }
}

/// Final estimation error of one named state block, in the error basis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockError {
    pub name: String,
    /// `‖(x_true ⊟ x̂)_block‖`.
    pub error_norm: f64,
    /// `‖σ_block‖`, the filter's own claim about that error.
    pub std_dev_norm: f64,
}

/// The outcome of one scenario run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub scenario: String,
    pub model: String,
    pub seed: u64,
    pub duration_seconds: f64,
    pub predict_steps: u64,
    /// Timer predicts the filter refused.
    pub predict_failures: u64,
    pub sensors: Vec<SensorReport>,
    pub final_error: Vec<BlockError>,
    pub snapshot: FilterSnapshot,
}

impl RunReport {
    pub fn log_summary(&self) {
        info!(
            scenario = %self.scenario,
            model = %self.model,
            seed = self.seed,
            steps = self.predict_steps,
            predict_failures = self.predict_failures,
            "run finished"
        );
        for sensor in &self.sensors {
            info!(
                sensor = %sensor.name,
                kind = sensor.kind,
                samples = sensor.samples,
                accepted = sensor.accepted,
                gated = sensor.gated,
                rejected = sensor.rejected,
                mean_nis = sensor.mean_nis.unwrap_or(f64::NAN),
                expected_nis = sensor.expected_nis,
                "sensor summary"
            );
        }
        for block in &self.final_error {
            info!(
                block = %block.name,
                error = block.error_norm,
                std_dev = block.std_dev_norm,
                "final error"
            );
        }
    }
}

/// Every run of an invocation, as written to `--report`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BatchReport {
    pub runs: Vec<RunReport>,
}

impl BatchReport {
    pub fn to_toml(&self) -> Result<String, ReportError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn write_toml(&self, path: &Path) -> Result<(), ReportError> {
        std::fs::write(path, self.to_toml()?)?;
        info!("Wrote report to: {}", path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use locus_core::prelude::UpdateReport;
    use nalgebra::{DMatrix, DVector};

    #[test]
    fn record_sorts_outcomes() {
        let mut sensor = SensorReport::new("gps", 12, 3);
        let update = |nis: f64| -> EkfResult<Processed<u8>> {
            Ok(Processed::Updated(UpdateReport {
                kind: 12,
                innovation: DVector::zeros(3),
                innovation_covariance: DMatrix::identity(3, 3),
                mahalanobis: nis,
            }))
        };
        sensor.record(&update(2.0));
        sensor.record(&update(4.0));
        sensor.record::<u8>(&Err(EkfError::InnovationGated {
            kind: "EcefPos",
            distance: 40.0,
            threshold: 11.3,
        }));
        sensor.record::<u8>(&Err(EkfError::NonFiniteInput { what: "z" }));

        assert_eq!(sensor.samples, 4);
        assert_eq!(sensor.accepted, 2);
        assert_eq!(sensor.gated, 1);
        assert_eq!(sensor.rejected, 1);
        assert_eq!(sensor.mean_nis, Some(3.0));
    }
}
