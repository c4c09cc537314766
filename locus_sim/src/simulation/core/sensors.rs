// locus_sim/src/simulation/core/sensors.rs

use locus_core::prelude::{Covariance, FilterModel, Observation, ObservationKind, State};
use nalgebra::{DMatrix, DVector};

use super::prng::SimulationRng;
use crate::simulation::config::SensorConfig;
use crate::simulation::error::ConfigError;

/// A synthetic sensor that samples `h_kind(x_true) + N(0, R)` at a fixed rate.
#[derive(Debug, Clone)]
pub struct SyntheticSensor<K: ObservationKind> {
    pub name: String,
    pub kind: K,
    /// The noise reported to the filter alongside every sample.
    pub noise: Covariance,
    noise_std: DVector<f64>,
    period: f64,
    next_time: f64,
}

impl<K: ObservationKind> SyntheticSensor<K> {
    /// Builds a sensor for `model`, decoding the configured kind tag.
    pub fn from_config<M>(config: &SensorConfig, model: &M) -> Result<Self, ConfigError>
    where
        M: FilterModel<Kind = K>,
    {
        let kind = K::try_from(config.kind)?;
        let noise = match config.noise_std {
            Some(std) => DMatrix::identity(kind.dim(), kind.dim()) * (std * std),
            None => model.observation_noise(kind),
        };
        let noise_std = noise.diagonal().map(|v| v.max(0.0).sqrt());
        Ok(Self {
            name: config.name.clone(),
            kind,
            noise,
            noise_std,
            period: 1.0 / config.rate_hz,
            next_time: config.start_seconds,
        })
    }

    /// Time of the next sample.
    pub fn next_time(&self) -> f64 {
        self.next_time
    }

    /// Samples the sensor against the true state and schedules the next sample.
    pub fn sample<M>(&mut self, model: &M, truth: &State, rng: &mut SimulationRng) -> Observation
    where
        M: FilterModel<Kind = K>,
    {
        self.next_time += self.period;
        model.predict_measurement(self.kind, truth, None) + rng.gaussian(&self.noise_std)
    }
}
