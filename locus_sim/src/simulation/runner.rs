// locus_sim/src/simulation/runner.rs

//! Drives one filter through a scenario: a fixed predict timer interleaved with
//! synthetic sensor samples drawn from a simulated truth.

use locus_core::prelude::{
    CarModel, Covariance, ErrorStateKalmanFilter, FilterInput, FilterModel, GateConfig,
    LiveModel, ObservationKind, StateEstimator,
};
use nalgebra::{DMatrix, DVector};
use tracing::{debug, info, warn};

use crate::simulation::config::{FilterSection, ModelKind, ScenarioConfig};
use crate::simulation::core::prng::SimulationRng;
use crate::simulation::core::sensors::SyntheticSensor;
use crate::simulation::core::truth::TruthSystem;
use crate::simulation::error::ConfigError;
use crate::simulation::report::{BlockError, RunReport, SensorReport};

/// Seed used when neither the command line nor the scenario names one.
pub const DEFAULT_SEED: u64 = 0;

/// Runs a validated scenario to completion.
pub fn run_scenario(config: &ScenarioConfig, seed_override: Option<u64>) -> Result<RunReport, ConfigError> {
    let seed = seed_override.or(config.simulation.seed).unwrap_or(DEFAULT_SEED);
    match config.filter.model {
        ModelKind::Car => {
            let model = CarModel::new(config.car_params.unwrap_or_default())?;
            run_model(model, config, seed)
        }
        ModelKind::Live => run_model(LiveModel::new(), config, seed),
    }
}

fn diagonal(values: &[f64]) -> Covariance {
    DMatrix::from_diagonal(&DVector::from_column_slice(values))
}

/// Builds a filter at time zero with the scenario's overrides applied.
pub fn build_filter<M: FilterModel>(
    model: M,
    section: &FilterSection,
) -> Result<ErrorStateKalmanFilter<M>, ConfigError> {
    let mut filter = ErrorStateKalmanFilter::new(model);

    let x0 = section
        .initial_state
        .as_deref()
        .map(DVector::from_column_slice)
        .unwrap_or_else(|| filter.state().clone());
    let p0 = section
        .initial_covariance_diagonal
        .as_deref()
        .map(diagonal)
        .unwrap_or_else(|| filter.covariance().clone());
    filter.init_state(x0, p0, Some(0.0))?;

    if let Some(q) = section.process_noise_diagonal.as_deref() {
        filter.set_process_noise(diagonal(q))?;
    }

    if let Some(gate) = &section.gate {
        let kinds = if gate.kinds.is_empty() {
            <M::Kind>::ALL.to_vec()
        } else {
            gate.kinds
                .iter()
                .map(|&tag| <M::Kind>::try_from(tag))
                .collect::<Result<Vec<_>, _>>()?
        };
        filter.set_gate(Some(GateConfig::new(gate.probability, kinds)));
    }
    Ok(filter)
}

/// Index of the sensor whose next sample is earliest, if it is due by `tick`.
fn next_due<K: ObservationKind>(sensors: &[SyntheticSensor<K>], tick: f64) -> Option<usize> {
    sensors
        .iter()
        .enumerate()
        .filter(|(_, s)| s.next_time() <= tick)
        .min_by(|(_, a), (_, b)| a.next_time().total_cmp(&b.next_time()))
        .map(|(i, _)| i)
}

fn run_model<M: FilterModel + Clone>(
    model: M,
    config: &ScenarioConfig,
    seed: u64,
) -> Result<RunReport, ConfigError> {
    let scenario = config.name.clone().unwrap_or_else(|| "unnamed".to_string());
    info!(scenario = %scenario, model = M::NAME, seed, "running scenario");

    let mut filter = build_filter(model.clone(), &config.filter)?;
    let truth_x0 = config
        .truth
        .initial_state
        .as_deref()
        .map(DVector::from_column_slice)
        .unwrap_or_else(|| filter.state().clone());
    let mut truth = TruthSystem::new(model.clone(), truth_x0, config.truth.process_noise_scale);

    let mut sensors = config
        .sensors
        .iter()
        .map(|s| SyntheticSensor::from_config(s, &model))
        .collect::<Result<Vec<_>, _>>()?;
    let mut reports: Vec<SensorReport> = sensors
        .iter()
        .map(|s| SensorReport::new(&s.name, s.kind.tag(), s.kind.dim()))
        .collect();

    let mut rng = SimulationRng::from_seed(seed);
    let rate = config.simulation.predict_rate_hz;
    let period = 1.0 / rate;
    let steps = ((config.simulation.duration_seconds * rate).round() as u64).max(1);
    let mut predict_failures = 0;

    for step in 1..=steps {
        let tick = step as f64 * period;

        // Fuse every sample due by this tick, in time order.
        while let Some(i) = next_due(&sensors, tick) {
            let t = sensors[i].next_time();
            truth.advance_to(t, &mut rng);
            let z = sensors[i].sample(&model, truth.state(), &mut rng);
            let sensor = &sensors[i];
            let input = FilterInput::Observation {
                timestamp: t,
                tag: sensor.kind.tag(),
                z: &z,
                r: Some(&sensor.noise),
            };
            let result = filter.process(&input);
            reports[i].record(&result);
        }

        truth.advance_to(tick, &mut rng);
        if let Err(err) = filter.process(&FilterInput::Advance { timestamp: tick }) {
            warn!(tick, error = %err, "timer predict failed");
            predict_failures += 1;
        }
    }

    let error = filter.error_to(truth.state())?;
    let final_error = filter
        .model()
        .state_layout()
        .iter()
        .map(|block| BlockError {
            name: block.name.to_string(),
            error_norm: error.rows(block.error_start, block.error_len).norm(),
            std_dev_norm: filter.estimate().block_std_dev(block).norm(),
        })
        .collect();
    debug!(scenario = %scenario, error_norm = error.norm(), "final estimation error");

    Ok(RunReport {
        scenario,
        model: M::NAME.to_string(),
        seed,
        duration_seconds: config.simulation.duration_seconds,
        predict_steps: steps,
        predict_failures,
        sensors: reports,
        final_error,
        snapshot: filter.snapshot(),
    })
}
