// locus_sim/src/simulation/config/mod.rs

//! This module handles loading and validating scenario configuration from
//! disk, including discovery of scenario directories.

mod catalog;

pub mod structs;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use std::path::Path;
use tracing::info;

use crate::simulation::error::ConfigError;
pub use catalog::{discover_scenarios, ScenarioCatalog};
pub use structs::{
    FilterSection, GateSection, ModelKind, ScenarioConfig, SensorConfig, Simulation, Truth,
};

/// Environment variables with this prefix override scenario values, with `__`
/// separating nested keys (e.g. `LOCUS_SIMULATION__SEED=7`).
pub const ENV_PREFIX: &str = "LOCUS_";

/// Upper bound on the predict timer and on every sensor rate [Hz].
pub const MAX_RATE_HZ: f64 = 1.0e4;

/// Loads a scenario file, layered over the built-in defaults and under any
/// `LOCUS_` environment overrides, and validates it.
pub fn load_scenario(path: &Path) -> Result<ScenarioConfig, ConfigError> {
    info!("Loading scenario from: {}", path.display());
    let mut config = extract(base_figment().merge(Toml::file_exact(path)).merge(env_overrides()))?;
    if config.name.is_none() {
        config.name = path.file_stem().map(|s| s.to_string_lossy().into_owned());
    }
    Ok(config)
}

/// Parses a scenario from a TOML string. Environment overrides are not applied.
pub fn parse_scenario(toml: &str) -> Result<ScenarioConfig, ConfigError> {
    extract(base_figment().merge(Toml::string(toml)))
}

fn base_figment() -> Figment {
    Figment::from(Serialized::defaults(ScenarioConfig::default()))
}

fn env_overrides() -> Env {
    Env::prefixed(ENV_PREFIX).split("__")
}

fn extract(figment: Figment) -> Result<ScenarioConfig, ConfigError> {
    let config: ScenarioConfig = figment.extract()?;
    validate(&config)?;
    Ok(config)
}

fn require_positive(field: &str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::invalid(field, format!("must be positive, got {value}")))
    }
}

fn require_rate(field: &str, value: f64) -> Result<(), ConfigError> {
    require_positive(field, value)?;
    if value > MAX_RATE_HZ {
        return Err(ConfigError::invalid(
            field,
            format!("must be at most {MAX_RATE_HZ} Hz, got {value}"),
        ));
    }
    Ok(())
}

fn require_len(field: &str, values: &Option<Vec<f64>>, len: usize) -> Result<(), ConfigError> {
    match values {
        Some(v) if v.len() != len => Err(ConfigError::invalid(
            field,
            format!("expected {len} values, got {}", v.len()),
        )),
        Some(v) if v.iter().any(|x| !x.is_finite()) => {
            Err(ConfigError::invalid(field, "contains a non-finite value"))
        }
        _ => Ok(()),
    }
}

/// Checks everything that can be checked without knowing the model's kinds.
/// Kind tags are decoded (and rejected) when the run is set up.
pub fn validate(config: &ScenarioConfig) -> Result<(), ConfigError> {
    require_positive("simulation.duration_seconds", config.simulation.duration_seconds)?;
    require_rate("simulation.predict_rate_hz", config.simulation.predict_rate_hz)?;

    let (state_dim, error_dim) = config.filter.model.dims();
    require_len("filter.initial_state", &config.filter.initial_state, state_dim)?;
    require_len(
        "filter.initial_covariance_diagonal",
        &config.filter.initial_covariance_diagonal,
        error_dim,
    )?;
    require_len("filter.process_noise_diagonal", &config.filter.process_noise_diagonal, error_dim)?;
    require_len("truth.initial_state", &config.truth.initial_state, state_dim)?;

    if !(config.truth.process_noise_scale.is_finite() && config.truth.process_noise_scale >= 0.0) {
        return Err(ConfigError::invalid(
            "truth.process_noise_scale",
            "must be finite and non-negative",
        ));
    }

    if let Some(params) = &config.car_params {
        if config.filter.model != ModelKind::Car {
            return Err(ConfigError::invalid("car_params", "only valid with model = \"car\""));
        }
        params.validate()?;
    }

    for (i, sensor) in config.sensors.iter().enumerate() {
        require_rate(&format!("sensors[{i}].rate_hz"), sensor.rate_hz)?;
        if let Some(std) = sensor.noise_std {
            require_positive(&format!("sensors[{i}].noise_std"), std)?;
        }
        if !(sensor.start_seconds.is_finite() && sensor.start_seconds >= 0.0) {
            return Err(ConfigError::invalid(
                format!("sensors[{i}].start_seconds"),
                "must be finite and non-negative",
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use locus_core::prelude::GateProbability;

    const CAR_SCENARIO: &str = r#"
        name = "unit"

        [simulation]
        seed = 3
        duration_seconds = 2.0
        predict_rate_hz = 50.0

        [filter]
        model = "car"
        gate = { probability = "p95", kinds = [24] }

        [car_params]
        mass = 1800.0

        [[sensors]]
        name = "wheel_speeds"
        kind = 30
        rate_hz = 20.0
        noise_std = 0.1
    "#;

    #[test]
    fn parses_sections_and_fills_defaults() {
        let config = parse_scenario(CAR_SCENARIO).unwrap();
        assert_eq!(config.name.as_deref(), Some("unit"));
        assert_eq!(config.simulation.seed, Some(3));
        assert_eq!(config.filter.model, ModelKind::Car);
        let gate = config.filter.gate.as_ref().unwrap();
        assert_eq!(gate.probability, GateProbability::P95);
        assert_eq!(gate.kinds, vec![24]);

        let params = config.car_params.unwrap();
        assert_eq!(params.mass, 1800.0);
        // Unset parameters keep their defaults.
        assert_eq!(params.center_to_front, 1.2);

        assert_eq!(config.sensors.len(), 1);
        assert_eq!(config.sensors[0].start_seconds, 0.0);
        assert_eq!(config.truth.process_noise_scale, 0.0);
    }

    #[test]
    fn bundled_scenarios_load() {
        let root = Path::new(env!("CARGO_MANIFEST_DIR")).join("assets/scenarios");
        let car = load_scenario(&root.join("car_lateral.toml")).unwrap();
        assert_eq!(car.filter.model, ModelKind::Car);
        assert_eq!(car.sensors.len(), 4);

        let live = load_scenario(&root.join("live_static.toml")).unwrap();
        assert_eq!(live.name.as_deref(), Some("live_static"));
        assert_eq!(live.filter.model, ModelKind::Live);
    }

    #[test]
    fn missing_file_is_an_error() {
        let root = Path::new(env!("CARGO_MANIFEST_DIR")).join("assets/scenarios");
        assert!(load_scenario(&root.join("nope.toml")).is_err());
    }

    #[test]
    fn empty_file_is_the_default_scenario() {
        let config = parse_scenario("").unwrap();
        assert_eq!(config, ScenarioConfig::default());
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let err = parse_scenario("[simulation]\nspeed_of_light = 1.0\n");
        assert!(matches!(err, Err(ConfigError::Load(_))));
    }

    #[test]
    fn invalid_values_are_rejected() {
        let err = parse_scenario("[simulation]\nduration_seconds = -1.0\npredict_rate_hz = 10.0\n");
        assert!(matches!(err, Err(ConfigError::InvalidValue { .. })));

        let err = parse_scenario("[filter]\nmodel = \"live\"\ninitial_state = [1.0, 2.0]\n");
        assert!(matches!(err, Err(ConfigError::InvalidValue { ref field, .. }) if field == "filter.initial_state"));

        let err = parse_scenario("[filter]\nmodel = \"live\"\n[car_params]\nmass = 1.0\n");
        assert!(matches!(err, Err(ConfigError::InvalidValue { .. })));

        let err = parse_scenario("[car_params]\nmass = 0.0\n");
        assert!(matches!(err, Err(ConfigError::Filter(_))));
    }

    #[test]
    fn rates_are_bounded() {
        let flood = "[[sensors]]\nname = \"flood\"\nkind = 30\nrate_hz = 1e9\n";
        let err = parse_scenario(flood);
        assert!(matches!(err, Err(ConfigError::InvalidValue { ref field, .. }) if field == "sensors[0].rate_hz"));

        let err = parse_scenario("[simulation]\npredict_rate_hz = 1e7\n");
        assert!(matches!(err, Err(ConfigError::InvalidValue { ref field, .. }) if field == "simulation.predict_rate_hz"));

        let at_limit = "[[sensors]]\nname = \"fast\"\nkind = 30\nrate_hz = 10000.0\n";
        assert!(parse_scenario(at_limit).is_ok());
    }
}
