// locus_sim/src/simulation/core/truth.rs

use locus_core::prelude::{FilterModel, State};
use nalgebra::DVector;

use super::prng::SimulationRng;

/// The simulated ground truth, propagated with the model's own process function.
#[derive(Debug, Clone)]
pub struct TruthSystem<M: FilterModel> {
    model: M,
    state: State,
    time: f64,
    /// Per-unit-time standard deviations of the disturbance, in the error basis.
    disturbance_std: DVector<f64>,
}

impl<M: FilterModel> TruthSystem<M> {
    /// `process_noise_scale` multiplies the model's process noise; zero keeps
    /// the truth on the noiseless trajectory.
    pub fn new(model: M, initial_state: State, process_noise_scale: f64) -> Self {
        let disturbance_std = model
            .process_noise()
            .diagonal()
            .map(|q| (q.max(0.0) * process_noise_scale).sqrt());
        Self {
            model,
            state: initial_state,
            time: 0.0,
            disturbance_std,
        }
    }

    pub fn state(&self) -> &State {
        &self.state
    }

    pub fn time(&self) -> f64 {
        self.time
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    /// Moves the truth forward to `t`. Times in the past are ignored.
    pub fn advance_to(&mut self, t: f64, rng: &mut SimulationRng) {
        let dt = t - self.time;
        if dt <= 0.0 {
            return;
        }
        let next = self.model.transition(&self.state, dt);
        self.state = if self.disturbance_std.iter().any(|s| *s > 0.0) {
            let disturbance = rng.gaussian(&(&self.disturbance_std * dt.sqrt()));
            self.model.compose(&next, &disturbance)
        } else {
            next
        };
        self.time = t;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use locus_core::prelude::{CarModel, LiveModel, ProcessModel};

    #[test]
    fn noiseless_truth_follows_the_model() {
        let model = CarModel::default();
        let mut x = model.initial_state();
        x[7] = 0.1;
        let mut truth = TruthSystem::new(model.clone(), x.clone(), 0.0);
        let mut rng = SimulationRng::from_seed(0);

        truth.advance_to(0.02, &mut rng);
        assert_eq!(truth.state(), &model.transition(&x, 0.02));
        assert_eq!(truth.time(), 0.02);

        let before = truth.state().clone();
        truth.advance_to(0.01, &mut rng);
        assert_eq!(truth.state(), &before);
    }

    #[test]
    fn disturbed_truth_keeps_a_valid_quaternion() {
        let model = LiveModel::new();
        let x = model.initial_state();
        let mut truth = TruthSystem::new(model, x, 1.0);
        let mut rng = SimulationRng::from_seed(5);
        for step in 1..=50 {
            truth.advance_to(step as f64 * 0.01, &mut rng);
        }
        let q = truth.state().rows(3, 4).norm();
        assert!((q - 1.0).abs() < 1e-9);
    }
}
