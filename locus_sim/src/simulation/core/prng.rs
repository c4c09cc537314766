// locus_sim/src/simulation/core/prng.rs

use nalgebra::DVector;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, StandardNormal};

/// The central, deterministic pseudo-random number generator for a run.
/// Every noise sample in a scenario is drawn from one instance, in event order.
#[derive(Debug, Clone)]
pub struct SimulationRng(pub ChaCha8Rng);

impl SimulationRng {
    pub fn from_seed(seed: u64) -> Self {
        Self(ChaCha8Rng::seed_from_u64(seed))
    }

    /// A vector of independent zero-mean Gaussians with the given standard deviations.
    pub fn gaussian(&mut self, std_dev: &DVector<f64>) -> DVector<f64> {
        std_dev.map(|sigma| {
            let n: f64 = StandardNormal.sample(&mut self.0);
            n * sigma
        })
    }
}
