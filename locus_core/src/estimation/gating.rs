// locus_core/src/estimation/gating.rs

//! Chi-square innovation gating.
//!
//! A gated update is refused when the squared Mahalanobis distance of its
//! innovation, `d² = yᵀ S⁻¹ y`, exceeds the chi-square quantile for the
//! observation's dimension.

use serde::{Deserialize, Serialize};

use crate::models::ObservationKind;

/// Acceptance probability of the gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GateProbability {
    P95,
    #[default]
    P99,
    P999,
}

// Chi-square quantiles for 1..=6 degrees of freedom.
const CHI2_95: [f64; 6] = [3.841, 5.991, 7.815, 9.488, 11.070, 12.592];
const CHI2_99: [f64; 6] = [6.635, 9.210, 11.345, 13.277, 15.086, 16.812];
const CHI2_999: [f64; 6] = [10.828, 13.816, 16.266, 18.467, 20.515, 22.458];

impl GateProbability {
    pub fn probability(self) -> f64 {
        match self {
            GateProbability::P95 => 0.95,
            GateProbability::P99 => 0.99,
            GateProbability::P999 => 0.999,
        }
    }

    /// Upper standard-normal quantile at this probability.
    fn z_score(self) -> f64 {
        match self {
            GateProbability::P95 => 1.6449,
            GateProbability::P99 => 2.3263,
            GateProbability::P999 => 3.0902,
        }
    }

    fn table(self) -> &'static [f64; 6] {
        match self {
            GateProbability::P95 => &CHI2_95,
            GateProbability::P99 => &CHI2_99,
            GateProbability::P999 => &CHI2_999,
        }
    }
}

/// The chi-square quantile for `dof` degrees of freedom.
///
/// Tabulated up to 6 dof, Wilson–Hilferty approximation above.
pub fn chi_square_quantile(probability: GateProbability, dof: usize) -> f64 {
    match dof {
        0 => 0.0,
        1..=6 => probability.table()[dof - 1],
        _ => {
            let k = dof as f64;
            let a = 2.0 / (9.0 * k);
            k * (1.0 - a + probability.z_score() * a.sqrt()).powi(3)
        }
    }
}

/// Which kinds of a model are gated, and how tightly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GateConfig<K> {
    #[serde(default)]
    pub probability: GateProbability,
    pub kinds: Vec<K>,
}

impl<K: ObservationKind> GateConfig<K> {
    pub fn new(probability: GateProbability, kinds: Vec<K>) -> Self {
        Self { probability, kinds }
    }

    /// Gates every kind of the model.
    pub fn all(probability: GateProbability) -> Self {
        Self::new(probability, K::ALL.to_vec())
    }

    /// The `d²` threshold for `kind`, or `None` if it is not gated.
    pub fn threshold(&self, kind: K) -> Option<f64> {
        self.kinds
            .contains(&kind)
            .then(|| chi_square_quantile(self.probability, kind.dim()))
    }
}
