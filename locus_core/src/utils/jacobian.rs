// locus_core/src/utils/jacobian.rs

//! Finite-difference Jacobians for the models whose analytic derivatives are
//! not worth writing out by hand (quaternion kinematics, rotated gravity).

use nalgebra::{DMatrix, DVector};

/// Relative step for central differences. Balances truncation (O(h²)) against
/// cancellation (O(ε/h)) for f64.
const RELATIVE_STEP: f64 = 6e-6;

/// Absolute step for error-state perturbations. Larger than [`RELATIVE_STEP`]
/// because the outputs are differences of large-magnitude states (ECEF
/// positions are ~6.4e6 m), where cancellation dominates.
const ERROR_STATE_STEP: f64 = 1e-3;

fn central_difference<G, S>(g: G, x: &DVector<f64>, step_for: S) -> DMatrix<f64>
where
    G: Fn(&DVector<f64>) -> DVector<f64>,
    S: Fn(f64) -> f64,
{
    let base = g(x);
    let mut jac = DMatrix::zeros(base.nrows(), x.nrows());
    let mut probe = x.clone();

    for j in 0..x.nrows() {
        let original = probe[j];
        let step = step_for(original);

        probe[j] = original + step;
        let forward = g(&probe);
        probe[j] = original - step;
        let backward = g(&probe);
        probe[j] = original;

        jac.column_mut(j)
            .copy_from(&((forward - backward) / (2.0 * step)));
    }

    jac
}

/// Central-difference Jacobian `∂g/∂x` evaluated at `x`.
///
/// The step for column `j` scales with `|x_j|` so that large-magnitude states
/// are still perturbed meaningfully.
pub fn numerical_jacobian<G>(g: G, x: &DVector<f64>) -> DMatrix<f64>
where
    G: Fn(&DVector<f64>) -> DVector<f64>,
{
    central_difference(g, x, |value| RELATIVE_STEP * value.abs().max(1.0))
}

/// Central-difference Jacobian of a map defined on error-state perturbations,
/// `∂g(δ)/∂δ` evaluated at `δ = 0`.
///
/// `g` is expected to already express its output in the target error basis
/// (typically `δ ↦ difference(f(x), f(compose(x, δ)))`), so the result is the
/// error-state transition matrix directly.
pub fn error_state_jacobian<G>(g: G, error_dim: usize) -> DMatrix<f64>
where
    G: Fn(&DVector<f64>) -> DVector<f64>,
{
    central_difference(g, &DVector::zeros(error_dim), |_| ERROR_STATE_STEP)
}

/// The Jacobian of a measurement that reads `indices` straight out of the state:
/// row `i` has a single `1` in column `indices[i]`.
pub fn selection_jacobian(indices: &[usize], state_dim: usize) -> DMatrix<f64> {
    let mut jac = DMatrix::zeros(indices.len(), state_dim);
    for (row, &col) in indices.iter().enumerate() {
        jac[(row, col)] = 1.0;
    }
    jac
}
