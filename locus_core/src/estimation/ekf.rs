// locus_core/src/estimation/ekf.rs

//! The predict and update steps as pure functions.
//!
//! Both take the current [`Estimate`] by reference and return a new one. They
//! never mutate their input, so a caller that only commits on `Ok` gets
//! all-or-nothing semantics for free.

use nalgebra::{DMatrix, DVector};

use crate::error::{EkfError, EkfResult};
use crate::estimate::Estimate;
use crate::models::{ErrorStateMap, MeasurementModel, ObservationKind, ProcessModel};
use crate::types::{Covariance, Observation};
use crate::utils::linalg::{is_finite, symmetrize, SymmetricSolver};

/// Parameters of one predict step.
pub struct PredictParams<'a> {
    /// Per-unit-time process noise; the step adds `Q·dt`.
    pub process_noise: &'a Covariance,
    pub dt: f64,
}

/// Parameters of one update step.
pub struct UpdateParams<'a, K> {
    pub kind: K,
    pub z: &'a Observation,
    pub r: &'a Covariance,
    /// Side-channel input for observation functions that need one.
    pub extra: Option<&'a DVector<f64>>,
    /// Reject the update if `d²` exceeds this.
    pub gate_threshold: Option<f64>,
}

/// What an accepted update looked like, for consistency monitoring.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateReport<K> {
    pub kind: K,
    /// `y = z - h(x)`.
    pub innovation: DVector<f64>,
    /// `S = H P Hᵀ + R`.
    pub innovation_covariance: DMatrix<f64>,
    /// Normalized innovation squared, `yᵀ S⁻¹ y`.
    pub mahalanobis: f64,
}

fn check_shape(
    what: &'static str,
    m: &DMatrix<f64>,
    rows: usize,
    cols: usize,
) -> EkfResult<()> {
    if m.shape() != (rows, cols) {
        return Err(EkfError::shape(what, (rows, cols), m.shape()));
    }
    Ok(())
}

fn check_estimate<M: ErrorStateMap>(estimate: &Estimate) -> EkfResult<()> {
    if estimate.x.nrows() != M::STATE_DIM {
        return Err(EkfError::shape(
            "x",
            (M::STATE_DIM, 1),
            (estimate.x.nrows(), 1),
        ));
    }
    check_shape("P", &estimate.covariance, M::ERROR_DIM, M::ERROR_DIM)?;
    if !is_finite(&estimate.x) {
        return Err(EkfError::NonFiniteInput { what: "x" });
    }
    if !is_finite(&estimate.covariance) {
        return Err(EkfError::NonFiniteInput { what: "P" });
    }
    Ok(())
}

/// PURE FUNCTION: advances an estimate by `dt`.
///
/// `x' = f(x, dt)`, `P' = F P Fᵀ + Q·dt`, then `P'` is resymmetrized. A zero
/// `dt` returns the estimate unchanged.
pub fn ekf_predict<M: ProcessModel>(
    model: &M,
    estimate: &Estimate,
    params: &PredictParams,
) -> EkfResult<Estimate> {
    let dt = params.dt;
    if !dt.is_finite() || dt < 0.0 {
        return Err(EkfError::NonFiniteInput { what: "dt" });
    }
    check_estimate::<M>(estimate)?;
    check_shape("Q", params.process_noise, M::ERROR_DIM, M::ERROR_DIM)?;
    if !is_finite(params.process_noise) {
        return Err(EkfError::NonFiniteInput { what: "Q" });
    }

    if dt == 0.0 {
        return Ok(estimate.clone());
    }

    let x_new = model.transition(&estimate.x, dt);
    let f_jac = model.transition_jacobian(&estimate.x, dt);
    check_shape("F", &f_jac, M::ERROR_DIM, M::ERROR_DIM)?;

    let mut p_new = &f_jac * &estimate.covariance * f_jac.transpose() + params.process_noise * dt;
    symmetrize(&mut p_new);

    if !is_finite(&x_new) || !is_finite(&p_new) {
        return Err(EkfError::NonFiniteResult { stage: "predict" });
    }

    Ok(Estimate {
        x: x_new,
        covariance: p_new,
        filter_time: estimate.filter_time,
    })
}

/// PURE FUNCTION: fuses one observation into an estimate.
///
/// The correction `δx = K y` is computed in the error basis and applied with
/// [`ErrorStateMap::compose`]; the covariance uses the Joseph form.
pub fn ekf_update<M: MeasurementModel>(
    model: &M,
    estimate: &Estimate,
    params: &UpdateParams<M::Kind>,
) -> EkfResult<(Estimate, UpdateReport<M::Kind>)> {
    let kind = params.kind;
    let dim = kind.dim();

    if params.z.nrows() != dim {
        return Err(EkfError::shape("z", (dim, 1), (params.z.nrows(), 1)));
    }
    check_shape("R", params.r, dim, dim)?;
    if !is_finite(params.z) {
        return Err(EkfError::NonFiniteInput { what: "z" });
    }
    if !is_finite(params.r) {
        return Err(EkfError::NonFiniteInput { what: "R" });
    }
    if let Some(extra) = params.extra {
        if !is_finite(extra) {
            return Err(EkfError::NonFiniteInput { what: "extra" });
        }
    }
    check_estimate::<M>(estimate)?;

    let x = &estimate.x;
    let p = &estimate.covariance;

    // 1. Innovation.
    let y = params.z - model.predict_measurement(kind, x, params.extra);

    // 2. Linearize in the error basis.
    let mut h_jac = model.measurement_jacobian(kind, x, params.extra);
    check_shape("H", &h_jac, dim, M::STATE_DIM)?;
    if M::STATE_DIM != M::ERROR_DIM {
        h_jac = h_jac * model.h_mod(x);
    }

    // 3. Innovation covariance.
    let p_ht = p * h_jac.transpose();
    let mut s = &h_jac * &p_ht + params.r;
    symmetrize(&mut s);

    let singular = || EkfError::SingularInnovationCovariance { kind: kind.name() };
    let solver = SymmetricSolver::new(&s).ok_or_else(singular)?;
    let mahalanobis = solver.mahalanobis_squared(&y).ok_or_else(singular)?;

    if let Some(threshold) = params.gate_threshold {
        if mahalanobis > threshold {
            return Err(EkfError::InnovationGated {
                kind: kind.name(),
                distance: mahalanobis,
                threshold,
            });
        }
    }

    // 4. Gain. S and P are symmetric, so K = P Hᵀ S⁻¹ = (S⁻¹ H P)ᵀ.
    let k_gain = solver.solve(&p_ht.transpose()).ok_or_else(singular)?.transpose();

    // 5. Correct the mean on the manifold.
    let delta = &k_gain * &y;
    let x_new = model.compose(x, &delta);

    // 6. Joseph form.
    let i_kh = DMatrix::<f64>::identity(M::ERROR_DIM, M::ERROR_DIM) - &k_gain * &h_jac;
    let mut p_new = &i_kh * p * i_kh.transpose() + &k_gain * params.r * k_gain.transpose();
    symmetrize(&mut p_new);

    if !is_finite(&x_new) || !is_finite(&p_new) {
        return Err(EkfError::NonFiniteResult { stage: "update" });
    }

    let report = UpdateReport {
        kind,
        innovation: y,
        innovation_covariance: s,
        mahalanobis,
    };
    Ok((
        Estimate {
            x: x_new,
            covariance: p_new,
            filter_time: estimate.filter_time,
        },
        report,
    ))
}
