// locus_core/src/utils/linalg.rs

//! Small dense linear-algebra helpers shared by the predict and update steps.

use nalgebra::{Cholesky, DMatrix, DVector, Dim, Dyn, Matrix, RawStorage, LU};

/// Below this reciprocal condition estimate the innovation covariance is
/// treated as singular, even if a factorization technically succeeded.
const MIN_RCOND: f64 = 1e-14;

/// Returns `true` when every entry of the matrix (or vector) is finite.
pub fn is_finite<R: Dim, C: Dim, S: RawStorage<f64, R, C>>(m: &Matrix<f64, R, C, S>) -> bool {
    m.iter().all(|v| v.is_finite())
}

/// Forces exact symmetry: `P = (P + Pᵀ) / 2`.
pub fn symmetrize(m: &mut DMatrix<f64>) {
    let transposed = m.transpose();
    *m += transposed;
    *m *= 0.5;
}

/// Largest absolute difference between a matrix and its transpose.
pub fn max_asymmetry(m: &DMatrix<f64>) -> f64 {
    (m - m.transpose()).amax()
}

/// Smallest eigenvalue of a symmetric matrix.
pub fn min_eigenvalue(m: &DMatrix<f64>) -> f64 {
    m.clone()
        .symmetric_eigenvalues()
        .iter()
        .copied()
        .fold(f64::INFINITY, f64::min)
}

/// Ratio of the smallest to the largest magnitude on a diagonal, squared when
/// the diagonal belongs to a Cholesky factor.
fn diagonal_ratio(diag: &DVector<f64>) -> f64 {
    let (lo, hi) = diag
        .iter()
        .fold((f64::INFINITY, 0.0_f64), |(lo, hi), d| (lo.min(d.abs()), hi.max(d.abs())));
    if hi > 0.0 {
        lo / hi
    } else {
        0.0
    }
}

enum Factor {
    Cholesky(Cholesky<f64, Dyn>),
    Lu(LU<f64, Dyn, Dyn>),
}

/// A factored innovation covariance `S`.
///
/// `S` is symmetric positive definite in every healthy filter, so Cholesky is
/// tried first. If that fails (rounding on a nearly semi-definite `S`) a
/// partially pivoted LU is used instead. An explicit inverse is never formed.
pub struct SymmetricSolver {
    factor: Factor,
}

impl SymmetricSolver {
    /// Factors `s`, or returns `None` when it is singular or too ill-conditioned.
    pub fn new(s: &DMatrix<f64>) -> Option<Self> {
        if !s.is_square() || s.nrows() == 0 || !is_finite(s) {
            return None;
        }

        if let Some(chol) = Cholesky::new(s.clone()) {
            let rcond = diagonal_ratio(&chol.l_dirty().diagonal()).powi(2);
            if rcond < MIN_RCOND {
                return None;
            }
            return Some(Self {
                factor: Factor::Cholesky(chol),
            });
        }

        let lu = s.clone().lu();
        if !lu.is_invertible() {
            return None;
        }
        // |U_ii| spread is a crude but cheap conditioning estimate for the fallback path.
        if diagonal_ratio(&lu.u().diagonal()) < MIN_RCOND.sqrt() {
            return None;
        }
        Some(Self {
            factor: Factor::Lu(lu),
        })
    }

    /// Solves `S X = B`. Returns `None` if the result is not finite.
    pub fn solve(&self, b: &DMatrix<f64>) -> Option<DMatrix<f64>> {
        let x = match &self.factor {
            Factor::Cholesky(chol) => chol.solve(b),
            Factor::Lu(lu) => lu.solve(b)?,
        };
        is_finite(&x).then_some(x)
    }

    /// Squared Mahalanobis distance `yᵀ S⁻¹ y`.
    pub fn mahalanobis_squared(&self, y: &DVector<f64>) -> Option<f64> {
        let s_inv_y = match &self.factor {
            Factor::Cholesky(chol) => chol.solve(y),
            Factor::Lu(lu) => lu.solve(y)?,
        };
        let d2 = y.dot(&s_inv_y);
        d2.is_finite().then_some(d2)
    }

    pub fn is_cholesky(&self) -> bool {
        matches!(self.factor, Factor::Cholesky(_))
    }
}
