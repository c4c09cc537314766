// locus_core/src/estimate.rs

use nalgebra::{DVector, DVectorView};

use crate::models::layout::StateBlock;
use crate::types::{Covariance, State};

/// The single live estimate a filter owns: mean, covariance and filter time.
///
/// `x` has the model's state dimension, `covariance` the error-state dimension.
/// Neither is ever resized after construction.
#[derive(Debug, Clone, PartialEq)]
pub struct Estimate {
    /// The state vector `x`.
    pub x: State,
    /// The error-state covariance `P`.
    pub covariance: Covariance,
    /// Time of the last timestamped predict, if the filter has seen one.
    pub filter_time: Option<f64>,
}

impl Estimate {
    pub fn new(x: State, covariance: Covariance, filter_time: Option<f64>) -> Self {
        Self {
            x,
            covariance,
            filter_time,
        }
    }

    /// Length of the state vector.
    pub fn dim(&self) -> usize {
        self.x.nrows()
    }

    /// Side of the covariance matrix.
    pub fn error_dim(&self) -> usize {
        self.covariance.nrows()
    }

    pub fn trace(&self) -> f64 {
        self.covariance.trace()
    }

    /// The state entries of one named block.
    pub fn block(&self, block: &StateBlock) -> DVectorView<'_, f64> {
        self.x.rows(block.state_start, block.state_len)
    }

    /// Per-axis standard deviations of the whole error state.
    pub fn std_dev(&self) -> DVector<f64> {
        self.covariance.diagonal().map(|v| v.max(0.0).sqrt())
    }

    /// Per-axis standard deviations of one block, in the error basis.
    pub fn block_std_dev(&self, block: &StateBlock) -> DVector<f64> {
        self.covariance
            .diagonal()
            .rows(block.error_start, block.error_len)
            .map(|v| v.max(0.0).sqrt())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use nalgebra::DMatrix;

    #[test]
    fn blocks_index_state_and_error_bases_separately() {
        let x = DVector::from_fn(5, |i, _| i as f64);
        let p = DMatrix::from_diagonal(&DVector::from_column_slice(&[1.0, 4.0, 9.0, 16.0]));
        let estimate = Estimate::new(x, p, Some(2.0));
        let block = StateBlock::shifted("tail", 2, 3, 1, 3);

        assert_eq!(estimate.dim(), 5);
        assert_eq!(estimate.error_dim(), 4);
        assert_eq!(
            estimate.block(&block).iter().copied().collect::<Vec<_>>(),
            vec![2.0, 3.0, 4.0]
        );
        let sd = estimate.block_std_dev(&block);
        assert_abs_diff_eq!(sd[0], 2.0);
        assert_abs_diff_eq!(sd[2], 4.0);
        assert_abs_diff_eq!(estimate.trace(), 30.0);
    }
}
