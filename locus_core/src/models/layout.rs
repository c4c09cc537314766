// locus_core/src/models/layout.rs

use std::ops::Range;

/// A named, contiguous sub-block of a model's state vector together with the
/// matching block of the error state.
///
/// For Euclidean blocks both ranges have the same length. A unit quaternion
/// occupies four state slots but only three error slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateBlock {
    pub name: &'static str,
    pub state_start: usize,
    pub state_len: usize,
    pub error_start: usize,
    pub error_len: usize,
}

impl StateBlock {
    /// A Euclidean block that sits at the same offset in both bases.
    pub const fn euclidean(name: &'static str, start: usize, len: usize) -> Self {
        Self {
            name,
            state_start: start,
            state_len: len,
            error_start: start,
            error_len: len,
        }
    }

    /// A block whose state and error offsets differ (everything after a quaternion).
    pub const fn shifted(
        name: &'static str,
        state_start: usize,
        state_len: usize,
        error_start: usize,
        error_len: usize,
    ) -> Self {
        Self {
            name,
            state_start,
            state_len,
            error_start,
            error_len,
        }
    }

    pub fn state_range(&self) -> Range<usize> {
        self.state_start..self.state_start + self.state_len
    }

    pub fn error_range(&self) -> Range<usize> {
        self.error_start..self.error_start + self.error_len
    }
}

/// Sum of the state lengths of a layout.
pub fn state_dim(layout: &[StateBlock]) -> usize {
    layout.iter().map(|b| b.state_len).sum()
}

/// Sum of the error lengths of a layout.
pub fn error_dim(layout: &[StateBlock]) -> usize {
    layout.iter().map(|b| b.error_len).sum()
}

/// Looks a block up by name.
pub fn find_block<'a>(layout: &'a [StateBlock], name: &str) -> Option<&'a StateBlock> {
    layout.iter().find(|b| b.name == name)
}
