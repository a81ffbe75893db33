//! Error types for dense tensor and autodiff operations

use thiserror::Error;

/// Result type for tensor operations
pub type Result<T> = std::result::Result<T, TensorError>;

/// Errors that can occur during tensor operations
#[derive(Error, Debug)]
pub enum TensorError {
    /// Data length does not match the product of the dimensions
    #[error("Data length {len} does not match dimensions {dims:?}")]
    DataLength {
        /// Requested dimensions
        dims: Vec<usize>,
        /// Length of the provided buffer
        len: usize,
    },

    /// Two tensors that must agree in shape do not
    #[error("Shape mismatch in {op}: {lhs:?} vs {rhs:?}")]
    ShapeMismatch {
        /// Operation that detected the mismatch
        op: &'static str,
        /// Shape of the left operand
        lhs: Vec<usize>,
        /// Shape of the right operand
        rhs: Vec<usize>,
    },

    /// Invalid axis permutation
    #[error("Invalid permutation {perm:?} for rank {rank}")]
    InvalidPermutation {
        /// Offending permutation
        perm: Vec<usize>,
        /// Rank of the tensor
        rank: usize,
    },

    /// Invalid contraction axes
    #[error("Invalid contraction axes {axes_a:?} / {axes_b:?}")]
    InvalidAxes {
        /// Axes on the left operand
        axes_a: Vec<usize>,
        /// Axes on the right operand
        axes_b: Vec<usize>,
    },

    /// Operation requires a specific rank
    #[error("{op} requires rank {expected}, got rank {got}")]
    InvalidRank {
        /// Operation name
        op: &'static str,
        /// Expected rank
        expected: usize,
        /// Actual rank
        got: usize,
    },

    /// Operation requires a single-element tensor
    #[error("{op} requires a single-element tensor, got {len} elements")]
    NotScalar {
        /// Operation name
        op: &'static str,
        /// Number of elements
        len: usize,
    },

    /// Normalization of a tensor whose entries are all zero
    #[error("{op} requires a tensor with a nonzero entry")]
    ZeroNorm {
        /// Operation name
        op: &'static str,
    },

    /// Inputs were recorded on different tapes
    #[error("Tensors recorded on different tapes cannot be combined")]
    TapeMismatch,

    /// Backward requested on a tensor that is not tracked
    #[error("Tensor does not require gradients")]
    NotTracked,

    /// Linear algebra backend failure
    #[error("{op} failed: {message}")]
    Backend {
        /// Decomposition that failed
        op: &'static str,
        /// Backend error message
        message: String,
    },
}
