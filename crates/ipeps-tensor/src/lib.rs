#![warn(missing_docs)]
//! Dense tensors with reverse-mode differentiation.
//!
//! This crate provides the numeric substrate for corner-transfer-matrix
//! algorithms:
//! - [`DenseTensor`]: `f64` storage on `mdarray::Tensor<f64, DynRank>` with
//!   permute, reshape and GEMM-backed contraction
//! - [`linalg`]: symmetric eigendecomposition and singular values via faer
//! - [`Tensor`]/[`Tape`]: operations recorded for reverse-mode gradients,
//!   including the adjoint of a truncated symmetric eigendecomposition
//!
//! # Example
//!
//! ```
//! use ipeps_tensor::{DenseTensor, Tape};
//!
//! let tape = Tape::new();
//! let x = tape.leaf(DenseTensor::from_vec(vec![2], vec![1.0, 2.0]).unwrap());
//! let y = x.contract(&[0], &x, &[0]).unwrap();
//! let grads = y.backward().unwrap();
//! assert_eq!(grads.wrt(&x).data(), &[2.0, 4.0]);
//! ```

pub mod autodiff;
pub mod dense;
pub mod error;
pub mod linalg;
pub mod parallel;

pub use autodiff::{is_grad_enabled, no_grad, Gradients, Tape, Tensor};
pub use dense::DenseTensor;
pub use error::{Result, TensorError};
pub use parallel::{num_threads, set_num_threads};

// Re-exported so callers can build tensors with the same mdarray version.
pub use mdarray;
