//! Error types for C4v CTMRG and optimization

use std::path::PathBuf;

use ipeps_tensor::TensorError;
use thiserror::Error;

/// Result type for C4v CTMRG operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during CTMRG, loss evaluation and optimization
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid or incomplete configuration
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the problem
        message: String,
    },

    /// Fingerprints of consecutive CTMRG iterations cannot be compared
    #[error("Fingerprint length changed between iterations: {previous} vs {current}")]
    FingerprintMismatch {
        /// Length of the previous fingerprint
        previous: usize,
        /// Length of the current fingerprint
        current: usize,
    },

    /// Corner or edge tensor has an unexpected shape
    #[error("Environment {tensor} has shape {got:?}, expected {expected:?}")]
    EnvironmentShape {
        /// Which environment tensor
        tensor: &'static str,
        /// Expected shape
        expected: Vec<usize>,
        /// Actual shape
        got: Vec<usize>,
    },

    /// A convergence check did not append exactly one fingerprint
    #[error("Convergence check left {len} history entries after iteration {iteration}")]
    HistoryContract {
        /// 1-based iteration number
        iteration: usize,
        /// History length observed after the check
        len: usize,
    },

    /// On-site tensor or state file content is not usable
    #[error("Invalid state: {message}")]
    InvalidState {
        /// Description of the problem
        message: String,
    },

    /// Failure inside a tensor operation
    #[error(transparent)]
    Tensor(#[from] TensorError),

    /// Failure reading or writing a state file
    #[error("I/O error on {path}: {source}")]
    Io {
        /// File being accessed
        path: PathBuf,
        /// Underlying error
        source: std::io::Error,
    },

    /// State file is not valid JSON of the expected layout
    #[error("Malformed state file: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub(crate) fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    pub(crate) fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState {
            message: message.into(),
        }
    }
}
