//! Dense linear algebra backed by faer.
//!
//! All decompositions copy the row-major input into a faer matrix and copy
//! the factors back, so callers only ever see [`DenseTensor`].

use faer::{Mat, Side};

use crate::dense::DenseTensor;
use crate::error::{Result, TensorError};

/// Eigendecomposition of a real symmetric matrix `A = U diag(λ) Uᵀ`.
#[derive(Debug, Clone)]
pub struct SymEig {
    /// Eigenvalues in ascending order.
    pub values: Vec<f64>,
    /// Eigenvectors as the columns of an `n × n` matrix.
    pub vectors: DenseTensor,
}

fn square_dim(op: &'static str, a: &DenseTensor) -> Result<usize> {
    if a.rank() != 2 {
        return Err(TensorError::InvalidRank {
            op,
            expected: 2,
            got: a.rank(),
        });
    }
    Ok(a.dims()[0])
}

fn to_faer(a: &DenseTensor) -> Mat<f64> {
    let (m, n) = (a.dims()[0], a.dims()[1]);
    let data = a.data();
    Mat::from_fn(m, n, |i, j| data[i * n + j])
}

/// Symmetric eigendecomposition. Only the lower triangle of `a` is read.
pub fn eigh(a: &DenseTensor) -> Result<SymEig> {
    let n = square_dim("eigh", a)?;
    if a.dims()[1] != n {
        return Err(TensorError::ShapeMismatch {
            op: "eigh",
            lhs: vec![n],
            rhs: vec![a.dims()[1]],
        });
    }
    if n == 0 {
        return Ok(SymEig {
            values: Vec::new(),
            vectors: DenseTensor::zeros(&[0, 0]),
        });
    }

    let mat = to_faer(a);
    let evd = mat
        .as_ref()
        .self_adjoint_eigen(Side::Lower)
        .map_err(|e| TensorError::Backend {
            op: "eigh",
            message: format!("{e:?}"),
        })?;

    let s = evd.S().column_vector();
    let u = evd.U();
    let values = (0..n).map(|i| s[i]).collect();
    let vectors = DenseTensor::from_fn(&[n, n], |idx| u[(idx[0], idx[1])]);
    Ok(SymEig { values, vectors })
}

/// Singular values of a matrix in non-increasing order.
pub fn singular_values(a: &DenseTensor) -> Result<Vec<f64>> {
    square_dim("singular_values", a)?;
    if a.is_empty() {
        return Ok(Vec::new());
    }
    let mat = to_faer(a);
    let mut s = mat
        .as_ref()
        .singular_values()
        .map_err(|e| TensorError::Backend {
            op: "singular_values",
            message: format!("{e:?}"),
        })?;
    s.sort_by(|x, y| y.total_cmp(x));
    Ok(s)
}

/// Indices of the `k` entries of largest magnitude, largest first.
///
/// Ties keep their original order; `k` is clamped to `values.len()`.
#[must_use]
pub fn leading_by_magnitude(values: &[f64], k: usize) -> Vec<usize> {
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|&i, &j| values[j].abs().total_cmp(&values[i].abs()));
    order.truncate(k.min(values.len()));
    order
}
