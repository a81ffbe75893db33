//! Dense `f64` tensors backed by mdarray.
//!
//! Contractions follow the permute-then-GEMM scheme: contracted axes are moved
//! to the back of the left operand and the front of the right operand, after
//! which a single faer matrix product does the work.

use faer::linalg::matmul::matmul as faer_matmul;
use faer::Accum;
use mdarray::{DynRank, Shape, Tensor};
use rand::Rng;

use crate::error::{Result, TensorError};
use crate::parallel;

/// Dense tensor wrapping mdarray's `Tensor` with dynamic rank.
///
/// Storage is row-major, so the flat data seen through [`DenseTensor::data`]
/// is what the GEMM path and the autodiff adjoints index into.
#[derive(Debug, Clone)]
pub struct DenseTensor(Tensor<f64, DynRank>);

impl PartialEq for DenseTensor {
    fn eq(&self, other: &Self) -> bool {
        self.dims() == other.dims() && self.data() == other.data()
    }
}

/// Inverse of a permutation.
pub(crate) fn invert_permutation(perm: &[usize]) -> Vec<usize> {
    let mut inv = vec![0; perm.len()];
    for (i, &p) in perm.iter().enumerate() {
        inv[p] = i;
    }
    inv
}

fn is_permutation(perm: &[usize], rank: usize) -> bool {
    if perm.len() != rank {
        return false;
    }
    let mut seen = vec![false; rank];
    for &p in perm {
        if p >= rank || seen[p] {
            return false;
        }
        seen[p] = true;
    }
    true
}

impl DenseTensor {
    /// Wrap a vector whose length is already known to match `dims`.
    fn with_shape(data: Vec<f64>, dims: &[usize]) -> Self {
        Self(Tensor::from(data).into_shape(DynRank::from_dims(dims)))
    }

    /// Create a tensor from dimensions and row-major data.
    pub fn from_vec(dims: Vec<usize>, data: Vec<f64>) -> Result<Self> {
        let expected: usize = dims.iter().product();
        if expected != data.len() {
            return Err(TensorError::DataLength {
                dims,
                len: data.len(),
            });
        }
        Ok(Self::with_shape(data, &dims))
    }

    /// Wrap an existing mdarray tensor.
    #[must_use]
    pub fn from_tensor(tensor: Tensor<f64, DynRank>) -> Self {
        Self(tensor)
    }

    /// Underlying mdarray tensor.
    #[must_use]
    pub fn tensor(&self) -> &Tensor<f64, DynRank> {
        &self.0
    }

    /// Tensor filled with `value`.
    #[must_use]
    pub fn full(dims: &[usize], value: f64) -> Self {
        let len = dims.iter().product();
        Self::with_shape(vec![value; len], dims)
    }

    /// Tensor of zeros.
    #[must_use]
    pub fn zeros(dims: &[usize]) -> Self {
        Self::full(dims, 0.0)
    }

    /// Tensor of ones.
    #[must_use]
    pub fn ones(dims: &[usize]) -> Self {
        Self::full(dims, 1.0)
    }

    /// Rank-0 tensor holding `value`.
    #[must_use]
    pub fn scalar(value: f64) -> Self {
        Self::with_shape(vec![value], &[])
    }

    /// Build a tensor by evaluating `f` at every multi-index.
    pub fn from_fn<F: FnMut(&[usize]) -> f64>(dims: &[usize], mut f: F) -> Self {
        Self(Tensor::from_fn(DynRank::from_dims(dims), |idx| f(&idx[..])))
    }

    /// Tensor with entries drawn uniformly from `[0, 1)`.
    pub fn random<R: Rng + ?Sized>(rng: &mut R, dims: &[usize]) -> Self {
        let len = dims.iter().product();
        let data = (0..len).map(|_| rng.random::<f64>()).collect();
        Self::with_shape(data, dims)
    }

    /// `n × n` identity matrix.
    #[must_use]
    pub fn identity(n: usize) -> Self {
        Self::from_fn(&[n, n], |idx| if idx[0] == idx[1] { 1.0 } else { 0.0 })
    }

    /// Square matrix with `values` on the diagonal.
    #[must_use]
    pub fn diag(values: &[f64]) -> Self {
        let n = values.len();
        let mut out = Self::zeros(&[n, n]);
        let data = out.data_mut();
        for (i, &v) in values.iter().enumerate() {
            data[i * n + i] = v;
        }
        out
    }

    /// Dimensions of each axis.
    #[must_use]
    pub fn dims(&self) -> &[usize] {
        self.0.shape().dims()
    }

    /// Number of axes.
    #[must_use]
    pub fn rank(&self) -> usize {
        self.0.rank()
    }

    /// Total number of elements.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True if the tensor holds no elements.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Row-major data.
    #[must_use]
    pub fn data(&self) -> &[f64] {
        &self.0[..]
    }

    /// Mutable row-major data.
    pub fn data_mut(&mut self) -> &mut [f64] {
        &mut self.0[..]
    }

    /// Consume and return the row-major data.
    #[must_use]
    pub fn into_data(self) -> Vec<f64> {
        self.0.into_vec()
    }

    /// Element at a multi-index.
    ///
    /// # Panics
    /// Panics if the index is out of bounds.
    #[must_use]
    pub fn get(&self, index: &[usize]) -> f64 {
        self.data()[self.offset(index)]
    }

    /// Set the element at a multi-index.
    ///
    /// # Panics
    /// Panics if the index is out of bounds.
    pub fn set(&mut self, index: &[usize], value: f64) {
        let offset = self.offset(index);
        self.data_mut()[offset] = value;
    }

    fn offset(&self, index: &[usize]) -> usize {
        let dims = self.dims();
        assert_eq!(index.len(), dims.len(), "index rank mismatch");
        index.iter().zip(dims).fold(0, |acc, (&i, &d)| {
            assert!(i < d, "index {i} out of bounds for axis of size {d}");
            acc * d + i
        })
    }

    /// Value of a single-element tensor.
    pub fn item(&self) -> Result<f64> {
        if self.len() != 1 {
            return Err(TensorError::NotScalar {
                op: "item",
                len: self.len(),
            });
        }
        Ok(self.data()[0])
    }

    /// Reorder axes: axis `i` of the result is axis `perm[i]` of `self`.
    pub fn permute(&self, perm: &[usize]) -> Result<Self> {
        let rank = self.rank();
        if !is_permutation(perm, rank) {
            return Err(TensorError::InvalidPermutation {
                perm: perm.to_vec(),
                rank,
            });
        }
        if perm.iter().enumerate().all(|(i, &p)| i == p) {
            return Ok(self.clone());
        }
        Ok(Self(self.0.permute(perm).to_tensor()))
    }

    /// Reinterpret the data with new dimensions of equal total size.
    pub fn reshape(&self, dims: &[usize]) -> Result<Self> {
        let len: usize = dims.iter().product();
        if len != self.len() {
            return Err(TensorError::ShapeMismatch {
                op: "reshape",
                lhs: self.dims().to_vec(),
                rhs: dims.to_vec(),
            });
        }
        Ok(Self(self.0.clone().into_shape(DynRank::from_dims(dims))))
    }

    /// Matrix transpose.
    pub fn transpose(&self) -> Result<Self> {
        if self.rank() != 2 {
            return Err(TensorError::InvalidRank {
                op: "transpose",
                expected: 2,
                got: self.rank(),
            });
        }
        self.permute(&[1, 0])
    }

    /// Tensordot: sum over `axes_a` of `self` paired with `axes_b` of `other`.
    ///
    /// The result carries the free axes of `self` in their original order
    /// followed by the free axes of `other` in their original order.
    pub fn contract(&self, axes_a: &[usize], other: &Self, axes_b: &[usize]) -> Result<Self> {
        validate_axes(self.dims(), axes_a, other.dims(), axes_b)?;

        let (perm_a, dims_a) = compute_contraction_permutation(self.dims(), axes_a, false);
        let (perm_b, dims_b) = compute_contraction_permutation(other.dims(), axes_b, true);
        let a = self.permute(&perm_a)?;
        let b = other.permute(&perm_b)?;

        let naxes = axes_a.len();
        let free_a = &dims_a[..dims_a.len() - naxes];
        let free_b = &dims_b[naxes..];
        let m: usize = free_a.iter().product();
        let k: usize = dims_a[dims_a.len() - naxes..].iter().product();
        let n: usize = free_b.iter().product();

        let data = contract_via_gemm(a.data(), b.data(), m, k, n);
        let dims: Vec<usize> = free_a.iter().chain(free_b).copied().collect();
        Ok(Self::with_shape(data, &dims))
    }

    /// Elementwise sum.
    pub fn add(&self, other: &Self) -> Result<Self> {
        self.zip_with(other, "add", |x, y| x + y)
    }

    /// Elementwise difference.
    pub fn sub(&self, other: &Self) -> Result<Self> {
        self.zip_with(other, "sub", |x, y| x - y)
    }

    /// Accumulate `other` into `self`.
    pub fn add_assign(&mut self, other: &Self) -> Result<()> {
        if self.dims() != other.dims() {
            return Err(TensorError::ShapeMismatch {
                op: "add_assign",
                lhs: self.dims().to_vec(),
                rhs: other.dims().to_vec(),
            });
        }
        for (x, y) in self.data_mut().iter_mut().zip(other.data()) {
            *x += y;
        }
        Ok(())
    }

    fn zip_with(&self, other: &Self, op: &'static str, f: impl Fn(f64, f64) -> f64) -> Result<Self> {
        if self.dims() != other.dims() {
            return Err(TensorError::ShapeMismatch {
                op,
                lhs: self.dims().to_vec(),
                rhs: other.dims().to_vec(),
            });
        }
        let data = self
            .data()
            .iter()
            .zip(other.data())
            .map(|(&x, &y)| f(x, y))
            .collect();
        Ok(Self::with_shape(data, self.dims()))
    }

    /// Multiply every element by `alpha`.
    #[must_use]
    pub fn scale(&self, alpha: f64) -> Self {
        let data = self.data().iter().map(|x| x * alpha).collect();
        Self::with_shape(data, self.dims())
    }

    /// Position of the element with the largest magnitude (first on ties).
    #[must_use]
    pub fn argmax_abs(&self) -> Option<usize> {
        let mut best: Option<(usize, f64)> = None;
        for (i, x) in self.data().iter().enumerate() {
            let a = x.abs();
            match best {
                Some((_, b)) if a <= b || a.is_nan() => {}
                _ => best = Some((i, a)),
            }
        }
        best.map(|(i, _)| i)
    }

    /// Largest element magnitude; zero for an empty tensor.
    #[must_use]
    pub fn max_abs(&self) -> f64 {
        self.argmax_abs().map_or(0.0, |i| self.data()[i].abs())
    }

    /// Frobenius norm.
    #[must_use]
    pub fn norm(&self) -> f64 {
        self.data().iter().map(|x| x * x).sum::<f64>().sqrt()
    }

    /// Full inner product of two tensors of identical shape.
    pub fn dot(&self, other: &Self) -> Result<f64> {
        if self.dims() != other.dims() {
            return Err(TensorError::ShapeMismatch {
                op: "dot",
                lhs: self.dims().to_vec(),
                rhs: other.dims().to_vec(),
            });
        }
        Ok(self.data().iter().zip(other.data()).map(|(x, y)| x * y).sum())
    }

    /// Copy into a tensor of the same rank with new dimensions.
    ///
    /// The leading block shared by both shapes is kept; axes that grow are
    /// zero-padded and axes that shrink are truncated.
    pub fn resized(&self, dims: &[usize]) -> Result<Self> {
        if dims.len() != self.rank() {
            return Err(TensorError::InvalidRank {
                op: "resized",
                expected: self.rank(),
                got: dims.len(),
            });
        }
        let src = self.dims();
        Ok(Self::from_fn(dims, |idx| {
            if idx.iter().zip(src).all(|(i, d)| i < d) {
                self.get(idx)
            } else {
                0.0
            }
        }))
    }

    /// Diagonal of a square matrix.
    pub fn diagonal(&self) -> Result<Vec<f64>> {
        if self.rank() != 2 || self.dims()[0] != self.dims()[1] {
            return Err(TensorError::InvalidRank {
                op: "diagonal",
                expected: 2,
                got: self.rank(),
            });
        }
        let n = self.dims()[0];
        Ok((0..n).map(|i| self.data()[i * n + i]).collect())
    }
}

fn validate_axes(dims_a: &[usize], axes_a: &[usize], dims_b: &[usize], axes_b: &[usize]) -> Result<()> {
    let invalid = || TensorError::InvalidAxes {
        axes_a: axes_a.to_vec(),
        axes_b: axes_b.to_vec(),
    };
    if axes_a.len() != axes_b.len() {
        return Err(invalid());
    }
    let unique = |axes: &[usize], rank: usize| {
        let mut seen = vec![false; rank];
        axes.iter().all(|&ax| ax < rank && !std::mem::replace(&mut seen[ax], true))
    };
    if !unique(axes_a, dims_a.len()) || !unique(axes_b, dims_b.len()) {
        return Err(invalid());
    }
    for (&a, &b) in axes_a.iter().zip(axes_b) {
        if dims_a[a] != dims_b[b] {
            return Err(TensorError::ShapeMismatch {
                op: "contract",
                lhs: dims_a.to_vec(),
                rhs: dims_b.to_vec(),
            });
        }
    }
    Ok(())
}

/// Compute the permutation making contracted axes contiguous.
///
/// If `axes_at_front` is true the contracted axes go to the front, otherwise
/// to the back. Contracted axes keep the order given in `axes`, so that the
/// pairing with the other operand survives. Returns `(perm, new_dims)`.
fn compute_contraction_permutation(
    dims: &[usize],
    axes: &[usize],
    axes_at_front: bool,
) -> (Vec<usize>, Vec<usize>) {
    let non_contracted: Vec<usize> = (0..dims.len()).filter(|i| !axes.contains(i)).collect();
    let perm: Vec<usize> = if axes_at_front {
        axes.iter().chain(non_contracted.iter()).copied().collect()
    } else {
        non_contracted.iter().chain(axes.iter()).copied().collect()
    };
    let new_dims = perm.iter().map(|&i| dims[i]).collect();
    (perm, new_dims)
}

/// `C[m, n] = A[m, k] @ B[k, n]` on row-major buffers.
fn contract_via_gemm(a: &[f64], b: &[f64], m: usize, k: usize, n: usize) -> Vec<f64> {
    let mut c = vec![0.0; m * n];
    if m == 0 || n == 0 || k == 0 {
        return c;
    }

    // Row-major views: row stride is the column count, column stride is 1.
    // SAFETY: the buffers hold exactly m*k, k*n and m*n elements.
    let a_mat = unsafe { faer::MatRef::from_raw_parts(a.as_ptr(), m, k, k as isize, 1) };
    let b_mat = unsafe { faer::MatRef::from_raw_parts(b.as_ptr(), k, n, n as isize, 1) };
    let mut c_mat =
        unsafe { faer::MatMut::from_raw_parts_mut(c.as_mut_ptr(), m, n, n as isize, 1) };

    faer_matmul(&mut c_mat, Accum::Replace, a_mat, b_mat, 1.0, parallel::par());

    c
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn arange(dims: &[usize]) -> DenseTensor {
        let len: usize = dims.iter().product();
        DenseTensor::from_vec(dims.to_vec(), (0..len).map(|x| x as f64).collect()).unwrap()
    }

    #[test]
    fn test_from_vec_length_mismatch() {
        assert!(DenseTensor::from_vec(vec![2, 3], vec![0.0; 5]).is_err());
    }

    #[test]
    fn test_permute_matches_index_map() {
        let t = arange(&[2, 3, 4]);
        let p = t.permute(&[2, 0, 1]).unwrap();
        assert_eq!(p.dims(), &[4, 2, 3]);
        for i in 0..2 {
            for j in 0..3 {
                for k in 0..4 {
                    assert_eq!(p.get(&[k, i, j]), t.get(&[i, j, k]));
                }
            }
        }
    }

    #[test]
    fn test_reshape_keeps_row_major_order() {
        let t = arange(&[2, 3]);
        let r = t.reshape(&[3, 2]).unwrap();
        assert_eq!(r.dims(), &[3, 2]);
        assert_eq!(r.data(), t.data());
        assert_eq!(r.get(&[2, 0]), 4.0);
        assert!(t.reshape(&[4, 2]).is_err());
        assert_eq!(DenseTensor::from_tensor(t.tensor().clone()), t);
    }

    #[test]
    fn test_permute_rejects_duplicates() {
        let t = arange(&[2, 2]);
        assert!(t.permute(&[0, 0]).is_err());
    }

    #[test]
    fn test_contract_matrix_product() {
        let a = DenseTensor::from_vec(vec![2, 3], vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
        let b = DenseTensor::from_vec(vec![3, 2], vec![7.0, 8.0, 9.0, 10.0, 11.0, 12.0]).unwrap();
        let c = a.contract(&[1], &b, &[0]).unwrap();
        assert_eq!(c.dims(), &[2, 2]);
        assert_eq!(c.data(), &[58.0, 64.0, 139.0, 154.0]);
    }

    #[test]
    fn test_contract_respects_axis_pairing() {
        let a = arange(&[2, 3, 4]);
        let b = arange(&[4, 5, 3]);
        let c = a.contract(&[2, 1], &b, &[0, 2]).unwrap();
        assert_eq!(c.dims(), &[2, 5]);
        for i in 0..2 {
            for l in 0..5 {
                let mut expected = 0.0;
                for j in 0..3 {
                    for k in 0..4 {
                        expected += a.get(&[i, j, k]) * b.get(&[k, l, j]);
                    }
                }
                assert_relative_eq!(c.get(&[i, l]), expected, epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn test_contract_outer_and_full() {
        let a = arange(&[2]);
        let b = arange(&[3]);
        let outer = a.contract(&[], &b, &[]).unwrap();
        assert_eq!(outer.dims(), &[2, 3]);
        assert_eq!(outer.get(&[1, 2]), 2.0);

        let full = a.contract(&[0], &a, &[0]).unwrap();
        assert!(full.dims().is_empty());
        assert_eq!(full.item().unwrap(), 1.0);
    }

    #[test]
    fn test_contract_dimension_mismatch() {
        let a = arange(&[2, 3]);
        let b = arange(&[2, 3]);
        assert!(matches!(
            a.contract(&[1], &b, &[0]),
            Err(TensorError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_resized_pads_and_truncates() {
        let t = arange(&[2, 3]);
        let r = t.resized(&[3, 2]).unwrap();
        assert_eq!(r.data(), &[0.0, 1.0, 3.0, 4.0, 0.0, 0.0]);
    }

    #[test]
    fn test_max_abs_prefers_first() {
        let t = DenseTensor::from_vec(vec![4], vec![1.0, -3.0, 3.0, 2.0]).unwrap();
        assert_eq!(t.argmax_abs(), Some(1));
        assert_eq!(t.max_abs(), 3.0);
    }
}
