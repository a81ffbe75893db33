//! Differentiable operations and their adjoints.

use std::rc::Rc;

use super::{record, record_one, Tensor};
use crate::dense::{invert_permutation, DenseTensor};
use crate::error::{Result, TensorError};
use crate::linalg;

/// Lorentzian broadening of `1/(λⱼ - λᵢ)` in the eigenvector adjoint.
///
/// Keeps exactly degenerate pairs finite; gradients near a degeneracy are
/// still ill-conditioned.
pub const EIGH_BROADENING: f64 = 1e-12;

/// Recorded operation together with what its adjoint needs.
pub(super) enum Op {
    Permute {
        perm: Vec<usize>,
    },
    Reshape {
        input_dims: Vec<usize>,
    },
    Contract {
        a: Rc<DenseTensor>,
        axes_a: Vec<usize>,
        b: Rc<DenseTensor>,
        axes_b: Vec<usize>,
    },
    Add,
    Sub,
    Scale {
        alpha: f64,
    },
    /// `a / s` with `s` a single-element tensor.
    DivScalar {
        numer: Rc<DenseTensor>,
        denom: f64,
        denom_dims: Vec<usize>,
    },
    MaxAbs {
        input_dims: Vec<usize>,
        index: usize,
        sign: f64,
    },
    Diag {
        n: usize,
    },
    Resize {
        input_dims: Vec<usize>,
    },
    /// Truncated symmetric eigendecomposition; outputs are the kept
    /// eigenvalues and eigenvectors.
    Eigh {
        values: Vec<f64>,
        vectors: DenseTensor,
        kept: Vec<usize>,
    },
}

fn single<'a>(grads: &[Option<&'a DenseTensor>]) -> Result<&'a DenseTensor> {
    grads.first().copied().flatten().ok_or(TensorError::NotTracked)
}

impl Op {
    /// Gradients for each input, given gradients of each output.
    pub(super) fn backward(&self, grads: &[Option<&DenseTensor>]) -> Result<Vec<Option<DenseTensor>>> {
        match self {
            Op::Permute { perm } => {
                let g = single(grads)?;
                Ok(vec![Some(g.permute(&invert_permutation(perm))?)])
            }
            Op::Reshape { input_dims } => Ok(vec![Some(single(grads)?.reshape(input_dims)?)]),
            Op::Contract { a, axes_a, b, axes_b } => {
                let (ga, gb) = contract_backward(a, axes_a, b, axes_b, single(grads)?)?;
                Ok(vec![Some(ga), Some(gb)])
            }
            Op::Add => {
                let g = single(grads)?;
                Ok(vec![Some(g.clone()), Some(g.clone())])
            }
            Op::Sub => {
                let g = single(grads)?;
                Ok(vec![Some(g.clone()), Some(g.scale(-1.0))])
            }
            Op::Scale { alpha } => Ok(vec![Some(single(grads)?.scale(*alpha))]),
            Op::DivScalar {
                numer,
                denom,
                denom_dims,
            } => {
                let g = single(grads)?;
                let ga = g.scale(1.0 / denom);
                let gs = -g.dot(numer)? / (denom * denom);
                Ok(vec![Some(ga), Some(DenseTensor::full(denom_dims, gs))])
            }
            Op::MaxAbs {
                input_dims,
                index,
                sign,
            } => {
                let g = single(grads)?.item()?;
                let mut ga = DenseTensor::zeros(input_dims);
                ga.data_mut()[*index] = sign * g;
                Ok(vec![Some(ga)])
            }
            Op::Diag { n } => {
                let g = single(grads)?;
                let diag = g.diagonal()?;
                Ok(vec![Some(DenseTensor::from_vec(vec![*n], diag)?)])
            }
            Op::Resize { input_dims } => Ok(vec![Some(single(grads)?.resized(input_dims)?)]),
            Op::Eigh {
                values,
                vectors,
                kept,
            } => Ok(vec![Some(eigh_backward(values, vectors, kept, grads[0], grads[1])?)]),
        }
    }
}

/// Adjoint of `C = contract(A, axes_a, B, axes_b)`.
fn contract_backward(
    a: &DenseTensor,
    axes_a: &[usize],
    b: &DenseTensor,
    axes_b: &[usize],
    g: &DenseTensor,
) -> Result<(DenseTensor, DenseTensor)> {
    let free_a: Vec<usize> = (0..a.rank()).filter(|i| !axes_a.contains(i)).collect();
    let free_b: Vec<usize> = (0..b.rank()).filter(|i| !axes_b.contains(i)).collect();
    let nfa = free_a.len();
    let paired_in_a = |bx: usize| axes_a[axes_b.iter().position(|&x| x == bx).unwrap_or(0)];
    let paired_in_b = |ax: usize| axes_b[axes_a.iter().position(|&x| x == ax).unwrap_or(0)];

    // dA = G · B over the free axes of B; the leftover B axes come out in
    // ascending order and map back onto their partner axes of A.
    let g_free_b: Vec<usize> = (nfa..nfa + free_b.len()).collect();
    let ga = g.contract(&g_free_b, b, &free_b)?;
    let mut sorted_b = axes_b.to_vec();
    sorted_b.sort_unstable();
    let src_a: Vec<usize> = free_a
        .iter()
        .copied()
        .chain(sorted_b.iter().map(|&bx| paired_in_a(bx)))
        .collect();
    let ga = ga.permute(&invert_permutation(&src_a))?;

    let g_free_a: Vec<usize> = (0..nfa).collect();
    let gb = a.contract(&free_a, g, &g_free_a)?;
    let mut sorted_a = axes_a.to_vec();
    sorted_a.sort_unstable();
    let src_b: Vec<usize> = sorted_a
        .iter()
        .map(|&ax| paired_in_b(ax))
        .chain(free_b.iter().copied())
        .collect();
    let gb = gb.permute(&invert_permutation(&src_b))?;

    Ok((ga, gb))
}

/// Adjoint of the truncated symmetric eigendecomposition.
///
/// With the full decomposition `A = U diag(λ) Uᵀ` and cotangents scattered
/// onto the kept columns, `Ā = U (diag(λ̄) + F ∘ (Uᵀ Ū)) Uᵀ` where
/// `Fᵢⱼ = 1/(λⱼ - λᵢ)` off the diagonal.
fn eigh_backward(
    values: &[f64],
    vectors: &DenseTensor,
    kept: &[usize],
    g_values: Option<&DenseTensor>,
    g_vectors: Option<&DenseTensor>,
) -> Result<DenseTensor> {
    let n = values.len();
    let mut inner = DenseTensor::zeros(&[n, n]);

    if let Some(gu) = g_vectors {
        let k = kept.len();
        let mut u_bar = DenseTensor::zeros(&[n, n]);
        for row in 0..n {
            for (col, &src) in kept.iter().enumerate() {
                u_bar.set(&[row, src], gu.data()[row * k + col]);
            }
        }
        let ut_ubar = vectors.contract(&[0], &u_bar, &[0])?;
        for i in 0..n {
            for j in 0..n {
                if i != j {
                    let diff = values[j] - values[i];
                    let f = diff / (diff * diff + EIGH_BROADENING);
                    inner.set(&[i, j], f * ut_ubar.get(&[i, j]));
                }
            }
        }
    }
    if let Some(gl) = g_values {
        for (pos, &src) in kept.iter().enumerate() {
            let v = inner.get(&[src, src]) + gl.data()[pos];
            inner.set(&[src, src], v);
        }
    }

    let left = vectors.contract(&[1], &inner, &[0])?;
    left.contract(&[1], vectors, &[1])
}

impl Tensor {
    /// Reorder axes: axis `i` of the result is axis `perm[i]` of `self`.
    pub fn permute(&self, perm: &[usize]) -> Result<Tensor> {
        let out = self.value.permute(perm)?;
        record_one(
            Op::Permute {
                perm: perm.to_vec(),
            },
            &[self],
            out,
        )
    }

    /// Reinterpret with new dimensions of equal total size.
    pub fn reshape(&self, dims: &[usize]) -> Result<Tensor> {
        let out = self.value.reshape(dims)?;
        record_one(
            Op::Reshape {
                input_dims: self.dims().to_vec(),
            },
            &[self],
            out,
        )
    }

    /// Tensordot; see [`DenseTensor::contract`] for the axis order of the result.
    pub fn contract(&self, axes_a: &[usize], other: &Tensor, axes_b: &[usize]) -> Result<Tensor> {
        let out = self.value.contract(axes_a, &other.value, axes_b)?;
        record_one(
            Op::Contract {
                a: Rc::clone(&self.value),
                axes_a: axes_a.to_vec(),
                b: Rc::clone(&other.value),
                axes_b: axes_b.to_vec(),
            },
            &[self, other],
            out,
        )
    }

    /// Elementwise sum.
    pub fn add(&self, other: &Tensor) -> Result<Tensor> {
        let out = self.value.add(&other.value)?;
        record_one(Op::Add, &[self, other], out)
    }

    /// Elementwise difference.
    pub fn sub(&self, other: &Tensor) -> Result<Tensor> {
        let out = self.value.sub(&other.value)?;
        record_one(Op::Sub, &[self, other], out)
    }

    /// Multiply by a constant.
    pub fn scale(&self, alpha: f64) -> Result<Tensor> {
        let out = self.value.scale(alpha);
        record_one(Op::Scale { alpha }, &[self], out)
    }

    /// Divide by a single-element tensor.
    pub fn div_scalar(&self, denom: &Tensor) -> Result<Tensor> {
        let d = denom.value.item()?;
        let out = self.value.scale(1.0 / d);
        record_one(
            Op::DivScalar {
                numer: Rc::clone(&self.value),
                denom: d,
                denom_dims: denom.dims().to_vec(),
            },
            &[self, denom],
            out,
        )
    }

    /// Largest element magnitude as a rank-0 tensor.
    pub fn max_abs(&self) -> Result<Tensor> {
        let index = self.value.argmax_abs().ok_or(TensorError::NotScalar {
            op: "max_abs",
            len: 0,
        })?;
        let x = self.value.data()[index];
        record_one(
            Op::MaxAbs {
                input_dims: self.dims().to_vec(),
                index,
                sign: if x < 0.0 { -1.0 } else { 1.0 },
            },
            &[self],
            DenseTensor::scalar(x.abs()),
        )
    }

    /// Divide by the largest element magnitude.
    pub fn normalize_max_abs(&self) -> Result<Tensor> {
        let scale = self.max_abs()?;
        if scale.value.item()? == 0.0 {
            return Err(TensorError::ZeroNorm {
                op: "normalize_max_abs",
            });
        }
        self.div_scalar(&scale)
    }

    /// `(M + Mᵀ) / 2` for a square matrix.
    pub fn symmetrize_matrix(&self) -> Result<Tensor> {
        self.add(&self.permute(&[1, 0])?)?.scale(0.5)
    }

    /// Square matrix with this vector on its diagonal.
    pub fn diag(&self) -> Result<Tensor> {
        if self.value.rank() != 1 {
            return Err(TensorError::InvalidRank {
                op: "diag",
                expected: 1,
                got: self.value.rank(),
            });
        }
        let n = self.dims()[0];
        record_one(Op::Diag { n }, &[self], DenseTensor::diag(self.value.data()))
    }

    /// Zero-pad or truncate every axis to `dims`, keeping the leading block.
    pub fn resized(&self, dims: &[usize]) -> Result<Tensor> {
        let out = self.value.resized(dims)?;
        record_one(
            Op::Resize {
                input_dims: self.dims().to_vec(),
            },
            &[self],
            out,
        )
    }

    /// Keep the `k` eigenpairs of largest |λ| of a symmetric matrix.
    ///
    /// Returns `(values, vectors)` with `values` of length `min(k, n)` ordered
    /// by descending magnitude and `vectors` of shape `n × min(k, n)`. Only the
    /// lower triangle is read; symmetrize first when the input may not be
    /// exactly symmetric.
    pub fn eigh_truncated(&self, k: usize) -> Result<(Tensor, Tensor)> {
        let eig = linalg::eigh(&self.value)?;
        let n = eig.values.len();
        let kept = linalg::leading_by_magnitude(&eig.values, k);
        let kk = kept.len();

        let values = DenseTensor::from_vec(vec![kk], kept.iter().map(|&i| eig.values[i]).collect())?;
        let vectors = DenseTensor::from_fn(&[n, kk], |idx| eig.vectors.get(&[idx[0], kept[idx[1]]]));

        let mut out = record(
            Op::Eigh {
                values: eig.values,
                vectors: eig.vectors,
                kept,
            },
            &[self],
            vec![values, vectors],
        )?;
        match (out.pop(), out.pop()) {
            (Some(vectors), Some(values)) => Ok((values, vectors)),
            _ => Err(TensorError::NotTracked),
        }
    }
}
