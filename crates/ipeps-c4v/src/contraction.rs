//! Double-layer tensors and the enlarged corner.
//!
//! Leg order conventions used throughout the crate:
//! - site tensor `A[p, u, l, d, r]`
//! - double layer `a[u, l, d, r]` with each leg fusing ket and bra, `D²`
//! - open double layer `a_op[p, p', u, l, d, r]`, physical legs left open
//! - corner `C[χ, χ]`, edge `T[χ, D², χ]` ordered (towards corner, aux, away)

use ipeps_tensor::{DenseTensor, Tensor};

use crate::error::Result;

/// `a = Σ_p A[p] ⊗ A[p]` with ket and bra legs fused pairwise.
pub fn double_layer(site: &Tensor) -> Result<Tensor> {
    let d = site.dims()[1];
    let aa = site.contract(&[0], site, &[0])?;
    let fused = aa.permute(&[0, 4, 1, 5, 2, 6, 3, 7])?;
    Ok(fused.reshape(&[d * d; 4])?)
}

/// `A ⊗ A` with physical legs kept: `[p, p', u, l, d, r]`.
pub fn double_layer_open(site: &Tensor) -> Result<Tensor> {
    let p = site.dims()[0];
    let d = site.dims()[1];
    let aa = site.contract(&[], site, &[])?;
    let fused = aa.permute(&[0, 5, 1, 6, 2, 7, 3, 8, 4, 9])?;
    Ok(fused.reshape(&[p, p, d * d, d * d, d * d, d * d])?)
}

/// Vectorized identity on a fused `D²` leg.
pub fn identity_boundary(bond_dim: usize) -> Tensor {
    let n = bond_dim * bond_dim;
    Tensor::constant(DenseTensor::from_fn(&[n], |idx| {
        if idx[0] % (bond_dim + 1) == 0 {
            1.0
        } else {
            0.0
        }
    }))
}

/// Corner with one edge on each side: `C·T`, shape `[i, u, k]`.
pub(crate) fn corner_edge(c: &Tensor, t: &Tensor) -> Result<Tensor> {
    Ok(c.contract(&[1], t, &[0])?)
}

/// Enlarged corner `C·T·T·a` as a `[χD², χD²]` matrix.
///
/// Rows fuse (left-edge environment leg, down aux leg), columns fuse
/// (top-edge environment leg, right aux leg).
pub fn enlarged_corner(c: &Tensor, t: &Tensor, a: &Tensor) -> Result<Tensor> {
    let chi = c.dims()[0];
    let d2 = a.dims()[0];
    let ct = corner_edge(c, t)?;
    let ctt = ct.contract(&[0], t, &[0])?;
    let c2 = ctt.contract(&[0, 2], a, &[0, 1])?;
    let c2 = c2.permute(&[1, 2, 0, 3])?;
    Ok(c2.reshape(&[chi * d2, chi * d2])?)
}
