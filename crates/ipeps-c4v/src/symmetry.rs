//! C4v point-group projection of the on-site tensor.
//!
//! The auxiliary legs `(u, l, d, r)` of a site tensor `[p, u, l, d, r]` are
//! permuted by the eight elements of C4v: four rotations and four
//! reflections. Averaging over the group projects onto the invariant
//! subspace.

use ipeps_tensor::{DenseTensor, Tensor};

use crate::error::{Error, Result};

/// Axis permutations of `[p, u, l, d, r]` realizing the C4v group.
pub const C4V_LEG_PERMUTATIONS: [[usize; 5]; 8] = [
    [0, 1, 2, 3, 4],
    [0, 2, 3, 4, 1],
    [0, 3, 4, 1, 2],
    [0, 4, 1, 2, 3],
    [0, 1, 4, 3, 2],
    [0, 3, 2, 1, 4],
    [0, 2, 1, 4, 3],
    [0, 4, 3, 2, 1],
];

fn check_site(dims: &[usize]) -> Result<()> {
    if dims.len() != 5 || dims[1..].iter().any(|&d| d != dims[1]) {
        return Err(Error::invalid_state(format!(
            "site tensor must be [p, D, D, D, D], got {dims:?}"
        )));
    }
    Ok(())
}

/// Average `a` over all leg permutations of C4v.
///
/// Differentiable; the result is invariant under every permutation in
/// [`C4V_LEG_PERMUTATIONS`] and projecting twice changes nothing.
pub fn make_c4v_symm(a: &Tensor) -> Result<Tensor> {
    check_site(a.dims())?;
    let mut acc = a.clone();
    for perm in &C4V_LEG_PERMUTATIONS[1..] {
        acc = acc.add(&a.permute(perm)?)?;
    }
    Ok(acc.scale(1.0 / C4V_LEG_PERMUTATIONS.len() as f64)?)
}

/// Largest elementwise deviation of `a` from its C4v images.
pub fn c4v_asymmetry(a: &DenseTensor) -> Result<f64> {
    check_site(a.dims())?;
    let mut worst: f64 = 0.0;
    for perm in &C4V_LEG_PERMUTATIONS[1..] {
        worst = worst.max(a.sub(&a.permute(perm)?)?.max_abs());
    }
    Ok(worst)
}
