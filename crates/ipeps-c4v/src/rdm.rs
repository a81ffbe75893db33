//! Reduced density matrices from a C4v environment.
//!
//! Both matrices are normalized to unit trace and are differentiable in the
//! site tensor and the environment.

use ipeps_tensor::{DenseTensor, Tensor};

use crate::contraction::{corner_edge, double_layer_open};
use crate::env::EnvC4v;
use crate::error::Result;
use crate::ipeps::IpepsC4v;

/// Single-site density matrix `ρ[p, p']`.
pub fn rdm1x1(state: &IpepsC4v, env: &EnvC4v) -> Result<Tensor> {
    let (c, t) = (env.c(), env.t());
    let a_op = double_layer_open(state.site())?;

    // C T C row, reused above and below the site
    let row = corner_edge(c, t)?.contract(&[2], c, &[0])?;
    let x = row.contract(&[0], t, &[0])?;
    let x = x.contract(&[0, 2], &a_op, &[2, 3])?;
    let x = x.contract(&[0, 5], t, &[0, 1])?;
    let rdm = x.contract(&[0, 3, 4], &row, &[0, 1, 2])?;

    let p = state.phys_dim();
    normalize_trace(rdm, &DenseTensor::identity(p))
}

/// Density matrix of two horizontally adjacent sites,
/// `ρ[p1, p2, p1', p2']`.
pub fn rdm2x1(state: &IpepsC4v, env: &EnvC4v) -> Result<Tensor> {
    let (c, t) = (env.c(), env.t());
    let a_op = double_layer_open(state.site())?;

    // half system: corners and edges around one open site, [k, p, p', r, k2]
    let ct = corner_edge(c, t)?;
    let half = ct.contract(&[0], t, &[0])?;
    let half = half.contract(&[0, 2], &a_op, &[2, 3])?;
    let half = half.contract(&[1, 4], &ct, &[0, 1])?;

    let rdm = half.contract(&[0, 3, 4], &half, &[0, 3, 4])?;
    let rdm = rdm.permute(&[0, 2, 1, 3])?;

    let p = state.phys_dim();
    let id = DenseTensor::from_fn(&[p, p, p, p], |i| {
        if i[0] == i[2] && i[1] == i[3] {
            1.0
        } else {
            0.0
        }
    });
    normalize_trace(rdm, &id)
}

fn normalize_trace(rdm: Tensor, identity: &DenseTensor) -> Result<Tensor> {
    let axes: Vec<usize> = (0..rdm.dims().len()).collect();
    let trace = rdm.contract(&axes, &Tensor::constant(identity.clone()), &axes)?;
    Ok(rdm.div_scalar(&trace)?)
}
