//! C4v environment: one corner and one edge tensor.

use ipeps_tensor::{DenseTensor, Tensor};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::debug;

use crate::config::EnvInit;
use crate::contraction::{double_layer, identity_boundary};
use crate::error::{Error, Result};
use crate::ipeps::IpepsC4v;

/// Corner `C[χ, χ]` and edge `T[χ, D², χ]` of a C4v-symmetric state.
///
/// A single corner and edge stand in for all four of each by symmetry. The
/// environment legs always have dimension `chi`, padded with zeros when the
/// spectrum is shorter.
#[derive(Debug, Clone)]
pub struct EnvC4v {
    chi: usize,
    c: Tensor,
    t: Tensor,
}

impl EnvC4v {
    /// Zero environment sized for `state`; seed it with [`init_env`].
    #[must_use]
    pub fn new(chi: usize, state: &IpepsC4v) -> Self {
        let d2 = state.bond_dim() * state.bond_dim();
        Self {
            chi,
            c: Tensor::constant(DenseTensor::zeros(&[chi, chi])),
            t: Tensor::constant(DenseTensor::zeros(&[chi, d2, chi])),
        }
    }

    /// Assemble from explicit tensors, checking their shapes.
    pub fn from_tensors(chi: usize, c: Tensor, t: Tensor) -> Result<Self> {
        let d2 = t.dims().get(1).copied().unwrap_or(0);
        let env = Self { chi, c, t };
        env.check_shapes(d2)?;
        Ok(env)
    }

    /// Environment bond dimension.
    #[must_use]
    pub fn chi(&self) -> usize {
        self.chi
    }

    /// Corner tensor.
    #[must_use]
    pub fn c(&self) -> &Tensor {
        &self.c
    }

    /// Edge tensor.
    #[must_use]
    pub fn t(&self) -> &Tensor {
        &self.t
    }

    /// Same values, cut from any gradient tape.
    #[must_use]
    pub fn detach(&self) -> Self {
        Self {
            chi: self.chi,
            c: self.c.detach(),
            t: self.t.detach(),
        }
    }

    /// Check `C: [χ, χ]` and `T: [χ, d2, χ]`.
    pub fn check_shapes(&self, d2: usize) -> Result<()> {
        let expected_c = [self.chi, self.chi];
        if self.c.dims() != expected_c {
            return Err(Error::EnvironmentShape {
                tensor: "C",
                expected: expected_c.to_vec(),
                got: self.c.dims().to_vec(),
            });
        }
        let expected_t = [self.chi, d2, self.chi];
        if self.t.dims() != expected_t {
            return Err(Error::EnvironmentShape {
                tensor: "T",
                expected: expected_t.to_vec(),
                got: self.t.dims().to_vec(),
            });
        }
        Ok(())
    }

    pub(crate) fn replace(&mut self, c: Tensor, t: Tensor) {
        self.c = c;
        self.t = t;
    }
}

/// Seed `env` for `state` in place.
///
/// Every mode normalizes the tensors by their largest element. The `Ctmrg`
/// seed is built from the site tensor and stays differentiable in it.
pub fn init_env(state: &IpepsC4v, env: &mut EnvC4v, method: EnvInit) -> Result<()> {
    let chi = env.chi;
    let d = state.bond_dim();
    let d2 = d * d;
    let (c, t) = match method {
        EnvInit::Ctmrg => {
            let a = double_layer(state.site())?;
            let v = identity_boundary(d);
            // a[u, l, d, r] closed with v on u and l (corner), on l (edge)
            let c0 = a.contract(&[0], &v, &[0])?.contract(&[0], &v, &[0])?;
            let t0 = a.contract(&[1], &v, &[0])?.permute(&[0, 2, 1])?;
            (
                c0.resized(&[chi, chi])?,
                t0.resized(&[chi, d2, chi])?,
            )
        }
        EnvInit::Const => (
            Tensor::constant(DenseTensor::ones(&[chi, chi])),
            Tensor::constant(DenseTensor::ones(&[chi, d2, chi])),
        ),
        EnvInit::Random { seed } => {
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            let c = Tensor::constant(DenseTensor::random(&mut rng, &[chi, chi]));
            let t = Tensor::constant(DenseTensor::random(&mut rng, &[chi, d2, chi]));
            let t = t.add(&t.permute(&[2, 1, 0])?)?.scale(0.5)?;
            (c.symmetrize_matrix()?, t)
        }
    };
    debug!(%method, chi, bond_dim = d, "seeded environment");
    env.replace(c.normalize_max_abs()?, t.normalize_max_abs()?);
    Ok(())
}
