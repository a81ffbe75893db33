//! C4v corner transfer matrix renormalization group.
//!
//! Every iteration performs one directional move: the enlarged corner is
//! diagonalized, its leading `χ` eigenvectors renormalize the edge and its
//! leading eigenvalues become the new corner. By C4v symmetry one move
//! updates all four directions at once.
//!
//! The loop is differentiable: when the site tensor requires gradients every
//! contraction and eigendecomposition is recorded on its tape.

use std::time::Instant;

use ipeps_tensor::Tensor;
use tracing::{debug, info, warn};

use crate::config::CtmArgs;
use crate::contraction::{double_layer, enlarged_corner};
use crate::convergence::{ConvergenceCheck, ConvergenceHistory};
use crate::env::EnvC4v;
use crate::error::{Error, Result};
use crate::ipeps::IpepsC4v;

/// How a CTMRG run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CtmrgStatus {
    /// The convergence check succeeded after this many iterations.
    Converged {
        /// Iterations performed.
        iterations: usize,
    },
    /// `ctm_max_iter` moves were performed without convergence.
    MaxIterationsReached {
        /// Iterations performed.
        iterations: usize,
    },
}

impl CtmrgStatus {
    /// Iterations performed.
    #[must_use]
    pub fn iterations(&self) -> usize {
        match *self {
            Self::Converged { iterations } | Self::MaxIterationsReached { iterations } => iterations,
        }
    }

    /// Whether the convergence check succeeded.
    #[must_use]
    pub fn is_converged(&self) -> bool {
        matches!(self, Self::Converged { .. })
    }
}

/// Result of [`run`].
#[derive(Debug, Clone)]
pub struct CtmrgOutcome {
    /// Environment after the last move.
    pub env: EnvC4v,
    /// One fingerprint per iteration.
    pub history: ConvergenceHistory,
    /// Termination reason.
    pub status: CtmrgStatus,
}

/// Iterate CTM moves on `env` until `conv_check` reports convergence or
/// `ctm_args.ctm_max_iter` is reached.
///
/// Convergence is only accepted once the history holds at least two
/// fingerprints. At least one move is required, so `ctm_max_iter == 0` is a
/// configuration error.
pub fn run(
    state: &IpepsC4v,
    env: EnvC4v,
    conv_check: &dyn ConvergenceCheck,
    ctm_args: &CtmArgs,
) -> Result<CtmrgOutcome> {
    if ctm_args.ctm_max_iter == 0 {
        return Err(Error::config("ctm_max_iter must be positive"));
    }
    let d2 = state.bond_dim() * state.bond_dim();
    env.check_shapes(d2)?;
    let a = double_layer(state.site())?;
    let start = Instant::now();

    let mut env = env;
    let mut history = ConvergenceHistory::new();
    let mut status = CtmrgStatus::MaxIterationsReached {
        iterations: ctm_args.ctm_max_iter,
    };

    for iteration in 1..=ctm_args.ctm_max_iter {
        env = ctm_move(&a, &env)?;
        env.check_shapes(d2)?;

        let converged = conv_check.check(state, &env, &mut history, ctm_args)?;
        if history.len() != iteration {
            return Err(Error::HistoryContract {
                iteration,
                len: history.len(),
            });
        }
        debug!(iteration, converged, "ctm move");
        if converged && history.len() > 1 {
            status = CtmrgStatus::Converged { iterations: iteration };
            break;
        }
    }

    match status {
        CtmrgStatus::Converged { iterations } => info!(
            iterations,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "ctmrg converged"
        ),
        CtmrgStatus::MaxIterationsReached { iterations } => warn!(
            iterations,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "ctmrg reached ctm_max_iter without converging"
        ),
    }

    Ok(CtmrgOutcome { env, history, status })
}

/// One renormalization step of `env` with double-layer tensor `a`.
pub fn ctm_move(a: &Tensor, env: &EnvC4v) -> Result<EnvC4v> {
    let chi = env.chi();
    let chi_in = env.c().dims()[0];
    let d2 = a.dims()[0];
    let t = env.t();

    let corner = enlarged_corner(env.c(), t, a)?.symmetrize_matrix()?;
    let (values, projector) = corner.eigh_truncated(chi)?;
    let kept = values.dims()[0];

    let c_new = values.diag()?;

    // T_new[x, r, y] = P[i u, x] T[i, l, m] a[u, l, d, r] P[m d, y]
    let p = projector.reshape(&[chi_in, d2, kept])?;
    let pt = p.contract(&[0], t, &[0])?;
    let pta = pt.contract(&[0, 2], a, &[0, 1])?;
    let t_new = pta.contract(&[1, 2], &p, &[0, 1])?;
    let t_new = t_new.add(&t_new.permute(&[2, 1, 0])?)?.scale(0.5)?;

    let (c_new, t_new) = if kept < chi {
        (c_new.resized(&[chi, chi])?, t_new.resized(&[chi, d2, chi])?)
    } else {
        (c_new, t_new)
    };

    EnvC4v::from_tensors(chi, c_new.normalize_max_abs()?, t_new.normalize_max_abs()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EnvInit;
    use crate::convergence::SpectralDistance;
    use crate::env::init_env;
    use ipeps_tensor::DenseTensor;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn seeded(chi: usize, bond_dim: usize) -> (IpepsC4v, EnvC4v) {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let state = IpepsC4v::random(&mut rng, 5, bond_dim).unwrap();
        let mut env = EnvC4v::new(chi, &state);
        init_env(&state, &mut env, EnvInit::Ctmrg).unwrap();
        (state, env)
    }

    #[test]
    fn test_move_keeps_shapes_and_symmetry() {
        let (state, env) = seeded(5, 2);
        let a = double_layer(state.site()).unwrap();
        let next = ctm_move(&a, &env).unwrap();
        next.check_shapes(4).unwrap();
        let c = next.c().value();
        for i in 0..5 {
            for j in 0..5 {
                if i != j {
                    assert_eq!(c.get(&[i, j]), 0.0);
                }
            }
        }
        let t = next.t().value();
        assert!((t.get(&[0, 1, 2]) - t.get(&[2, 1, 0])).abs() < 1e-14);
        assert!((t.max_abs() - 1.0).abs() < 1e-14);
    }

    #[test]
    fn test_corner_spectrum_sorted_by_magnitude() {
        let (state, env) = seeded(4, 2);
        let a = double_layer(state.site()).unwrap();
        let next = ctm_move(&a, &env).unwrap();
        let diag = next.c().value().diagonal().unwrap();
        assert!(diag.windows(2).all(|w| w[0].abs() >= w[1].abs()));
    }

    #[test]
    fn test_max_iter_one() {
        let (state, env) = seeded(3, 2);
        let args = CtmArgs::default().with_max_iter(1).with_conv_tol(f64::INFINITY);
        let out = run(&state, env, &SpectralDistance, &args).unwrap();
        assert_eq!(out.history.len(), 1);
        assert_eq!(out.status, CtmrgStatus::MaxIterationsReached { iterations: 1 });
    }

    #[test]
    fn test_max_iter_zero_is_rejected() {
        let (state, env) = seeded(3, 2);
        let args = CtmArgs::default().with_max_iter(0);
        let err = run(&state, env, &SpectralDistance, &args).unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }

    #[test]
    fn test_rejects_wrong_environment() {
        let (state, _) = seeded(3, 2);
        let c = Tensor::constant(DenseTensor::ones(&[3, 3]));
        let t = Tensor::constant(DenseTensor::ones(&[3, 9, 3]));
        let env = EnvC4v::from_tensors(3, c, t).unwrap();
        let err = run(&state, env, &SpectralDistance, &CtmArgs::default()).unwrap_err();
        assert!(matches!(err, Error::EnvironmentShape { tensor: "T", .. }));
    }
}
