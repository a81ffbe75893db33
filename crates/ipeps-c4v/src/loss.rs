//! Loss closure of the optimization: symmetrize, converge, measure.

use ipeps_tensor::Tensor;
use tracing::debug;

use crate::config::Config;
use crate::convergence::{ConvergenceCheck, ConvergenceHistory};
use crate::ctmrg::{self, CtmrgOutcome, CtmrgStatus};
use crate::env::{init_env, EnvC4v};
use crate::error::Result;
use crate::ipeps::IpepsC4v;
use crate::models::Model;

/// Everything produced by one loss evaluation.
#[derive(Debug, Clone)]
pub struct LossOutput {
    /// Energy per site, differentiable in the site tensor of the input state.
    pub loss: Tensor,
    /// Symmetrized state the loss was measured on.
    pub state: IpepsC4v,
    /// Converged (or capped) environment.
    pub env: EnvC4v,
    /// Fingerprints of the CTMRG run.
    pub history: ConvergenceHistory,
    /// Termination of the CTMRG run.
    pub status: CtmrgStatus,
}

/// Energy of the C4v-projected state in its CTMRG environment.
#[derive(Clone, Copy)]
pub struct C4vLoss<'a, M> {
    model: &'a M,
    conv_check: &'a dyn ConvergenceCheck,
    cfg: &'a Config,
}

impl<'a, M: Model> C4vLoss<'a, M> {
    /// Loss of `model`, with CTMRG stopped by `conv_check`.
    #[must_use]
    pub fn new(model: &'a M, conv_check: &'a dyn ConvergenceCheck, cfg: &'a Config) -> Self {
        Self {
            model,
            conv_check,
            cfg,
        }
    }

    /// Model being optimized.
    #[must_use]
    pub fn model(&self) -> &'a M {
        self.model
    }

    /// Configuration in use.
    #[must_use]
    pub fn config(&self) -> &'a Config {
        self.cfg
    }

    /// Evaluate the loss for `state`, starting CTMRG from `env_in`.
    ///
    /// The site tensor is projected onto C4v first. With `opt_ctm_reinit`
    /// the environment is re-seeded from the projected state; otherwise
    /// `env_in` is used as a warm start.
    pub fn evaluate(&self, state: &IpepsC4v, env_in: EnvC4v) -> Result<LossOutput> {
        let symm_state = state.symmetrized()?;

        let mut env = env_in;
        if self.cfg.opt.opt_ctm_reinit {
            init_env(&symm_state, &mut env, self.cfg.ctm.ctm_env_init_type)?;
        }

        let CtmrgOutcome {
            env,
            history,
            status,
        } = ctmrg::run(&symm_state, env, self.conv_check, &self.cfg.ctm)?;
        let loss = self.model.energy_1x1(&symm_state, &env)?;
        debug!(iterations = status.iterations(), loss = loss.item()?, "loss evaluated");

        Ok(LossOutput {
            loss,
            state: symm_state,
            env,
            history,
            status,
        })
    }
}
