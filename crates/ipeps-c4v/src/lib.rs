#![warn(missing_docs)]
//! Single-site C4v corner transfer matrix renormalization group and
//! gradient optimization of infinite PEPS.
//!
//! The pipeline for one loss evaluation:
//! 1. project the site tensor onto the C4v-invariant subspace
//!    ([`make_c4v_symm`])
//! 2. seed or warm-start the environment ([`init_env`]) and iterate CTM moves
//!    until a [`ConvergenceCheck`] succeeds ([`ctmrg::run`])
//! 3. measure the energy per site from the two-site reduced density matrix
//!    ([`Model::energy_1x1`])
//!
//! Every step is recorded on an [`ipeps_tensor::Tape`], so the energy is
//! differentiable in the site tensor through the whole CTMRG loop, and
//! [`optimize_state`] minimizes it with L-BFGS.

pub mod config;
pub mod contraction;
pub mod convergence;
pub mod ctmrg;
pub mod env;
pub mod error;
pub mod ipeps;
pub mod loss;
pub mod models;
pub mod optim;
pub mod rdm;
pub mod symmetry;

pub use config::{Config, CtmArgs, EnvInit, GlobalArgs, OptArgs, StateArgs};
pub use convergence::{ConvergenceCheck, ConvergenceHistory, EnergyDistance, SpectralDistance};
pub use ctmrg::{CtmrgOutcome, CtmrgStatus};
pub use env::{init_env, EnvC4v};
pub use error::{Error, Result};
pub use ipeps::{initial_state, read_ipeps, IpepsC4v};
pub use loss::{C4vLoss, LossOutput};
pub use models::{AkltS2C4vBipartite, Model, Observables};
pub use optim::{optimize_state, OptimizationResult};
pub use rdm::{rdm1x1, rdm2x1};
pub use symmetry::make_c4v_symm;
