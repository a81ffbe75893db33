//! Run configuration.
//!
//! Parameters are grouped the way the command line presents them: global
//! settings (seed, threads, numeric type), CTMRG settings, optimizer settings
//! and the state/run settings of the driver. Every group has defaults and
//! `with_*` builders; [`Config::validate`] checks the combination.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::{Error, Result};

/// How a fresh environment is seeded before CTMRG.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EnvInit {
    /// Corners and edges built from the double-layer tensor with identity
    /// boundary vectors on the open legs.
    #[default]
    Ctmrg,
    /// All entries one.
    Const,
    /// Uniform entries in `[0, 1)` from a seeded generator.
    Random {
        /// Generator seed.
        seed: u64,
    },
}

impl FromStr for EnvInit {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "CTMRG" => Ok(Self::Ctmrg),
            "CONST" => Ok(Self::Const),
            "RANDOM" => Ok(Self::Random { seed: 0 }),
            other => Err(Error::config(format!(
                "unknown environment init type {other:?} (expected CTMRG, CONST or RANDOM)"
            ))),
        }
    }
}

impl fmt::Display for EnvInit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ctmrg => f.write_str("CTMRG"),
            Self::Const => f.write_str("CONST"),
            Self::Random { .. } => f.write_str("RANDOM"),
        }
    }
}

/// Process-wide settings.
#[derive(Debug, Clone, PartialEq)]
pub struct GlobalArgs {
    /// Seed for every random generator of the run.
    pub seed: u64,
    /// Worker threads for dense kernels.
    pub omp_cores: usize,
    /// Numeric type; only `float64` is supported.
    pub dtype: String,
    /// Compute device; only `cpu` is supported.
    pub device: String,
}

impl Default for GlobalArgs {
    fn default() -> Self {
        Self {
            seed: 1,
            omp_cores: 1,
            dtype: "float64".to_string(),
            device: "cpu".to_string(),
        }
    }
}

/// CTMRG settings.
#[derive(Debug, Clone, PartialEq)]
pub struct CtmArgs {
    /// Upper bound on CTM moves per run.
    pub ctm_max_iter: usize,
    /// Tolerance of the convergence predicate.
    pub ctm_conv_tol: f64,
    /// Seeding of fresh environments.
    pub ctm_env_init_type: EnvInit,
    /// Log every fingerprint distance at debug level.
    pub verbose_convergence: bool,
}

impl Default for CtmArgs {
    fn default() -> Self {
        Self {
            ctm_max_iter: 50,
            ctm_conv_tol: 1e-10,
            ctm_env_init_type: EnvInit::Ctmrg,
            verbose_convergence: false,
        }
    }
}

impl CtmArgs {
    /// Set the iteration bound.
    #[must_use]
    pub fn with_max_iter(mut self, ctm_max_iter: usize) -> Self {
        self.ctm_max_iter = ctm_max_iter;
        self
    }

    /// Set the convergence tolerance.
    #[must_use]
    pub fn with_conv_tol(mut self, ctm_conv_tol: f64) -> Self {
        self.ctm_conv_tol = ctm_conv_tol;
        self
    }

    /// Set the environment seeding.
    #[must_use]
    pub fn with_env_init(mut self, init: EnvInit) -> Self {
        self.ctm_env_init_type = init;
        self
    }
}

/// Optimizer settings.
#[derive(Debug, Clone, PartialEq)]
pub struct OptArgs {
    /// Number of optimizer epochs.
    pub opt_max_iter: usize,
    /// Re-seed the environment at every loss evaluation instead of
    /// warm-starting from the previous one.
    pub opt_ctm_reinit: bool,
    /// Initial step length.
    pub lr: f64,
    /// Stop once the largest gradient component is at most this.
    pub tolerance_grad: f64,
    /// Stop once the loss changes by less than this between epochs.
    pub tolerance_change: f64,
    /// Number of curvature pairs kept by L-BFGS.
    pub history_size: usize,
    /// Maximum step halvings per line search.
    pub max_line_search: usize,
}

impl Default for OptArgs {
    fn default() -> Self {
        Self {
            opt_max_iter: 100,
            opt_ctm_reinit: true,
            lr: 1.0,
            tolerance_grad: 1e-5,
            tolerance_change: 1e-9,
            history_size: 100,
            max_line_search: 20,
        }
    }
}

impl OptArgs {
    /// Set the number of epochs.
    #[must_use]
    pub fn with_max_iter(mut self, opt_max_iter: usize) -> Self {
        self.opt_max_iter = opt_max_iter;
        self
    }

    /// Enable or disable environment re-seeding per evaluation.
    #[must_use]
    pub fn with_ctm_reinit(mut self, reinit: bool) -> Self {
        self.opt_ctm_reinit = reinit;
        self
    }

    /// Set the initial step length.
    #[must_use]
    pub fn with_lr(mut self, lr: f64) -> Self {
        self.lr = lr;
        self
    }

    /// Set both stopping tolerances.
    #[must_use]
    pub fn with_tolerances(mut self, tolerance_grad: f64, tolerance_change: f64) -> Self {
        self.tolerance_grad = tolerance_grad;
        self.tolerance_change = tolerance_change;
        self
    }
}

/// Trial state and output settings.
#[derive(Debug, Clone, PartialEq)]
pub struct StateArgs {
    /// Auxiliary bond dimension `D`.
    pub bond_dim: usize,
    /// Environment bond dimension `χ`.
    pub chi: usize,
    /// State file to start from.
    pub instate: Option<PathBuf>,
    /// Amplitude of uniform noise added to a loaded state.
    pub instate_noise: f64,
    /// Initialization when no state file is given; only `RANDOM` is known.
    pub ipeps_init_type: String,
    /// Prefix of output files.
    pub out_prefix: String,
}

impl Default for StateArgs {
    fn default() -> Self {
        Self {
            bond_dim: 1,
            chi: 20,
            instate: None,
            instate_noise: 0.0,
            ipeps_init_type: "RANDOM".to_string(),
            out_prefix: "output".to_string(),
        }
    }
}

impl StateArgs {
    /// Path of the checkpointed state.
    #[must_use]
    pub fn out_state_path(&self) -> PathBuf {
        PathBuf::from(format!("{}_state.json", self.out_prefix))
    }
}

/// Complete configuration of a run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Config {
    /// Process-wide settings.
    pub global: GlobalArgs,
    /// CTMRG settings.
    pub ctm: CtmArgs,
    /// Optimizer settings.
    pub opt: OptArgs,
    /// Trial state and output settings.
    pub state: StateArgs,
}

impl Config {
    /// Default configuration with the given `D` and `χ`.
    #[must_use]
    pub fn new(bond_dim: usize, chi: usize) -> Self {
        let mut cfg = Self::default();
        cfg.state.bond_dim = bond_dim;
        cfg.state.chi = chi;
        cfg
    }

    /// Replace the CTMRG settings.
    #[must_use]
    pub fn with_ctm(mut self, ctm: CtmArgs) -> Self {
        self.ctm = ctm;
        self
    }

    /// Replace the optimizer settings.
    #[must_use]
    pub fn with_opt(mut self, opt: OptArgs) -> Self {
        self.opt = opt;
        self
    }

    /// Set the output prefix.
    #[must_use]
    pub fn with_out_prefix(mut self, out_prefix: impl Into<String>) -> Self {
        self.state.out_prefix = out_prefix.into();
        self
    }

    /// Set the global seed.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.global.seed = seed;
        self
    }

    /// Check that the combination of settings can be run.
    pub fn validate(&self) -> Result<()> {
        if self.global.dtype != "float64" {
            return Err(Error::config(format!(
                "unsupported dtype {:?}, only float64 is available",
                self.global.dtype
            )));
        }
        if self.global.device != "cpu" {
            return Err(Error::config(format!(
                "unsupported device {:?}, only cpu is available",
                self.global.device
            )));
        }
        if self.state.bond_dim == 0 || self.state.chi == 0 {
            return Err(Error::config("bond_dim and chi must be positive"));
        }
        if self.ctm.ctm_max_iter == 0 {
            return Err(Error::config("ctm_max_iter must be positive"));
        }
        if !(self.ctm.ctm_conv_tol >= 0.0) {
            return Err(Error::config("ctm_conv_tol must be non-negative"));
        }
        if !(self.opt.lr > 0.0) {
            return Err(Error::config("lr must be positive"));
        }
        if self.opt.history_size == 0 {
            return Err(Error::config("history_size must be positive"));
        }
        if self.state.instate_noise < 0.0 {
            return Err(Error::config("instate_noise must be non-negative"));
        }
        Ok(())
    }
}
