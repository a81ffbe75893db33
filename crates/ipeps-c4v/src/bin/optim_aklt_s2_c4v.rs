//! Variational optimization of a C4v-symmetric iPEPS for the spin-2 AKLT
//! model.
//!
//! Usage: `optim-aklt-s2-c4v --bond-dim 2 --chi 16 --out-prefix aklt`
//!
//! Prints `epoch, energy, m, sz, sp, sm, SS2x1` rows on stdout: epoch `-1` for
//! the initial state, one per optimizer epoch, and a final row for the best
//! state re-read from `<out_prefix>_state.json`. Diagnostics go to stderr,
//! filtered by `RUST_LOG` (default `info`).

use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use ipeps_c4v::{
    ctmrg, init_env, initial_state, optim, read_ipeps, AkltS2C4vBipartite, C4vLoss, Config, CtmArgs,
    EnvC4v, EnvInit, GlobalArgs, IpepsC4v, Model, OptArgs, SpectralDistance, StateArgs,
};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

#[derive(Parser, Debug)]
#[command(
    name = "optim-aklt-s2-c4v",
    about = "Optimize a single-site C4v iPEPS for the spin-2 AKLT model"
)]
struct Cli {
    /// Auxiliary bond dimension
    #[arg(long, default_value_t = 1)]
    bond_dim: usize,
    /// Environment bond dimension
    #[arg(long, default_value_t = 20)]
    chi: usize,
    /// Initial state file
    #[arg(long)]
    instate: Option<PathBuf>,
    /// Noise added to the initial state
    #[arg(long, default_value_t = 0.0)]
    instate_noise: f64,
    /// Initialization when no state file is given
    #[arg(long, default_value = "RANDOM")]
    ipeps_init_type: String,
    /// Prefix of output files
    #[arg(long, default_value = "output")]
    out_prefix: String,
    /// Optimizer epochs
    #[arg(long, default_value_t = 100)]
    opt_max_iter: usize,
    /// Re-seed the environment at every loss evaluation
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    opt_ctm_reinit: bool,
    /// Initial step length
    #[arg(long, default_value_t = 1.0)]
    lr: f64,
    /// Gradient tolerance
    #[arg(long, default_value_t = 1e-5)]
    tolerance_grad: f64,
    /// Loss change tolerance
    #[arg(long, default_value_t = 1e-9)]
    tolerance_change: f64,
    /// L-BFGS history size
    #[arg(long, default_value_t = 100)]
    history_size: usize,
    /// Maximum step halvings per line search
    #[arg(long, default_value_t = 20)]
    max_line_search: usize,
    /// Maximum CTM moves per run
    #[arg(long, default_value_t = 50)]
    ctm_max_iter: usize,
    /// CTMRG convergence tolerance
    #[arg(long, default_value_t = 1e-10)]
    ctm_conv_tol: f64,
    /// Environment initialization: CTMRG, CONST or RANDOM
    #[arg(long, default_value = "CTMRG")]
    ctm_env_init_type: String,
    /// Log fingerprint distances of every CTM move
    #[arg(long)]
    verbose_ctm_convergence: bool,
    /// Worker threads for dense kernels
    #[arg(long, default_value_t = 1)]
    omp_cores: usize,
    /// Random seed
    #[arg(long, default_value_t = 1)]
    seed: u64,
    /// Numeric type
    #[arg(long, default_value = "float64")]
    dtype: String,
    /// Compute device
    #[arg(long, default_value = "cpu")]
    device: String,
}

impl Cli {
    fn into_config(self) -> Result<Config> {
        let mut env_init: EnvInit = self.ctm_env_init_type.parse()?;
        if let EnvInit::Random { seed } = &mut env_init {
            *seed = self.seed;
        }
        Ok(Config {
            global: GlobalArgs {
                seed: self.seed,
                omp_cores: self.omp_cores,
                dtype: self.dtype,
                device: self.device,
            },
            ctm: CtmArgs {
                ctm_max_iter: self.ctm_max_iter,
                ctm_conv_tol: self.ctm_conv_tol,
                ctm_env_init_type: env_init,
                verbose_convergence: self.verbose_ctm_convergence,
            },
            opt: OptArgs {
                opt_max_iter: self.opt_max_iter,
                opt_ctm_reinit: self.opt_ctm_reinit,
                lr: self.lr,
                tolerance_grad: self.tolerance_grad,
                tolerance_change: self.tolerance_change,
                history_size: self.history_size,
                max_line_search: self.max_line_search,
            },
            state: StateArgs {
                bond_dim: self.bond_dim,
                chi: self.chi,
                instate: self.instate,
                instate_noise: self.instate_noise,
                ipeps_init_type: self.ipeps_init_type,
                out_prefix: self.out_prefix,
            },
        })
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_writer(io::stderr);
    Registry::default().with(filter).with(fmt_layer).init();
}

/// Seed an environment for `state` and converge it.
fn converged_env(state: &IpepsC4v, cfg: &Config, conv: &SpectralDistance) -> Result<EnvC4v> {
    let mut env = EnvC4v::new(cfg.state.chi, state);
    init_env(state, &mut env, cfg.ctm.ctm_env_init_type)?;
    Ok(ctmrg::run(state, env, conv, &cfg.ctm)?.env)
}

fn main() -> Result<()> {
    init_tracing();
    let cfg = Cli::parse().into_config()?;
    cfg.validate()?;
    info!("{cfg:#?}");
    ipeps_tensor::set_num_threads(cfg.global.omp_cores);

    let model = AkltS2C4vBipartite::new()?;
    let mut rng = ChaCha8Rng::seed_from_u64(cfg.global.seed);
    let state = initial_state(&cfg, model.phys_dim(), &mut rng)?;
    info!("{state}");

    let conv = SpectralDistance;
    let stdout = io::stdout();
    let mut out = stdout.lock();

    let env = converged_env(&state, &cfg, &conv)?;
    let loss = model.energy_1x1(&state, &env)?.item()?;
    let (values, labels) = model.eval_obs(&state, &env)?;
    writeln!(out, "{}", optim::header_row(&labels))?;
    writeln!(out, "{}", optim::epoch_row(-1, loss, &values))?;

    let loss_fn = C4vLoss::new(&model, &conv, &cfg);
    let result = optim::optimize_state(&state, env, &loss_fn, &mut out)?;
    info!(best_loss = result.best_loss, epochs = result.epochs, "optimization finished");

    let path = cfg.state.out_state_path();
    let state = read_ipeps(&path).with_context(|| format!("failed to re-read {}", path.display()))?;
    let env = converged_env(&state, &cfg, &conv)?;
    let energy = model.energy_1x1(&state, &env)?.item()?;
    let (values, _) = model.eval_obs(&state, &env)?;
    writeln!(
        out,
        "{}",
        optim::epoch_row(cfg.opt.opt_max_iter as i64, energy, &values)
    )?;
    Ok(())
}
