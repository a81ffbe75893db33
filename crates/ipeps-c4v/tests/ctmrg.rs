use ipeps_c4v::ctmrg::{self, CtmrgStatus};
use ipeps_c4v::{
    init_env, AkltS2C4vBipartite, ConvergenceCheck, ConvergenceHistory, CtmArgs, EnergyDistance,
    EnvC4v, EnvInit, Error, IpepsC4v, Result, SpectralDistance,
};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

fn seeded(chi: usize, bond_dim: usize, seed: u64) -> (IpepsC4v, EnvC4v) {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let state = IpepsC4v::random(&mut rng, 5, bond_dim).unwrap();
    let mut env = EnvC4v::new(chi, &state);
    init_env(&state, &mut env, EnvInit::Ctmrg).unwrap();
    (state, env)
}

/// Claims convergence on every call.
struct AlwaysConverged;

impl ConvergenceCheck for AlwaysConverged {
    fn check(
        &self,
        _state: &IpepsC4v,
        _env: &EnvC4v,
        history: &mut ConvergenceHistory,
        _ctm_args: &CtmArgs,
    ) -> Result<bool> {
        history.push(vec![0.0]);
        Ok(true)
    }
}

/// Forgets to record a fingerprint.
struct Forgetful;

impl ConvergenceCheck for Forgetful {
    fn check(
        &self,
        _state: &IpepsC4v,
        _env: &EnvC4v,
        _history: &mut ConvergenceHistory,
        _ctm_args: &CtmArgs,
    ) -> Result<bool> {
        Ok(false)
    }
}

#[test]
fn test_run_is_deterministic() {
    let args = CtmArgs::default().with_max_iter(20).with_conv_tol(1e-12);
    let (state, env) = seeded(4, 2, 1);
    let first = ctmrg::run(&state, env.clone(), &SpectralDistance, &args).unwrap();
    let second = ctmrg::run(&state, env, &SpectralDistance, &args).unwrap();
    assert_eq!(first.history, second.history);
    assert_eq!(first.status, second.status);
    assert_eq!(first.env.c().value().data(), second.env.c().value().data());
    assert_eq!(first.env.t().value().data(), second.env.t().value().data());
}

#[test]
fn test_history_has_one_entry_per_iteration() {
    let args = CtmArgs::default().with_max_iter(7).with_conv_tol(0.0);
    let (state, env) = seeded(4, 2, 2);
    let out = ctmrg::run(&state, env, &SpectralDistance, &args).unwrap();
    assert_eq!(out.status, CtmrgStatus::MaxIterationsReached { iterations: 7 });
    assert_eq!(out.history.len(), 7);
    assert!(out.history.entries().iter().all(|s| s.len() == 4));
}

#[test]
fn test_infinite_tolerance_stops_after_two_iterations() {
    let args = CtmArgs::default().with_conv_tol(f64::INFINITY);
    let (state, env) = seeded(3, 2, 3);
    let out = ctmrg::run(&state, env, &SpectralDistance, &args).unwrap();
    assert_eq!(out.status, CtmrgStatus::Converged { iterations: 2 });
    assert_eq!(out.history.len(), 2);
}

#[test]
fn test_never_converged_on_first_iteration() {
    let (state, env) = seeded(3, 2, 4);
    let out = ctmrg::run(&state, env, &AlwaysConverged, &CtmArgs::default()).unwrap();
    assert_eq!(out.status, CtmrgStatus::Converged { iterations: 2 });

    let (state, env) = seeded(3, 2, 4);
    let args = CtmArgs::default().with_max_iter(1);
    let out = ctmrg::run(&state, env, &AlwaysConverged, &args).unwrap();
    assert_eq!(out.status, CtmrgStatus::MaxIterationsReached { iterations: 1 });
    assert!(!out.status.is_converged());
}

#[test]
fn test_check_must_record_a_fingerprint() {
    let (state, env) = seeded(3, 2, 5);
    let err = ctmrg::run(&state, env, &Forgetful, &CtmArgs::default()).unwrap_err();
    assert!(matches!(err, Error::HistoryContract { iteration: 1, len: 0 }));
}

#[test]
fn test_spectral_distance_converges() {
    let args = CtmArgs::default().with_max_iter(200).with_conv_tol(1e-9);
    let (state, env) = seeded(4, 2, 6);
    let out = ctmrg::run(&state, env, &SpectralDistance, &args).unwrap();
    assert!(out.status.is_converged());
    assert_eq!(out.history.len(), out.status.iterations());
    let dist = out.history.last_distance().unwrap().unwrap();
    assert!(dist < 1e-9);
}

#[test]
fn test_energy_distance_records_scalars() {
    let model = AkltS2C4vBipartite::new().unwrap();
    let check = EnergyDistance::new(&model);
    let args = CtmArgs::default().with_max_iter(200).with_conv_tol(1e-10);
    let (state, env) = seeded(4, 2, 7);
    let out = ctmrg::run(&state, env, &check, &args).unwrap();
    assert!(out.status.is_converged());
    assert!(out.history.entries().iter().all(|e| e.len() == 1 && e[0].is_finite()));
}
