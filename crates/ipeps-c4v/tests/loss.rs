use approx::assert_abs_diff_eq;
use ipeps_c4v::ctmrg;
use ipeps_c4v::symmetry::{c4v_asymmetry, make_c4v_symm};
use ipeps_c4v::{
    init_env, AkltS2C4vBipartite, C4vLoss, Config, CtmArgs, EnvC4v, EnvInit, Error, IpepsC4v,
    Model, OptArgs, SpectralDistance,
};
use ipeps_tensor::{DenseTensor, Tensor, TensorError};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

fn random_state(bond_dim: usize, seed: u64) -> IpepsC4v {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    IpepsC4v::random(&mut rng, 5, bond_dim).unwrap()
}

/// Random state without C4v projection.
fn raw_state(bond_dim: usize, seed: u64) -> IpepsC4v {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let d = bond_dim;
    IpepsC4v::new(Tensor::constant(DenseTensor::random(&mut rng, &[5, d, d, d, d]))).unwrap()
}

fn config(chi: usize, bond_dim: usize) -> Config {
    Config::new(bond_dim, chi).with_ctm(CtmArgs::default().with_max_iter(200).with_conv_tol(1e-10))
}

/// Converge an environment for `state` from a CTMRG seed.
fn converged_env(state: &IpepsC4v, chi: usize, ctm_args: &CtmArgs) -> EnvC4v {
    let mut env = EnvC4v::new(chi, state);
    init_env(state, &mut env, EnvInit::Ctmrg).unwrap();
    ctmrg::run(state, env, &SpectralDistance, ctm_args).unwrap().env
}

#[test]
fn test_energy_invariant_under_resymmetrization() {
    let cfg = config(4, 2);
    let model = AkltS2C4vBipartite::new().unwrap();
    let state = random_state(2, 1);
    let env = converged_env(&state, 4, &cfg.ctm);

    let resymm = IpepsC4v::new(make_c4v_symm(state.site()).unwrap()).unwrap();
    let e = model.energy_1x1(&state, &env).unwrap().item().unwrap();
    let e_resymm = model.energy_1x1(&resymm, &env).unwrap().item().unwrap();
    assert_abs_diff_eq!(e, e_resymm, epsilon = 1e-12);
}

#[test]
fn test_loss_symmetrizes_raw_state() {
    let cfg = config(4, 2);
    let model = AkltS2C4vBipartite::new().unwrap();
    let loss_fn = C4vLoss::new(&model, &SpectralDistance, &cfg);

    let state = raw_state(2, 1);
    assert!(c4v_asymmetry(state.site().value()).unwrap() > 1e-3);
    let symm = state.symmetrized().unwrap();

    let e_raw = loss_fn.evaluate(&state, EnvC4v::new(4, &state)).unwrap();
    let e_sym = loss_fn.evaluate(&symm, EnvC4v::new(4, &symm)).unwrap();
    assert!(c4v_asymmetry(e_raw.state.site().value()).unwrap() < 1e-14);
    assert_abs_diff_eq!(
        e_raw.loss.item().unwrap(),
        e_sym.loss.item().unwrap(),
        epsilon = 1e-8
    );
}

#[test]
fn test_eval_obs_labels_are_stable() {
    let cfg = config(4, 2);
    let model = AkltS2C4vBipartite::new().unwrap();
    let mut labels_seen = Vec::new();
    for seed in [2, 3] {
        let state = random_state(2, seed);
        let mut env = EnvC4v::new(4, &state);
        init_env(&state, &mut env, EnvInit::Ctmrg).unwrap();
        let out = ctmrg::run(&state, env, &SpectralDistance, &cfg.ctm).unwrap();
        let (values, labels) = model.eval_obs(&state, &out.env).unwrap();
        assert_eq!(values.len(), labels.len());
        assert!(values.iter().all(|v| v.is_finite()));
        // m = sqrt|sz² + sp·sm|
        let (sz, sp, sm) = (values[1], values[2], values[3]);
        assert_abs_diff_eq!(values[0], (sz * sz + sp * sm).abs().sqrt(), epsilon = 1e-14);
        labels_seen.push(labels);
    }
    assert_eq!(labels_seen[0], vec!["m", "sz", "sp", "sm", "SS2x1"]);
    assert_eq!(labels_seen[0], labels_seen[1]);
}

#[test]
fn test_end_to_end_chi_one() {
    let cfg = config(1, 2).with_ctm(CtmArgs::default().with_max_iter(200).with_conv_tol(1e-8));
    let model = AkltS2C4vBipartite::new().unwrap();
    let loss_fn = C4vLoss::new(&model, &SpectralDistance, &cfg);
    let state = random_state(2, 4);

    let first = loss_fn.evaluate(&state, EnvC4v::new(1, &state)).unwrap();
    assert!(first.status.is_converged());
    assert!(first.history.len() >= 2);
    let energy = first.loss.item().unwrap();
    assert!(energy.is_finite());

    let second = loss_fn.evaluate(&state, EnvC4v::new(1, &state)).unwrap();
    assert_eq!(energy, second.loss.item().unwrap());
    assert_eq!(first.history, second.history);

    // warm start from the converged environment
    let cfg_warm = cfg.clone().with_opt(OptArgs::default().with_ctm_reinit(false));
    let warm = C4vLoss::new(&model, &SpectralDistance, &cfg_warm);
    let hot = warm.evaluate(&state, first.env.detach()).unwrap();
    assert!(hot.status.is_converged());
    assert_abs_diff_eq!(energy, hot.loss.item().unwrap(), epsilon = 1e-6);
}

#[test]
fn test_warm_start_from_zero_environment_is_rejected() {
    let cfg = config(3, 2).with_opt(OptArgs::default().with_ctm_reinit(false));
    let model = AkltS2C4vBipartite::new().unwrap();
    let loss_fn = C4vLoss::new(&model, &SpectralDistance, &cfg);
    let state = random_state(2, 7);

    let err = loss_fn.evaluate(&state, EnvC4v::new(3, &state)).unwrap_err();
    assert!(matches!(err, Error::Tensor(TensorError::ZeroNorm { .. })));
}

#[test]
fn test_reinit_and_warm_start_agree_at_fixed_point() {
    let model = AkltS2C4vBipartite::new().unwrap();
    let state = random_state(2, 5);

    let cfg_reinit = config(4, 2);
    let reinit = C4vLoss::new(&model, &SpectralDistance, &cfg_reinit);
    let cold = reinit.evaluate(&state, EnvC4v::new(4, &state)).unwrap();
    assert!(cold.status.is_converged());

    let cfg_warm = config(4, 2).with_opt(OptArgs::default().with_ctm_reinit(false));
    let warm = C4vLoss::new(&model, &SpectralDistance, &cfg_warm);
    let hot = warm.evaluate(&state, cold.env.detach()).unwrap();
    assert!(hot.status.is_converged());

    assert_abs_diff_eq!(
        cold.loss.item().unwrap(),
        hot.loss.item().unwrap(),
        epsilon = 1e-6
    );
}

#[test]
fn test_aklt_energy_is_non_negative_for_converged_state() {
    // h is positive semi-definite, so up to environment error so is its mean
    let cfg = config(8, 2);
    let model = AkltS2C4vBipartite::new().unwrap();
    let loss_fn = C4vLoss::new(&model, &SpectralDistance, &cfg);
    let state = random_state(2, 6);
    let out = loss_fn.evaluate(&state, EnvC4v::new(8, &state)).unwrap();
    assert!(out.loss.item().unwrap() > -1e-6);
}
