use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use ipeps_c4v::contraction::double_layer;
use ipeps_c4v::ctmrg::ctm_move;
use ipeps_c4v::{init_env, EnvC4v, EnvInit, IpepsC4v};
use ipeps_tensor::Tape;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

/// Random C4v state with a seeded environment
fn seeded(bond_dim: usize, chi: usize, seed: u64) -> (IpepsC4v, EnvC4v) {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let state = IpepsC4v::random(&mut rng, 5, bond_dim).unwrap();
    let mut env = EnvC4v::new(chi, &state);
    init_env(&state, &mut env, EnvInit::Ctmrg).unwrap();
    (state, env)
}

fn bench_ctm_move(c: &mut Criterion) {
    let mut group = c.benchmark_group("ctm_move");

    for &(bond_dim, chi) in &[(2, 16), (2, 32), (3, 27), (3, 54)] {
        let id = format!("D{bond_dim}_chi{chi}");
        let (state, env) = seeded(bond_dim, chi, 42);
        let a = double_layer(state.site()).unwrap();

        group.bench_with_input(BenchmarkId::new("forward", &id), &(), |b, _| {
            b.iter(|| ctm_move(&a, &env).unwrap());
        });

        group.bench_with_input(BenchmarkId::new("forward_backward", &id), &(), |b, _| {
            b.iter(|| {
                let tape = Tape::new();
                let site = tape.leaf(state.site().value().clone());
                let tracked = IpepsC4v::new(site.clone()).unwrap();
                let a = double_layer(tracked.site()).unwrap();
                let next = ctm_move(&a, &env).unwrap();
                let c = next.c();
                let loss = c.contract(&[0, 1], c, &[0, 1]).unwrap();
                loss.backward().unwrap().wrt(&site)
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_ctm_move);
criterion_main!(benches);
