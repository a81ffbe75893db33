use approx::assert_relative_eq;
use ipeps_tensor::{DenseTensor, Tape, Tensor, TensorError};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

/// Central finite-difference gradient of `f` at `x`.
fn numeric_grad<F>(x: &DenseTensor, f: F) -> DenseTensor
where
    F: Fn(&Tensor) -> Tensor,
{
    let h = 1e-6;
    let mut grad = DenseTensor::zeros(x.dims());
    for i in 0..x.len() {
        let mut plus = x.clone();
        plus.data_mut()[i] += h;
        let mut minus = x.clone();
        minus.data_mut()[i] -= h;
        let fp = f(&Tensor::constant(plus)).item().unwrap();
        let fm = f(&Tensor::constant(minus)).item().unwrap();
        grad.data_mut()[i] = (fp - fm) / (2.0 * h);
    }
    grad
}

fn check_gradient<F>(x: DenseTensor, f: F, tol: f64)
where
    F: Fn(&Tensor) -> Tensor,
{
    let tape = Tape::new();
    let leaf = tape.leaf(x.clone());
    let y = f(&leaf);
    let grads = y.backward().expect("backward should succeed");
    let analytic = grads.wrt(&leaf);
    let numeric = numeric_grad(&x, &f);
    for (a, n) in analytic.data().iter().zip(numeric.data()) {
        assert_relative_eq!(a, n, epsilon = tol, max_relative = tol);
    }
}

fn random(dims: &[usize], seed: u64) -> DenseTensor {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    DenseTensor::random(&mut rng, dims).scale(2.0).sub(&DenseTensor::ones(dims)).unwrap()
}

#[test]
fn test_contract_gradient_with_permuted_axes() {
    let b = Tensor::constant(random(&[4, 2, 3], 1));
    let w = Tensor::constant(random(&[2, 2], 2));
    check_gradient(
        random(&[3, 2, 4], 3),
        |a| {
            let c = a.contract(&[2, 0], &b, &[0, 2]).unwrap();
            c.contract(&[0, 1], &w, &[1, 0]).unwrap()
        },
        1e-6,
    );
}

#[test]
fn test_contract_gradient_second_operand() {
    let a = Tensor::constant(random(&[3, 2, 4], 4));
    check_gradient(
        random(&[4, 5, 3], 5),
        |b| {
            let c = a.contract(&[0, 2], b, &[2, 0]).unwrap();
            c.contract(&[0, 1], &c, &[0, 1]).unwrap()
        },
        1e-6,
    );
}

#[test]
fn test_permute_reshape_resize_gradient() {
    let w = Tensor::constant(random(&[3, 6], 6));
    check_gradient(
        random(&[2, 3, 2], 7),
        |x| {
            let y = x.permute(&[1, 2, 0]).unwrap().reshape(&[3, 4]).unwrap();
            let y = y.resized(&[3, 6]).unwrap();
            y.contract(&[0, 1], &w, &[0, 1]).unwrap()
        },
        1e-6,
    );
}

#[test]
fn test_max_abs_normalization_gradient() {
    let w = Tensor::constant(random(&[5], 8));
    check_gradient(
        DenseTensor::from_vec(vec![5], vec![0.3, -0.9, 0.1, 0.5, -0.2]).unwrap(),
        |x| {
            let y = x.normalize_max_abs().unwrap();
            y.contract(&[0], &w, &[0]).unwrap()
        },
        1e-6,
    );
}

#[test]
fn test_max_abs_normalization_rejects_zero_tensor() {
    let tape = Tape::new();
    let x = tape.leaf(DenseTensor::zeros(&[3, 3]));
    assert!(matches!(
        x.normalize_max_abs(),
        Err(TensorError::ZeroNorm { .. })
    ));
}

#[test]
fn test_truncated_eigh_gradient() {
    // Sign-invariant functions of the kept eigenpairs.
    let weights = Tensor::constant(random(&[5, 5], 9).add(&DenseTensor::identity(5)).unwrap());
    check_gradient(
        random(&[5, 5], 10),
        |m| {
            let sym = m.symmetrize_matrix().unwrap();
            let (values, vectors) = sym.eigh_truncated(3).unwrap();
            let c = values.diag().unwrap();
            let projected = vectors.contract(&[0], &weights, &[0]).unwrap();
            let projected = projected.contract(&[1], &vectors, &[0]).unwrap();
            let a = projected.contract(&[0, 1], &c, &[0, 1]).unwrap();
            let b = values.contract(&[0], &values, &[0]).unwrap();
            a.add(&b).unwrap()
        },
        1e-5,
    );
}

#[test]
fn test_eigh_truncated_orders_by_magnitude() {
    let m = Tensor::constant(DenseTensor::diag(&[0.5, -3.0, 2.0, 0.1]));
    let (values, vectors) = m.eigh_truncated(2).unwrap();
    assert_eq!(values.dims(), &[2]);
    assert_eq!(vectors.dims(), &[4, 2]);
    assert_relative_eq!(values.value().data()[0], -3.0, epsilon = 1e-12);
    assert_relative_eq!(values.value().data()[1], 2.0, epsilon = 1e-12);
    assert_relative_eq!(vectors.value().get(&[1, 0]).abs(), 1.0, epsilon = 1e-12);
}
