//! Spin operators in the `|S, m⟩` basis ordered `m = S, S-1, …, -S`.

use ipeps_tensor::DenseTensor;

use crate::error::{Error, Result};

/// Spin-`S` operators of dimension `2S + 1`.
#[derive(Debug, Clone, Copy)]
pub struct SpinOps {
    dim: usize,
}

impl SpinOps {
    /// Operators for a `dim = 2S + 1` dimensional irrep.
    pub fn new(dim: usize) -> Result<Self> {
        if dim == 0 {
            return Err(Error::config("spin irrep dimension must be positive"));
        }
        Ok(Self { dim })
    }

    /// Irrep dimension `2S + 1`.
    #[must_use]
    pub fn dim(&self) -> usize {
        self.dim
    }

    fn spin(&self) -> f64 {
        (self.dim as f64 - 1.0) / 2.0
    }

    fn m(&self, i: usize) -> f64 {
        self.spin() - i as f64
    }

    /// Identity.
    #[must_use]
    pub fn identity(&self) -> DenseTensor {
        DenseTensor::identity(self.dim)
    }

    /// `Sᶻ = diag(S, …, -S)`.
    #[must_use]
    pub fn sz(&self) -> DenseTensor {
        let m: Vec<f64> = (0..self.dim).map(|i| self.m(i)).collect();
        DenseTensor::diag(&m)
    }

    /// Raising operator `S⁺|m⟩ = sqrt(S(S+1) - m(m+1)) |m+1⟩`.
    #[must_use]
    pub fn sp(&self) -> DenseTensor {
        let s = self.spin();
        DenseTensor::from_fn(&[self.dim, self.dim], |idx| {
            let (row, col) = (idx[0], idx[1]);
            if row + 1 == col {
                let m = self.m(col);
                (s * (s + 1.0) - m * (m + 1.0)).sqrt()
            } else {
                0.0
            }
        })
    }

    /// Lowering operator `S⁻ = (S⁺)ᵀ`.
    #[must_use]
    pub fn sm(&self) -> DenseTensor {
        let sp = self.sp();
        DenseTensor::from_fn(&[self.dim, self.dim], |idx| sp.get(&[idx[1], idx[0]]))
    }

    /// `exp(-iπSʸ)`, real for integer spin: `|m⟩ ↦ (-1)^(S-m) |-m⟩`.
    #[must_use]
    pub fn rot_op(&self) -> DenseTensor {
        let n = self.dim;
        DenseTensor::from_fn(&[n, n], |idx| {
            if idx[0] + idx[1] + 1 == n {
                if idx[0] % 2 == 0 {
                    1.0
                } else {
                    -1.0
                }
            } else {
                0.0
            }
        })
    }

    /// Heisenberg coupling `S·S` on two sites, `O[s1, s2, s1', s2']`.
    #[must_use]
    pub fn ss(&self) -> DenseTensor {
        let (sz, sp, sm) = (self.sz(), self.sp(), self.sm());
        let n = self.dim;
        DenseTensor::from_fn(&[n, n, n, n], |i| {
            let (a, b, c, d) = (i[0], i[1], i[2], i[3]);
            sz.get(&[a, c]) * sz.get(&[b, d])
                + 0.5 * (sp.get(&[a, c]) * sm.get(&[b, d]) + sm.get(&[a, c]) * sp.get(&[b, d]))
        })
    }
}

/// Two-site operator `O[s1, s2, s1', s2']` conjugated by `rot` on the
/// second site.
pub fn rotate_second_site(op: &DenseTensor, rot: &DenseTensor) -> DenseTensor {
    let n = rot.dims()[0];
    DenseTensor::from_fn(&[n, n, n, n], |i| {
        let mut acc = 0.0;
        for t in 0..n {
            let r1 = rot.get(&[i[1], t]);
            if r1 == 0.0 {
                continue;
            }
            for u in 0..n {
                acc += r1 * op.get(&[i[0], t, i[2], u]) * rot.get(&[i[3], u]);
            }
        }
        acc
    })
}

/// Product of two-site operators as `[n², n²]` matrices.
pub fn two_site_product(a: &DenseTensor, b: &DenseTensor) -> Result<DenseTensor> {
    let n = a.dims()[0];
    let ab = a
        .reshape(&[n * n, n * n])?
        .contract(&[1], &b.reshape(&[n * n, n * n])?, &[0])?;
    Ok(ab.reshape(&[n, n, n, n])?)
}
