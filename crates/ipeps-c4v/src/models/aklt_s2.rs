use ipeps_tensor::{no_grad, DenseTensor, Tensor};

use super::spin::{rotate_second_site, two_site_product, SpinOps};
use super::{Model, Observables};
use crate::env::EnvC4v;
use crate::error::Result;
use crate::ipeps::IpepsC4v;
use crate::rdm::{rdm1x1, rdm2x1};

/// Spin-2 AKLT model on the square lattice with a bipartite sublattice
/// rotation.
///
/// The bond Hamiltonian is
/// `h = (S·S + 7/10 (S·S)² + 7/45 (S·S)³ + 1/90 (S·S)⁴) / 14`, which is twice
/// the projector onto total spin 4 of the two sites. The second site of every
/// bond is rotated by `exp(-iπSʸ)`, so a single C4v-symmetric tensor can
/// describe the antiferromagnetic sublattice structure.
#[derive(Debug, Clone)]
pub struct AkltS2C4vBipartite {
    h2_rot: Tensor,
    ss_rot: Tensor,
    obs_ops: Vec<(&'static str, Tensor)>,
}

impl AkltS2C4vBipartite {
    const PHYS_DIM: usize = 5;

    /// Build the rotated bond operators.
    pub fn new() -> Result<Self> {
        let ops = SpinOps::new(Self::PHYS_DIM)?;
        let ss = ops.ss();
        let ss2 = two_site_product(&ss, &ss)?;
        let ss3 = two_site_product(&ss2, &ss)?;
        let ss4 = two_site_product(&ss3, &ss)?;
        let h2 = ss
            .add(&ss2.scale(7.0 / 10.0))?
            .add(&ss3.scale(7.0 / 45.0))?
            .add(&ss4.scale(1.0 / 90.0))?
            .scale(1.0 / 14.0);

        let rot = ops.rot_op();
        Ok(Self {
            h2_rot: Tensor::constant(rotate_second_site(&h2, &rot)),
            ss_rot: Tensor::constant(rotate_second_site(&ss, &rot)),
            obs_ops: vec![
                ("sz", Tensor::constant(ops.sz())),
                ("sp", Tensor::constant(ops.sp())),
                ("sm", Tensor::constant(ops.sm())),
            ],
        })
    }

    /// Rotated bond Hamiltonian `h[s1, s2, s1', s2']`.
    #[must_use]
    pub fn bond_hamiltonian(&self) -> &DenseTensor {
        self.h2_rot.value()
    }
}

/// `Tr(ρ O)` for a two-site density matrix and operator.
fn two_site_expectation(rdm: &Tensor, op: &Tensor) -> Result<Tensor> {
    Ok(rdm.contract(&[0, 1, 2, 3], op, &[2, 3, 0, 1])?)
}

impl Model for AkltS2C4vBipartite {
    fn phys_dim(&self) -> usize {
        Self::PHYS_DIM
    }

    fn energy_1x1(&self, state: &IpepsC4v, env: &EnvC4v) -> Result<Tensor> {
        // two bonds per site
        let rdm = rdm2x1(state, env)?;
        Ok(two_site_expectation(&rdm, &self.h2_rot)?.scale(2.0)?)
    }

    fn eval_obs(&self, state: &IpepsC4v, env: &EnvC4v) -> Result<Observables> {
        no_grad(|| {
            let rdm1 = rdm1x1(state, env)?;
            let mut onsite = Vec::with_capacity(self.obs_ops.len());
            for (_, op) in &self.obs_ops {
                onsite.push(rdm1.contract(&[0, 1], op, &[1, 0])?.item()?);
            }
            let (sz, sp, sm) = (onsite[0], onsite[1], onsite[2]);
            let m = (sz * sz + sp * sm).abs().sqrt();

            let rdm2 = rdm2x1(state, env)?;
            let ss = two_site_expectation(&rdm2, &self.ss_rot)?.item()?;

            let mut values = vec![m];
            values.extend(onsite);
            values.push(ss);

            let mut labels = vec!["m".to_string()];
            labels.extend(self.obs_ops.iter().map(|(label, _)| label.to_string()));
            labels.push("SS2x1".to_string());
            Ok((values, labels))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_bond_hamiltonian_is_twice_a_projector() {
        let model = AkltS2C4vBipartite::new().unwrap();
        let h = model.bond_hamiltonian().reshape(&[25, 25]).unwrap();
        let h2 = h.contract(&[1], &h, &[0]).unwrap();
        for (x, y) in h2.data().iter().zip(h.scale(2.0).data()) {
            assert_relative_eq!(x, y, epsilon = 1e-10);
        }
        // the total spin 4 multiplet has 9 states
        let tr: f64 = h.diagonal().unwrap().iter().sum();
        assert_relative_eq!(tr, 18.0, epsilon = 1e-10);
    }

    #[test]
    fn test_bond_hamiltonian_is_symmetric() {
        let model = AkltS2C4vBipartite::new().unwrap();
        let h = model.bond_hamiltonian().reshape(&[25, 25]).unwrap();
        for i in 0..25 {
            for j in 0..25 {
                assert_relative_eq!(h.get(&[i, j]), h.get(&[j, i]), epsilon = 1e-12);
            }
        }
    }
}
