//! Lattice models evaluated on a C4v environment.

mod aklt_s2;
mod spin;

pub use aklt_s2::AkltS2C4vBipartite;
pub use spin::{rotate_second_site, two_site_product, SpinOps};

use ipeps_tensor::Tensor;

use crate::env::EnvC4v;
use crate::error::Result;
use crate::ipeps::IpepsC4v;

/// Observable values paired with their labels, in a fixed order.
pub type Observables = (Vec<f64>, Vec<String>);

/// Energy and observables of a translation-invariant model.
pub trait Model {
    /// Dimension of the local Hilbert space.
    fn phys_dim(&self) -> usize;

    /// Energy per site as a differentiable scalar.
    fn energy_1x1(&self, state: &IpepsC4v, env: &EnvC4v) -> Result<Tensor>;

    /// Observable values and labels, evaluated without gradient tracking.
    ///
    /// The labels and their order do not depend on the state.
    fn eval_obs(&self, state: &IpepsC4v, env: &EnvC4v) -> Result<Observables>;
}
