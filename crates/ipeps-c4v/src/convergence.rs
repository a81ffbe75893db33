//! Convergence checks for the CTMRG loop.
//!
//! A check is called once per iteration, appends one fingerprint of the
//! current environment to the history and reports whether the last two
//! fingerprints are close enough.

use ipeps_tensor::{linalg, no_grad};
use tracing::debug;

use crate::config::CtmArgs;
use crate::env::EnvC4v;
use crate::error::{Error, Result};
use crate::ipeps::IpepsC4v;
use crate::models::Model;

/// Fingerprints recorded during one CTMRG run, oldest first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConvergenceHistory {
    entries: Vec<Vec<f64>>,
}

impl ConvergenceHistory {
    /// Empty history.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one fingerprint.
    pub fn push(&mut self, fingerprint: Vec<f64>) {
        self.entries.push(fingerprint);
    }

    /// Number of fingerprints.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no fingerprint has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All fingerprints, oldest first.
    #[must_use]
    pub fn entries(&self) -> &[Vec<f64>] {
        &self.entries
    }

    /// Most recent fingerprint.
    #[must_use]
    pub fn last(&self) -> Option<&[f64]> {
        self.entries.last().map(Vec::as_slice)
    }

    /// Euclidean distance between the last two fingerprints, if there are two.
    pub fn last_distance(&self) -> Result<Option<f64>> {
        let [.., prev, curr] = self.entries.as_slice() else {
            return Ok(None);
        };
        if prev.len() != curr.len() {
            return Err(Error::FingerprintMismatch {
                previous: prev.len(),
                current: curr.len(),
            });
        }
        let dist = prev
            .iter()
            .zip(curr)
            .map(|(a, b)| (a - b) * (a - b))
            .sum::<f64>()
            .sqrt();
        Ok(Some(dist))
    }
}

/// Decides after each CTM move whether the environment has converged.
///
/// Implementations must append exactly one entry to `history` per call; the
/// CTMRG loop aborts otherwise.
pub trait ConvergenceCheck {
    /// Record a fingerprint of `env` and report convergence.
    fn check(
        &self,
        state: &IpepsC4v,
        env: &EnvC4v,
        history: &mut ConvergenceHistory,
        ctm_args: &CtmArgs,
    ) -> Result<bool>;
}

fn compare_last_two(history: &ConvergenceHistory, ctm_args: &CtmArgs) -> Result<bool> {
    match history.last_distance()? {
        Some(dist) => {
            if ctm_args.verbose_convergence {
                debug!(iteration = history.len(), dist, "fingerprint distance");
            }
            Ok(dist < ctm_args.ctm_conv_tol)
        }
        None => Ok(false),
    }
}

/// Compares the singular value spectra of the corner between iterations.
#[derive(Debug, Clone, Copy, Default)]
pub struct SpectralDistance;

impl ConvergenceCheck for SpectralDistance {
    fn check(
        &self,
        _state: &IpepsC4v,
        env: &EnvC4v,
        history: &mut ConvergenceHistory,
        ctm_args: &CtmArgs,
    ) -> Result<bool> {
        let spectrum = no_grad(|| linalg::singular_values(env.c().value()))?;
        history.push(spectrum);
        compare_last_two(history, ctm_args)
    }
}

/// Compares the energy per site between iterations.
#[derive(Debug, Clone, Copy)]
pub struct EnergyDistance<'m, M> {
    model: &'m M,
}

impl<'m, M: Model> EnergyDistance<'m, M> {
    /// Check against the energy of `model`.
    #[must_use]
    pub fn new(model: &'m M) -> Self {
        Self { model }
    }
}

impl<M: Model> ConvergenceCheck for EnergyDistance<'_, M> {
    fn check(
        &self,
        state: &IpepsC4v,
        env: &EnvC4v,
        history: &mut ConvergenceHistory,
        ctm_args: &CtmArgs,
    ) -> Result<bool> {
        let energy = no_grad(|| -> Result<f64> { Ok(self.model.energy_1x1(state, env)?.item()?) })?;
        history.push(vec![energy]);
        compare_last_two(history, ctm_args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distance_needs_two_entries() {
        let mut h = ConvergenceHistory::new();
        assert_eq!(h.last_distance().unwrap(), None);
        h.push(vec![1.0, 0.5]);
        assert_eq!(h.last_distance().unwrap(), None);
        h.push(vec![1.0, 0.5 + 3e-3]);
        let d = h.last_distance().unwrap().unwrap();
        assert!((d - 3e-3).abs() < 1e-15);
    }

    #[test]
    fn test_length_mismatch_is_an_error() {
        let mut h = ConvergenceHistory::new();
        h.push(vec![1.0]);
        h.push(vec![1.0, 0.0]);
        assert!(matches!(
            h.last_distance(),
            Err(Error::FingerprintMismatch { previous: 1, current: 2 })
        ));
    }

    #[test]
    fn test_infinite_tolerance_accepts_second_entry() {
        let args = CtmArgs::default().with_conv_tol(f64::INFINITY);
        let mut h = ConvergenceHistory::new();
        h.push(vec![0.0]);
        assert!(!compare_last_two(&h, &args).unwrap());
        h.push(vec![1e9]);
        assert!(compare_last_two(&h, &args).unwrap());
    }
}
