//! Gradient optimization of the site tensor.
//!
//! L-BFGS with a backtracking Armijo line search. Every loss evaluation runs
//! a full CTMRG on a fresh gradient tape; the converged environment is
//! detached and handed to the next evaluation as a warm start. The best
//! state seen so far is checkpointed to `<out_prefix>_state.json`.

use std::collections::VecDeque;
use std::io::Write;

use ipeps_tensor::{DenseTensor, Tape, Tensor};
use tracing::{info, warn};

use crate::env::EnvC4v;
use crate::error::{Error, Result};
use crate::ipeps::IpepsC4v;
use crate::loss::C4vLoss;
use crate::models::Model;

/// Armijo sufficient-decrease constant.
const ARMIJO_C1: f64 = 1e-4;

/// Outcome of [`optimize_state`].
#[derive(Debug, Clone)]
pub struct OptimizationResult {
    /// Lowest loss observed.
    pub best_loss: f64,
    /// Symmetrized, normalized state achieving `best_loss`.
    pub best_state: IpepsC4v,
    /// Environment of the last accepted evaluation.
    pub env: EnvC4v,
    /// Epochs completed.
    pub epochs: usize,
}

/// Header row of the epoch log.
#[must_use]
pub fn header_row(labels: &[String]) -> String {
    let mut fields = vec!["epoch".to_string(), "energy".to_string()];
    fields.extend(labels.iter().cloned());
    fields.join(", ")
}

/// One row of the epoch log.
#[must_use]
pub fn epoch_row(epoch: i64, energy: f64, values: &[f64]) -> String {
    let mut fields = vec![epoch.to_string(), energy.to_string()];
    fields.extend(values.iter().map(f64::to_string));
    fields.join(", ")
}

struct Evaluation {
    loss: f64,
    grad: Vec<f64>,
    state: IpepsC4v,
    env: EnvC4v,
}

fn evaluate<M: Model>(
    loss_fn: &C4vLoss<'_, M>,
    dims: &[usize],
    x: &[f64],
    env: EnvC4v,
) -> Result<Evaluation> {
    let tape = Tape::new();
    let site = tape.leaf(DenseTensor::from_vec(dims.to_vec(), x.to_vec())?);
    let out = loss_fn.evaluate(&IpepsC4v::new(site.clone())?, env)?;
    let grads = out.loss.backward()?;
    Ok(Evaluation {
        loss: out.loss.item()?,
        grad: grads.wrt(&site).into_data(),
        state: out.state.detach(),
        env: out.env.detach(),
    })
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// `-H g` from the L-BFGS two-loop recursion over the stored pairs.
fn lbfgs_direction(grad: &[f64], s_hist: &VecDeque<Vec<f64>>, y_hist: &VecDeque<Vec<f64>>) -> Vec<f64> {
    let mut q = grad.to_vec();
    let rho: Vec<f64> = s_hist.iter().zip(y_hist).map(|(s, y)| 1.0 / dot(y, s)).collect();
    let mut alpha = vec![0.0; s_hist.len()];

    for i in (0..s_hist.len()).rev() {
        alpha[i] = rho[i] * dot(&s_hist[i], &q);
        for (qj, yj) in q.iter_mut().zip(&y_hist[i]) {
            *qj -= alpha[i] * yj;
        }
    }

    let gamma = match (s_hist.back(), y_hist.back()) {
        (Some(s), Some(y)) => dot(s, y) / dot(y, y),
        _ => 1.0,
    };
    for qj in &mut q {
        *qj *= gamma;
    }

    for i in 0..s_hist.len() {
        let beta = rho[i] * dot(&y_hist[i], &q);
        for (qj, sj) in q.iter_mut().zip(&s_hist[i]) {
            *qj += (alpha[i] - beta) * sj;
        }
    }

    q.iter().map(|v| -v).collect()
}

fn checkpoint(state: &IpepsC4v, loss_fn: &C4vLoss<'_, impl Model>) -> Result<IpepsC4v> {
    let best = state.normalized()?;
    best.write_to_file(loss_fn.config().state.out_state_path())?;
    Ok(best)
}

fn write_row(out: &mut dyn Write, row: &str) -> Result<()> {
    writeln!(out, "{row}").map_err(|source| Error::Io {
        path: "<log>".into(),
        source,
    })
}

/// Minimize the loss of `state` by L-BFGS.
///
/// `env` seeds the first CTMRG run. After every epoch a row
/// `epoch, energy, observables…` is written to `out`. Stops after
/// `opt_max_iter` epochs, when the largest gradient component drops to
/// `tolerance_grad`, when the loss changes by less than `tolerance_change`,
/// or when the line search finds no decrease.
pub fn optimize_state<M: Model>(
    state: &IpepsC4v,
    env: EnvC4v,
    loss_fn: &C4vLoss<'_, M>,
    out: &mut dyn Write,
) -> Result<OptimizationResult> {
    let args = &loss_fn.config().opt;
    let model = loss_fn.model();
    let dims = state.site().dims().to_vec();

    let mut x = state.site().value().data().to_vec();
    let mut current = evaluate(loss_fn, &dims, &x, env)?;
    let mut best_loss = current.loss;
    let mut best_state = checkpoint(&current.state, loss_fn)?;
    info!(loss = current.loss, "initial loss");

    let mut s_hist: VecDeque<Vec<f64>> = VecDeque::with_capacity(args.history_size);
    let mut y_hist: VecDeque<Vec<f64>> = VecDeque::with_capacity(args.history_size);
    let mut epochs = 0;

    for epoch in 0..args.opt_max_iter {
        let grad_max = current.grad.iter().fold(0.0f64, |m, g| m.max(g.abs()));
        if grad_max <= args.tolerance_grad {
            info!(epoch, grad_max, "gradient below tolerance_grad");
            break;
        }

        let first_step = || {
            let l1: f64 = current.grad.iter().map(|g| g.abs()).sum();
            (1.0f64).min(1.0 / l1) * args.lr
        };
        let mut direction = lbfgs_direction(&current.grad, &s_hist, &y_hist);
        let mut slope = dot(&current.grad, &direction);
        let mut step = if s_hist.is_empty() { first_step() } else { args.lr };
        if slope > -args.tolerance_change {
            // not a descent direction: drop curvature memory
            s_hist.clear();
            y_hist.clear();
            direction = current.grad.iter().map(|g| -g).collect();
            slope = -dot(&current.grad, &current.grad);
            step = first_step();
        }

        let mut accepted = None;
        for _ in 0..args.max_line_search.max(1) {
            let trial_x: Vec<f64> = x.iter().zip(&direction).map(|(xi, di)| xi + step * di).collect();
            let trial = evaluate(loss_fn, &dims, &trial_x, current.env.clone())?;
            if trial.loss.is_finite() && trial.loss <= current.loss + ARMIJO_C1 * step * slope {
                accepted = Some((trial_x, trial));
                break;
            }
            step *= 0.5;
        }
        let Some((new_x, next)) = accepted else {
            warn!(epoch, "line search found no decrease");
            break;
        };

        let s: Vec<f64> = new_x.iter().zip(&x).map(|(a, b)| a - b).collect();
        let y: Vec<f64> = next.grad.iter().zip(&current.grad).map(|(a, b)| a - b).collect();
        if dot(&s, &y) > 1e-10 {
            if s_hist.len() == args.history_size {
                s_hist.pop_front();
                y_hist.pop_front();
            }
            s_hist.push_back(s);
            y_hist.push_back(y);
        }

        let previous_loss = current.loss;
        x = new_x;
        current = next;
        epochs = epoch + 1;

        let (values, _) = model.eval_obs(&current.state, &current.env)?;
        write_row(out, &epoch_row(epoch as i64, current.loss, &values))?;
        info!(epoch, loss = current.loss, step, "epoch finished");

        if current.loss < best_loss {
            best_loss = current.loss;
            best_state = checkpoint(&current.state, loss_fn)?;
        }
        if (current.loss - previous_loss).abs() < args.tolerance_change {
            info!(epoch, "loss change below tolerance_change");
            break;
        }
    }

    Ok(OptimizationResult {
        best_loss,
        best_state,
        env: current.env,
        epochs,
    })
}

/// Gradient of the loss at `state` with respect to its site tensor.
pub fn loss_gradient<M: Model>(
    loss_fn: &C4vLoss<'_, M>,
    state: &IpepsC4v,
    env: EnvC4v,
) -> Result<(f64, DenseTensor)> {
    let dims = state.site().dims().to_vec();
    let eval = evaluate(loss_fn, &dims, state.site().value().data(), env)?;
    Ok((eval.loss, DenseTensor::from_vec(dims, eval.grad)?))
}

/// Loss at `state` without recording gradients.
pub fn loss_value<M: Model>(loss_fn: &C4vLoss<'_, M>, state: &IpepsC4v, env: EnvC4v) -> Result<f64> {
    let state = IpepsC4v::new(Tensor::constant(state.site().value().clone()))?;
    Ok(loss_fn.evaluate(&state, env)?.loss.item()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_rows() {
        let labels = vec!["m".to_string(), "sz".to_string()];
        assert_eq!(header_row(&labels), "epoch, energy, m, sz");
        assert_eq!(epoch_row(-1, 0.5, &[0.25, -1.0]), "-1, 0.5, 0.25, -1");
    }

    #[test]
    fn test_two_loop_without_history_is_steepest_descent() {
        let g = vec![1.0, -2.0];
        let d = lbfgs_direction(&g, &VecDeque::new(), &VecDeque::new());
        assert_eq!(d, vec![-1.0, 2.0]);
    }

    #[test]
    fn test_two_loop_recovers_quadratic_newton_step() {
        // f = x0² + 4 x1², H = diag(2, 8); pairs along both axes pin H exactly
        let s: VecDeque<Vec<f64>> = vec![vec![1.0, 0.0], vec![0.0, 1.0]].into();
        let y: VecDeque<Vec<f64>> = vec![vec![2.0, 0.0], vec![0.0, 8.0]].into();
        let g = vec![2.0, 8.0];
        let d = lbfgs_direction(&g, &s, &y);
        assert_relative_eq!(d[0], -1.0, epsilon = 1e-14);
        assert_relative_eq!(d[1], -1.0, epsilon = 1e-14);
    }
}
