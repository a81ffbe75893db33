//! Reverse-mode automatic differentiation.
//!
//! A [`Tape`] records every operation whose inputs require gradients. Each
//! recorded node owns what its adjoint needs (saved operands, eigenpairs), and
//! [`Tensor::backward`] replays the nodes in reverse, accumulating gradients
//! per tracked value. Tensors that do not descend from a tape leaf are plain
//! constants and never touch a tape.
//!
//! Recording can be suspended for a scope with [`no_grad`]; anything computed
//! inside is a constant.

mod ops;

pub use ops::EIGH_BROADENING;

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use crate::dense::DenseTensor;
use crate::error::{Result, TensorError};

use ops::Op;

thread_local! {
    static GRAD_ENABLED: Cell<bool> = const { Cell::new(true) };
}

/// Whether operations are currently being recorded.
#[must_use]
pub fn is_grad_enabled() -> bool {
    GRAD_ENABLED.with(Cell::get)
}

/// Run `f` with recording suspended on this thread.
pub fn no_grad<R>(f: impl FnOnce() -> R) -> R {
    let _guard = NoGradGuard::new();
    f()
}

struct NoGradGuard {
    previous: bool,
}

impl NoGradGuard {
    fn new() -> Self {
        let previous = GRAD_ENABLED.with(|g| g.replace(false));
        Self { previous }
    }
}

impl Drop for NoGradGuard {
    fn drop(&mut self) {
        GRAD_ENABLED.with(|g| g.set(self.previous));
    }
}

type VarId = usize;

struct Node {
    op: Op,
    inputs: Vec<Option<VarId>>,
    outputs: Vec<VarId>,
}

#[derive(Default)]
struct TapeInner {
    num_vars: usize,
    nodes: Vec<Node>,
}

/// Linear record of differentiable operations.
#[derive(Default)]
pub struct Tape {
    inner: RefCell<TapeInner>,
}

impl fmt::Debug for Tape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("Tape")
            .field("num_vars", &inner.num_vars)
            .field("num_nodes", &inner.nodes.len())
            .finish()
    }
}

impl Tape {
    /// Create an empty tape.
    #[must_use]
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    /// Register `value` as a differentiable input.
    pub fn leaf(self: &Rc<Self>, value: DenseTensor) -> Tensor {
        let id = {
            let mut inner = self.inner.borrow_mut();
            inner.num_vars += 1;
            inner.num_vars - 1
        };
        Tensor {
            value: Rc::new(value),
            var: Some(Var {
                tape: Rc::clone(self),
                id,
            }),
        }
    }

    /// Number of recorded operations.
    #[must_use]
    pub fn num_nodes(&self) -> usize {
        self.inner.borrow().nodes.len()
    }

    fn push(&self, op: Op, inputs: Vec<Option<VarId>>, num_outputs: usize) -> Vec<VarId> {
        let mut inner = self.inner.borrow_mut();
        let first = inner.num_vars;
        inner.num_vars += num_outputs;
        let outputs: Vec<VarId> = (first..first + num_outputs).collect();
        inner.nodes.push(Node {
            op,
            inputs,
            outputs: outputs.clone(),
        });
        outputs
    }
}

#[derive(Clone)]
struct Var {
    tape: Rc<Tape>,
    id: VarId,
}

/// Tensor value, optionally tracked on a [`Tape`].
///
/// Cloning is cheap: the value is reference counted.
#[derive(Clone)]
pub struct Tensor {
    value: Rc<DenseTensor>,
    var: Option<Var>,
}

impl fmt::Debug for Tensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tensor")
            .field("dims", &self.value.dims())
            .field("requires_grad", &self.requires_grad())
            .finish()
    }
}

impl From<DenseTensor> for Tensor {
    fn from(value: DenseTensor) -> Self {
        Self::constant(value)
    }
}

impl Tensor {
    /// Untracked tensor.
    #[must_use]
    pub fn constant(value: DenseTensor) -> Self {
        Self {
            value: Rc::new(value),
            var: None,
        }
    }

    /// Underlying values.
    #[must_use]
    pub fn value(&self) -> &DenseTensor {
        &self.value
    }

    /// Dimensions of each axis.
    #[must_use]
    pub fn dims(&self) -> &[usize] {
        self.value.dims()
    }

    /// Whether gradients flow into this tensor.
    #[must_use]
    pub fn requires_grad(&self) -> bool {
        self.var.is_some()
    }

    /// Same values, cut from any tape.
    #[must_use]
    pub fn detach(&self) -> Self {
        Self {
            value: Rc::clone(&self.value),
            var: None,
        }
    }

    /// Value of a single-element tensor.
    pub fn item(&self) -> Result<f64> {
        self.value.item()
    }

    /// Back-propagate from this single-element tensor.
    pub fn backward(&self) -> Result<Gradients> {
        let var = self.var.as_ref().ok_or(TensorError::NotTracked)?;
        if self.value.len() != 1 {
            return Err(TensorError::NotScalar {
                op: "backward",
                len: self.value.len(),
            });
        }

        let inner = var.tape.inner.borrow();
        let mut grads: Vec<Option<DenseTensor>> = vec![None; inner.num_vars];
        grads[var.id] = Some(DenseTensor::ones(self.dims()));

        for node in inner.nodes.iter().rev() {
            let input_grads = {
                let out_grads: Vec<Option<&DenseTensor>> =
                    node.outputs.iter().map(|&id| grads[id].as_ref()).collect();
                if out_grads.iter().all(Option::is_none) {
                    continue;
                }
                node.op.backward(&out_grads)?
            };
            for (slot, grad) in node.inputs.iter().zip(input_grads) {
                if let (Some(id), Some(grad)) = (slot, grad) {
                    match &mut grads[*id] {
                        Some(acc) => acc.add_assign(&grad)?,
                        empty => *empty = Some(grad),
                    }
                }
            }
        }

        Ok(Gradients {
            tape: Rc::clone(&var.tape),
            grads,
        })
    }

    fn tape(&self) -> Option<&Rc<Tape>> {
        self.var.as_ref().map(|v| &v.tape)
    }

    fn var_id(&self) -> Option<VarId> {
        self.var.as_ref().map(|v| v.id)
    }
}

/// Gradients produced by [`Tensor::backward`].
pub struct Gradients {
    tape: Rc<Tape>,
    grads: Vec<Option<DenseTensor>>,
}

impl Gradients {
    /// Gradient with respect to `t`, if any flowed into it.
    #[must_use]
    pub fn get(&self, t: &Tensor) -> Option<&DenseTensor> {
        let var = t.var.as_ref()?;
        if !Rc::ptr_eq(&var.tape, &self.tape) {
            return None;
        }
        self.grads.get(var.id).and_then(Option::as_ref)
    }

    /// Gradient with respect to `t`, zeros if none flowed into it.
    #[must_use]
    pub fn wrt(&self, t: &Tensor) -> DenseTensor {
        self.get(t)
            .cloned()
            .unwrap_or_else(|| DenseTensor::zeros(t.dims()))
    }
}

/// Record `op` producing `outputs` from `inputs`, or return constants when
/// nothing needs tracking.
fn record(op: Op, inputs: &[&Tensor], outputs: Vec<DenseTensor>) -> Result<Vec<Tensor>> {
    let mut tape: Option<&Rc<Tape>> = None;
    for t in inputs {
        if let Some(other) = t.tape() {
            match tape {
                Some(existing) if !Rc::ptr_eq(existing, other) => {
                    return Err(TensorError::TapeMismatch)
                }
                _ => tape = Some(other),
            }
        }
    }

    match tape.filter(|_| is_grad_enabled()) {
        None => Ok(outputs.into_iter().map(Tensor::constant).collect()),
        Some(tape) => {
            let ids = inputs.iter().map(|t| t.var_id()).collect();
            let out_ids = tape.push(op, ids, outputs.len());
            Ok(outputs
                .into_iter()
                .zip(out_ids)
                .map(|(value, id)| Tensor {
                    value: Rc::new(value),
                    var: Some(Var {
                        tape: Rc::clone(tape),
                        id,
                    }),
                })
                .collect())
        }
    }
}

/// Record a single-output op.
fn record_one(op: Op, inputs: &[&Tensor], output: DenseTensor) -> Result<Tensor> {
    let mut out = record(op, inputs, vec![output])?;
    Ok(out.remove(0))
}
