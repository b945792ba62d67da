//! The op catalog.
//!
//! Every entry point builds an [`Operation`], binds it to its operands and
//! registers it through [`apply_operation`]:
//!
//! ```text
//! ops::mul(a, 2.0)
//!     → promote raw operands to constant Variables
//!     → forward on the input values (errors here register nothing)
//!     → apply the op's mask policy
//!     → wrap an Rc<OpNode> owned by the outputs, fresh VarIds for outputs
//!     → record the node on the current tape, if any
//! ```
//!
//! Ops declared non-differentiable return [`Undifferentiable`].

mod arithmetic;
mod compare;
mod generate;
mod linalg;
mod masking;
mod math;
mod reduce;
mod shape;
mod structure;

pub use arithmetic::{add, div, increment, increment_with_alpha, mul, scale, sub};
pub use compare::{bandpart, cast, equal, greater, greater_equal, less, less_equal, not_equal, where_};
pub use generate::{fill, ones, ones_like, random_normal, random_uniform, zeros, zeros_like};
pub use linalg::matmul;
pub use masking::{inherit_mask, mask_of, strip_mask, with_mask};
pub use math::{abs, clip_by_value, exp, log, neg, pow, relu, sigmoid, sqrt, square, tanh};
pub use reduce::{reduce_max, reduce_mean, reduce_sum};
pub use shape::{expand_dims, get, get_range, reshape, shape, slice, squeeze, transpose};
pub use structure::{SplitSpec, concat, repeat, split};

use std::rc::Rc;

use super::graph::{OpNode, OpRef, Operation, next_var_id};
use super::mask::apply_mask_policy;
use super::tape::current_tape;
use super::variable::{Undifferentiable, VarId, Variable};
use crate::dtype::DType;
use crate::error::{GradError, Result};
use crate::operations::apply_binary;
use crate::tensor::Tensor;
use crate::value::Value;

/// Run `op` on `inputs` and register it in the computation graph.
///
/// This is how layers with hand-written math join the graph as one opaque
/// op. Outputs are backpropagatable exactly when the op is differentiable.
///
/// # Errors
///
/// Propagates any error from `op.forward`; in that case nothing is
/// registered.
///
/// # Example
///
/// ```
/// use gradtape::{BackwardContext, GradientTape, Operation, Result, Tensor, Value, Variable, with};
/// use gradtape::autodiff::apply_operation;
///
/// #[derive(Debug)]
/// struct Double;
///
/// impl Operation for Double {
///     fn name(&self) -> &'static str {
///         "double"
///     }
///
///     fn forward(&self, inputs: &[&Value]) -> Result<Vec<Value>> {
///         let x = inputs[0].as_tensor();
///         let data = x.data().iter().map(|v| v * 2.0).collect();
///         Ok(vec![Tensor::from_vec(data, x.shape())?.into()])
///     }
///
///     fn backward(&self, _ctx: &BackwardContext<'_>, grads: &[Tensor]) -> Result<Vec<Option<Tensor>>> {
///         let g = &grads[0];
///         let data = g.data().iter().map(|v| v * 2.0).collect();
///         Ok(vec![Some(Tensor::from_vec(data, g.shape())?)])
///     }
/// }
///
/// let x = Variable::new(Tensor::from(vec![1.0, 2.0]));
/// let tape = GradientTape::new();
/// let y = with(&tape, |_| apply_operation(Double, vec![x.clone()])).unwrap();
/// assert_eq!(y[0].tensor().data(), &[2.0, 4.0]);
/// assert_eq!(tape.gradient(&y[0], &x).unwrap().data(), &[2.0, 2.0]);
/// ```
pub fn apply_operation<O: Operation + 'static>(op: O, inputs: Vec<Variable>) -> Result<Vec<Variable>> {
    invoke(Rc::new(op), inputs)
}

fn invoke(op: Rc<dyn Operation>, inputs: Vec<Variable>) -> Result<Vec<Variable>> {
    let outputs: Vec<Rc<Value>> = {
        let values: Vec<&Value> = inputs.iter().map(Variable::value).collect();
        let raw = op.forward(&values)?;
        apply_mask_policy(op.mask_policy(), &values, raw)
            .into_iter()
            .map(|v| Rc::new(normalize(v)))
            .collect()
    };
    let output_ids: Vec<VarId> = outputs.iter().map(|_| next_var_id()).collect();
    let backpropagatable = op.is_differentiable();

    let node = OpNode::new(op, inputs, outputs.clone(), output_ids.clone());
    log::trace!(
        "registered op {} ({}): {} inputs, {} outputs",
        node.id.index(),
        node.op.name(),
        node.inputs.len(),
        outputs.len()
    );
    if let Some(tape) = current_tape() {
        tape.record(&node);
    }

    Ok(outputs
        .into_iter()
        .zip(output_ids)
        .enumerate()
        .map(|(output, (value, var_id))| {
            let op_ref = OpRef {
                node: Rc::clone(&node),
                output,
            };
            Variable::from_op(value, var_id, op_ref, backpropagatable)
        })
        .collect())
}

// Rank-0 arrays are carried as scalars.
fn normalize(value: Value) -> Value {
    match value {
        Value::Tensor(t) if t.ndim() == 0 => Value::from_tensor(t),
        other => other,
    }
}

/// Invoke a single-output differentiable op.
pub(crate) fn invoke_one(op: impl Operation + 'static, inputs: Vec<Variable>) -> Result<Variable> {
    let name = op.name();
    let outputs = invoke(Rc::new(op), inputs)?;
    let n = outputs.len();
    match <[Variable; 1]>::try_from(outputs) {
        Ok([out]) => Ok(out),
        Err(_) => Err(GradError::Arity {
            op: name,
            expected: 1,
            actual: n,
        }),
    }
}

/// Invoke a single-output op whose output never takes a gradient.
pub(crate) fn invoke_undifferentiable(
    op: impl Operation + 'static,
    inputs: Vec<Variable>,
) -> Result<Undifferentiable> {
    invoke_one(op, inputs).map(Undifferentiable::new)
}

/// Read an integer list operand: a shape tuple, an integer vector or a
/// single integer.
pub(crate) fn int_list(op: &'static str, value: &Value) -> Result<Vec<i64>> {
    match value {
        Value::ShapeTuple(s) => Ok(s.iter().map(|&d| d as i64).collect()),
        Value::Masked(_) => Err(GradError::UnsupportedValue {
            op,
            expected: "integer list",
            given: value.kind_name(),
        }),
        other => {
            let t = other.as_tensor();
            if t.ndim() > 1 {
                return Err(GradError::InvalidArgument {
                    op,
                    message: format!("expected a 1-D integer list, got shape {:?}", t.shape()),
                });
            }
            t.data().iter().map(|&x| as_integer(op, x)).collect()
        }
    }
}

/// Read a single integer operand.
pub(crate) fn int_scalar(op: &'static str, value: &Value) -> Result<i64> {
    let x = value.item().ok_or_else(|| GradError::InvalidArgument {
        op,
        message: format!("expected a single integer, got shape {:?}", value.shape()),
    })?;
    as_integer(op, x)
}

fn as_integer(op: &'static str, x: f64) -> Result<i64> {
    if x.fract() != 0.0 || !x.is_finite() {
        return Err(GradError::InvalidArgument {
            op,
            message: format!("expected an integer, got {x}"),
        });
    }
    Ok(x as i64)
}

/// Float dtype gradient math between `a` and `b` is carried out in.
fn grad_dtype(a: &Tensor, b: &Tensor) -> DType {
    a.dtype().promote(b.dtype()).gradient_dtype()
}

pub(crate) fn grad_mul(a: &Tensor, b: &Tensor) -> Result<Tensor> {
    apply_binary("mul", a, b, grad_dtype(a, b), |x, y| x * y)
}

pub(crate) fn grad_div(a: &Tensor, b: &Tensor) -> Result<Tensor> {
    apply_binary("div", a, b, grad_dtype(a, b), |x, y| x / y)
}
