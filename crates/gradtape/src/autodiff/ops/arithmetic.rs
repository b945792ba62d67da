//! Broadcasting arithmetic: add, sub, mul, div, increment and scale.

use super::{grad_div, grad_mul, invoke_one};
use crate::autodiff::graph::{BackwardContext, Operation};
use crate::autodiff::mask::MaskPolicy;
use crate::autodiff::variable::{IntoOperand, Variable};
use crate::dtype::DType;
use crate::error::{GradError, Result};
use crate::operations::{apply, apply_binary, sum_axes};
use crate::tensor::Tensor;
use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Arith {
    Add,
    Sub,
    Mul,
    Div,
}

#[derive(Debug)]
struct ArithOp(Arith);

/// Result dtype of `a op b`. Bools count as integers; integer division
/// yields `Float64`.
fn arith_dtype(kind: Arith, a: DType, b: DType) -> DType {
    let dtype = a.promote(b);
    match (kind, dtype) {
        (Arith::Div, d) if !d.is_float() => DType::Float64,
        (_, DType::Bool) => DType::Int64,
        (_, d) => d,
    }
}

impl Operation for ArithOp {
    fn name(&self) -> &'static str {
        match self.0 {
            Arith::Add => "add",
            Arith::Sub => "sub",
            Arith::Mul => "mul",
            Arith::Div => "div",
        }
    }

    fn forward(&self, inputs: &[&Value]) -> Result<Vec<Value>> {
        let a = inputs[0].as_tensor();
        let b = inputs[1].as_tensor();
        let dtype = arith_dtype(self.0, a.dtype(), b.dtype());
        let out = match self.0 {
            Arith::Add => apply_binary(self.name(), &a, &b, dtype, |x, y| x + y)?,
            Arith::Sub => apply_binary(self.name(), &a, &b, dtype, |x, y| x - y)?,
            Arith::Mul => apply_binary(self.name(), &a, &b, dtype, |x, y| x * y)?,
            Arith::Div => apply_binary(self.name(), &a, &b, dtype, |x, y| x / y)?,
        };
        Ok(vec![out.into()])
    }

    fn backward(&self, ctx: &BackwardContext<'_>, grads: &[Tensor]) -> Result<Vec<Option<Tensor>>> {
        let g = &grads[0];
        let a = ctx.input(0);
        let b = ctx.input(1);
        let (da, db) = match self.0 {
            Arith::Add => (g.clone(), g.clone()),
            Arith::Sub => (g.clone(), apply(g, g.dtype(), |x| -x)),
            Arith::Mul => (grad_mul(g, &b)?, grad_mul(g, &a)?),
            Arith::Div => {
                let da = grad_div(g, &b)?;
                // -g * a / b^2
                let ga = grad_mul(g, &a)?;
                let b2 = grad_mul(&b, &b)?;
                let db = apply(&grad_div(&ga, &b2)?, ga.dtype(), |x| -x);
                (da, db)
            }
        };
        Ok(vec![Some(da), Some(db)])
    }

    fn mask_policy(&self) -> MaskPolicy {
        MaskPolicy::InheritFirst
    }
}

fn arith(kind: Arith, a: impl IntoOperand, b: impl IntoOperand) -> Result<Variable> {
    invoke_one(ArithOp(kind), vec![a.into_operand(), b.into_operand()])
}

/// Elementwise `a + b` with broadcasting.
///
/// # Example
///
/// ```
/// use gradtape::{GradientTape, Variable, ops, with};
///
/// let x = Variable::new(3.0);
/// let tape = GradientTape::new();
/// let y = with(&tape, |_| ops::add(&x, &x)).unwrap();
/// assert_eq!(y.item(), Some(6.0));
/// assert_eq!(tape.gradient(&y, &x).unwrap().item(), Some(2.0));
/// ```
pub fn add(a: impl IntoOperand, b: impl IntoOperand) -> Result<Variable> {
    arith(Arith::Add, a, b)
}

/// Elementwise `a - b` with broadcasting.
pub fn sub(a: impl IntoOperand, b: impl IntoOperand) -> Result<Variable> {
    arith(Arith::Sub, a, b)
}

/// Elementwise `a * b` with broadcasting.
pub fn mul(a: impl IntoOperand, b: impl IntoOperand) -> Result<Variable> {
    arith(Arith::Mul, a, b)
}

/// Elementwise `a / b` with broadcasting. Integer operands divide as floats.
pub fn div(a: impl IntoOperand, b: impl IntoOperand) -> Result<Variable> {
    arith(Arith::Div, a, b)
}

/// `alpha * x + bias`.
#[derive(Debug)]
struct Increment;

impl Operation for Increment {
    fn name(&self) -> &'static str {
        "increment"
    }

    fn forward(&self, inputs: &[&Value]) -> Result<Vec<Value>> {
        let x = inputs[0].as_tensor();
        let bias = inputs[1].as_tensor();
        let alpha = inputs[2].as_tensor();
        let dtype = arith_dtype(Arith::Add, arith_dtype(Arith::Mul, alpha.dtype(), x.dtype()), bias.dtype());
        let scaled = apply_binary(self.name(), &alpha, &x, dtype, |a, v| a * v)?;
        let out = apply_binary(self.name(), &scaled, &bias, dtype, |s, b| s + b)?;
        Ok(vec![out.into()])
    }

    fn backward(&self, ctx: &BackwardContext<'_>, grads: &[Tensor]) -> Result<Vec<Option<Tensor>>> {
        let g = &grads[0];
        let x = ctx.input(0);
        let alpha = ctx.input(2);
        Ok(vec![
            Some(grad_mul(g, &alpha)?),
            Some(g.clone()),
            Some(grad_mul(g, &x)?),
        ])
    }

    fn mask_policy(&self) -> MaskPolicy {
        MaskPolicy::InheritFirst
    }
}

/// `x + bias`, the `alpha = 1` case of [`increment_with_alpha`].
pub fn increment(x: impl IntoOperand, bias: impl IntoOperand) -> Result<Variable> {
    increment_with_alpha(x, bias, 1.0)
}

/// `alpha * x + bias` with broadcasting among all three operands.
///
/// The gradient w.r.t. `alpha` is the broadcast-reduced sum of `dy * x`.
///
/// # Example
///
/// ```
/// use gradtape::{GradientTape, Tensor, Variable, ops, with};
///
/// let x = Variable::new(Tensor::from(vec![1.0, 2.0, 3.0]));
/// let bias = Variable::new(0.5);
/// let alpha = Variable::new(2.0);
/// let tape = GradientTape::new();
/// let y = with(&tape, |_| ops::increment_with_alpha(&x, &bias, &alpha)).unwrap();
/// assert_eq!(y.tensor().data(), &[2.5, 4.5, 6.5]);
/// let g = tape.gradient(&y, [&x, &bias, &alpha]).unwrap();
/// assert_eq!(g[0].data(), &[2.0, 2.0, 2.0]);
/// assert_eq!(g[1].item(), Some(3.0));
/// assert_eq!(g[2].item(), Some(6.0));
/// ```
pub fn increment_with_alpha(
    x: impl IntoOperand,
    bias: impl IntoOperand,
    alpha: impl IntoOperand,
) -> Result<Variable> {
    invoke_one(
        Increment,
        vec![x.into_operand(), bias.into_operand(), alpha.into_operand()],
    )
}

/// `c * x` where `c` holds exactly one element.
#[derive(Debug)]
struct Scale;

impl Operation for Scale {
    fn name(&self) -> &'static str {
        "scale"
    }

    fn forward(&self, inputs: &[&Value]) -> Result<Vec<Value>> {
        let c = inputs[0].as_tensor();
        if c.len() != 1 {
            return Err(GradError::InvalidArgument {
                op: self.name(),
                message: format!("scale factor must have one element, got shape {:?}", c.shape()),
            });
        }
        let x = inputs[1].as_tensor();
        let dtype = arith_dtype(Arith::Mul, c.dtype(), x.dtype());
        let out = apply_binary(self.name(), &c, &x, dtype, |a, v| a * v)?;
        Ok(vec![out.into()])
    }

    fn backward(&self, ctx: &BackwardContext<'_>, grads: &[Tensor]) -> Result<Vec<Option<Tensor>>> {
        let g = &grads[0];
        let c = ctx.input(0);
        let x = ctx.input(1);
        let gx = grad_mul(g, &x)?;
        let all: Vec<usize> = (0..gx.ndim()).collect();
        let dc = sum_axes(&gx, &all, false)?.reshape(c.shape())?;
        Ok(vec![Some(dc), Some(grad_mul(g, &c)?)])
    }

    fn mask_policy(&self) -> MaskPolicy {
        MaskPolicy::InheritFirst
    }
}

/// Scale `x` by the one-element value `c`.
///
/// # Errors
///
/// Returns `InvalidArgument` if `c` has more than one element.
pub fn scale(c: impl IntoOperand, x: impl IntoOperand) -> Result<Variable> {
    invoke_one(Scale, vec![c.into_operand(), x.into_operand()])
}
