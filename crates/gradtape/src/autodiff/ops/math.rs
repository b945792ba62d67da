//! Unary elementwise math and clipping.

use super::{grad_mul, invoke_one};
use crate::autodiff::graph::{BackwardContext, Operation};
use crate::autodiff::mask::MaskPolicy;
use crate::autodiff::variable::{IntoOperand, Variable};
use crate::dtype::DType;
use crate::error::{GradError, Result};
use crate::operations::{apply, apply_binary};
use crate::tensor::Tensor;
use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq)]
enum Unary {
    Neg,
    Square,
    Pow(f64),
    Exp,
    Log,
    Sqrt,
    Tanh,
    Sigmoid,
    Relu,
    Abs,
}

impl Unary {
    fn eval(self, x: f64) -> f64 {
        match self {
            Unary::Neg => -x,
            Unary::Square => x * x,
            Unary::Pow(p) => x.powf(p),
            Unary::Exp => x.exp(),
            Unary::Log => x.ln(),
            Unary::Sqrt => x.sqrt(),
            Unary::Tanh => x.tanh(),
            Unary::Sigmoid => 1.0 / (1.0 + (-x).exp()),
            Unary::Relu => x.max(0.0),
            Unary::Abs => x.abs(),
        }
    }

    /// dy/dx in terms of the input `x` and output `y`.
    fn derivative(self, x: f64, y: f64) -> f64 {
        match self {
            Unary::Neg => -1.0,
            Unary::Square => 2.0 * x,
            Unary::Pow(p) => p * x.powf(p - 1.0),
            Unary::Exp => y,
            Unary::Log => 1.0 / x,
            Unary::Sqrt => 0.5 / y,
            Unary::Tanh => 1.0 - y * y,
            Unary::Sigmoid => y * (1.0 - y),
            Unary::Relu => {
                if x > 0.0 {
                    1.0
                } else {
                    0.0
                }
            }
            Unary::Abs => {
                if x > 0.0 {
                    1.0
                } else if x < 0.0 {
                    -1.0
                } else {
                    0.0
                }
            }
        }
    }

    /// Whether the op keeps integer dtypes; the rest compute in floats.
    fn keeps_dtype(self) -> bool {
        matches!(self, Unary::Neg | Unary::Square | Unary::Relu | Unary::Abs)
    }
}

#[derive(Debug)]
struct UnaryOp(Unary);

impl Operation for UnaryOp {
    fn name(&self) -> &'static str {
        match self.0 {
            Unary::Neg => "neg",
            Unary::Square => "square",
            Unary::Pow(_) => "pow",
            Unary::Exp => "exp",
            Unary::Log => "log",
            Unary::Sqrt => "sqrt",
            Unary::Tanh => "tanh",
            Unary::Sigmoid => "sigmoid",
            Unary::Relu => "relu",
            Unary::Abs => "abs",
        }
    }

    fn forward(&self, inputs: &[&Value]) -> Result<Vec<Value>> {
        let x = inputs[0].as_tensor();
        let dtype = match x.dtype() {
            DType::Bool => DType::Float64,
            d if self.0.keeps_dtype() || d.is_float() => d,
            _ => DType::Float64,
        };
        let kind = self.0;
        Ok(vec![apply(&x, dtype, |v| kind.eval(v)).into()])
    }

    fn backward(&self, ctx: &BackwardContext<'_>, grads: &[Tensor]) -> Result<Vec<Option<Tensor>>> {
        let g = &grads[0];
        let x = ctx.input(0);
        let y = ctx.output(0);
        let kind = self.0;
        let local = apply_binary(self.name(), &x, &y, DType::Float64, |xv, yv| kind.derivative(xv, yv))?;
        Ok(vec![Some(grad_mul(g, &local)?)])
    }

    fn mask_policy(&self) -> MaskPolicy {
        MaskPolicy::InheritFirst
    }
}

fn unary(kind: Unary, x: impl IntoOperand) -> Result<Variable> {
    invoke_one(UnaryOp(kind), vec![x.into_operand()])
}

pub fn neg(x: impl IntoOperand) -> Result<Variable> {
    unary(Unary::Neg, x)
}

pub fn square(x: impl IntoOperand) -> Result<Variable> {
    unary(Unary::Square, x)
}

/// `x` raised to the constant power `p`.
pub fn pow(x: impl IntoOperand, p: f64) -> Result<Variable> {
    unary(Unary::Pow(p), x)
}

pub fn exp(x: impl IntoOperand) -> Result<Variable> {
    unary(Unary::Exp, x)
}

/// Natural logarithm.
pub fn log(x: impl IntoOperand) -> Result<Variable> {
    unary(Unary::Log, x)
}

pub fn sqrt(x: impl IntoOperand) -> Result<Variable> {
    unary(Unary::Sqrt, x)
}

pub fn tanh(x: impl IntoOperand) -> Result<Variable> {
    unary(Unary::Tanh, x)
}

/// Logistic sigmoid `1 / (1 + e^-x)`.
pub fn sigmoid(x: impl IntoOperand) -> Result<Variable> {
    unary(Unary::Sigmoid, x)
}

/// `max(x, 0)`. The gradient at 0 is 0.
pub fn relu(x: impl IntoOperand) -> Result<Variable> {
    unary(Unary::Relu, x)
}

/// Absolute value. The gradient at 0 is 0.
pub fn abs(x: impl IntoOperand) -> Result<Variable> {
    unary(Unary::Abs, x)
}

#[derive(Debug)]
struct ClipByValue;

impl Operation for ClipByValue {
    fn name(&self) -> &'static str {
        "clip_by_value"
    }

    fn forward(&self, inputs: &[&Value]) -> Result<Vec<Value>> {
        let x = inputs[0].as_tensor();
        let lo = inputs[1].as_tensor();
        let hi = inputs[2].as_tensor();
        let inverted = apply_binary(self.name(), &lo, &hi, DType::Bool, |l, h| f64::from(u8::from(l > h)))?;
        if inverted.data().iter().any(|&v| v != 0.0) {
            return Err(GradError::InvalidArgument {
                op: "clip_by_value",
                message: "lower bound exceeds upper bound".into(),
            });
        }
        let dtype = x.dtype().promote(lo.dtype()).promote(hi.dtype());
        let floor = apply_binary(self.name(), &x, &lo, dtype, f64::max)?;
        let out = apply_binary(self.name(), &floor, &hi, dtype, f64::min)?;
        Ok(vec![out.into()])
    }

    fn backward(&self, ctx: &BackwardContext<'_>, grads: &[Tensor]) -> Result<Vec<Option<Tensor>>> {
        let g = &grads[0];
        let x = ctx.input(0);
        let lo = ctx.input(1);
        let hi = ctx.input(2);
        // Strictly inside (lo, hi) passes the gradient through.
        let above = apply_binary(self.name(), &x, &lo, DType::Float64, |v, l| f64::from(u8::from(v > l)))?;
        let inside = apply_binary(self.name(), &x, &hi, DType::Float64, |v, h| f64::from(u8::from(v < h)))?;
        let keep = grad_mul(&above, &inside)?;
        Ok(vec![Some(grad_mul(g, &keep)?), None, None])
    }

    fn input_differentiable(&self, index: usize) -> bool {
        index == 0
    }

    fn mask_policy(&self) -> MaskPolicy {
        MaskPolicy::InheritFirst
    }
}

/// Clamp `x` into `[lo, hi]` elementwise.
///
/// The gradient passes through where `lo < x < hi` and is zero elsewhere,
/// including at the bounds themselves. `lo` and `hi` take no gradient.
///
/// # Errors
///
/// `InvalidArgument` if any element of `lo` exceeds the matching `hi`.
///
/// # Example
///
/// ```
/// use gradtape::{GradientTape, Tensor, Variable, ops, with};
///
/// let x = Variable::new(Tensor::from(vec![0.2, 0.4, 0.6]));
/// let tape = GradientTape::new();
/// let y = with(&tape, |_| ops::mul(ops::clip_by_value(&x, 0.3, 0.5)?, 2.0)).unwrap();
/// assert_eq!(tape.gradient(&y, &x).unwrap().data(), &[0.0, 2.0, 0.0]);
/// ```
pub fn clip_by_value(x: impl IntoOperand, lo: impl IntoOperand, hi: impl IntoOperand) -> Result<Variable> {
    invoke_one(ClipByValue, vec![x.into_operand(), lo.into_operand(), hi.into_operand()])
}
