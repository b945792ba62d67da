//! Comparisons, selection, casting and band masks.

use super::{grad_mul, invoke_one, invoke_undifferentiable};
use crate::autodiff::graph::{BackwardContext, Operation};
use crate::autodiff::mask::MaskPolicy;
use crate::autodiff::variable::{IntoOperand, Undifferentiable, Variable};
use crate::backend::{broadcast_shapes, broadcast_to};
use crate::dtype::DType;
use crate::error::Result;
use crate::operations::{apply, band_part, compare};
use crate::tensor::Tensor;
use crate::value::{MaskedTensor, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Comparison {
    Greater,
    GreaterEqual,
    Less,
    LessEqual,
    Equal,
    NotEqual,
}

#[derive(Debug)]
struct Compare(Comparison);

impl Operation for Compare {
    fn name(&self) -> &'static str {
        match self.0 {
            Comparison::Greater => "greater",
            Comparison::GreaterEqual => "greater_equal",
            Comparison::Less => "less",
            Comparison::LessEqual => "less_equal",
            Comparison::Equal => "equal",
            Comparison::NotEqual => "not_equal",
        }
    }

    fn forward(&self, inputs: &[&Value]) -> Result<Vec<Value>> {
        let a = inputs[0].as_tensor();
        let b = inputs[1].as_tensor();
        let out = match self.0 {
            Comparison::Greater => compare(self.name(), &a, &b, |x, y| x > y)?,
            Comparison::GreaterEqual => compare(self.name(), &a, &b, |x, y| x >= y)?,
            Comparison::Less => compare(self.name(), &a, &b, |x, y| x < y)?,
            Comparison::LessEqual => compare(self.name(), &a, &b, |x, y| x <= y)?,
            Comparison::Equal => compare(self.name(), &a, &b, |x, y| x == y)?,
            Comparison::NotEqual => compare(self.name(), &a, &b, |x, y| x != y)?,
        };
        Ok(vec![out.into()])
    }

    fn is_differentiable(&self) -> bool {
        false
    }

    fn mask_policy(&self) -> MaskPolicy {
        MaskPolicy::InheritFirst
    }
}

fn comparison(kind: Comparison, a: impl IntoOperand, b: impl IntoOperand) -> Result<Undifferentiable> {
    invoke_undifferentiable(Compare(kind), vec![a.into_operand(), b.into_operand()])
}

/// `a > b` elementwise, as a `Bool` array.
///
/// # Example
///
/// ```
/// use gradtape::{DType, Tensor, Variable, ops};
///
/// let x = Variable::new(Tensor::from(vec![1.0, 5.0]));
/// let m = ops::greater(&x, 2.0).unwrap();
/// assert_eq!(m.dtype(), DType::Bool);
/// assert_eq!(m.tensor().data(), &[0.0, 1.0]);
/// assert!(!m.is_backpropagatable());
/// ```
pub fn greater(a: impl IntoOperand, b: impl IntoOperand) -> Result<Undifferentiable> {
    comparison(Comparison::Greater, a, b)
}

pub fn greater_equal(a: impl IntoOperand, b: impl IntoOperand) -> Result<Undifferentiable> {
    comparison(Comparison::GreaterEqual, a, b)
}

pub fn less(a: impl IntoOperand, b: impl IntoOperand) -> Result<Undifferentiable> {
    comparison(Comparison::Less, a, b)
}

pub fn less_equal(a: impl IntoOperand, b: impl IntoOperand) -> Result<Undifferentiable> {
    comparison(Comparison::LessEqual, a, b)
}

pub fn equal(a: impl IntoOperand, b: impl IntoOperand) -> Result<Undifferentiable> {
    comparison(Comparison::Equal, a, b)
}

/// `a != b` elementwise, as a `Bool` array.
pub fn not_equal(a: impl IntoOperand, b: impl IntoOperand) -> Result<Undifferentiable> {
    comparison(Comparison::NotEqual, a, b)
}

/// `cond ? a : b` with broadcasting among all three.
#[derive(Debug)]
struct Where;

impl Where {
    fn condition(cond: &Tensor, shape: &[usize]) -> Result<Tensor> {
        let flags = apply(cond, DType::Float64, |c| f64::from(u8::from(c != 0.0)));
        broadcast_to(&flags, shape)
    }
}

impl Operation for Where {
    fn name(&self) -> &'static str {
        "where"
    }

    fn forward(&self, inputs: &[&Value]) -> Result<Vec<Value>> {
        let cond = inputs[0].as_tensor();
        let a = inputs[1].as_tensor();
        let b = inputs[2].as_tensor();
        let branches = broadcast_shapes(self.name(), a.shape(), b.shape())?;
        let shape = broadcast_shapes(self.name(), cond.shape(), &branches)?;
        let dtype = a.dtype().promote(b.dtype());
        let c = Self::condition(&cond, &shape)?;
        let a = broadcast_to(&a, &shape)?;
        let b = broadcast_to(&b, &shape)?;
        let data = c
            .data()
            .iter()
            .zip(a.data().iter().zip(b.data()))
            .map(|(&c, (&x, &y))| dtype.coerce(if c != 0.0 { x } else { y }))
            .collect();
        Ok(vec![Tensor::from_vec_with_dtype(data, &shape, dtype)?.into()])
    }

    fn backward(&self, ctx: &BackwardContext<'_>, grads: &[Tensor]) -> Result<Vec<Option<Tensor>>> {
        let g = &grads[0];
        let chosen = Self::condition(&ctx.input(0), g.shape())?;
        let other = apply(&chosen, DType::Float64, |c| 1.0 - c);
        Ok(vec![None, Some(grad_mul(g, &chosen)?), Some(grad_mul(g, &other)?)])
    }

    fn input_differentiable(&self, index: usize) -> bool {
        index != 0
    }

    fn mask_policy(&self) -> MaskPolicy {
        MaskPolicy::InheritFirst
    }
}

/// Select from `a` where `cond` is true and from `b` elsewhere.
///
/// Gradients flow only into the branch that was selected at each
/// position; `cond` takes none.
pub fn where_(cond: impl IntoOperand, a: impl IntoOperand, b: impl IntoOperand) -> Result<Variable> {
    invoke_one(Where, vec![cond.into_operand(), a.into_operand(), b.into_operand()])
}

#[derive(Debug)]
struct Cast(DType);

impl Operation for Cast {
    fn name(&self) -> &'static str {
        "cast"
    }

    fn forward(&self, inputs: &[&Value]) -> Result<Vec<Value>> {
        let out = match inputs[0] {
            Value::Scalar { value, .. } => Value::Scalar {
                value: self.0.coerce(*value),
                dtype: self.0,
            },
            Value::Masked(m) => Value::Masked(MaskedTensor::from_parts_unchecked(
                m.tensor().cast(self.0),
                m.mask().to_vec(),
            )),
            other => other.as_tensor().cast(self.0).into(),
        };
        Ok(vec![out])
    }

    fn is_differentiable(&self) -> bool {
        false
    }

    fn mask_policy(&self) -> MaskPolicy {
        MaskPolicy::Explicit
    }
}

/// Convert `x` to `dtype`. A mask on `x` is kept.
///
/// Casting never carries a gradient, even between float dtypes.
pub fn cast(x: impl IntoOperand, dtype: DType) -> Result<Undifferentiable> {
    invoke_undifferentiable(Cast(dtype), vec![x.into_operand()])
}

#[derive(Debug)]
struct BandPart {
    lower: i64,
    upper: i64,
}

impl Operation for BandPart {
    fn name(&self) -> &'static str {
        "bandpart"
    }

    fn forward(&self, inputs: &[&Value]) -> Result<Vec<Value>> {
        let x = inputs[0].as_tensor();
        Ok(vec![band_part(&x, self.lower, self.upper)?.into()])
    }

    fn is_differentiable(&self) -> bool {
        false
    }
}

/// Keep the band of the trailing two axes with `lower` sub-diagonals and
/// `upper` super-diagonals; a negative count keeps that whole triangle.
///
/// Typically applied to a ones matrix to build an attention mask.
///
/// # Example
///
/// ```
/// use gradtape::{Tensor, ops};
///
/// let causal = ops::bandpart(Tensor::ones(&[3, 3]), -1, 0).unwrap();
/// assert_eq!(causal.tensor().data(), &[1.0, 0.0, 0.0, 1.0, 1.0, 0.0, 1.0, 1.0, 1.0]);
/// ```
pub fn bandpart(x: impl IntoOperand, lower: i64, upper: i64) -> Result<Undifferentiable> {
    invoke_undifferentiable(BandPart { lower, upper }, vec![x.into_operand()])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::autodiff::ops::mul;
    use crate::autodiff::{GradientTape, with};
    use crate::error::GradError;

    #[test]
    fn test_comparisons() {
        let a = Tensor::from(vec![1.0, 2.0, 3.0]);
        assert_eq!(less(a.clone(), 2.0).unwrap().tensor().data(), &[1.0, 0.0, 0.0]);
        assert_eq!(less_equal(a.clone(), 2.0).unwrap().tensor().data(), &[1.0, 1.0, 0.0]);
        assert_eq!(greater_equal(a.clone(), 2.0).unwrap().tensor().data(), &[0.0, 1.0, 1.0]);
        assert_eq!(equal(a.clone(), 2.0).unwrap().tensor().data(), &[0.0, 1.0, 0.0]);
        assert_eq!(not_equal(a, 2.0).unwrap().tensor().data(), &[1.0, 0.0, 1.0]);
    }

    #[test]
    fn test_comparison_target_is_not_differentiable() {
        let x = Variable::new(Tensor::from(vec![1.0, 2.0]));
        let tape = GradientTape::new();
        let m = with(&tape, |_| greater(&x, 1.5)).unwrap();
        let err = tape.gradient(m.as_variable(), &x).unwrap_err();
        assert!(matches!(err, GradError::NonDifferentiableTarget { .. }));
    }

    #[test]
    fn test_comparison_blocks_gradient_path() {
        let x = Variable::new(Tensor::from(vec![1.0, 2.0]));
        let tape = GradientTape::new();
        let y = with(&tape, |_| {
            let m = not_equal(&x, 1.0)?;
            mul(m, 3.0)
        })
        .unwrap();
        assert!(matches!(tape.gradient(&y, &x), Err(GradError::NoGradient { .. })));
    }

    #[test]
    fn test_where_routes_gradient() {
        let a = Variable::new(Tensor::from(vec![1.0, 2.0, 3.0]));
        let b = Variable::new(10.0);
        let cond = Tensor::from_bools(&[true, false, true], &[3]).unwrap();
        let tape = GradientTape::new();
        let y = with(&tape, |_| where_(cond.clone(), &a, &b)).unwrap();
        assert_eq!(y.tensor().data(), &[1.0, 10.0, 3.0]);
        let g = tape.gradient(&y, [&a, &b]).unwrap();
        assert_eq!(g[0].data(), &[1.0, 0.0, 1.0]);
        assert_eq!(g[1].item(), Some(1.0));
    }

    #[test]
    fn test_cast_is_undifferentiable() {
        let x = Variable::new(Tensor::from(vec![1.7, -2.2]));
        let y = cast(&x, DType::Int32).unwrap();
        assert_eq!(y.dtype(), DType::Int32);
        assert_eq!(y.tensor().data(), &[1.0, -2.0]);
        assert!(!cast(&x, DType::Float32).unwrap().is_backpropagatable());
    }

    #[test]
    fn test_bandpart_requires_matrix() {
        assert!(bandpart(Tensor::ones(&[3]), 0, 0).is_err());
    }
}
