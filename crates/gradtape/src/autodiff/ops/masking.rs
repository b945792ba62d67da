//! Attaching, inheriting and reading validity masks.
//!
//! Masks address the leading (sequence) axis. They are replaced, never
//! merged: attaching a mask discards whatever mask the value had.

use super::{invoke_one, invoke_undifferentiable};
use crate::autodiff::graph::{BackwardContext, Operation};
use crate::autodiff::mask::MaskPolicy;
use crate::autodiff::variable::{IntoOperand, Undifferentiable, Variable};
use crate::error::{GradError, Result};
use crate::tensor::Tensor;
use crate::value::{MaskedTensor, Value};

#[derive(Debug)]
enum MaskOp {
    /// Attach the mask operand to `x`.
    With,
    /// Attach the mask of another value to `x`.
    Inherit,
    Strip,
}

impl Operation for MaskOp {
    fn name(&self) -> &'static str {
        match self {
            MaskOp::With => "with_mask",
            MaskOp::Inherit => "inherit_mask",
            MaskOp::Strip => "strip_mask",
        }
    }

    fn forward(&self, inputs: &[&Value]) -> Result<Vec<Value>> {
        let x = inputs[0].as_tensor().into_owned();
        let out = match self {
            MaskOp::With => {
                let mask = inputs[1].as_tensor();
                if mask.ndim() != 1 {
                    return Err(GradError::ShapeMismatch {
                        op: self.name(),
                        expected: vec![x.shape().first().copied().unwrap_or(0)],
                        given: mask.shape().to_vec(),
                    });
                }
                let flags = mask.data().iter().map(|&m| m != 0.0).collect();
                Value::Masked(MaskedTensor::new(x, flags)?)
            }
            MaskOp::Inherit => match inputs[1].mask() {
                Some(mask) if x.shape().first() == Some(&mask.len()) => {
                    Value::Masked(MaskedTensor::new(x, mask.to_vec())?)
                }
                _ => Value::from_tensor(x),
            },
            MaskOp::Strip => Value::from_tensor(x),
        };
        Ok(vec![out])
    }

    fn backward(&self, ctx: &BackwardContext<'_>, grads: &[Tensor]) -> Result<Vec<Option<Tensor>>> {
        let mut out = vec![Some(grads[0].clone())];
        out.resize(ctx.inputs.len(), None);
        Ok(out)
    }

    fn input_differentiable(&self, index: usize) -> bool {
        index == 0
    }

    fn mask_policy(&self) -> MaskPolicy {
        MaskPolicy::Explicit
    }
}

/// Attach `mask` (a 1-D array over the leading axis, nonzero = valid) to
/// `x`, replacing any mask `x` had.
///
/// # Errors
///
/// `ShapeMismatch` if `mask` is not 1-D or its length differs from the
/// leading axis of `x`.
///
/// # Example
///
/// ```
/// use gradtape::{Tensor, Variable, ops};
///
/// let x = Variable::new(Tensor::ones(&[3, 2]));
/// let mask = Tensor::from_bools(&[true, true, false], &[3]).unwrap();
/// let m = ops::with_mask(&x, mask).unwrap();
/// assert_eq!(m.mask(), Some(&[true, true, false][..]));
///
/// // Elementwise ops inherit it.
/// let y = ops::mul(&m, 2.0).unwrap();
/// assert_eq!(y.mask(), Some(&[true, true, false][..]));
/// ```
pub fn with_mask(x: impl IntoOperand, mask: impl IntoOperand) -> Result<Variable> {
    invoke_one(MaskOp::With, vec![x.into_operand(), mask.into_operand()])
}

/// Give `x` the mask of `from`, discarding the mask `x` had.
///
/// If `from` is unmasked, or its mask does not fit the leading axis of `x`,
/// the result is unmasked.
pub fn inherit_mask(x: impl IntoOperand, from: impl IntoOperand) -> Result<Variable> {
    invoke_one(MaskOp::Inherit, vec![x.into_operand(), from.into_operand()])
}

/// `x` without its mask.
pub fn strip_mask(x: impl IntoOperand) -> Result<Variable> {
    invoke_one(MaskOp::Strip, vec![x.into_operand()])
}

#[derive(Debug)]
struct MaskOf;

impl Operation for MaskOf {
    fn name(&self) -> &'static str {
        "mask_of"
    }

    fn forward(&self, inputs: &[&Value]) -> Result<Vec<Value>> {
        let x = inputs[0];
        let flags = match (x.mask(), x.shape().first()) {
            (Some(mask), _) => mask.to_vec(),
            (None, Some(&len)) => vec![true; len],
            (None, None) => {
                return Err(GradError::UnsupportedValue {
                    op: self.name(),
                    expected: "value of rank >= 1",
                    given: x.kind_name(),
                });
            }
        };
        let len = flags.len();
        Ok(vec![Tensor::from_bools(&flags, &[len])?.into()])
    }

    fn is_differentiable(&self) -> bool {
        false
    }
}

/// The mask of `x` as a `Bool` vector; all true when `x` is unmasked.
pub fn mask_of(x: impl IntoOperand) -> Result<Undifferentiable> {
    invoke_undifferentiable(MaskOf, vec![x.into_operand()])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::autodiff::ops::{add, reduce_sum};
    use crate::autodiff::{GradientTape, with};

    fn masked(len: usize, mask: &[bool]) -> Variable {
        let x = Variable::new(Tensor::ones(&[len, 2]));
        with_mask(&x, Tensor::from_bools(mask, &[mask.len()]).unwrap()).unwrap()
    }

    #[test]
    fn test_with_mask_length_checked() {
        let x = Variable::new(Tensor::ones(&[3, 2]));
        assert!(with_mask(&x, Tensor::from_bools(&[true, false], &[2]).unwrap()).is_err());
    }

    #[test]
    fn test_replace_not_merge() {
        let a = masked(3, &[true, false, true]);
        let b = masked(3, &[false, true, true]);
        let c = inherit_mask(&a, &b).unwrap();
        assert_eq!(c.mask(), Some(&[false, true, true][..]));
    }

    #[test]
    fn test_first_masked_input_wins() {
        let a = Variable::new(Tensor::ones(&[3, 2]));
        let b = masked(3, &[true, false, false]);
        let c = masked(3, &[false, false, true]);
        let y = add(&add(&a, &b).unwrap(), &c).unwrap();
        assert_eq!(y.mask(), Some(&[true, false, false][..]));
    }

    #[test]
    fn test_reduction_drops_mask() {
        let a = masked(3, &[true, false, true]);
        assert!(reduce_sum(&a, Some(&[1]), false).unwrap().mask().is_none());
        assert!(strip_mask(&a).unwrap().mask().is_none());
    }

    #[test]
    fn test_mask_of() {
        let a = masked(2, &[true, false]);
        assert_eq!(mask_of(&a).unwrap().tensor().data(), &[1.0, 0.0]);
        let plain = Variable::new(Tensor::ones(&[2]));
        assert_eq!(mask_of(&plain).unwrap().tensor().data(), &[1.0, 1.0]);
        assert!(mask_of(1.0).is_err());
    }

    #[test]
    fn test_gradient_passes_through_mask_ops() {
        let x = Variable::new(Tensor::ones(&[2, 2]));
        let tape = GradientTape::new();
        let y = with(&tape, |_| {
            let m = with_mask(&x, Tensor::from_bools(&[true, false], &[2])?)?;
            strip_mask(&m)
        })
        .unwrap();
        assert_eq!(tape.gradient(&y, &x).unwrap().data(), &[1.0; 4]);
    }
}
