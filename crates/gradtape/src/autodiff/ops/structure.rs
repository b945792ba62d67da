//! Splitting, joining and repeating along an axis.

use std::ops::Range;

use super::{apply_operation, int_scalar, invoke_one};
use crate::autodiff::graph::{BackwardContext, Operation};
use crate::autodiff::mask::MaskPolicy;
use crate::autodiff::variable::{IntoOperand, Variable};
use crate::error::{GradError, Result};
use crate::operations::{concat as concat_tensors, normalize_axis, slice, sum_axes, tile};
use crate::tensor::Tensor;
use crate::value::Value;

/// How [`split`] partitions its axis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SplitSpec {
    /// `n` equal parts; the axis length must be divisible by `n`.
    Count(usize),
    /// Explicit part lengths summing to the axis length.
    Sizes(Vec<usize>),
}

impl From<usize> for SplitSpec {
    fn from(n: usize) -> Self {
        SplitSpec::Count(n)
    }
}

impl From<Vec<usize>> for SplitSpec {
    fn from(sizes: Vec<usize>) -> Self {
        SplitSpec::Sizes(sizes)
    }
}

impl<const N: usize> From<[usize; N]> for SplitSpec {
    fn from(sizes: [usize; N]) -> Self {
        SplitSpec::Sizes(sizes.to_vec())
    }
}

impl SplitSpec {
    fn sizes(&self, len: usize) -> Result<Vec<usize>> {
        match self {
            SplitSpec::Count(0) => Err(GradError::InvalidArgument {
                op: "split",
                message: "cannot split into 0 parts".into(),
            }),
            SplitSpec::Count(n) if len % n != 0 => Err(GradError::InvalidArgument {
                op: "split",
                message: format!("axis of length {len} is not divisible into {n} parts"),
            }),
            SplitSpec::Count(n) => Ok(vec![len / n; *n]),
            SplitSpec::Sizes(sizes) if sizes.iter().sum::<usize>() != len => Err(GradError::InvalidArgument {
                op: "split",
                message: format!("sizes {sizes:?} do not sum to the axis length {len}"),
            }),
            SplitSpec::Sizes(sizes) => Ok(sizes.clone()),
        }
    }
}

fn axis_ranges(shape: &[usize], axis: usize, range: Range<usize>) -> Vec<Range<usize>> {
    shape
        .iter()
        .enumerate()
        .map(|(d, &n)| if d == axis { range.clone() } else { 0..n })
        .collect()
}

#[derive(Debug)]
struct Split {
    spec: SplitSpec,
    axis: Option<isize>,
}

impl Split {
    fn resolve(&self, shape: &[usize]) -> Result<(usize, Vec<usize>)> {
        let axis = normalize_axis("split", self.axis.unwrap_or(-1), shape.len())?;
        Ok((axis, self.spec.sizes(shape[axis])?))
    }
}

impl Operation for Split {
    fn name(&self) -> &'static str {
        "split"
    }

    fn forward(&self, inputs: &[&Value]) -> Result<Vec<Value>> {
        let x = inputs[0].as_tensor();
        let (axis, sizes) = self.resolve(x.shape())?;
        let mut offset = 0;
        sizes
            .iter()
            .map(|&size| -> Result<Value> {
                let ranges = axis_ranges(x.shape(), axis, offset..offset + size);
                offset += size;
                Ok(slice(&x, &ranges)?.into())
            })
            .collect()
    }

    fn backward(&self, ctx: &BackwardContext<'_>, grads: &[Tensor]) -> Result<Vec<Option<Tensor>>> {
        let (axis, _) = self.resolve(&ctx.inputs[0].shape())?;
        let parts: Vec<&Tensor> = grads.iter().collect();
        Ok(vec![Some(concat_tensors(&parts, axis)?)])
    }

    fn mask_policy(&self) -> MaskPolicy {
        MaskPolicy::InheritFirst
    }
}

/// Partition `x` along `axis` (default: the last axis).
///
/// The gradient of each part lands at that part's offset in a zero array of
/// `x`'s shape; parts that receive no gradient contribute zeros.
///
/// # Example
///
/// ```
/// use gradtape::{GradientTape, Tensor, Variable, ops, with};
///
/// let x = Variable::new(Tensor::from_vec(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], &[2, 3]).unwrap());
/// let tape = GradientTape::new();
/// let parts = with(&tape, |_| ops::split(&x, [1usize, 2], None)).unwrap();
/// assert_eq!(parts[1].tensor().data(), &[2.0, 3.0, 5.0, 6.0]);
/// let g = tape.gradient(&parts[0], &x).unwrap();
/// assert_eq!(g.data(), &[1.0, 0.0, 0.0, 1.0, 0.0, 0.0]);
/// ```
pub fn split(x: impl IntoOperand, spec: impl Into<SplitSpec>, axis: Option<isize>) -> Result<Vec<Variable>> {
    apply_operation(
        Split {
            spec: spec.into(),
            axis,
        },
        vec![x.into_operand()],
    )
}

#[derive(Debug)]
struct Concat {
    axis: isize,
}

impl Concat {
    fn resolve(&self, inputs: &[&Value]) -> Result<usize> {
        let ndim = inputs.first().map_or(0, |v| v.shape().len());
        normalize_axis("concat", self.axis, ndim)
    }
}

impl Operation for Concat {
    fn name(&self) -> &'static str {
        "concat"
    }

    fn forward(&self, inputs: &[&Value]) -> Result<Vec<Value>> {
        if inputs.is_empty() {
            return Err(GradError::InvalidArgument {
                op: "concat",
                message: "at least one tensor is required".into(),
            });
        }
        let axis = self.resolve(inputs)?;
        let parts: Vec<_> = inputs.iter().map(|v| v.as_tensor()).collect();
        let refs: Vec<&Tensor> = parts.iter().map(|p| &**p).collect();
        Ok(vec![concat_tensors(&refs, axis)?.into()])
    }

    fn backward(&self, ctx: &BackwardContext<'_>, grads: &[Tensor]) -> Result<Vec<Option<Tensor>>> {
        let axis = self.resolve(ctx.inputs)?;
        let g = &grads[0];
        let mut offset = 0;
        ctx.inputs
            .iter()
            .map(|input| -> Result<Option<Tensor>> {
                let size = input.shape()[axis];
                let ranges = axis_ranges(g.shape(), axis, offset..offset + size);
                offset += size;
                Ok(Some(slice(g, &ranges)?))
            })
            .collect()
    }

    fn mask_policy(&self) -> MaskPolicy {
        MaskPolicy::InheritFirst
    }
}

/// Join `xs` along an existing `axis`.
///
/// # Example
///
/// ```
/// use gradtape::{Tensor, Variable, ops};
///
/// let x = Variable::new(Tensor::from_vec(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], &[2, 3]).unwrap());
/// let parts = ops::split(&x, 3usize, Some(1)).unwrap();
/// let back = ops::concat(&parts, 1).unwrap();
/// assert_eq!(back.tensor(), x.tensor());
/// ```
pub fn concat<T: IntoOperand>(xs: impl IntoIterator<Item = T>, axis: isize) -> Result<Variable> {
    let inputs = xs.into_iter().map(IntoOperand::into_operand).collect();
    invoke_one(Concat { axis }, inputs)
}

#[derive(Debug)]
struct Repeat {
    axis: isize,
    keepdims: bool,
}

impl Repeat {
    /// Axis of the output the copies are laid along.
    fn resolve(&self, ndim: usize) -> Result<usize> {
        let rank = if self.keepdims { ndim } else { ndim + 1 };
        normalize_axis("repeat", self.axis, rank)
    }

    fn count(&self, value: &Value) -> Result<usize> {
        let n = int_scalar("repeat", value)?;
        usize::try_from(n).map_err(|_| GradError::InvalidArgument {
            op: "repeat",
            message: format!("repeat count must be non-negative, got {n}"),
        })
    }
}

impl Operation for Repeat {
    fn name(&self) -> &'static str {
        "repeat"
    }

    fn forward(&self, inputs: &[&Value]) -> Result<Vec<Value>> {
        let x = inputs[0].as_tensor();
        let n = self.count(inputs[1])?;
        let axis = self.resolve(x.ndim())?;
        let out = if self.keepdims {
            tile(&x, n, axis)?
        } else {
            let mut shape = x.shape().to_vec();
            shape.insert(axis, 1);
            tile(&x.reshape(&shape)?, n, axis)?
        };
        Ok(vec![out.into()])
    }

    fn backward(&self, ctx: &BackwardContext<'_>, grads: &[Tensor]) -> Result<Vec<Option<Tensor>>> {
        let shape = ctx.inputs[0].shape();
        let n = self.count(ctx.inputs[1])?;
        let axis = self.resolve(shape.len())?;
        // Copies become their own axis, then sum them away.
        let mut blocks = shape[..axis].to_vec();
        blocks.push(n);
        blocks.extend_from_slice(&shape[axis..]);
        let summed = sum_axes(&grads[0].reshape(&blocks)?, &[axis], false)?;
        Ok(vec![Some(summed), None])
    }

    fn input_differentiable(&self, index: usize) -> bool {
        index == 0
    }
}

/// Tile `x` `n` times along `axis`.
///
/// With `keepdims` the copies are laid end to end along the existing
/// `axis`; without it a new axis of length `n` is inserted at `axis`. The
/// gradient sums the `n` gradient blocks back onto `x`.
///
/// # Example
///
/// ```
/// use gradtape::{GradientTape, Tensor, Variable, ops, with};
///
/// let x = Variable::new(Tensor::from(vec![1.0, 2.0]));
/// let tape = GradientTape::new();
/// let y = with(&tape, |_| ops::repeat(&x, 3i64, 0, false)).unwrap();
/// assert_eq!(y.shape(), vec![3, 2]);
/// assert_eq!(tape.gradient(&y, &x).unwrap().data(), &[3.0, 3.0]);
/// ```
pub fn repeat(x: impl IntoOperand, n: impl IntoOperand, axis: isize, keepdims: bool) -> Result<Variable> {
    invoke_one(Repeat { axis, keepdims }, vec![x.into_operand(), n.into_operand()])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::autodiff::ops::mul;
    use crate::autodiff::{GradientTape, with};

    fn t23() -> Variable {
        Variable::new(Tensor::from_vec(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], &[2, 3]).unwrap())
    }

    #[test]
    fn test_split_count_and_sizes() {
        let x = t23();
        let parts = split(&x, 2usize, Some(0)).unwrap();
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[1].tensor().data(), &[4.0, 5.0, 6.0]);
        assert!(split(&x, 2usize, Some(1)).is_err());
        assert!(split(&x, vec![1usize, 1], Some(1)).is_err());
        assert!(split(&x, 0usize, None).is_err());
    }

    #[test]
    fn test_split_both_parts_used() {
        let x = t23();
        let tape = GradientTape::new();
        let y = with(&tape, |_| {
            let parts = split(&x, [1usize, 2], Some(1))?;
            let scaled = mul(&parts[1], 10.0)?;
            concat([&parts[0], &scaled], 1)
        })
        .unwrap();
        assert_eq!(y.tensor().data(), &[1.0, 20.0, 30.0, 4.0, 50.0, 60.0]);
        let g = tape.gradient(&y, &x).unwrap();
        assert_eq!(g.data(), &[1.0, 10.0, 10.0, 1.0, 10.0, 10.0]);
    }

    #[test]
    fn test_concat_gradient_slices() {
        let a = Variable::new(Tensor::ones(&[1, 2]));
        let b = Variable::new(Tensor::ones(&[2, 2]));
        let tape = GradientTape::new();
        let y = with(&tape, |_| {
            let c = concat([&a, &b], 0)?;
            mul(&c, Tensor::from_vec(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], &[3, 2]).unwrap())
        })
        .unwrap();
        let g = tape.gradient(&y, [&a, &b]).unwrap();
        assert_eq!(g[0].data(), &[1.0, 2.0]);
        assert_eq!(g[1].data(), &[3.0, 4.0, 5.0, 6.0]);
    }

    #[test]
    fn test_concat_empty_is_error() {
        assert!(concat(Vec::<Variable>::new(), 0).is_err());
    }

    #[test]
    fn test_repeat_keepdims_gradient() {
        let x = Variable::new(Tensor::from_vec(vec![1.0, 2.0, 3.0, 4.0], &[2, 2]).unwrap());
        let w = Tensor::from_vec((1..=8).map(f64::from).collect(), &[2, 4]).unwrap();
        let tape = GradientTape::new();
        let y = with(&tape, |_| {
            let r = repeat(&x, 2i64, 1, true)?;
            mul(&r, w.clone())
        })
        .unwrap();
        let g = tape.gradient(&y, &x).unwrap();
        // Tiled layout [x0, x1, x0, x1] per row.
        assert_eq!(g.data(), &[1.0 + 3.0, 2.0 + 4.0, 5.0 + 7.0, 6.0 + 8.0]);
    }

    #[test]
    fn test_repeat_zero_and_negative() {
        let x = Variable::new(Tensor::ones(&[3]));
        let tape = GradientTape::new();
        let y = with(&tape, |_| repeat(&x, 0i64, 0, true)).unwrap();
        assert_eq!(y.shape(), vec![0]);
        assert_eq!(tape.gradient(&y, &x).unwrap().data(), &[0.0, 0.0, 0.0]);
        assert!(repeat(&x, -1i64, 0, true).is_err());
    }

    #[test]
    fn test_repeat_count_is_not_differentiable() {
        let x = Variable::new(Tensor::ones(&[2]));
        let n = Variable::new(2i64);
        let tape = GradientTape::new();
        let y = with(&tape, |_| repeat(&x, &n, 0, true)).unwrap();
        assert!(tape.gradient(&y, &n).is_err());
    }
}
