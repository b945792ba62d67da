//! Axis reductions.

use super::{grad_div, grad_mul, invoke_one};
use crate::autodiff::graph::{BackwardContext, Operation};
use crate::autodiff::variable::{IntoOperand, Variable};
use crate::backend::broadcast_to;
use crate::dtype::DType;
use crate::error::Result;
use crate::operations::{apply_binary, max_axes, mean_axes, normalize_axes, reduced_shape, sum_axes};
use crate::tensor::Tensor;
use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Reduction {
    Sum,
    Mean,
    Max,
}

#[derive(Debug)]
struct Reduce {
    kind: Reduction,
    axes: Option<Vec<isize>>,
    keepdims: bool,
}

impl Reduce {
    fn axes(&self, ndim: usize) -> Result<Vec<usize>> {
        match &self.axes {
            Some(axes) => normalize_axes(self.name(), axes, ndim),
            None => Ok((0..ndim).collect()),
        }
    }
}

impl Operation for Reduce {
    fn name(&self) -> &'static str {
        match self.kind {
            Reduction::Sum => "reduce_sum",
            Reduction::Mean => "reduce_mean",
            Reduction::Max => "reduce_max",
        }
    }

    fn forward(&self, inputs: &[&Value]) -> Result<Vec<Value>> {
        let x = inputs[0].as_tensor();
        let axes = self.axes(x.ndim())?;
        let out = match self.kind {
            Reduction::Sum => sum_axes(&x, &axes, self.keepdims)?,
            Reduction::Mean => mean_axes(&x, &axes, self.keepdims)?,
            Reduction::Max => max_axes(&x, &axes, self.keepdims)?,
        };
        Ok(vec![out.into()])
    }

    fn backward(&self, ctx: &BackwardContext<'_>, grads: &[Tensor]) -> Result<Vec<Option<Tensor>>> {
        let x = ctx.input(0);
        let axes = self.axes(x.ndim())?;
        let kept = reduced_shape(x.shape(), &axes, true);
        let g = grads[0].reshape(&kept)?;

        let dx = match self.kind {
            Reduction::Sum => broadcast_to(&g, x.shape())?,
            Reduction::Mean => {
                let count: usize = axes.iter().map(|&a| x.shape()[a]).product();
                let g = broadcast_to(&g, x.shape())?;
                let n = count as f64;
                apply_binary(self.name(), &g, &Tensor::scalar(n), g.dtype(), |v, n| v / n)?
            }
            Reduction::Max => {
                // Ties split the gradient evenly.
                let y = ctx.output(0).reshape(&kept)?;
                let hits = apply_binary(self.name(), &x, &y, DType::Float64, |a, b| f64::from(u8::from(a == b)))?;
                let counts = sum_axes(&hits, &axes, true)?;
                grad_div(&grad_mul(&hits, &g)?, &counts)?
            }
        };
        Ok(vec![Some(dx)])
    }
}

fn reduce(kind: Reduction, x: impl IntoOperand, axes: Option<&[isize]>, keepdims: bool) -> Result<Variable> {
    invoke_one(
        Reduce {
            kind,
            axes: axes.map(<[isize]>::to_vec),
            keepdims,
        },
        vec![x.into_operand()],
    )
}

/// Sum over `axes`, or over every axis when `None`.
///
/// # Example
///
/// ```
/// use gradtape::{GradientTape, Tensor, Variable, ops, with};
///
/// let x = Variable::new(Tensor::from_vec(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], &[2, 3]).unwrap());
/// let tape = GradientTape::new();
/// let y = with(&tape, |_| ops::reduce_sum(&x, Some(&[-1]), false)).unwrap();
/// assert_eq!(y.tensor().data(), &[6.0, 15.0]);
/// assert_eq!(tape.gradient(&y, &x).unwrap().data(), &[1.0; 6]);
/// ```
pub fn reduce_sum(x: impl IntoOperand, axes: Option<&[isize]>, keepdims: bool) -> Result<Variable> {
    reduce(Reduction::Sum, x, axes, keepdims)
}

/// Mean over `axes`, or over every axis when `None`. Integer inputs give
/// `Float64`.
pub fn reduce_mean(x: impl IntoOperand, axes: Option<&[isize]>, keepdims: bool) -> Result<Variable> {
    reduce(Reduction::Mean, x, axes, keepdims)
}

/// Maximum over `axes`. The gradient goes to the maximal positions and is
/// shared evenly among ties.
pub fn reduce_max(x: impl IntoOperand, axes: Option<&[isize]>, keepdims: bool) -> Result<Variable> {
    reduce(Reduction::Max, x, axes, keepdims)
}
