//! Shape manipulation and indexing: reshape, transpose, expand_dims,
//! squeeze, shape, get, get_range and slice.

use std::ops::Range;

use super::{int_list, invoke_one, invoke_undifferentiable};
use crate::autodiff::graph::{BackwardContext, Operation};
use crate::autodiff::variable::{IntoOperand, Undifferentiable, Variable};
use crate::dtype::DType;
use crate::error::{GradError, Result};
use crate::operations::{
    inverse_permutation, normalize_axis, permutedims, scatter_into_zeros, slice as slice_ranges,
    validate_permutation,
};
use crate::tensor::Tensor;
use crate::value::{ShapeTuple, Value};

/// Resolve a reshape target against `from`.
///
/// `0` keeps the source dimension at the same position and a single `-1`
/// is inferred from the remaining element count.
fn resolve_reshape(from: &[usize], target: &[i64]) -> Result<Vec<usize>> {
    let err = |reason| GradError::InvalidReshape {
        from: from.to_vec(),
        target: target.to_vec(),
        reason,
    };
    if target.iter().filter(|&&d| d == -1).count() > 1 {
        return Err(err("at most one dimension may be -1"));
    }

    let mut out = Vec::with_capacity(target.len());
    let mut inferred = None;
    for (i, &d) in target.iter().enumerate() {
        match d {
            -1 => {
                inferred = Some(i);
                out.push(1);
            }
            0 => out.push(*from.get(i).ok_or(err("0 refers to a missing source dimension"))?),
            d if d < 0 => return Err(err("negative dimension")),
            d => out.push(d as usize),
        }
    }

    let total: usize = from.iter().product();
    let known: usize = out.iter().product();
    if let Some(i) = inferred {
        if known == 0 || total % known != 0 {
            return Err(err("cannot infer the -1 dimension"));
        }
        out[i] = total / known;
    } else if known != total {
        return Err(err("element count differs"));
    }
    Ok(out)
}

#[derive(Debug)]
struct Reshape;

impl Operation for Reshape {
    fn name(&self) -> &'static str {
        "reshape"
    }

    fn forward(&self, inputs: &[&Value]) -> Result<Vec<Value>> {
        let x = inputs[0].as_tensor();
        let target = int_list(self.name(), inputs[1])?;
        let shape = resolve_reshape(x.shape(), &target)?;
        Ok(vec![x.reshape(&shape)?.into()])
    }

    fn backward(&self, ctx: &BackwardContext<'_>, grads: &[Tensor]) -> Result<Vec<Option<Tensor>>> {
        Ok(vec![Some(grads[0].reshape(&ctx.inputs[0].shape())?), None])
    }

    fn input_differentiable(&self, index: usize) -> bool {
        index == 0
    }
}

/// Reshape `x` to `shape`.
///
/// `shape` is an integer list (a `Vec<i64>`, an array, or the output of
/// [`shape`]). A `0` keeps the source dimension at that position and one
/// `-1` is inferred.
///
/// # Errors
///
/// `InvalidReshape` for a second `-1`, a negative entry other than `-1`,
/// or a target whose element count differs from `x`.
///
/// # Example
///
/// ```
/// use gradtape::{Tensor, Variable, ops};
///
/// let x = Variable::new(Tensor::ones(&[2, 3, 4]));
/// let y = ops::reshape(&x, [0i64, -1]).unwrap();
/// assert_eq!(y.shape(), vec![2, 12]);
/// assert!(ops::reshape(&x, [-1i64, -1]).is_err());
/// ```
pub fn reshape(x: impl IntoOperand, shape: impl IntoOperand) -> Result<Variable> {
    invoke_one(Reshape, vec![x.into_operand(), shape.into_operand()])
}

#[derive(Debug)]
struct Transpose {
    perm: Option<Vec<usize>>,
}

impl Transpose {
    fn resolve(&self, ndim: usize) -> Result<Vec<usize>> {
        match &self.perm {
            Some(perm) => {
                validate_permutation(perm, ndim)?;
                Ok(perm.clone())
            }
            None => Ok((0..ndim).rev().collect()),
        }
    }
}

impl Operation for Transpose {
    fn name(&self) -> &'static str {
        "transpose"
    }

    fn forward(&self, inputs: &[&Value]) -> Result<Vec<Value>> {
        let x = inputs[0].as_tensor();
        let perm = self.resolve(x.ndim())?;
        Ok(vec![permutedims(&x, &perm)?.into()])
    }

    fn backward(&self, ctx: &BackwardContext<'_>, grads: &[Tensor]) -> Result<Vec<Option<Tensor>>> {
        let perm = self.resolve(ctx.inputs[0].shape().len())?;
        Ok(vec![Some(permutedims(&grads[0], &inverse_permutation(&perm))?)])
    }
}

/// Permute the axes of `x`; `None` reverses them.
///
/// # Errors
///
/// `InvalidPermutation` if `perm` is not a permutation of `0..ndim`,
/// including when an index repeats.
pub fn transpose(x: impl IntoOperand, perm: Option<&[usize]>) -> Result<Variable> {
    invoke_one(
        Transpose {
            perm: perm.map(<[usize]>::to_vec),
        },
        vec![x.into_operand()],
    )
}

/// Ops whose backward is a reshape back to the input shape.
#[derive(Debug)]
enum Restride {
    ExpandDims(isize),
    Squeeze(Option<isize>),
}

impl Restride {
    fn output_shape(&self, shape: &[usize]) -> Result<Vec<usize>> {
        match *self {
            Restride::ExpandDims(axis) => {
                let axis = normalize_axis("expand_dims", axis, shape.len() + 1)?;
                let mut out = shape.to_vec();
                out.insert(axis, 1);
                Ok(out)
            }
            Restride::Squeeze(None) => Ok(shape.iter().copied().filter(|&d| d != 1).collect()),
            Restride::Squeeze(Some(axis)) => {
                let axis = normalize_axis("squeeze", axis, shape.len())?;
                if shape[axis] != 1 {
                    return Err(GradError::InvalidArgument {
                        op: "squeeze",
                        message: format!("axis {axis} of shape {shape:?} does not have size 1"),
                    });
                }
                let mut out = shape.to_vec();
                out.remove(axis);
                Ok(out)
            }
        }
    }
}

impl Operation for Restride {
    fn name(&self) -> &'static str {
        match self {
            Restride::ExpandDims(_) => "expand_dims",
            Restride::Squeeze(_) => "squeeze",
        }
    }

    fn forward(&self, inputs: &[&Value]) -> Result<Vec<Value>> {
        let x = inputs[0].as_tensor();
        let shape = self.output_shape(x.shape())?;
        Ok(vec![x.reshape(&shape)?.into()])
    }

    fn backward(&self, ctx: &BackwardContext<'_>, grads: &[Tensor]) -> Result<Vec<Option<Tensor>>> {
        Ok(vec![Some(grads[0].reshape(&ctx.inputs[0].shape())?)])
    }
}

/// Insert a size-1 axis at `axis` (in `-(ndim+1)..=ndim`).
pub fn expand_dims(x: impl IntoOperand, axis: isize) -> Result<Variable> {
    invoke_one(Restride::ExpandDims(axis), vec![x.into_operand()])
}

/// Remove the size-1 axis `axis`, or every size-1 axis when `None`.
pub fn squeeze(x: impl IntoOperand, axis: Option<isize>) -> Result<Variable> {
    invoke_one(Restride::Squeeze(axis), vec![x.into_operand()])
}

#[derive(Debug)]
struct ShapeOf;

impl Operation for ShapeOf {
    fn name(&self) -> &'static str {
        "shape"
    }

    fn forward(&self, inputs: &[&Value]) -> Result<Vec<Value>> {
        let dims: ShapeTuple = inputs[0].shape().into_iter().collect();
        Ok(vec![Value::ShapeTuple(dims)])
    }

    fn is_differentiable(&self) -> bool {
        false
    }
}

/// The shape of `x` as a [`ShapeTuple`] value.
///
/// Index it with [`Undifferentiable::get`] and
/// [`Undifferentiable::get_range`], which keep the result typed as
/// undifferentiable.
///
/// # Example
///
/// ```
/// use gradtape::{Tensor, Variable, ops};
///
/// let x = Variable::new(Tensor::ones(&[2, 5]));
/// let s = ops::shape(&x).unwrap();
/// assert_eq!(s.get(-1).unwrap().item(), Some(5.0));
/// assert!(!s.is_backpropagatable());
/// ```
pub fn shape(x: impl IntoOperand) -> Result<Undifferentiable> {
    invoke_undifferentiable(ShapeOf, vec![x.into_operand()])
}

fn resolve_index(index: isize, len: usize) -> Result<usize> {
    let n = len as isize;
    if index < -n || index >= n {
        return Err(GradError::IndexOutOfBounds {
            index: index.unsigned_abs(),
            dim_size: len,
        });
    }
    Ok(if index < 0 { (index + n) as usize } else { index as usize })
}

/// Ranges selecting `leading` on axis 0 and everything on the other axes.
fn leading_ranges(shape: &[usize], leading: Range<usize>) -> Vec<Range<usize>> {
    std::iter::once(leading)
        .chain(shape[1..].iter().map(|&d| 0..d))
        .collect()
}

fn reject_scalar(op: &'static str, value: &Value) -> Result<()> {
    if value.shape().is_empty() {
        return Err(GradError::UnsupportedValue {
            op,
            expected: "value of rank >= 1",
            given: value.kind_name(),
        });
    }
    Ok(())
}

/// Extraction along the leading axis: one position or a contiguous range.
/// `frozen` selections take no gradient.
#[derive(Debug)]
enum Select {
    Index { index: isize, frozen: bool },
    Range { start: usize, size: usize, frozen: bool },
}

impl Select {
    fn frozen(&self) -> bool {
        match *self {
            Select::Index { frozen, .. } | Select::Range { frozen, .. } => frozen,
        }
    }

    fn range(&self, len: usize) -> Result<Range<usize>> {
        match *self {
            Select::Index { index, .. } => {
                let i = resolve_index(index, len)?;
                Ok(i..i + 1)
            }
            Select::Range { start, size, .. } => match start.checked_add(size) {
                Some(end) if end <= len => Ok(start..end),
                _ => Err(GradError::SliceOutOfBounds {
                    start,
                    end: start.saturating_add(size),
                    dim: 0,
                    size: len,
                }),
            },
        }
    }
}

impl Operation for Select {
    fn name(&self) -> &'static str {
        match self {
            Select::Index { .. } => "get",
            Select::Range { .. } => "get_range",
        }
    }

    fn forward(&self, inputs: &[&Value]) -> Result<Vec<Value>> {
        let x = inputs[0];
        reject_scalar(self.name(), x)?;
        if let Value::ShapeTuple(dims) = x {
            let range = self.range(dims.len())?;
            let out = match self {
                Select::Index { .. } => Value::Scalar {
                    value: dims[range.start] as f64,
                    dtype: DType::Int64,
                },
                Select::Range { .. } => Value::ShapeTuple(dims[range].iter().copied().collect()),
            };
            return Ok(vec![out]);
        }

        let t = x.as_tensor();
        let range = self.range(t.shape()[0])?;
        let part = slice_ranges(&t, &leading_ranges(t.shape(), range))?;
        let out = match self {
            Select::Index { .. } => part.reshape(&t.shape()[1..])?,
            Select::Range { .. } => part,
        };
        Ok(vec![out.into()])
    }

    fn backward(&self, ctx: &BackwardContext<'_>, grads: &[Tensor]) -> Result<Vec<Option<Tensor>>> {
        let shape = ctx.inputs[0].shape();
        let range = self.range(shape[0])?;
        let ranges = leading_ranges(&shape, range.clone());
        let mut part_shape = shape.clone();
        part_shape[0] = range.len();
        let part = grads[0].reshape(&part_shape)?;
        Ok(vec![Some(scatter_into_zeros(&part, &shape, &ranges)?)])
    }

    fn is_differentiable(&self) -> bool {
        !self.frozen()
    }
}

fn is_shape_tuple(var: &Variable) -> bool {
    matches!(var.value(), Value::ShapeTuple(_))
}

/// Element `index` along the leading axis; negative indices count from
/// the end.
///
/// On a shape tuple this yields an `Int64` scalar that takes no gradient.
/// The result is still a plain [`Variable`], flagged non-backpropagatable;
/// call [`Undifferentiable::get`] on the output of [`shape`] to keep the
/// undifferentiable type.
///
/// # Example
///
/// ```
/// use gradtape::{GradientTape, Tensor, Variable, ops, with};
///
/// let x = Variable::new(Tensor::from_vec(vec![1.0, 2.0, 3.0, 4.0], &[2, 2]).unwrap());
/// let tape = GradientTape::new();
/// let row = with(&tape, |_| ops::get(&x, 1)).unwrap();
/// assert_eq!(row.tensor().data(), &[3.0, 4.0]);
/// assert_eq!(tape.gradient(&row, &x).unwrap().data(), &[0.0, 0.0, 1.0, 1.0]);
/// ```
pub fn get(x: impl IntoOperand, index: isize) -> Result<Variable> {
    let x = x.into_operand();
    let frozen = is_shape_tuple(&x);
    invoke_one(Select::Index { index, frozen }, vec![x])
}

/// `size` consecutive elements along the leading axis starting at `start`.
///
/// Like [`get`], a shape tuple operand gives a non-backpropagatable
/// [`Variable`]; [`Undifferentiable::get_range`] keeps the type.
pub fn get_range(x: impl IntoOperand, start: usize, size: usize) -> Result<Variable> {
    let x = x.into_operand();
    let frozen = is_shape_tuple(&x);
    invoke_one(Select::Range { start, size, frozen }, vec![x])
}

impl Undifferentiable {
    /// Element `index` of this value, see [`get`].
    pub fn get(&self, index: isize) -> Result<Undifferentiable> {
        let x = self.as_variable().clone();
        invoke_one(Select::Index { index, frozen: true }, vec![x]).map(Undifferentiable::new)
    }

    /// Range of this value, see [`get_range`].
    pub fn get_range(&self, start: usize, size: usize) -> Result<Undifferentiable> {
        let x = self.as_variable().clone();
        invoke_one(Select::Range { start, size, frozen: true }, vec![x]).map(Undifferentiable::new)
    }
}

#[derive(Debug)]
struct Slice {
    begin: Vec<usize>,
    size: Vec<isize>,
}

impl Slice {
    fn ranges(&self, shape: &[usize]) -> Result<Vec<Range<usize>>> {
        if self.begin.len() != shape.len() || self.size.len() != shape.len() {
            return Err(GradError::WrongNumberOfIndices {
                expected: shape.len(),
                actual: self.begin.len().max(self.size.len()),
            });
        }
        self.begin
            .iter()
            .zip(&self.size)
            .enumerate()
            .map(|(dim, (&start, &size))| {
                let end = match size {
                    -1 => shape[dim].max(start),
                    s if s < 0 => {
                        return Err(GradError::InvalidArgument {
                            op: "slice",
                            message: format!("size {s} on axis {dim}; only -1 may be negative"),
                        });
                    }
                    s => start.saturating_add(s as usize),
                };
                // A saturated end is always out of bounds.
                if end > shape[dim] || start > shape[dim] {
                    return Err(GradError::SliceOutOfBounds {
                        start,
                        end,
                        dim,
                        size: shape[dim],
                    });
                }
                Ok(start..end)
            })
            .collect()
    }
}

impl Operation for Slice {
    fn name(&self) -> &'static str {
        "slice"
    }

    fn forward(&self, inputs: &[&Value]) -> Result<Vec<Value>> {
        let x = inputs[0].as_tensor();
        let ranges = self.ranges(x.shape())?;
        Ok(vec![slice_ranges(&x, &ranges)?.into()])
    }

    fn backward(&self, ctx: &BackwardContext<'_>, grads: &[Tensor]) -> Result<Vec<Option<Tensor>>> {
        let shape = ctx.inputs[0].shape();
        let ranges = self.ranges(&shape)?;
        Ok(vec![Some(scatter_into_zeros(&grads[0], &shape, &ranges)?)])
    }
}

/// Slice every axis: `begin[i]..begin[i] + size[i]`, where a size of `-1`
/// runs to the end of the axis.
pub fn slice(x: impl IntoOperand, begin: &[usize], size: &[isize]) -> Result<Variable> {
    invoke_one(
        Slice {
            begin: begin.to_vec(),
            size: size.to_vec(),
        },
        vec![x.into_operand()],
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::autodiff::ops::mul;
    use crate::autodiff::{GradientTape, with};

    #[test]
    fn test_resolve_reshape() {
        assert_eq!(resolve_reshape(&[2, 3, 4], &[0, -1]).unwrap(), vec![2, 12]);
        assert_eq!(resolve_reshape(&[2, 3], &[3, 2]).unwrap(), vec![3, 2]);
        assert_eq!(resolve_reshape(&[1], &[]).unwrap(), Vec::<usize>::new());
        assert!(matches!(
            resolve_reshape(&[6], &[-1, -1]),
            Err(GradError::InvalidReshape { .. })
        ));
        assert!(resolve_reshape(&[6], &[4]).is_err());
        assert!(resolve_reshape(&[6], &[-1, 4]).is_err());
        assert!(resolve_reshape(&[6], &[0, 0]).is_err());
    }

    #[test]
    fn test_reshape_to_scalar() {
        let x = Variable::new(Tensor::from(vec![10.0]));
        let tape = GradientTape::new();
        let y = with(&tape, |_| reshape(&x, Vec::<i64>::new())).unwrap();
        assert!(matches!(y.value(), Value::Scalar { .. }));
        assert_eq!(y.item(), Some(10.0));
        let g = tape.gradient(&y, &x).unwrap();
        assert_eq!(g.shape(), &[1]);
        assert_eq!(g.data(), &[1.0]);
    }

    #[test]
    fn test_reshape_from_shape_of() {
        let x = Variable::new(Tensor::ones(&[6]));
        let like = Variable::new(Tensor::zeros(&[2, 3]));
        let s = shape(&like).unwrap();
        assert_eq!(reshape(&x, &s).unwrap().shape(), vec![2, 3]);
    }

    #[test]
    fn test_transpose_default_reverses() {
        let x = Variable::new(Tensor::ones(&[2, 3, 4]));
        assert_eq!(transpose(&x, None).unwrap().shape(), vec![4, 3, 2]);
    }

    #[test]
    fn test_transpose_gradient_is_inverse() {
        let x = Variable::new(Tensor::from_vec((0..6).map(f64::from).collect(), &[1, 2, 3]).unwrap());
        let w = Tensor::from_vec((1..=6).map(f64::from).collect(), &[3, 1, 2]).unwrap();
        let tape = GradientTape::new();
        let y = with(&tape, |_| {
            let t = transpose(&x, Some(&[2, 0, 1]))?;
            mul(&t, w.clone())
        })
        .unwrap();
        let g = tape.gradient(&y, &x).unwrap();
        assert_eq!(g.shape(), &[1, 2, 3]);
        assert_eq!(g, w.permutedims(&[1, 2, 0]).unwrap());
    }

    #[test]
    fn test_transpose_duplicate_axis() {
        let x = Variable::new(Tensor::ones(&[2, 3]));
        assert!(matches!(
            transpose(&x, Some(&[0, 0])),
            Err(GradError::InvalidPermutation { .. })
        ));
    }

    #[test]
    fn test_expand_and_squeeze() {
        let x = Variable::new(Tensor::ones(&[2, 3]));
        let e = expand_dims(&x, -1).unwrap();
        assert_eq!(e.shape(), vec![2, 3, 1]);
        assert_eq!(squeeze(&e, None).unwrap().shape(), vec![2, 3]);
        assert!(squeeze(&x, Some(0)).is_err());
    }

    #[test]
    fn test_get_on_shape_tuple() {
        let x = Variable::new(Tensor::ones(&[4, 7, 9]));
        let s = shape(&x).unwrap();
        let d = s.get(1).unwrap();
        assert_eq!(d.item(), Some(7.0));
        assert_eq!(d.dtype(), DType::Int64);
        let r = s.get_range(1, 2).unwrap();
        assert_eq!(r.shape(), vec![2]);
        assert_eq!(r.tensor().data(), &[7.0, 9.0]);
        assert!(s.get(3).is_err());
    }

    #[test]
    fn test_free_get_on_shape_tuple_is_flagged() {
        let x = Variable::new(Tensor::ones(&[4, 7]));
        let tape = GradientTape::new();
        let (d, r) = with(&tape, |_| -> Result<(Variable, Variable)> {
            let s = shape(&x)?;
            Ok((get(&s, 0)?, get_range(s, 0, 2)?))
        })
        .unwrap();
        assert!(!d.is_backpropagatable());
        assert!(!r.is_backpropagatable());
        assert_eq!(d.item(), Some(4.0));
        assert!(matches!(
            tape.gradient(&d, &x),
            Err(GradError::NonDifferentiableTarget { .. })
        ));
    }

    #[test]
    fn test_get_on_undifferentiable_tensor() {
        let x = Variable::new(Tensor::from_vec(vec![1.0, 2.0, 3.0, 4.0], &[2, 2]).unwrap());
        let flags = crate::ops::greater(&x, 2.5).unwrap();
        let row = flags.get(1).unwrap();
        assert!(!row.as_variable().is_backpropagatable());
        assert_eq!(row.as_variable().tensor().data(), &[1.0, 1.0]);
    }

    #[test]
    fn test_get_range_gradient() {
        let x = Variable::new(Tensor::ones(&[4, 2]));
        let tape = GradientTape::new();
        let y = with(&tape, |_| get_range(&x, 1, 2)).unwrap();
        assert_eq!(y.shape(), vec![2, 2]);
        let g = tape.gradient(&y, &x).unwrap();
        assert_eq!(g.data(), &[0.0, 0.0, 1.0, 1.0, 1.0, 1.0, 0.0, 0.0]);
    }

    #[test]
    fn test_get_negative_index() {
        let x = Variable::new(Tensor::from(vec![1.0, 2.0, 3.0]));
        assert_eq!(get(&x, -1).unwrap().item(), Some(3.0));
        assert!(matches!(
            get(&x, 3),
            Err(GradError::IndexOutOfBounds { index: 3, dim_size: 3 })
        ));
        assert!(get(2.0, 0).is_err());
    }

    #[test]
    fn test_slice_to_end() {
        let x = Variable::new(Tensor::from_vec((0..6).map(f64::from).collect(), &[2, 3]).unwrap());
        let tape = GradientTape::new();
        let y = with(&tape, |_| slice(&x, &[0, 1], &[-1, 2])).unwrap();
        assert_eq!(y.tensor().data(), &[1.0, 2.0, 4.0, 5.0]);
        let g = tape.gradient(&y, &x).unwrap();
        assert_eq!(g.data(), &[0.0, 1.0, 1.0, 0.0, 1.0, 1.0]);
    }
}
