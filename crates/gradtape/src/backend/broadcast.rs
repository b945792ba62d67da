//! NumPy-style broadcasting.
//!
//! Shapes are aligned at their trailing axes; a dimension of size 1 stretches
//! to match the other operand. [`reduce_to_shape`] is the inverse used on the
//! backward pass: it sums a gradient over exactly the axes that were prepended
//! or stretched so that it matches the original operand again.

use crate::error::{GradError, Result};
use crate::operations::sum_axes;
use crate::strides::{cartesian_to_linear, compute_strides, increment_index};
use crate::tensor::Tensor;

/// Compute the broadcast shape of `a` and `b`.
///
/// # Example
///
/// ```
/// use gradtape::backend::broadcast_shapes;
///
/// assert_eq!(broadcast_shapes("add", &[2, 1, 3], &[4, 1]).unwrap(), vec![2, 4, 3]);
/// assert!(broadcast_shapes("add", &[2, 3], &[4]).is_err());
/// ```
pub fn broadcast_shapes(op: &'static str, a: &[usize], b: &[usize]) -> Result<Vec<usize>> {
    let ndim = a.len().max(b.len());
    let mut out = vec![0; ndim];
    for i in 0..ndim {
        let da = if i + a.len() >= ndim { a[i + a.len() - ndim] } else { 1 };
        let db = if i + b.len() >= ndim { b[i + b.len() - ndim] } else { 1 };
        out[i] = match (da, db) {
            (x, y) if x == y => x,
            (1, y) => y,
            (x, 1) => x,
            _ => {
                return Err(GradError::IncompatibleBroadcast {
                    op,
                    lhs: a.to_vec(),
                    rhs: b.to_vec(),
                });
            }
        };
    }
    Ok(out)
}

/// Strides that read `shape` as if it were broadcast to `target`.
///
/// Prepended and stretched axes get stride 0.
pub(crate) fn broadcast_strides(shape: &[usize], target: &[usize]) -> Vec<usize> {
    let strides = compute_strides(shape);
    let offset = target.len() - shape.len();
    (0..target.len())
        .map(|i| {
            if i < offset || shape[i - offset] == 1 {
                0
            } else {
                strides[i - offset]
            }
        })
        .collect()
}

/// Materialize `tensor` broadcast to `shape`.
pub fn broadcast_to(tensor: &Tensor, shape: &[usize]) -> Result<Tensor> {
    let out_shape = broadcast_shapes("broadcast_to", tensor.shape(), shape)?;
    if out_shape != shape {
        return Err(GradError::IncompatibleBroadcast {
            op: "broadcast_to",
            lhs: tensor.shape().to_vec(),
            rhs: shape.to_vec(),
        });
    }
    if tensor.shape() == shape {
        return Ok(tensor.clone());
    }
    let src_strides = broadcast_strides(tensor.shape(), shape);
    let total: usize = shape.iter().product();
    let mut data = Vec::with_capacity(total);
    let mut idx = vec![0usize; shape.len()];
    for _ in 0..total {
        data.push(tensor.data()[cartesian_to_linear(&idx, &src_strides)]);
        increment_index(&mut idx, shape);
    }
    Tensor::from_vec_with_dtype(data, shape, tensor.dtype())
}

/// Axes of `from` that must be summed to fold it back onto `to`.
///
/// These are the prepended axes plus every axis where `to` has size 1 and
/// `from` does not.
///
/// # Example
///
/// ```
/// use gradtape::backend::reduced_axes;
///
/// assert_eq!(reduced_axes(&[4, 2, 3], &[2, 1]), vec![0, 2]);
/// assert_eq!(reduced_axes(&[2, 3], &[2, 3]), Vec::<usize>::new());
/// ```
pub fn reduced_axes(from: &[usize], to: &[usize]) -> Vec<usize> {
    let offset = from.len().saturating_sub(to.len());
    (0..from.len())
        .filter(|&i| i < offset || (to[i - offset] == 1 && from[i] != 1))
        .collect()
}

/// Sum `grad` over broadcast axes so that its shape becomes `shape`.
///
/// # Errors
///
/// Returns `IncompatibleBroadcast` if `shape` does not broadcast to
/// `grad.shape()`.
pub fn reduce_to_shape(grad: &Tensor, shape: &[usize]) -> Result<Tensor> {
    if grad.shape() == shape {
        return Ok(grad.clone());
    }
    let compatible = shape.len() <= grad.ndim()
        && broadcast_shapes("reduce_to_shape", grad.shape(), shape)
            .map(|s| s == grad.shape())
            .unwrap_or(false);
    if !compatible {
        return Err(GradError::IncompatibleBroadcast {
            op: "reduce_to_shape",
            lhs: grad.shape().to_vec(),
            rhs: shape.to_vec(),
        });
    }
    let axes = reduced_axes(grad.shape(), shape);
    sum_axes(grad, &axes, false)?.reshape(shape)
}
