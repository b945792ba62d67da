//! Joining and tiling along an axis.

use crate::error::{GradError, Result};
use crate::tensor::Tensor;

/// Concatenate tensors along an existing `axis`.
///
/// All parts must agree on every other dimension. The result takes the
/// promoted dtype of the parts.
///
/// # Example
///
/// ```
/// use gradtape::Tensor;
/// use gradtape::operations::concat;
///
/// let a = Tensor::from_vec(vec![1.0, 2.0, 3.0, 4.0], &[2, 2]).unwrap();
/// let b = Tensor::from_vec(vec![5.0, 6.0], &[2, 1]).unwrap();
/// let c = concat(&[&a, &b], 1).unwrap();
/// assert_eq!(c.shape(), &[2, 3]);
/// assert_eq!(c.data(), &[1.0, 2.0, 5.0, 3.0, 4.0, 6.0]);
/// ```
pub fn concat(parts: &[&Tensor], axis: usize) -> Result<Tensor> {
    let first = parts.first().ok_or_else(|| GradError::InvalidArgument {
        op: "concat",
        message: "at least one tensor is required".into(),
    })?;
    let ndim = first.ndim();
    if axis >= ndim {
        return Err(GradError::InvalidAxis {
            op: "concat",
            axis: axis as isize,
            ndim,
        });
    }

    let mut out_shape = first.shape().to_vec();
    out_shape[axis] = 0;
    let mut dtype = first.dtype();
    for part in parts {
        let compatible = part.ndim() == ndim
            && part
                .shape()
                .iter()
                .zip(first.shape())
                .enumerate()
                .all(|(d, (a, b))| d == axis || a == b);
        if !compatible {
            return Err(GradError::ShapeMismatch {
                op: "concat",
                expected: first.shape().to_vec(),
                given: part.shape().to_vec(),
            });
        }
        out_shape[axis] += part.shape()[axis];
        dtype = dtype.promote(part.dtype());
    }

    // Row-major: outer = product of dims before axis, each part contributes
    // a contiguous block of `shape[axis] * inner` per outer index.
    let outer: usize = out_shape[..axis].iter().product();
    let inner: usize = out_shape[axis + 1..].iter().product();
    let mut data = Vec::with_capacity(out_shape.iter().product());
    for o in 0..outer {
        for part in parts {
            let block = part.shape()[axis] * inner;
            data.extend_from_slice(&part.data()[o * block..(o + 1) * block]);
        }
    }
    Tensor::from_vec_with_dtype(data, &out_shape, dtype)
}

/// Repeat `tensor` `n` times along an existing `axis`.
///
/// Blocks are laid out whole: `[a, b]` tiled twice gives `[a, b, a, b]`.
pub fn tile(tensor: &Tensor, n: usize, axis: usize) -> Result<Tensor> {
    if n == 0 {
        if axis >= tensor.ndim() {
            return Err(GradError::InvalidAxis {
                op: "repeat",
                axis: axis as isize,
                ndim: tensor.ndim(),
            });
        }
        let mut shape = tensor.shape().to_vec();
        shape[axis] = 0;
        return Ok(Tensor::full_with_dtype(&shape, 0.0, tensor.dtype()));
    }
    let parts = vec![tensor; n];
    concat(&parts, axis)
}
