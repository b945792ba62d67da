//! Tensor slicing operations.

use crate::error::{GradError, Result};
use crate::strides::{cartesian_to_linear, increment_index};
use crate::tensor::Tensor;
use std::ops::Range;

fn validate_ranges(shape: &[usize], ranges: &[Range<usize>]) -> Result<Vec<usize>> {
    if ranges.len() != shape.len() {
        return Err(GradError::WrongNumberOfIndices {
            expected: shape.len(),
            actual: ranges.len(),
        });
    }
    let mut new_shape = Vec::with_capacity(shape.len());
    for (dim, range) in ranges.iter().enumerate() {
        if range.start > range.end || range.end > shape[dim] {
            return Err(GradError::SliceOutOfBounds {
                start: range.start,
                end: range.end,
                dim,
                size: shape[dim],
            });
        }
        new_shape.push(range.end - range.start);
    }
    Ok(new_shape)
}

/// Extract a slice from a tensor along every dimension.
///
/// This creates a copy of the sliced data (not a view).
///
/// # Errors
///
/// Returns error if:
/// - Number of ranges doesn't match tensor dimensions
/// - Any range is out of bounds
///
/// # Example
///
/// ```
/// use gradtape::Tensor;
/// use gradtape::operations::slice;
///
/// let t = Tensor::ones(&[4, 5, 6]);
/// let s = slice(&t, &[1..3, 0..5, 2..4]).unwrap();
/// assert_eq!(s.shape(), &[2, 5, 2]);
/// ```
pub fn slice(tensor: &Tensor, ranges: &[Range<usize>]) -> Result<Tensor> {
    let new_shape = validate_ranges(tensor.shape(), ranges)?;
    let total: usize = new_shape.iter().product();
    let mut data = Vec::with_capacity(total);

    let mut indices = vec![0usize; new_shape.len()];
    let mut src = vec![0usize; new_shape.len()];
    for _ in 0..total {
        for (d, range) in ranges.iter().enumerate() {
            src[d] = range.start + indices[d];
        }
        data.push(tensor.data()[cartesian_to_linear(&src, tensor.strides())]);
        increment_index(&mut indices, &new_shape);
    }

    Ok(Tensor::from_raw(data, &new_shape, tensor.dtype()))
}

/// Place `part` into a zero tensor of `shape` at the region `ranges`.
///
/// This is the adjoint of [`slice`]; every position outside the region is 0.
///
/// # Example
///
/// ```
/// use gradtape::Tensor;
/// use gradtape::operations::scatter_into_zeros;
///
/// let g = Tensor::from_vec(vec![1.0, 1.0], &[2, 1]).unwrap();
/// let full = scatter_into_zeros(&g, &[2, 3], &[0..2, 0..1]).unwrap();
/// assert_eq!(full.data(), &[1.0, 0.0, 0.0, 1.0, 0.0, 0.0]);
/// ```
pub fn scatter_into_zeros(part: &Tensor, shape: &[usize], ranges: &[Range<usize>]) -> Result<Tensor> {
    let region = validate_ranges(shape, ranges)?;
    if region != part.shape() {
        return Err(GradError::ShapeMismatch {
            op: "scatter_into_zeros",
            expected: region,
            given: part.shape().to_vec(),
        });
    }

    let mut out = Tensor::full_with_dtype(shape, 0.0, part.dtype());
    let strides = out.strides().to_vec();
    let mut indices = vec![0usize; region.len()];
    let mut dst = vec![0usize; region.len()];
    for &value in part.data() {
        for (d, range) in ranges.iter().enumerate() {
            dst[d] = range.start + indices[d];
        }
        out.data_mut()[cartesian_to_linear(&dst, &strides)] = value;
        increment_index(&mut indices, &region);
    }
    Ok(out)
}
