//! Axis reductions.
//!
//! Axes are already normalized (`usize`, sorted, unique); see
//! [`normalize_axes`](super::normalize_axes) for the signed entry point.

use crate::dtype::DType;
use crate::error::{GradError, Result};
use crate::strides::{cartesian_to_linear, compute_strides, increment_index};
use crate::tensor::Tensor;

/// Shape after reducing `axes`; reduced axes become 1 with `keepdims`.
pub fn reduced_shape(shape: &[usize], axes: &[usize], keepdims: bool) -> Vec<usize> {
    shape
        .iter()
        .enumerate()
        .filter_map(|(i, &d)| {
            if axes.contains(&i) {
                keepdims.then_some(1)
            } else {
                Some(d)
            }
        })
        .collect()
}

fn check_axes(op: &'static str, tensor: &Tensor, axes: &[usize]) -> Result<()> {
    match axes.iter().find(|&&a| a >= tensor.ndim()) {
        Some(&axis) => Err(GradError::InvalidAxis {
            op,
            axis: axis as isize,
            ndim: tensor.ndim(),
        }),
        None => Ok(()),
    }
}

/// Fold every element into its output slot with `combine`, starting from `init`.
fn fold_axes<F>(tensor: &Tensor, axes: &[usize], keepdims: bool, init: f64, combine: F) -> (Vec<f64>, Vec<usize>)
where
    F: Fn(f64, f64) -> f64,
{
    let kept = reduced_shape(tensor.shape(), axes, true);
    let kept_strides = compute_strides(&kept);
    let out_len: usize = kept.iter().product();
    let mut out = vec![init; out_len];

    let mut idx = vec![0usize; tensor.ndim()];
    let mut dst = vec![0usize; tensor.ndim()];
    for &x in tensor.data() {
        for (d, &i) in idx.iter().enumerate() {
            dst[d] = if axes.contains(&d) { 0 } else { i };
        }
        let slot = cartesian_to_linear(&dst, &kept_strides);
        out[slot] = combine(out[slot], x);
        increment_index(&mut idx, tensor.shape());
    }

    (out, reduced_shape(tensor.shape(), axes, keepdims))
}

fn reduction_dtype(dtype: DType) -> DType {
    if dtype == DType::Bool { DType::Int64 } else { dtype }
}

/// Sum over `axes`.
///
/// An empty `axes` slice returns a copy of the input.
///
/// # Example
///
/// ```
/// use gradtape::Tensor;
/// use gradtape::operations::sum_axes;
///
/// let t = Tensor::from_vec(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], &[2, 3]).unwrap();
/// assert_eq!(sum_axes(&t, &[0], false).unwrap().data(), &[5.0, 7.0, 9.0]);
/// assert_eq!(sum_axes(&t, &[1], true).unwrap().shape(), &[2, 1]);
/// ```
pub fn sum_axes(tensor: &Tensor, axes: &[usize], keepdims: bool) -> Result<Tensor> {
    check_axes("reduce_sum", tensor, axes)?;
    let (data, shape) = fold_axes(tensor, axes, keepdims, 0.0, |acc, x| acc + x);
    Tensor::from_vec_with_dtype(data, &shape, reduction_dtype(tensor.dtype()))
}

/// Arithmetic mean over `axes`.
pub fn mean_axes(tensor: &Tensor, axes: &[usize], keepdims: bool) -> Result<Tensor> {
    check_axes("reduce_mean", tensor, axes)?;
    let count: usize = axes.iter().map(|&a| tensor.shape()[a]).product();
    let (mut data, shape) = fold_axes(tensor, axes, keepdims, 0.0, |acc, x| acc + x);
    let n = count as f64;
    for x in data.iter_mut() {
        *x /= n;
    }
    let dtype = if tensor.dtype().is_float() {
        tensor.dtype()
    } else {
        DType::Float64
    };
    Tensor::from_vec_with_dtype(data, &shape, dtype)
}

/// Maximum over `axes`.
///
/// # Errors
///
/// Reducing an empty axis has no identity and is rejected.
pub fn max_axes(tensor: &Tensor, axes: &[usize], keepdims: bool) -> Result<Tensor> {
    check_axes("reduce_max", tensor, axes)?;
    if axes.iter().any(|&a| tensor.shape()[a] == 0) {
        return Err(GradError::InvalidArgument {
            op: "reduce_max",
            message: format!("cannot reduce an empty axis of shape {:?}", tensor.shape()),
        });
    }
    let (data, shape) = fold_axes(tensor, axes, keepdims, f64::NEG_INFINITY, f64::max);
    Tensor::from_vec_with_dtype(data, &shape, tensor.dtype())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn t23() -> Tensor {
        Tensor::from_vec(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], &[2, 3]).unwrap()
    }

    #[test]
    fn test_sum_all() {
        let s = sum_axes(&t23(), &[0, 1], false).unwrap();
        assert_eq!(s.shape(), &[] as &[usize]);
        assert_eq!(s.item(), Some(21.0));
    }

    #[test]
    fn test_sum_keepdims() {
        let s = sum_axes(&t23(), &[1], true).unwrap();
        assert_eq!(s.shape(), &[2, 1]);
        assert_eq!(s.data(), &[6.0, 15.0]);
    }

    #[test]
    fn test_sum_no_axes_is_identity() {
        assert_eq!(sum_axes(&t23(), &[], false).unwrap(), t23());
    }

    #[test]
    fn test_mean() {
        let m = mean_axes(&t23(), &[0], false).unwrap();
        assert_eq!(m.data(), &[2.5, 3.5, 4.5]);
        let all = mean_axes(&t23(), &[0, 1], false).unwrap();
        assert_relative_eq!(all.item().unwrap(), 3.5);
    }

    #[test]
    fn test_max() {
        let t = Tensor::from_vec(vec![1.0, 9.0, 3.0, 4.0, 5.0, 6.0], &[2, 3]).unwrap();
        assert_eq!(max_axes(&t, &[1], false).unwrap().data(), &[9.0, 6.0]);
        assert_eq!(max_axes(&t, &[0], true).unwrap().data(), &[4.0, 9.0, 6.0]);
    }

    #[test]
    fn test_bool_sum_counts() {
        let b = Tensor::from_bools(&[true, false, true], &[3]).unwrap();
        let s = sum_axes(&b, &[0], false).unwrap();
        assert_eq!(s.dtype(), DType::Int64);
        assert_eq!(s.item(), Some(2.0));
    }

    #[test]
    fn test_invalid_axis() {
        assert!(sum_axes(&t23(), &[2], false).is_err());
    }

    #[test]
    fn test_reduced_shape() {
        assert_eq!(reduced_shape(&[2, 3, 4], &[1], false), vec![2, 4]);
        assert_eq!(reduced_shape(&[2, 3, 4], &[0, 2], true), vec![1, 3, 1]);
    }
}
