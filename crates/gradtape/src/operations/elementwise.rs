//! Element-wise tensor operations.

use crate::backend::broadcast::{broadcast_shapes, broadcast_strides};
use crate::dtype::DType;
use crate::error::Result;
use crate::strides::{cartesian_to_linear, increment_index};
use crate::tensor::Tensor;

/// Apply a function to each element, returning a new tensor of `dtype`.
///
/// # Example
///
/// ```
/// use gradtape::{DType, Tensor};
/// use gradtape::operations::apply;
///
/// let t = Tensor::from_vec(vec![1.0, 4.0, 9.0], &[3]).unwrap();
/// let ts = apply(&t, DType::Float64, |x| x.sqrt());
/// assert_eq!(ts.data(), &[1.0, 2.0, 3.0]);
/// ```
pub fn apply<F>(tensor: &Tensor, dtype: DType, f: F) -> Tensor
where
    F: Fn(f64) -> f64,
{
    let data: Vec<f64> = tensor.data().iter().map(|&x| dtype.coerce(f(x))).collect();
    Tensor::from_raw(data, tensor.shape(), dtype)
}

/// Combine two tensors element-wise with broadcasting.
///
/// The result has the broadcast shape of `a` and `b` and dtype `dtype`.
///
/// # Errors
///
/// Returns `IncompatibleBroadcast` (tagged with `op`) if the shapes do not
/// broadcast.
///
/// # Example
///
/// ```
/// use gradtape::{DType, Tensor};
/// use gradtape::operations::apply_binary;
///
/// let a = Tensor::from_vec(vec![1.0, 2.0, 3.0, 4.0], &[2, 2]).unwrap();
/// let b = Tensor::from_vec(vec![10.0, 20.0], &[2]).unwrap();
/// let c = apply_binary("add", &a, &b, DType::Float64, |x, y| x + y).unwrap();
/// assert_eq!(c.data(), &[11.0, 22.0, 13.0, 24.0]);
/// ```
pub fn apply_binary<F>(op: &'static str, a: &Tensor, b: &Tensor, dtype: DType, f: F) -> Result<Tensor>
where
    F: Fn(f64, f64) -> f64,
{
    if a.shape() == b.shape() {
        let data: Vec<f64> = a
            .data()
            .iter()
            .zip(b.data().iter())
            .map(|(&x, &y)| dtype.coerce(f(x, y)))
            .collect();
        return Tensor::from_vec_with_dtype(data, a.shape(), dtype);
    }

    let shape = broadcast_shapes(op, a.shape(), b.shape())?;
    let a_strides = broadcast_strides(a.shape(), &shape);
    let b_strides = broadcast_strides(b.shape(), &shape);
    let total: usize = shape.iter().product();

    let mut data = Vec::with_capacity(total);
    let mut idx = vec![0usize; shape.len()];
    for _ in 0..total {
        let x = a.data()[cartesian_to_linear(&idx, &a_strides)];
        let y = b.data()[cartesian_to_linear(&idx, &b_strides)];
        data.push(dtype.coerce(f(x, y)));
        increment_index(&mut idx, &shape);
    }
    Tensor::from_vec_with_dtype(data, &shape, dtype)
}

/// Broadcasting comparison producing a `Bool` tensor.
pub fn compare<F>(op: &'static str, a: &Tensor, b: &Tensor, f: F) -> Result<Tensor>
where
    F: Fn(f64, f64) -> bool,
{
    apply_binary(op, a, b, DType::Bool, |x, y| if f(x, y) { 1.0 } else { 0.0 })
}
