//! Batched GEMM using faer.
//!
//! Each operand is read as a stack of row-major matrices over its trailing two
//! axes. Leading (batch) axes broadcast against each other; every output
//! batch is an independent `matmul` call, so no reduction across batches
//! happens here.

use faer::linalg::matmul::matmul as faer_matmul;
use faer::{Accum, MatMut, MatRef, Par};

use crate::backend::broadcast::{broadcast_shapes, broadcast_strides};
use crate::dtype::DType;
use crate::error::{GradError, Result};
use crate::strides::{cartesian_to_linear, increment_index};
use crate::tensor::Tensor;

/// Logical `(rows, cols)` of the trailing matrix of `shape` after an optional transpose.
fn matrix_dims(shape: &[usize], transpose: bool) -> (usize, usize) {
    let r = shape[shape.len() - 2];
    let c = shape[shape.len() - 1];
    if transpose { (c, r) } else { (r, c) }
}

/// Output shape of `matmul(a, b, transpose_a, transpose_b)`.
///
/// # Errors
///
/// Returns an error if either operand has rank < 2, the inner dimensions
/// differ, or the batch axes do not broadcast.
pub fn matmul_output_shape(
    a: &[usize],
    b: &[usize],
    transpose_a: bool,
    transpose_b: bool,
) -> Result<Vec<usize>> {
    for shape in [a, b] {
        if shape.len() < 2 {
            return Err(GradError::InvalidArgument {
                op: "matmul",
                message: format!("operands must have rank >= 2, given shape {shape:?}"),
            });
        }
    }
    let (m, k) = matrix_dims(a, transpose_a);
    let (k2, n) = matrix_dims(b, transpose_b);
    if k != k2 {
        return Err(GradError::ShapeMismatch {
            op: "matmul",
            expected: vec![k],
            given: vec![k2],
        });
    }
    let mut out = broadcast_shapes("matmul", &a[..a.len() - 2], &b[..b.len() - 2])?;
    out.push(m);
    out.push(n);
    Ok(out)
}

/// Batched matrix product `op(a) · op(b)` where `op` optionally transposes
/// the trailing two axes.
///
/// # Example
///
/// ```
/// use gradtape::Tensor;
/// use gradtape::backend::matmul;
///
/// let a = Tensor::from_vec(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], &[2, 3]).unwrap();
/// let b = Tensor::from_vec(vec![7.0, 8.0, 9.0, 10.0, 11.0, 12.0], &[3, 2]).unwrap();
/// let c = matmul(&a, &b, false, false).unwrap();
/// assert_eq!(c.data(), &[58.0, 64.0, 139.0, 154.0]);
/// ```
pub fn matmul(a: &Tensor, b: &Tensor, transpose_a: bool, transpose_b: bool) -> Result<Tensor> {
    let out_shape = matmul_output_shape(a.shape(), b.shape(), transpose_a, transpose_b)?;
    let (m, k) = matrix_dims(a.shape(), transpose_a);
    let n = out_shape[out_shape.len() - 1];

    let batch_shape = &out_shape[..out_shape.len() - 2];
    let a_batch_strides = broadcast_strides(&a.shape()[..a.ndim() - 2], batch_shape);
    let b_batch_strides = broadcast_strides(&b.shape()[..b.ndim() - 2], batch_shape);
    let a_mat_len = a.shape()[a.ndim() - 2] * a.shape()[a.ndim() - 1];
    let b_mat_len = b.shape()[b.ndim() - 2] * b.shape()[b.ndim() - 1];
    let batches: usize = batch_shape.iter().product();

    let mut out = vec![0.0; batches * m * n];
    let mut batch_idx = vec![0usize; batch_shape.len()];
    for batch in 0..batches {
        let a_off = cartesian_to_linear(&batch_idx, &a_batch_strides) * a_mat_len;
        let b_off = cartesian_to_linear(&batch_idx, &b_batch_strides) * b_mat_len;

        let a_slice = &a.data()[a_off..a_off + a_mat_len];
        let b_slice = &b.data()[b_off..b_off + b_mat_len];
        let a_mat = stored_matrix(a_slice, a.shape(), transpose_a);
        let b_mat = stored_matrix(b_slice, b.shape(), transpose_b);

        let c_slice = &mut out[batch * m * n..(batch + 1) * m * n];
        let c_mat = MatMut::from_row_major_slice_mut(c_slice, m, n);

        debug_assert_eq!(a_mat.ncols(), k);

        // C = 1 * op(A) * op(B), overwriting C
        faer_matmul(c_mat, Accum::Replace, a_mat, b_mat, 1.0, Par::Seq);

        increment_index(&mut batch_idx, batch_shape);
    }

    let dtype = a.dtype().promote(b.dtype());
    let data = if dtype == DType::Float64 {
        out
    } else {
        out.into_iter().map(|x| dtype.coerce(x)).collect()
    };
    Tensor::from_vec_with_dtype(data, &out_shape, dtype)
}

/// View one stored matrix, applying the transpose flag as a faer view transpose.
fn stored_matrix<'a>(slice: &'a [f64], shape: &[usize], transpose: bool) -> MatRef<'a, f64> {
    let rows = shape[shape.len() - 2];
    let cols = shape[shape.len() - 1];
    let mat = MatRef::from_row_major_slice(slice, rows, cols);
    if transpose { mat.transpose() } else { mat }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_matmul_2x3_3x2() {
        let a = Tensor::from_vec(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], &[2, 3]).unwrap();
        let b = Tensor::from_vec(vec![7.0, 8.0, 9.0, 10.0, 11.0, 12.0], &[3, 2]).unwrap();
        let c = matmul(&a, &b, false, false).unwrap();
        assert_eq!(c.shape(), &[2, 2]);
        assert_eq!(c.data(), &[58.0, 64.0, 139.0, 154.0]);
    }

    #[test]
    fn test_matmul_transpose_flags() {
        let a = Tensor::from_vec(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], &[2, 3]).unwrap();
        let at = a.permutedims(&[1, 0]).unwrap();
        let b = Tensor::from_vec(vec![7.0, 8.0, 9.0, 10.0, 11.0, 12.0], &[3, 2]).unwrap();
        let bt = b.permutedims(&[1, 0]).unwrap();

        let expected = matmul(&a, &b, false, false).unwrap();
        let c = matmul(&at, &bt, true, true).unwrap();
        assert_eq!(c.shape(), expected.shape());
        for (x, y) in c.data().iter().zip(expected.data()) {
            assert_relative_eq!(x, y, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_matmul_broadcast_batch() {
        let a = Tensor::ones(&[3, 2, 4]);
        let b = Tensor::ones(&[4, 5]);
        let c = matmul(&a, &b, false, false).unwrap();
        assert_eq!(c.shape(), &[3, 2, 5]);
        assert!(c.data().iter().all(|&x| x == 4.0));
    }

    #[test]
    fn test_matmul_independent_batches() {
        let a = Tensor::from_vec(vec![1.0, 0.0, 0.0, 1.0, 2.0, 0.0, 0.0, 2.0], &[2, 2, 2]).unwrap();
        let b = Tensor::from_vec(vec![1.0, 2.0, 3.0, 4.0, 1.0, 2.0, 3.0, 4.0], &[2, 2, 2]).unwrap();
        let c = matmul(&a, &b, false, false).unwrap();
        assert_eq!(c.data(), &[1.0, 2.0, 3.0, 4.0, 2.0, 4.0, 6.0, 8.0]);
    }

    #[test]
    fn test_matmul_inner_mismatch() {
        let a = Tensor::ones(&[2, 3]);
        let b = Tensor::ones(&[4, 5]);
        assert!(matches!(
            matmul(&a, &b, false, false),
            Err(GradError::ShapeMismatch { op: "matmul", .. })
        ));
    }

    #[test]
    fn test_matmul_rank_one_rejected() {
        let a = Tensor::ones(&[3]);
        let b = Tensor::ones(&[3, 1]);
        assert!(matmul(&a, &b, false, false).is_err());
    }
}
