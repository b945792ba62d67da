//! Stride computation utilities.
//!
//! Uses row-major (C) order: the last axis is contiguous.

/// Compute row-major strides from shape.
///
/// For shape [d0, d1, d2], returns strides [d1*d2, d2, 1].
///
/// # Examples
///
/// ```
/// use gradtape::strides::compute_strides;
///
/// assert_eq!(compute_strides(&[3, 4, 5]), vec![20, 5, 1]);
/// assert_eq!(compute_strides(&[2, 3]), vec![3, 1]);
/// assert_eq!(compute_strides(&[5]), vec![1]);
/// assert_eq!(compute_strides(&[]), Vec::<usize>::new());
/// ```
pub fn compute_strides(shape: &[usize]) -> Vec<usize> {
    let mut strides = vec![0; shape.len()];
    let mut stride = 1;

    for (s, &dim) in strides.iter_mut().zip(shape.iter()).rev() {
        *s = stride;
        stride *= dim;
    }

    strides
}

/// Convert cartesian indices to a linear index.
#[inline]
pub fn cartesian_to_linear(indices: &[usize], strides: &[usize]) -> usize {
    indices
        .iter()
        .zip(strides.iter())
        .map(|(&idx, &stride)| idx * stride)
        .sum()
}

/// Convert a linear index to cartesian indices using row-major order.
pub fn linear_to_cartesian(mut linear: usize, shape: &[usize]) -> Vec<usize> {
    let mut indices = vec![0; shape.len()];

    for (idx, &dim) in indices.iter_mut().zip(shape.iter()).rev() {
        if dim == 0 {
            continue;
        }
        *idx = linear % dim;
        linear /= dim;
    }

    indices
}

/// Advance `indices` to the next position in row-major order.
///
/// Returns `false` once every position has been visited.
#[inline]
pub fn increment_index(indices: &mut [usize], shape: &[usize]) -> bool {
    for d in (0..shape.len()).rev() {
        indices[d] += 1;
        if indices[d] < shape[d] {
            return true;
        }
        indices[d] = 0;
    }
    false
}
