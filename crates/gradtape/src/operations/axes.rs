//! Axis normalization.

use crate::error::{GradError, Result};

/// Resolve a possibly negative axis against `ndim`.
///
/// # Example
///
/// ```
/// use gradtape::operations::normalize_axis;
///
/// assert_eq!(normalize_axis("sum", -1, 3).unwrap(), 2);
/// assert!(normalize_axis("sum", 3, 3).is_err());
/// ```
pub fn normalize_axis(op: &'static str, axis: isize, ndim: usize) -> Result<usize> {
    let n = ndim as isize;
    if axis < -n || axis >= n {
        return Err(GradError::InvalidAxis { op, axis, ndim });
    }
    Ok(if axis < 0 { (axis + n) as usize } else { axis as usize })
}

/// Resolve a list of axes, rejecting duplicates. The result is sorted.
pub fn normalize_axes(op: &'static str, axes: &[isize], ndim: usize) -> Result<Vec<usize>> {
    let mut out = Vec::with_capacity(axes.len());
    for &axis in axes {
        let a = normalize_axis(op, axis, ndim)?;
        if out.contains(&a) {
            return Err(GradError::InvalidAxis { op, axis, ndim });
        }
        out.push(a);
    }
    out.sort_unstable();
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_axes_sorted() {
        assert_eq!(normalize_axes("sum", &[-1, 0], 3).unwrap(), vec![0, 2]);
    }

    #[test]
    fn test_normalize_axes_duplicate() {
        assert!(matches!(
            normalize_axes("sum", &[1, -2], 3),
            Err(GradError::InvalidAxis { axis: -2, .. })
        ));
    }
}
