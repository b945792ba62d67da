//! Band extraction over the trailing two axes.

use crate::error::{GradError, Result};
use crate::tensor::Tensor;

/// Keep the band of each innermost matrix, zeroing everything else.
///
/// Element `(i, j)` is kept when `(lower < 0 || i - j <= lower)` and
/// `(upper < 0 || j - i <= upper)`; a negative bound keeps that whole
/// triangle.
///
/// # Example
///
/// ```
/// use gradtape::Tensor;
/// use gradtape::operations::band_part;
///
/// let t = Tensor::ones(&[3, 3]);
/// let lower = band_part(&t, -1, 0).unwrap();
/// assert_eq!(lower.data(), &[1.0, 0.0, 0.0, 1.0, 1.0, 0.0, 1.0, 1.0, 1.0]);
/// ```
pub fn band_part(tensor: &Tensor, lower: i64, upper: i64) -> Result<Tensor> {
    if tensor.ndim() < 2 {
        return Err(GradError::InvalidArgument {
            op: "bandpart",
            message: format!("input must have rank >= 2, given shape {:?}", tensor.shape()),
        });
    }
    let rows = tensor.shape()[tensor.ndim() - 2];
    let cols = tensor.shape()[tensor.ndim() - 1];
    let mut out = tensor.clone();
    if rows * cols == 0 {
        return Ok(out);
    }
    for (linear, x) in out.data_mut().iter_mut().enumerate() {
        let within = linear % (rows * cols);
        let i = (within / cols) as i64;
        let j = (within % cols) as i64;
        let keep = (lower < 0 || i - j <= lower) && (upper < 0 || j - i <= upper);
        if !keep {
            *x = 0.0;
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_band_diagonal() {
        let t = Tensor::from_vec((1..=9).map(|x| x as f64).collect(), &[3, 3]).unwrap();
        let d = band_part(&t, 0, 0).unwrap();
        assert_eq!(d.data(), &[1.0, 0.0, 0.0, 0.0, 5.0, 0.0, 0.0, 0.0, 9.0]);
    }

    #[test]
    fn test_band_tridiagonal_batched() {
        let t = Tensor::ones(&[2, 3, 3]);
        let b = band_part(&t, 1, 1).unwrap();
        let one = [1.0, 1.0, 0.0, 1.0, 1.0, 1.0, 0.0, 1.0, 1.0];
        assert_eq!(&b.data()[..9], &one);
        assert_eq!(&b.data()[9..], &one);
    }

    #[test]
    fn test_band_requires_matrix() {
        assert!(band_part(&Tensor::ones(&[3]), 0, 0).is_err());
    }
}
