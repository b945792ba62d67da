//! Permutation operations for tensors.
//!
//! ```text
//! permutedims(tensor, perm)
//!     → validate permutation
//!     → allocate output with permuted shape
//!     → permutedims_into(output, tensor, perm)
//!
//! permutedims_into(dest, src, perm)
//!     → dispatch to backend (GenericBackend)
//! ```

use crate::backend::{GenericBackend, PermutationBackend};
use crate::error::{GradError, Result};
use crate::tensor::Tensor;

/// Permute the dimensions of a tensor, returning a new tensor.
///
/// `perm[i]` gives the source dimension for the i-th dimension of the result.
///
/// # Errors
///
/// Returns error if `perm` is not a valid permutation of `0..ndim`.
///
/// # Examples
///
/// ```
/// use gradtape::Tensor;
/// use gradtape::operations::permutedims;
///
/// let t = Tensor::from_vec(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], &[2, 3]).unwrap();
/// let t2 = permutedims(&t, &[1, 0]).unwrap();
/// assert_eq!(t2.shape(), &[3, 2]);
/// assert_eq!(t.get(&[1, 0]), t2.get(&[0, 1]));
/// ```
pub fn permutedims(tensor: &Tensor, perm: &[usize]) -> Result<Tensor> {
    validate_permutation(perm, tensor.ndim())?;

    let new_shape: Vec<usize> = perm.iter().map(|&p| tensor.shape()[p]).collect();
    let mut result = Tensor::full_with_dtype(&new_shape, 0.0, tensor.dtype());

    permutedims_into(&mut result, tensor, perm);

    Ok(result)
}

/// Permute tensor dimensions into an existing output tensor.
///
/// # Panics
///
/// Panics if dest shape doesn't match the permuted src shape.
pub fn permutedims_into(dest: &mut Tensor, src: &Tensor, perm: &[usize]) {
    GenericBackend::permute_into(dest, src, perm);
}

/// Validate that perm is a valid permutation of 0..ndim.
pub fn validate_permutation(perm: &[usize], ndim: usize) -> Result<()> {
    let invalid = || GradError::InvalidPermutation {
        perm: perm.to_vec(),
        ndim,
    };
    if perm.len() != ndim {
        return Err(invalid());
    }

    let mut seen = vec![false; ndim];
    for &p in perm {
        if p >= ndim || seen[p] {
            return Err(invalid());
        }
        seen[p] = true;
    }

    Ok(())
}

/// Inverse of a valid permutation: `inv[perm[i]] = i`.
///
/// # Example
///
/// ```
/// use gradtape::operations::inverse_permutation;
///
/// assert_eq!(inverse_permutation(&[2, 0, 1]), vec![1, 2, 0]);
/// ```
pub fn inverse_permutation(perm: &[usize]) -> Vec<usize> {
    let mut inv = vec![0; perm.len()];
    for (i, &p) in perm.iter().enumerate() {
        inv[p] = i;
    }
    inv
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permutedims_3d() {
        let mut t = Tensor::zeros(&[2, 3, 4]);
        for i in 0..2 {
            for j in 0..3 {
                for k in 0..4 {
                    t.set(&[i, j, k], (i * 100 + j * 10 + k) as f64).unwrap();
                }
            }
        }

        // [0,1,2] -> [2,0,1]: shape 2x3x4 -> 4x2x3
        let t2 = permutedims(&t, &[2, 0, 1]).unwrap();
        assert_eq!(t2.shape(), &[4, 2, 3]);

        for i in 0..2 {
            for j in 0..3 {
                for k in 0..4 {
                    assert_eq!(t.get(&[i, j, k]), t2.get(&[k, i, j]));
                }
            }
        }
    }

    #[test]
    fn test_permutedims_inverse_roundtrip() {
        let t = Tensor::from_vec((0..24).map(|x| x as f64).collect(), &[2, 3, 4]).unwrap();
        let perm = [1, 2, 0];
        let there = permutedims(&t, &perm).unwrap();
        let back = permutedims(&there, &inverse_permutation(&perm)).unwrap();
        assert_eq!(back, t);
    }

    #[test]
    fn test_permutedims_invalid() {
        let t = Tensor::zeros(&[2, 3]);
        assert!(permutedims(&t, &[0]).is_err());
        assert!(permutedims(&t, &[0, 0]).is_err());
        assert!(permutedims(&t, &[0, 2]).is_err());
    }
}
