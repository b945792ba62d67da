//! Generic (naive loop-based) backend implementation.

use crate::backend::PermutationBackend;
use crate::strides::{cartesian_to_linear, increment_index};
use crate::tensor::Tensor;

/// Generic backend using naive loop-based implementations.
///
/// This backend is always available and serves as a fallback.
pub struct GenericBackend;

impl PermutationBackend for GenericBackend {
    fn permute_into(dest: &mut Tensor, src: &Tensor, perm: &[usize]) {
        assert_eq!(
            dest.shape(),
            perm.iter().map(|&p| src.shape()[p]).collect::<Vec<_>>().as_slice(),
            "destination must have the permuted shape"
        );
        if src.is_empty() {
            return;
        }
        // Copy strides to avoid borrow conflict with data_mut()
        let new_strides: Vec<usize> = dest.strides().to_vec();
        let old_shape = src.shape().to_vec();

        let mut old_indices = vec![0usize; old_shape.len()];
        let mut new_indices = vec![0usize; old_shape.len()];
        for linear_old in 0..src.len() {
            // new_indices[i] = old_indices[perm[i]]
            for (n, &p) in new_indices.iter_mut().zip(perm.iter()) {
                *n = old_indices[p];
            }
            let linear_new = cartesian_to_linear(&new_indices, &new_strides);
            dest.data_mut()[linear_new] = src.data()[linear_old];
            increment_index(&mut old_indices, &old_shape);
        }
    }
}
