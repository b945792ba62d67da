//! Permutation backend trait.

use crate::tensor::Tensor;

/// Backend trait for tensor permutation.
///
/// Implementations can provide optimized permutation algorithms:
/// - `GenericBackend`: Naive loop-based (always available)
pub trait PermutationBackend {
    /// Permute `src` into `dest`.
    ///
    /// `perm[i]` gives the source dimension for the i-th dimension of `dest`.
    ///
    /// # Panics
    ///
    /// Panics if `dest` does not have the permuted shape of `src`.
    fn permute_into(dest: &mut Tensor, src: &Tensor, perm: &[usize]);
}
