//! Array-level tensor operations.
//!
//! These are the backend primitives the op catalog is expressed in. Each one
//! allocates its output and never writes into its inputs:
//!
//! ```text
//! Level 1: op catalog (autodiff::ops)   -> validates, records, differentiates
//! Level 2: operations (this module)     -> allocate output, loop / dispatch
//! Level 3: backend (GenericBackend, faer GEMM)
//! ```

mod axes;
mod band;
mod concat;
mod elementwise;
mod permutedims;
mod reduce;
mod slice;

pub use axes::{normalize_axes, normalize_axis};
pub use band::band_part;
pub use concat::{concat, tile};
pub use elementwise::{apply, apply_binary, compare};
pub use permutedims::{inverse_permutation, permutedims, permutedims_into, validate_permutation};
pub use reduce::{max_axes, mean_axes, reduced_shape, sum_axes};
pub use slice::{scatter_into_zeros, slice};
