//! Array backend kernels used by the op catalog.
//!
//! # Backends
//!
//! - `GenericBackend`: naive loop-based permutation (always available)
//! - `gemm`: batched matrix multiplication through faer's GEMM over
//!   row-major matrix views
//! - `broadcast`: NumPy-style broadcasting and the broadcast-reduce used to
//!   fold gradients back onto an input's shape

pub mod broadcast;
mod gemm;
mod generic;
mod permutation;

pub use broadcast::{broadcast_shapes, broadcast_to, reduce_to_shape, reduced_axes};
pub use gemm::{matmul, matmul_output_shape};
pub use generic::GenericBackend;
pub use permutation::PermutationBackend;
