//! gradtape - tape-based reverse-mode automatic differentiation
//!
//! Ops run eagerly on immutable [`Variable`]s. Inside a [`with`] scope they
//! are recorded on a [`GradientTape`], which later computes gradients of a
//! target with respect to any recorded or leaf variable.
//!
//! # Architecture
//!
//! ```text
//! Level 1: Op catalog (ops module)
//!     → add, matmul, reduce_sum, split, where_, with_mask, ...
//!
//! Level 2: Graph and tape (autodiff module)
//!     → Variable, Operation, GradientTape, TracedFunction
//!
//! Level 3: Tensor kernels (operations and backend modules)
//!     → broadcasting, permutation, gemm, reductions
//! ```
//!
//! # Example
//!
//! ```
//! use gradtape::{GradientTape, Tensor, Variable, ops, with};
//!
//! let x = Variable::new(3.0);
//! let tape = GradientTape::new();
//! let y = with(&tape, |_| ops::mul(&x, &x)).unwrap();
//!
//! assert_eq!(y.item(), Some(9.0));
//! assert_eq!(tape.gradient(&y, &x).unwrap().item(), Some(6.0));
//!
//! // Row-major data.
//! let t = Tensor::from_vec(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], &[2, 3]).unwrap();
//! assert_eq!(t.get(&[0, 1]), Some(2.0));
//! ```

pub mod autodiff;
pub mod backend;
pub mod dtype;
pub mod error;
pub mod gradcheck;
pub mod operations;
mod random;
pub mod storage;
pub mod strides;
pub mod tensor;
pub mod value;

pub use autodiff::ops;
pub use autodiff::{
    BackwardContext, GradientTape, IntoOperand, MaskPolicy, Operation, TapeOptions, Trace, TracedFunction,
    Undifferentiable, Variable, with, with_trace, with_traced, without_recording,
};
pub use dtype::DType;
pub use error::{ErrorKind, GradError, Result};
pub use tensor::Tensor;
pub use value::{MaskedTensor, ShapeTuple, Value};
