//! Tape-based reverse-mode automatic differentiation.
//!
//! Every op invocation runs eagerly, binds an [`Operation`] to its inputs in
//! a reference-counted graph node, and is recorded on the innermost active
//! [`GradientTape`]. Gradients are computed over the recorded ops only.
//!
//! # Architecture
//!
//! ```text
//! Variable ──creator──► OpRef ──► Rc<OpNode> ──inputs──► Variable ...
//!    │                               │
//!    ▼                               ▼
//!  Rc<Value>              Rc<dyn Operation>, id + epoch
//!                                    │      (ComputationGraph, thread_local)
//! GradientTape ──records──► {OpId → Rc<OpNode>}
//!    │                               ▼
//!    │                      Operation::backward
//!    ▼                               │
//! gradient(target, sources) ──toposort──► Gradients
//! ```
//!
//! # Example
//!
//! ```
//! use gradtape::{GradientTape, Tensor, Variable, ops, with};
//!
//! let x = Variable::new(Tensor::from(vec![1.0, 2.0, 3.0]));
//! let tape = GradientTape::new();
//! let y = with(&tape, |_| ops::reduce_sum(&ops::square(&x)?, None, false)).unwrap();
//!
//! assert_eq!(y.item(), Some(14.0));
//! assert_eq!(tape.gradient(&y, &x).unwrap().data(), &[2.0, 4.0, 6.0]);
//! ```
//!
//! # Key Types
//!
//! - [`Variable`]: immutable value plus the op that produced it
//! - [`GradientTape`]: records ops inside a [`with`] scope and computes gradients
//! - [`Operation`]: forward/backward contract every op implements
//! - [`TracedFunction`]: a function traced once per argument signature
//!
//! # Design Notes
//!
//! - Nodes are owned by the variables they produced and the tapes that
//!   recorded them; [`graph_len`] counts the nodes alive on this thread.
//! - Variables created before [`clear_graph`] keep their values but their
//!   creators become stale.
//! - Multiple paths to the same variable accumulate into one gradient.

mod backward;
mod gradients;
mod graph;
mod mask;
pub mod ops;
mod tape;
mod traced;
mod variable;

pub use gradients::Gradients;
pub use graph::{
    BackwardContext, ComputationGraph, OpId, OpRef, Operation, clear_graph, graph_len, with_graph,
};
pub use mask::MaskPolicy;
pub use ops::apply_operation;
pub use tape::{
    GradientTape, Sources, TapeOptions, Trace, scope_depth, with, with_trace, with_traced,
    without_recording,
};
pub use traced::{ArgSignature, TracedFunction};
pub use variable::{Creator, IntoOperand, Undifferentiable, VarId, Variable};
