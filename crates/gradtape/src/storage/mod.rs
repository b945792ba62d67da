//! Storage types for tensor data.
//!
//! Storage is always a flat vector of `f64`; shape, strides and dtype come
//! from the [`Tensor`](crate::Tensor) wrapper.

mod dense;

pub use dense::Dense;
