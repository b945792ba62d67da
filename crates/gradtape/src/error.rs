//! Error types for gradtape.

use thiserror::Error;

/// Broad classification of a [`GradError`].
///
/// Graph and shape errors surface when an op is invoked; differentiability
/// and tape errors surface when gradients are requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed op arguments detected at invocation time.
    Graph,
    /// A gradient was requested along a path with no differentiable ops.
    Differentiability,
    /// Declared and actual shapes disagree.
    Shape,
    /// Misuse of a tape (consumed, stale creator).
    Tape,
}

/// Errors that can occur while building or differentiating a graph.
#[derive(Debug, Error)]
pub enum GradError {
    /// Data length does not match the element count of a shape.
    #[error("shape mismatch: expected {expected} elements, got {actual}")]
    DataLength { expected: usize, actual: usize },

    /// An operand has the wrong shape for an operation.
    #[error("{op}: shape mismatch, expected {expected:?}, given {given:?}")]
    ShapeMismatch {
        op: &'static str,
        expected: Vec<usize>,
        given: Vec<usize>,
    },

    /// Two shapes cannot be broadcast against each other.
    #[error("{op}: shapes {lhs:?} and {rhs:?} are not broadcast-compatible")]
    IncompatibleBroadcast {
        op: &'static str,
        lhs: Vec<usize>,
        rhs: Vec<usize>,
    },

    /// Axis outside `-ndim..ndim`, or repeated where axes must be unique.
    #[error("{op}: invalid axis {axis} for tensor of rank {ndim}")]
    InvalidAxis {
        op: &'static str,
        axis: isize,
        ndim: usize,
    },

    /// Permutation is not a permutation of `0..ndim`.
    #[error("invalid permutation {perm:?} for tensor with {ndim} dimensions")]
    InvalidPermutation { perm: Vec<usize>, ndim: usize },

    /// Reshape target cannot be resolved against the source shape.
    #[error("reshape: cannot reshape {from:?} into {target:?}: {reason}")]
    InvalidReshape {
        from: Vec<usize>,
        target: Vec<i64>,
        reason: &'static str,
    },

    /// Index out of bounds.
    #[error("index out of bounds: index {index} is out of range for dimension {dim_size}")]
    IndexOutOfBounds { index: usize, dim_size: usize },

    /// Wrong number of indices provided.
    #[error("wrong number of indices: expected {expected}, got {actual}")]
    WrongNumberOfIndices { expected: usize, actual: usize },

    /// Slice range out of bounds.
    #[error("slice range {start}..{end} out of bounds for dimension {dim} with size {size}")]
    SliceOutOfBounds {
        start: usize,
        end: usize,
        dim: usize,
        size: usize,
    },

    /// An operand holds a value type the operation does not accept.
    #[error("{op}: expected {expected}, given {given}")]
    UnsupportedValue {
        op: &'static str,
        expected: &'static str,
        given: &'static str,
    },

    /// Any other malformed argument.
    #[error("{op}: {message}")]
    InvalidArgument { op: &'static str, message: String },

    /// A requested source has no differentiable path to the target.
    #[error("No applicable gradient found for source {variable}")]
    NoGradient { variable: String },

    /// The gradient target itself was produced by a non-differentiable op.
    #[error("target {target} is not backpropagatable")]
    NonDifferentiableTarget { target: String },

    /// A leaf variable has no creator to run backward on.
    #[error("variable {variable} is a leaf and has no creator")]
    NoCreator { variable: String },

    /// The creator lives in a graph that has since been cleared.
    #[error("creator op {op} belongs to a cleared graph")]
    StaleCreator { op: usize },

    /// A non-persistent tape was asked for a second gradient.
    #[error("gradient tape has already been consumed; create it with persistent = true to call gradient more than once")]
    TapeConsumed,

    /// An op returned the wrong number of values.
    #[error("{op}: expected {expected} values, got {actual}")]
    Arity {
        op: &'static str,
        expected: usize,
        actual: usize,
    },
}

impl GradError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            GradError::DataLength { .. }
            | GradError::ShapeMismatch { .. }
            | GradError::IncompatibleBroadcast { .. } => ErrorKind::Shape,
            GradError::NoGradient { .. } | GradError::NonDifferentiableTarget { .. } => {
                ErrorKind::Differentiability
            }
            GradError::NoCreator { .. } | GradError::StaleCreator { .. } | GradError::TapeConsumed => {
                ErrorKind::Tape
            }
            _ => ErrorKind::Graph,
        }
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, GradError>;
