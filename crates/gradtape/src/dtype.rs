//! Runtime element type tags.
//!
//! Storage is always `f64`; the dtype decides how values are coerced on
//! construction and which family an op result belongs to.

use std::fmt;

/// Family of a [`DType`]. Casting across families is never differentiable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DTypeFamily {
    Bool,
    Integer,
    Float,
}

/// Element type of a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum DType {
    Bool,
    Int32,
    Int64,
    Float32,
    #[default]
    Float64,
}

impl DType {
    /// Family this dtype belongs to.
    pub fn family(self) -> DTypeFamily {
        match self {
            DType::Bool => DTypeFamily::Bool,
            DType::Int32 | DType::Int64 => DTypeFamily::Integer,
            DType::Float32 | DType::Float64 => DTypeFamily::Float,
        }
    }

    /// Whether this dtype is a floating-point type.
    pub fn is_float(self) -> bool {
        self.family() == DTypeFamily::Float
    }

    /// Result dtype of a binary arithmetic op on `self` and `other`.
    ///
    /// The wider of the two wins; bools promote to the other operand.
    pub fn promote(self, other: DType) -> DType {
        self.max(other)
    }

    /// Dtype gradients are carried in for values of this dtype.
    pub fn gradient_dtype(self) -> DType {
        if self.is_float() { self } else { DType::Float64 }
    }

    /// Coerce a raw `f64` into the value domain of this dtype.
    #[inline]
    pub fn coerce(self, v: f64) -> f64 {
        match self {
            DType::Bool => {
                if v != 0.0 {
                    1.0
                } else {
                    0.0
                }
            }
            DType::Int32 => (v.trunc() as i32) as f64,
            DType::Int64 => (v.trunc() as i64) as f64,
            DType::Float32 => (v as f32) as f64,
            DType::Float64 => v,
        }
    }

    /// Short lowercase name, e.g. `float32`.
    pub fn name(self) -> &'static str {
        match self {
            DType::Bool => "bool",
            DType::Int32 => "int32",
            DType::Int64 => "int64",
            DType::Float32 => "float32",
            DType::Float64 => "float64",
        }
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
