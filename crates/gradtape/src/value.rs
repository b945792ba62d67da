//! Value types carried by variables.
//!
//! ```text
//! Value
//! ├── Tensor(Tensor)            plain array
//! ├── Scalar { value, dtype }   0-d number
//! ├── ShapeTuple(ShapeTuple)    dimension sizes
//! └── Masked(MaskedTensor)      tensor + validity mask over the leading axis
//! ```

use std::borrow::Cow;
use std::fmt;

use smallvec::SmallVec;

use crate::dtype::DType;
use crate::error::{GradError, Result};
use crate::tensor::Tensor;

/// Ordered sequence of dimension sizes.
pub type ShapeTuple = SmallVec<[usize; 6]>;

/// A tensor paired with a boolean mask over its leading axis.
///
/// The mask is fixed at construction. Ops that re-derive a mask build a new
/// `MaskedTensor`; masks are replaced, never merged.
#[derive(Debug, Clone, PartialEq)]
pub struct MaskedTensor {
    tensor: Tensor,
    mask: Vec<bool>,
}

impl MaskedTensor {
    /// Pair `tensor` with `mask`.
    ///
    /// # Errors
    ///
    /// Returns `ShapeMismatch` if `tensor` is rank 0 or the mask length
    /// differs from the leading axis.
    ///
    /// # Example
    ///
    /// ```
    /// use gradtape::{MaskedTensor, Tensor};
    ///
    /// let m = MaskedTensor::new(Tensor::ones(&[3, 2]), vec![true, true, false]).unwrap();
    /// assert_eq!(m.valid_len(), 2);
    /// assert!(MaskedTensor::new(Tensor::ones(&[3, 2]), vec![true]).is_err());
    /// ```
    pub fn new(tensor: Tensor, mask: Vec<bool>) -> Result<Self> {
        match tensor.shape().first() {
            Some(&leading) if leading == mask.len() => Ok(Self { tensor, mask }),
            _ => Err(GradError::ShapeMismatch {
                op: "mask",
                expected: tensor.shape().first().copied().into_iter().collect(),
                given: vec![mask.len()],
            }),
        }
    }

    /// Pair without checking; callers have matched the leading axis.
    pub(crate) fn from_parts_unchecked(tensor: Tensor, mask: Vec<bool>) -> Self {
        debug_assert_eq!(tensor.shape().first(), Some(&mask.len()));
        Self { tensor, mask }
    }

    pub fn tensor(&self) -> &Tensor {
        &self.tensor
    }

    pub fn mask(&self) -> &[bool] {
        &self.mask
    }

    /// Number of valid positions.
    pub fn valid_len(&self) -> usize {
        self.mask.iter().filter(|&&m| m).count()
    }

    pub fn into_parts(self) -> (Tensor, Vec<bool>) {
        (self.tensor, self.mask)
    }

    /// The mask as a `Bool` tensor of shape `[len]`.
    pub fn mask_tensor(&self) -> Tensor {
        Tensor::from_raw(
            self.mask.iter().map(|&m| if m { 1.0 } else { 0.0 }).collect(),
            &[self.mask.len()],
            DType::Bool,
        )
    }
}

/// Closed set of values a [`Variable`](crate::Variable) can hold.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Tensor(Tensor),
    Scalar { value: f64, dtype: DType },
    ShapeTuple(ShapeTuple),
    Masked(MaskedTensor),
}

impl Value {
    /// `Float64` scalar.
    pub fn scalar(value: f64) -> Self {
        Value::Scalar {
            value,
            dtype: DType::Float64,
        }
    }

    /// Wrap a tensor, turning rank-0 tensors into scalars.
    pub fn from_tensor(tensor: Tensor) -> Self {
        if tensor.ndim() == 0 {
            Value::Scalar {
                value: tensor.data()[0],
                dtype: tensor.dtype(),
            }
        } else {
            Value::Tensor(tensor)
        }
    }

    /// Shape of the value. Scalars are `[]`, shape tuples are `[len]`.
    pub fn shape(&self) -> Vec<usize> {
        match self {
            Value::Tensor(t) => t.shape().to_vec(),
            Value::Scalar { .. } => Vec::new(),
            Value::ShapeTuple(s) => vec![s.len()],
            Value::Masked(m) => m.tensor().shape().to_vec(),
        }
    }

    pub fn dtype(&self) -> DType {
        match self {
            Value::Tensor(t) => t.dtype(),
            Value::Scalar { dtype, .. } => *dtype,
            Value::ShapeTuple(_) => DType::Int64,
            Value::Masked(m) => m.tensor().dtype(),
        }
    }

    /// Name of the variant, used in error messages.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Tensor(_) => "tensor",
            Value::Scalar { .. } => "scalar",
            Value::ShapeTuple(_) => "shape tuple",
            Value::Masked(_) => "masked tensor",
        }
    }

    /// View the value as an array. Only scalars and shape tuples allocate.
    pub fn as_tensor(&self) -> Cow<'_, Tensor> {
        match self {
            Value::Tensor(t) => Cow::Borrowed(t),
            Value::Masked(m) => Cow::Borrowed(m.tensor()),
            Value::Scalar { value, dtype } => Cow::Owned(Tensor::full_with_dtype(&[], *value, *dtype)),
            Value::ShapeTuple(s) => Cow::Owned(Tensor::from_raw(
                s.iter().map(|&d| d as f64).collect(),
                &[s.len()],
                DType::Int64,
            )),
        }
    }

    /// Convert into an owned tensor, dropping any mask.
    pub fn into_tensor(self) -> Tensor {
        match self {
            Value::Tensor(t) => t,
            Value::Masked(m) => m.into_parts().0,
            other => other.as_tensor().into_owned(),
        }
    }

    /// Validity mask, if the value carries one.
    pub fn mask(&self) -> Option<&[bool]> {
        match self {
            Value::Masked(m) => Some(m.mask()),
            _ => None,
        }
    }

    /// The same value without its mask.
    pub fn unmasked(self) -> Value {
        match self {
            Value::Masked(m) => Value::from_tensor(m.into_parts().0),
            other => other,
        }
    }

    /// The single number held by a scalar or one-element value.
    pub fn item(&self) -> Option<f64> {
        match self {
            Value::Scalar { value, .. } => Some(*value),
            Value::ShapeTuple(s) if s.len() == 1 => Some(s[0] as f64),
            Value::ShapeTuple(_) => None,
            Value::Tensor(t) => t.item(),
            Value::Masked(m) => m.tensor().item(),
        }
    }
}

impl From<Tensor> for Value {
    fn from(t: Tensor) -> Self {
        Value::from_tensor(t)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::scalar(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Scalar {
            value: v as f64,
            dtype: DType::Int64,
        }
    }
}

impl From<MaskedTensor> for Value {
    fn from(m: MaskedTensor) -> Self {
        Value::Masked(m)
    }
}

impl From<ShapeTuple> for Value {
    fn from(s: ShapeTuple) -> Self {
        Value::ShapeTuple(s)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Scalar { value, dtype } => write!(f, "{value} ({dtype})"),
            Value::ShapeTuple(s) => write!(f, "shape{:?}", s.as_slice()),
            Value::Tensor(t) => write!(f, "tensor{:?} ({})", t.shape(), t.dtype()),
            Value::Masked(m) => write!(
                f,
                "masked tensor{:?} ({}, {} valid)",
                m.tensor().shape(),
                m.tensor().dtype(),
                m.valid_len()
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use smallvec::smallvec;

    #[test]
    fn test_rank0_becomes_scalar() {
        let v = Value::from(Tensor::scalar(10.0));
        assert_eq!(
            v,
            Value::Scalar {
                value: 10.0,
                dtype: DType::Float64
            }
        );
        assert!(v.shape().is_empty());
    }

    #[test]
    fn test_shape_tuple_as_tensor() {
        let s: ShapeTuple = smallvec![2, 3, 4];
        let v = Value::ShapeTuple(s);
        assert_eq!(v.shape(), vec![3]);
        assert_eq!(v.dtype(), DType::Int64);
        assert_eq!(v.as_tensor().data(), &[2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_masked_roundtrip() {
        let m = MaskedTensor::new(Tensor::zeros(&[2, 5]), vec![true, false]).unwrap();
        let v = Value::from(m);
        assert_eq!(v.mask(), Some(&[true, false][..]));
        assert_eq!(v.shape(), vec![2, 5]);
        let plain = v.unmasked();
        assert!(plain.mask().is_none());
    }

    #[test]
    fn test_masked_rejects_scalar() {
        assert!(MaskedTensor::new(Tensor::scalar(1.0), vec![]).is_err());
    }

    #[test]
    fn test_mask_tensor() {
        let m = MaskedTensor::new(Tensor::zeros(&[3]), vec![true, false, true]).unwrap();
        let t = m.mask_tensor();
        assert_eq!(t.dtype(), DType::Bool);
        assert_eq!(t.data(), &[1.0, 0.0, 1.0]);
    }
}
