//! N-dimensional dense tensor with a runtime dtype tag.
//!
//! ```text
//! Tensor
//! ├── storage: Dense (flat Vec<f64>, row-major)
//! ├── shape / strides
//! └── dtype: DType (Bool, Int32, Int64, Float32, Float64)
//! ```

use crate::dtype::DType;
use crate::error::{GradError, Result};
use crate::storage::Dense;
use crate::strides::{cartesian_to_linear, compute_strides};

/// A dense n-dimensional array.
///
/// Tensors are plain values: every operation returns a new tensor and never
/// writes into its inputs.
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    storage: Dense,
    shape: Vec<usize>,
    strides: Vec<usize>,
    dtype: DType,
}

impl Tensor {
    /// Create a new `Float64` tensor with the given shape, zero-initialized.
    ///
    /// # Examples
    ///
    /// ```
    /// use gradtape::Tensor;
    ///
    /// let t = Tensor::zeros(&[2, 3, 4]);
    /// assert_eq!(t.shape(), &[2, 3, 4]);
    /// assert_eq!(t.len(), 24);
    /// ```
    pub fn zeros(shape: &[usize]) -> Self {
        Self::full_with_dtype(shape, 0.0, DType::Float64)
    }

    /// Create a `Float64` tensor filled with ones.
    pub fn ones(shape: &[usize]) -> Self {
        Self::full_with_dtype(shape, 1.0, DType::Float64)
    }

    /// Create a `Float64` tensor filled with `value`.
    pub fn full(shape: &[usize], value: f64) -> Self {
        Self::full_with_dtype(shape, value, DType::Float64)
    }

    /// Create a tensor of the given dtype filled with `value`.
    pub fn full_with_dtype(shape: &[usize], value: f64, dtype: DType) -> Self {
        let len: usize = shape.iter().product();
        Self {
            storage: Dense::from_vec(vec![dtype.coerce(value); len]),
            shape: shape.to_vec(),
            strides: compute_strides(shape),
            dtype,
        }
    }

    /// Create a rank-0 `Float64` tensor.
    pub fn scalar(value: f64) -> Self {
        Self::full_with_dtype(&[], value, DType::Float64)
    }

    /// Create a `Float64` tensor from row-major data and a shape.
    ///
    /// # Errors
    ///
    /// Returns `GradError::DataLength` if data length doesn't match shape.
    ///
    /// # Examples
    ///
    /// ```
    /// use gradtape::Tensor;
    ///
    /// let t = Tensor::from_vec(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], &[2, 3]).unwrap();
    /// assert_eq!(t.get(&[0, 1]), Some(2.0));
    /// assert_eq!(t.get(&[1, 0]), Some(4.0));
    /// ```
    pub fn from_vec(data: Vec<f64>, shape: &[usize]) -> Result<Self> {
        Self::from_vec_with_dtype(data, shape, DType::Float64)
    }

    /// Create a tensor of the given dtype, coercing every element.
    pub fn from_vec_with_dtype(mut data: Vec<f64>, shape: &[usize], dtype: DType) -> Result<Self> {
        let expected: usize = shape.iter().product();
        if data.len() != expected {
            return Err(GradError::DataLength {
                expected,
                actual: data.len(),
            });
        }
        if dtype != DType::Float64 {
            for x in data.iter_mut() {
                *x = dtype.coerce(*x);
            }
        }
        Ok(Self {
            storage: Dense::from_vec(data),
            shape: shape.to_vec(),
            strides: compute_strides(shape),
            dtype,
        })
    }

    /// Build a tensor from already-coerced data whose length matches `shape`.
    pub(crate) fn from_raw(data: Vec<f64>, shape: &[usize], dtype: DType) -> Self {
        debug_assert_eq!(data.len(), shape.iter().product::<usize>());
        Self {
            storage: Dense::from_vec(data),
            shape: shape.to_vec(),
            strides: compute_strides(shape),
            dtype,
        }
    }

    /// Create a `Bool` tensor from flags.
    pub fn from_bools(flags: &[bool], shape: &[usize]) -> Result<Self> {
        let data = flags.iter().map(|&b| if b { 1.0 } else { 0.0 }).collect();
        Self::from_vec_with_dtype(data, shape, DType::Bool)
    }

    /// Get the shape of the tensor.
    #[inline]
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Get the rank (number of dimensions).
    #[inline]
    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    /// Get total number of elements.
    #[inline]
    pub fn len(&self) -> usize {
        self.storage.len()
    }

    /// Check if tensor has zero elements.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.storage.is_empty()
    }

    #[inline]
    pub fn strides(&self) -> &[usize] {
        &self.strides
    }

    #[inline]
    pub fn dtype(&self) -> DType {
        self.dtype
    }

    /// Get underlying row-major data as slice.
    #[inline]
    pub fn data(&self) -> &[f64] {
        self.storage.as_slice()
    }

    /// Get underlying data as mutable slice.
    ///
    /// Writes are not coerced; callers keep values inside the dtype domain.
    #[inline]
    pub fn data_mut(&mut self) -> &mut [f64] {
        self.storage.as_mut_slice()
    }

    /// Consume the tensor, returning its row-major data.
    pub fn into_data(self) -> Vec<f64> {
        self.storage.into_vec()
    }

    /// Get element by linear index.
    #[inline]
    pub fn get_linear(&self, i: usize) -> Option<f64> {
        self.storage.as_slice().get(i).copied()
    }

    /// Get element by cartesian indices.
    ///
    /// Returns `None` if indices are out of bounds or wrong number of indices.
    pub fn get(&self, indices: &[usize]) -> Option<f64> {
        if indices.len() != self.ndim() {
            return None;
        }
        if indices.iter().zip(self.shape.iter()).any(|(&i, &d)| i >= d) {
            return None;
        }
        self.get_linear(cartesian_to_linear(indices, &self.strides))
    }

    /// Set element by cartesian indices.
    ///
    /// # Errors
    ///
    /// Returns error if indices are out of bounds or wrong number of indices.
    pub fn set(&mut self, indices: &[usize], value: f64) -> Result<()> {
        if indices.len() != self.ndim() {
            return Err(GradError::WrongNumberOfIndices {
                expected: self.ndim(),
                actual: indices.len(),
            });
        }
        for (&index, &dim_size) in indices.iter().zip(self.shape.iter()) {
            if index >= dim_size {
                return Err(GradError::IndexOutOfBounds { index, dim_size });
            }
        }
        let linear = cartesian_to_linear(indices, &self.strides);
        self.storage[linear] = self.dtype.coerce(value);
        Ok(())
    }

    /// Fill all elements with a value.
    pub fn fill(&mut self, value: f64) {
        let v = self.dtype.coerce(value);
        for x in self.storage.as_mut_slice() {
            *x = v;
        }
    }

    /// The single element of a one-element tensor.
    pub fn item(&self) -> Option<f64> {
        if self.len() == 1 { self.get_linear(0) } else { None }
    }

    /// Return a copy of this tensor with a new shape.
    ///
    /// # Errors
    ///
    /// Returns an error if the total number of elements doesn't match.
    ///
    /// # Example
    ///
    /// ```
    /// use gradtape::Tensor;
    ///
    /// let t = Tensor::from_vec(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], &[2, 3]).unwrap();
    /// let t3x2 = t.reshape(&[3, 2]).unwrap();
    /// assert_eq!(t3x2.shape(), &[3, 2]);
    /// assert_eq!(t3x2.data(), t.data());
    /// ```
    pub fn reshape(&self, new_shape: &[usize]) -> Result<Self> {
        let new_len: usize = new_shape.iter().product();
        if self.len() != new_len {
            return Err(GradError::DataLength {
                expected: self.len(),
                actual: new_len,
            });
        }
        Ok(Self {
            storage: self.storage.clone(),
            shape: new_shape.to_vec(),
            strides: compute_strides(new_shape),
            dtype: self.dtype,
        })
    }

    /// Return a copy of this tensor converted to `dtype`.
    pub fn cast(&self, dtype: DType) -> Self {
        let data = self.data().iter().map(|&x| dtype.coerce(x)).collect();
        Self {
            storage: Dense::from_vec(data),
            shape: self.shape.clone(),
            strides: self.strides.clone(),
            dtype,
        }
    }

    /// Relabel the dtype without touching values.
    pub(crate) fn with_dtype_unchecked(mut self, dtype: DType) -> Self {
        self.dtype = dtype;
        self
    }

    /// Permute the dimensions of the tensor.
    ///
    /// # Examples
    ///
    /// ```
    /// use gradtape::Tensor;
    ///
    /// let t = Tensor::from_vec(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], &[2, 3]).unwrap();
    /// let t2 = t.permutedims(&[1, 0]).unwrap();
    /// assert_eq!(t2.shape(), &[3, 2]);
    /// assert_eq!(t.get(&[0, 2]), t2.get(&[2, 0]));
    /// ```
    pub fn permutedims(&self, perm: &[usize]) -> Result<Self> {
        crate::operations::permutedims(self, perm)
    }
}

impl From<f64> for Tensor {
    fn from(value: f64) -> Self {
        Tensor::scalar(value)
    }
}

impl From<Vec<f64>> for Tensor {
    fn from(data: Vec<f64>) -> Self {
        let n = data.len();
        Tensor {
            storage: Dense::from_vec(data),
            shape: vec![n],
            strides: vec![1],
            dtype: DType::Float64,
        }
    }
}
