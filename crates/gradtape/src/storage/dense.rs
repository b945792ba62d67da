//! Dense storage for tensor data.

/// Dense storage - contiguous array of elements in row-major order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Dense {
    data: Vec<f64>,
}

impl Dense {
    /// Create dense storage with given length, zero-initialized.
    pub fn zeros(len: usize) -> Self {
        Self {
            data: vec![0.0; len],
        }
    }

    /// Create dense storage from existing vector (takes ownership).
    pub fn from_vec(data: Vec<f64>) -> Self {
        Self { data }
    }

    /// Length of storage.
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Check if storage is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[inline]
    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [f64] {
        &mut self.data
    }

    /// Consume the storage, returning the backing vector.
    pub fn into_vec(self) -> Vec<f64> {
        self.data
    }
}

impl std::ops::Index<usize> for Dense {
    type Output = f64;

    #[inline]
    fn index(&self, i: usize) -> &f64 {
        &self.data[i]
    }
}

impl std::ops::IndexMut<usize> for Dense {
    #[inline]
    fn index_mut(&mut self, i: usize) -> &mut f64 {
        &mut self.data[i]
    }
}
