//! Gradient storage container.

use super::variable::VarId;
use crate::dtype::DType;
use crate::error::Result;
use crate::operations::apply_binary;
use crate::tensor::Tensor;
use std::collections::HashMap;

/// Container for accumulated gradients.
///
/// Stores gradients keyed by [`VarId`], summing contributions from every
/// consumer of a variable.
#[derive(Debug, Default)]
pub struct Gradients {
    grads: HashMap<VarId, Tensor>,
}

impl Gradients {
    /// Create empty gradient container.
    pub fn new() -> Self {
        Self::default()
    }

    /// Accumulate gradient for a variable.
    ///
    /// If gradient already exists, adds to it (for multiple paths).
    pub fn accumulate(&mut self, id: VarId, grad: Tensor) -> Result<()> {
        if let Some(existing) = self.grads.get_mut(&id) {
            let dtype = existing.dtype().promote(grad.dtype()).gradient_dtype();
            *existing = apply_binary("accumulate", existing, &grad, dtype, |a, b| a + b)?;
        } else {
            let dtype = grad.dtype().gradient_dtype();
            let grad = if dtype == grad.dtype() {
                grad
            } else {
                grad.cast(DType::Float64)
            };
            self.grads.insert(id, grad);
        }
        Ok(())
    }

    /// Get gradient for a variable.
    pub fn get(&self, id: VarId) -> Option<&Tensor> {
        self.grads.get(&id)
    }

    /// Remove and return gradient.
    pub fn remove(&mut self, id: VarId) -> Option<Tensor> {
        self.grads.remove(&id)
    }

    /// Check if gradient exists for variable.
    pub fn contains(&self, id: VarId) -> bool {
        self.grads.contains_key(&id)
    }

    /// Number of stored gradients.
    pub fn len(&self) -> usize {
        self.grads.len()
    }

    /// Check if no gradients stored.
    pub fn is_empty(&self) -> bool {
        self.grads.is_empty()
    }

    /// Iterate over all gradients.
    pub fn iter(&self) -> impl Iterator<Item = (&VarId, &Tensor)> {
        self.grads.iter()
    }
}
