//! Variable - a value with provenance and differentiability metadata.

use std::fmt;
use std::rc::Rc;

use super::backward::local_backward;
use super::graph::{OpNode, OpRef, next_var_id};
use crate::dtype::DType;
use crate::error::{GradError, Result};
use crate::tensor::Tensor;
use crate::value::{MaskedTensor, ShapeTuple, Value};

/// Identity of a variable; gradient maps are keyed by it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VarId(u64);

impl VarId {
    pub(crate) fn new(id: u64) -> Self {
        Self(id)
    }

    /// Get the internal index.
    pub fn index(&self) -> u64 {
        self.0
    }
}

/// Graph-visible wrapper around a [`Value`].
///
/// Variables are immutable; every op returns new variables. Cloning is
/// cheap and keeps the identity, so a clone is the same graph input.
///
/// # Example
///
/// ```
/// use gradtape::{Tensor, Variable};
///
/// let x = Variable::new(Tensor::ones(&[2, 3]));
/// assert_eq!(x.shape(), vec![2, 3]);
/// assert!(x.is_backpropagatable());
/// assert!(x.is_leaf());
/// ```
#[derive(Debug, Clone)]
pub struct Variable {
    id: VarId,
    value: Rc<Value>,
    creator: Option<OpRef>,
    backpropagatable: bool,
}

impl Variable {
    /// Wrap a leaf value. Leaves are backpropagatable.
    pub fn new(value: impl Into<Value>) -> Self {
        Self {
            id: next_var_id(),
            value: Rc::new(value.into()),
            creator: None,
            backpropagatable: true,
        }
    }

    /// Wrap a leaf value converted to `dtype`.
    ///
    /// ```
    /// use gradtape::{DType, Tensor, Variable};
    ///
    /// let x = Variable::with_dtype(Tensor::from(vec![1.7, -2.2]), DType::Int32);
    /// assert_eq!(x.dtype(), DType::Int32);
    /// assert_eq!(x.tensor().data(), &[1.0, -2.0]);
    /// ```
    pub fn with_dtype(value: impl Into<Value>, dtype: DType) -> Self {
        let value = match value.into() {
            Value::Scalar { value, .. } => Value::Scalar {
                value: dtype.coerce(value),
                dtype,
            },
            Value::Masked(m) => {
                let (t, mask) = m.into_parts();
                Value::Masked(MaskedTensor::from_parts_unchecked(t.cast(dtype), mask))
            }
            other => Value::from_tensor(other.as_tensor().cast(dtype)),
        };
        Self::new(value)
    }

    /// Wrap a leaf value that never receives a gradient.
    ///
    /// Raw numbers and arrays passed to ops are promoted this way.
    pub fn constant(value: impl Into<Value>) -> Self {
        Self {
            backpropagatable: false,
            ..Self::new(value)
        }
    }

    pub(crate) fn from_op(value: Rc<Value>, id: VarId, creator: OpRef, backpropagatable: bool) -> Self {
        Self {
            id,
            value,
            creator: Some(creator),
            backpropagatable,
        }
    }

    pub fn id(&self) -> VarId {
        self.id
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub(crate) fn value_rc(&self) -> &Rc<Value> {
        &self.value
    }

    pub fn shape(&self) -> Vec<usize> {
        self.value.shape()
    }

    pub fn ndim(&self) -> usize {
        self.shape().len()
    }

    pub fn dtype(&self) -> DType {
        self.value.dtype()
    }

    /// Whether gradients can flow through this variable.
    pub fn is_backpropagatable(&self) -> bool {
        self.backpropagatable
    }

    /// A leaf has no creator.
    pub fn is_leaf(&self) -> bool {
        self.creator.is_none()
    }

    /// The op that produced this variable, for manual backward calls.
    pub fn creator(&self) -> Option<Creator> {
        self.creator.clone().map(|op_ref| Creator { op_ref })
    }

    pub(crate) fn op_ref(&self) -> Option<&OpRef> {
        self.creator.as_ref()
    }

    pub(crate) fn into_creator_node(self) -> Option<Rc<OpNode>> {
        self.creator.map(|r| r.node)
    }

    /// The value as an owned array (masks dropped).
    pub fn tensor(&self) -> Tensor {
        self.value.as_tensor().into_owned()
    }

    /// The single number held by a scalar or one-element value.
    pub fn item(&self) -> Option<f64> {
        self.value.item()
    }

    pub fn mask(&self) -> Option<&[bool]> {
        self.value.mask()
    }
}

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Variable#{} {}", self.id.0, self.value)
    }
}

/// Output of an op declared non-differentiable.
///
/// It has no `Deref` to [`Variable`]. It can still be passed to ops as an
/// operand, or unwrapped with [`as_variable`](Self::as_variable) and
/// [`into_variable`](Self::into_variable); the inner variable is always
/// flagged non-backpropagatable.
#[derive(Debug, Clone)]
pub struct Undifferentiable(Variable);

impl Undifferentiable {
    pub(crate) fn new(var: Variable) -> Self {
        debug_assert!(!var.is_backpropagatable());
        Self(var)
    }

    pub fn as_variable(&self) -> &Variable {
        &self.0
    }

    pub fn into_variable(self) -> Variable {
        self.0
    }

    pub fn value(&self) -> &Value {
        self.0.value()
    }

    pub fn shape(&self) -> Vec<usize> {
        self.0.shape()
    }

    pub fn dtype(&self) -> DType {
        self.0.dtype()
    }

    pub fn tensor(&self) -> Tensor {
        self.0.tensor()
    }

    pub fn item(&self) -> Option<f64> {
        self.0.item()
    }

    /// Always `false`.
    pub fn is_backpropagatable(&self) -> bool {
        false
    }
}

impl fmt::Display for Undifferentiable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (undifferentiable)", self.0)
    }
}

/// Anything an op accepts as an input.
///
/// Variables pass through with their identity; raw values become constant
/// leaves.
pub trait IntoOperand {
    fn into_operand(self) -> Variable;
}

impl IntoOperand for Variable {
    fn into_operand(self) -> Variable {
        self
    }
}

impl IntoOperand for &Variable {
    fn into_operand(self) -> Variable {
        self.clone()
    }
}

impl IntoOperand for Undifferentiable {
    fn into_operand(self) -> Variable {
        self.0
    }
}

impl IntoOperand for &Undifferentiable {
    fn into_operand(self) -> Variable {
        self.0.clone()
    }
}

impl IntoOperand for f64 {
    fn into_operand(self) -> Variable {
        Variable::constant(self)
    }
}

impl IntoOperand for i64 {
    fn into_operand(self) -> Variable {
        Variable::constant(self)
    }
}

impl IntoOperand for Tensor {
    fn into_operand(self) -> Variable {
        Variable::constant(self)
    }
}

impl IntoOperand for &Tensor {
    fn into_operand(self) -> Variable {
        Variable::constant(self.clone())
    }
}

impl IntoOperand for Value {
    fn into_operand(self) -> Variable {
        Variable::constant(self)
    }
}

impl IntoOperand for MaskedTensor {
    fn into_operand(self) -> Variable {
        Variable::constant(self)
    }
}

impl IntoOperand for ShapeTuple {
    fn into_operand(self) -> Variable {
        Variable::constant(self)
    }
}

impl IntoOperand for Vec<f64> {
    fn into_operand(self) -> Variable {
        Variable::constant(Tensor::from(self))
    }
}

impl IntoOperand for &[i64] {
    fn into_operand(self) -> Variable {
        let data = self.iter().map(|&x| x as f64).collect();
        Variable::constant(Tensor::from_raw(data, &[self.len()], DType::Int64))
    }
}

impl IntoOperand for Vec<i64> {
    fn into_operand(self) -> Variable {
        self.as_slice().into_operand()
    }
}

impl<const N: usize> IntoOperand for [i64; N] {
    fn into_operand(self) -> Variable {
        self.as_slice().into_operand()
    }
}

/// Handle on the op that produced a variable.
///
/// A creator keeps its op alive, along with everything upstream of it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Creator {
    op_ref: OpRef,
}

impl Creator {
    pub fn op_ref(&self) -> &OpRef {
        &self.op_ref
    }

    /// Name of the op.
    pub fn name(&self) -> Result<&'static str> {
        Ok(self.op_ref.node()?.op.name())
    }

    /// Input variables the op was bound to.
    pub fn inputs(&self) -> Result<Vec<Variable>> {
        Ok(self.op_ref.node()?.inputs.clone())
    }

    /// Number of outputs the op produced.
    pub fn num_outputs(&self) -> Result<usize> {
        Ok(self.op_ref.node()?.outputs.len())
    }

    /// Run this op's local backward with `seed` as the gradient of the
    /// variable this creator came from.
    ///
    /// Other outputs of a multi-output op are seeded with zeros. The result
    /// has one entry per input, `None` for inputs that take no gradient;
    /// every gradient is already folded onto its input's shape.
    ///
    /// # Example
    ///
    /// ```
    /// use gradtape::{Tensor, Variable, ops};
    ///
    /// let a = Variable::new(Tensor::from(vec![1.0, 2.0]));
    /// let y = ops::mul(&a, 3.0).unwrap();
    /// let grads = y.creator().unwrap().backward(&Tensor::ones(&[2])).unwrap();
    /// assert_eq!(grads[0].as_ref().unwrap().data(), &[3.0, 3.0]);
    /// assert!(grads[1].is_none());
    /// ```
    pub fn backward(&self, seed: &Tensor) -> Result<Vec<Option<Tensor>>> {
        let n = self.num_outputs()?;
        let mut seeds = vec![None; n];
        seeds[self.op_ref.output] = Some(seed.clone());
        self.backward_outputs(&seeds)
    }

    /// Local backward with an explicit seed per output.
    pub fn backward_outputs(&self, seeds: &[Option<Tensor>]) -> Result<Vec<Option<Tensor>>> {
        let node = self.op_ref.node()?;
        if seeds.len() != node.outputs.len() {
            return Err(GradError::Arity {
                op: node.op.name(),
                expected: node.outputs.len(),
                actual: seeds.len(),
            });
        }
        for (seed, out) in seeds.iter().zip(&node.outputs) {
            match seed {
                Some(seed) if seed.shape() != out.shape().as_slice() => {
                    return Err(GradError::ShapeMismatch {
                        op: node.op.name(),
                        expected: out.shape(),
                        given: seed.shape().to_vec(),
                    });
                }
                _ => {}
            }
        }
        local_backward(node, seeds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_leaf_defaults() {
        let x = Variable::new(3.0);
        assert!(x.is_leaf());
        assert!(x.is_backpropagatable());
        assert!(x.creator().is_none());
        assert_eq!(x.item(), Some(3.0));
        assert!(x.shape().is_empty());
    }

    #[test]
    fn test_clone_keeps_identity() {
        let x = Variable::new(Tensor::ones(&[2]));
        let y = x.clone();
        assert_eq!(x.id(), y.id());
        assert_ne!(x.id(), Variable::new(1.0).id());
    }

    #[test]
    fn test_raw_operands_are_constants() {
        let c = 2.0f64.into_operand();
        assert!(!c.is_backpropagatable());
        let s = vec![2i64, -1].into_operand();
        assert_eq!(s.dtype(), DType::Int64);
        assert_eq!(s.tensor().data(), &[2.0, -1.0]);
    }

    #[test]
    fn test_with_dtype_masked_keeps_mask() {
        let m = MaskedTensor::new(Tensor::from(vec![0.5, 1.5]), vec![true, false]).unwrap();
        let x = Variable::with_dtype(m, DType::Int64);
        assert_eq!(x.mask(), Some(&[true, false][..]));
        assert_eq!(x.tensor().data(), &[0.0, 1.0]);
    }

    #[test]
    fn test_display() {
        let x = Variable::new(Tensor::zeros(&[2, 3]));
        let text = x.to_string();
        assert!(text.contains("[2, 3]"));
        assert!(text.contains("float64"));
    }
}
