//! Computation graph for reverse-mode automatic differentiation.
//!
//! Each op invocation becomes an [`OpNode`] behind an `Rc`. The node is owned
//! by the variables it produced and by any tape that recorded it; producer
//! links only point backward, so the graph is a DAG and a node is freed as
//! soon as its last variable or tape goes away. The thread-local
//! [`ComputationGraph`] hands out op ids and epochs and counts live nodes.

use std::borrow::Cow;
use std::cell::Cell;
use std::fmt::{self, Debug};
use std::rc::Rc;

use super::mask::MaskPolicy;
use super::variable::{VarId, Variable};
use crate::error::{GradError, Result};
use crate::tensor::Tensor;
use crate::value::Value;

/// Unique identifier for an op in the computation graph.
///
/// Ids are never reused on a thread, not even across [`clear_graph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OpId(usize);

impl OpId {
    /// Get the internal index.
    pub fn index(&self) -> usize {
        self.0
    }
}

/// Back-reference from a variable to one output of the op that produced it.
///
/// Holding an `OpRef` keeps the op, and everything upstream of it, alive.
#[derive(Clone)]
pub struct OpRef {
    pub(crate) node: Rc<OpNode>,
    pub(crate) output: usize,
}

impl OpRef {
    pub fn op(&self) -> OpId {
        self.node.id
    }

    /// Which output of the op this reference points at.
    pub fn output(&self) -> usize {
        self.output
    }

    /// The node, rejecting references from a cleared epoch.
    pub(crate) fn node(&self) -> Result<&Rc<OpNode>> {
        if self.node.epoch != with_graph(ComputationGraph::epoch) {
            return Err(GradError::StaleCreator {
                op: self.node.id.index(),
            });
        }
        Ok(&self.node)
    }
}

impl PartialEq for OpRef {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.node, &other.node) && self.output == other.output
    }
}

impl Eq for OpRef {}

impl Debug for OpRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpRef")
            .field("op", &self.node.id)
            .field("output", &self.output)
            .field("epoch", &self.node.epoch)
            .finish()
    }
}

/// Values an op's backward rule may read.
#[derive(Debug)]
pub struct BackwardContext<'a> {
    pub inputs: &'a [&'a Value],
    pub outputs: &'a [&'a Value],
}

impl BackwardContext<'_> {
    /// Input `i` viewed as an array.
    pub fn input(&self, i: usize) -> Cow<'_, Tensor> {
        self.inputs[i].as_tensor()
    }

    /// Output `i` viewed as an array.
    pub fn output(&self, i: usize) -> Cow<'_, Tensor> {
        self.outputs[i].as_tensor()
    }
}

/// An atomic primitive: forward compute plus its local backward rule.
///
/// Every entry point in [`ops`](super::ops) is an `Operation`. Layers with
/// hand-written math implement this trait and register themselves through
/// [`apply_operation`](super::apply_operation).
pub trait Operation: Debug {
    /// Name used in errors and logs.
    fn name(&self) -> &'static str;

    /// Compute outputs from input values. Must not mutate inputs.
    ///
    /// Errors returned here are graph errors: nothing is registered.
    fn forward(&self, inputs: &[&Value]) -> Result<Vec<Value>>;

    /// Vector-Jacobian product.
    ///
    /// `grads` has one entry per output, zero-filled for outputs that
    /// received no gradient. Returns one entry per input; the gradient may
    /// have the broadcast output shape, the caller folds it back onto the
    /// input's shape.
    fn backward(&self, ctx: &BackwardContext<'_>, grads: &[Tensor]) -> Result<Vec<Option<Tensor>>> {
        let _ = grads;
        Ok(vec![None; ctx.inputs.len()])
    }

    /// Whether input `index` can carry a gradient. Axis and count inputs
    /// return `false`.
    fn input_differentiable(&self, index: usize) -> bool {
        let _ = index;
        true
    }

    /// Whether outputs of this op are backpropagatable at all.
    fn is_differentiable(&self) -> bool {
        true
    }

    fn mask_policy(&self) -> MaskPolicy {
        MaskPolicy::Drop
    }
}

/// An op bound to concrete inputs.
pub(crate) struct OpNode {
    pub(crate) id: OpId,
    pub(crate) epoch: u64,
    pub(crate) op: Rc<dyn Operation>,
    pub(crate) inputs: Vec<Variable>,
    pub(crate) outputs: Vec<Rc<Value>>,
    pub(crate) output_ids: Vec<VarId>,
}

impl OpNode {
    /// Register a new node with the thread's graph.
    pub(crate) fn new(
        op: Rc<dyn Operation>,
        inputs: Vec<Variable>,
        outputs: Vec<Rc<Value>>,
        output_ids: Vec<VarId>,
    ) -> Rc<Self> {
        let (id, epoch) = with_graph(ComputationGraph::register);
        Rc::new(Self {
            id,
            epoch,
            op,
            inputs,
            outputs,
            output_ids,
        })
    }
}

impl Drop for OpNode {
    fn drop(&mut self) {
        // Unlink upstream nodes we solely own one at a time, so dropping a
        // long chain does not recurse.
        let mut pending = std::mem::take(&mut self.inputs);
        while let Some(var) = pending.pop() {
            if let Some(mut node) = var.into_creator_node().and_then(|n| Rc::try_unwrap(n).ok()) {
                pending.append(&mut node.inputs);
            }
        }
        // The thread-local may already be gone during thread teardown.
        let _ = GRAPH.try_with(ComputationGraph::release);
    }
}

impl Debug for OpNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpNode")
            .field("id", &self.id)
            .field("epoch", &self.epoch)
            .field("op", &self.op.name())
            .field("num_inputs", &self.inputs.len())
            .field("num_outputs", &self.outputs.len())
            .finish()
    }
}

/// Thread-local graph bookkeeping: op ids, the current epoch and the number
/// of live nodes.
pub struct ComputationGraph {
    next_op: Cell<usize>,
    live: Cell<usize>,
    epoch: Cell<u64>,
}

impl ComputationGraph {
    /// Create a new empty computation graph.
    pub const fn new() -> Self {
        Self {
            next_op: Cell::new(0),
            live: Cell::new(0),
            epoch: Cell::new(0),
        }
    }

    fn register(&self) -> (OpId, u64) {
        let id = self.next_op.get();
        self.next_op.set(id + 1);
        self.live.set(self.live.get() + 1);
        (OpId(id), self.epoch.get())
    }

    fn release(&self) {
        self.live.set(self.live.get().saturating_sub(1));
    }

    /// Current epoch; bumped by every clear.
    pub fn epoch(&self) -> u64 {
        self.epoch.get()
    }

    /// Start a new epoch. Nodes from earlier epochs stay alive while
    /// referenced but can no longer run backward.
    pub fn clear(&self) {
        self.epoch.set(self.epoch.get() + 1);
    }

    /// Number of live ops.
    pub fn len(&self) -> usize {
        self.live.get()
    }

    /// Check if no op is alive.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ComputationGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl Debug for ComputationGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComputationGraph")
            .field("live_ops", &self.len())
            .field("epoch", &self.epoch())
            .finish()
    }
}

thread_local! {
    static GRAPH: ComputationGraph = const { ComputationGraph::new() };
    static NEXT_VAR_ID: Cell<u64> = const { Cell::new(0) };
}

/// Access the thread-local computation graph.
pub fn with_graph<R>(f: impl FnOnce(&ComputationGraph) -> R) -> R {
    GRAPH.with(f)
}

/// Start a new graph epoch on this thread.
///
/// Creators of variables built before the clear become stale; asking them
/// for a backward pass fails with [`GradError::StaleCreator`].
pub fn clear_graph() {
    with_graph(ComputationGraph::clear);
    log::debug!("computation graph cleared");
}

/// Number of ops alive on this thread.
pub fn graph_len() -> usize {
    with_graph(ComputationGraph::len)
}

/// Fresh variable identity. Ids are never reused on a thread.
pub(crate) fn next_var_id() -> VarId {
    NEXT_VAR_ID.with(|id| {
        let current = id.get();
        id.set(current + 1);
        VarId::new(current)
    })
}
