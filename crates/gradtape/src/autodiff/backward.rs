//! Backward pass execution for reverse-mode automatic differentiation.
//!
//! ```text
//! gradient(target, sources)
//!     → walk creator back-references from target (tape-recorded ops only)
//!     → petgraph toposort over the reachable ops (consumer → producer)
//!     → seed target with ones
//!     → per op: gather output grads, run backward, fold onto input shapes,
//!       accumulate per VarId
//!     → collect one gradient per source, failing on any without one
//! ```

use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};

use super::gradients::Gradients;
use super::graph::{BackwardContext, OpId, OpNode};
use super::variable::Variable;
use crate::backend::reduce_to_shape;
use crate::error::{GradError, Result};
use crate::tensor::Tensor;
use crate::value::Value;

/// Run one op's backward rule and fold each input gradient onto the input's
/// shape.
///
/// `seeds` has one entry per output; missing entries are zero-filled. Inputs
/// the op marks non-differentiable, and inputs that are not
/// backpropagatable, get `None`.
pub(crate) fn local_backward(node: &OpNode, seeds: &[Option<Tensor>]) -> Result<Vec<Option<Tensor>>> {
    let name = node.op.name();
    if !node.op.is_differentiable() {
        return Err(GradError::NonDifferentiableTarget {
            target: format!("output of {name}"),
        });
    }

    let grads: Vec<Tensor> = seeds
        .iter()
        .zip(&node.outputs)
        .map(|(seed, out)| match seed {
            Some(g) => g.clone(),
            None => Tensor::full_with_dtype(&out.shape(), 0.0, out.dtype().gradient_dtype()),
        })
        .collect();
    let inputs: Vec<&Value> = node.inputs.iter().map(Variable::value).collect();
    let outputs: Vec<&Value> = node.outputs.iter().map(|v| &**v).collect();
    let ctx = BackwardContext {
        inputs: &inputs,
        outputs: &outputs,
    };

    let raw = node.op.backward(&ctx, &grads)?;
    if raw.len() != node.inputs.len() {
        return Err(GradError::Arity {
            op: name,
            expected: node.inputs.len(),
            actual: raw.len(),
        });
    }

    raw.into_iter()
        .zip(&node.inputs)
        .enumerate()
        .map(|(i, (grad, input))| {
            if !node.op.input_differentiable(i) || !input.is_backpropagatable() {
                return Ok(None);
            }
            grad.map(|g| reduce_to_shape(&g, &input.shape())).transpose()
        })
        .collect()
}

/// Ops reachable backward from `target` through recorded, differentiable
/// edges, in an order where every consumer precedes its producers.
fn reverse_topological_ops(target: &Variable, recorded: &HashSet<OpId>) -> Result<Vec<(OpId, Rc<OpNode>)>> {
    let mut nodes: HashMap<OpId, Rc<OpNode>> = HashMap::new();
    let mut stack: Vec<_> = target.op_ref().into_iter().cloned().collect();

    while let Some(op_ref) = stack.pop() {
        let id = op_ref.op();
        if nodes.contains_key(&id) || !recorded.contains(&id) {
            continue;
        }
        let node = Rc::clone(op_ref.node()?);
        for (i, input) in node.inputs.iter().enumerate() {
            if !input.is_backpropagatable() || !node.op.input_differentiable(i) {
                continue;
            }
            if let Some(r) = input.op_ref() {
                stack.push(r.clone());
            }
        }
        nodes.insert(id, node);
    }

    let mut graph: DiGraph<OpId, ()> = DiGraph::new();
    let mut index: HashMap<OpId, NodeIndex> = HashMap::new();
    for &id in nodes.keys() {
        index.insert(id, graph.add_node(id));
    }
    for (id, node) in &nodes {
        for input in &node.inputs {
            if let Some(producer) = input.op_ref().and_then(|r| index.get(&r.op())) {
                // Edge from consumer to producer
                graph.add_edge(index[id], *producer, ());
            }
        }
    }

    let order = toposort(&graph, None).map_err(|cycle| GradError::InvalidArgument {
        op: "gradient",
        message: format!("graph contains a cycle through op {}", graph[cycle.node_id()].index()),
    })?;

    Ok(order
        .into_iter()
        .filter_map(|idx| {
            let id = graph[idx];
            nodes.remove(&id).map(|node| (id, node))
        })
        .collect())
}

/// Gradients of `target` with respect to each of `sources`.
///
/// Only ops in `recorded` are traversed.
pub(crate) fn compute_gradients(
    target: &Variable,
    sources: &[&Variable],
    recorded: &HashSet<OpId>,
) -> Result<Vec<Tensor>> {
    if !target.is_backpropagatable() {
        return Err(GradError::NonDifferentiableTarget {
            target: target.to_string(),
        });
    }

    let order = reverse_topological_ops(target, recorded)?;
    log::debug!(
        "gradient: {} reachable ops, {} sources",
        order.len(),
        sources.len()
    );

    let mut grads = Gradients::new();
    let seed = Tensor::full_with_dtype(&target.shape(), 1.0, target.dtype().gradient_dtype());
    grads.accumulate(target.id(), seed)?;

    for (id, node) in &order {
        let seeds: Vec<Option<Tensor>> = node.output_ids.iter().map(|v| grads.get(*v).cloned()).collect();
        if seeds.iter().all(Option::is_none) {
            continue;
        }
        log::trace!("backward through op {} ({})", id.index(), node.op.name());
        let input_grads = local_backward(node, &seeds)?;
        for (input, grad) in node.inputs.iter().zip(input_grads) {
            if let Some(grad) = grad {
                grads.accumulate(input.id(), grad)?;
            }
        }
    }

    let result = sources
        .iter()
        .map(|source| {
            grads.get(source.id()).cloned().ok_or_else(|| GradError::NoGradient {
                variable: source.to_string(),
            })
        })
        .collect::<Result<Vec<_>>>()?;
    log::debug!("gradient: done, {} gradients stored", grads.len());
    Ok(result)
}
