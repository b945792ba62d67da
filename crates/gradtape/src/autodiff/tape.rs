//! Gradient tape and the scoped "current tape" stack.
//!
//! ```text
//! with(&tape, |tape| { ...ops... })
//!     → push tape onto TAPE_STACK (thread-local)
//!     → every op invocation records its node on the top tape
//!     → guard pops the entry on return or unwind
//!
//! tape.gradient(target, sources)
//!     → compute_gradients over the recorded ops
//!     → non-persistent tapes are consumed (nodes released)
//! ```

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use super::backward::compute_gradients;
use super::graph::{OpId, OpNode};
use super::traced::TracedFunction;
use super::variable::Variable;
use crate::error::{GradError, Result};
use crate::tensor::Tensor;

/// Options for a [`GradientTape`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TapeOptions {
    /// Allow more than one `gradient` call.
    pub persistent: bool,
}

/// Whether a scoped call records ops on its tape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Trace {
    #[default]
    Record,
    /// Run the closure with recording suspended; ops execute eagerly only.
    Pause,
}

#[derive(Debug)]
struct TapeState {
    options: TapeOptions,
    recorded: HashMap<OpId, Rc<OpNode>>,
    consumed: bool,
}

/// Records op invocations for later reverse-mode differentiation.
///
/// Cloning yields another handle to the same tape. A tape keeps the ops it
/// recorded alive until it is consumed or dropped.
///
/// # Example
///
/// ```
/// use gradtape::{GradientTape, Tensor, Variable, ops, with};
///
/// let x = Variable::new(Tensor::from(vec![1.0, 2.0, 3.0]));
/// let tape = GradientTape::new();
/// let y = with(&tape, |_| ops::mul(&x, &x)).unwrap();
/// let dx = tape.gradient(&y, &x).unwrap();
/// assert_eq!(dx.data(), &[2.0, 4.0, 6.0]);
/// ```
#[derive(Debug, Clone)]
pub struct GradientTape {
    state: Rc<RefCell<TapeState>>,
}

impl GradientTape {
    /// Create a non-persistent tape.
    pub fn new() -> Self {
        Self::with_options(TapeOptions::default())
    }

    /// Create a tape that allows repeated `gradient` calls.
    pub fn persistent() -> Self {
        Self::with_options(TapeOptions { persistent: true })
    }

    pub fn with_options(options: TapeOptions) -> Self {
        Self {
            state: Rc::new(RefCell::new(TapeState {
                options,
                recorded: HashMap::new(),
                consumed: false,
            })),
        }
    }

    pub fn is_persistent(&self) -> bool {
        self.state.borrow().options.persistent
    }

    /// Whether a non-persistent tape has already served its `gradient` call.
    pub fn is_consumed(&self) -> bool {
        self.state.borrow().consumed
    }

    /// Number of ops recorded so far.
    pub fn num_recorded(&self) -> usize {
        self.state.borrow().recorded.len()
    }

    /// Whether the op that produced `var` was recorded on this tape.
    pub fn is_recorded(&self, var: &Variable) -> bool {
        var.op_ref()
            .is_some_and(|r| self.state.borrow().recorded.contains_key(&r.op()))
    }

    pub(crate) fn record(&self, node: &Rc<OpNode>) {
        let mut state = self.state.borrow_mut();
        if state.consumed {
            return;
        }
        state.recorded.insert(node.id, Rc::clone(node));
        log::trace!("tape recorded op {}", node.id.index());
    }

    /// Gradient of `target` with respect to `sources`.
    ///
    /// `sources` is either a single `&Variable` (returns one [`Tensor`]) or a
    /// list of variables (returns a `Vec<Tensor>` in the same order).
    ///
    /// # Errors
    ///
    /// - `TapeConsumed` if a non-persistent tape was already used
    /// - `NonDifferentiableTarget` if `target` is not backpropagatable
    /// - `NoGradient` naming the first source without a differentiable path
    ///   to `target`
    pub fn gradient<S: Sources>(&self, target: &Variable, sources: S) -> Result<S::Output> {
        let recorded: HashSet<OpId> = {
            let mut state = self.state.borrow_mut();
            if state.consumed {
                log::warn!("gradient requested from a consumed non-persistent tape");
                return Err(GradError::TapeConsumed);
            }
            if state.options.persistent {
                state.recorded.keys().copied().collect()
            } else {
                state.consumed = true;
                // Nodes reachable from `target` stay alive through it.
                std::mem::take(&mut state.recorded).into_keys().collect()
            }
        };
        let vars = sources.variables();
        let grads = compute_gradients(target, &vars, &recorded)?;
        Ok(S::collect(grads))
    }
}

impl Default for GradientTape {
    fn default() -> Self {
        Self::new()
    }
}

/// What `gradient` can be asked about: one variable or an ordered list.
pub trait Sources {
    type Output;

    fn variables(&self) -> Vec<&Variable>;

    /// Shape the per-source gradients, which arrive in `variables()` order.
    fn collect(grads: Vec<Tensor>) -> Self::Output;
}

impl Sources for &Variable {
    type Output = Tensor;

    fn variables(&self) -> Vec<&Variable> {
        vec![*self]
    }

    fn collect(mut grads: Vec<Tensor>) -> Tensor {
        grads.swap_remove(0)
    }
}

impl Sources for &[Variable] {
    type Output = Vec<Tensor>;

    fn variables(&self) -> Vec<&Variable> {
        self.iter().collect()
    }

    fn collect(grads: Vec<Tensor>) -> Vec<Tensor> {
        grads
    }
}

impl Sources for &Vec<Variable> {
    type Output = Vec<Tensor>;

    fn variables(&self) -> Vec<&Variable> {
        self.iter().collect()
    }

    fn collect(grads: Vec<Tensor>) -> Vec<Tensor> {
        grads
    }
}

impl<const N: usize> Sources for [&Variable; N] {
    type Output = Vec<Tensor>;

    fn variables(&self) -> Vec<&Variable> {
        self.to_vec()
    }

    fn collect(grads: Vec<Tensor>) -> Vec<Tensor> {
        grads
    }
}

impl Sources for Vec<&Variable> {
    type Output = Vec<Tensor>;

    fn variables(&self) -> Vec<&Variable> {
        self.clone()
    }

    fn collect(grads: Vec<Tensor>) -> Vec<Tensor> {
        grads
    }
}

thread_local! {
    // `None` entries pause recording for their scope.
    static TAPE_STACK: RefCell<Vec<Option<GradientTape>>> = const { RefCell::new(Vec::new()) };
}

/// Pops the entry it pushed, including during unwinding.
struct ScopeGuard;

impl ScopeGuard {
    fn push(entry: Option<GradientTape>) -> Self {
        TAPE_STACK.with(|s| s.borrow_mut().push(entry));
        ScopeGuard
    }
}

impl Drop for ScopeGuard {
    fn drop(&mut self) {
        TAPE_STACK.with(|s| {
            s.borrow_mut().pop();
        });
    }
}

/// The tape ops should record on, if any.
pub(crate) fn current_tape() -> Option<GradientTape> {
    TAPE_STACK.with(|s| s.borrow().last().cloned().flatten())
}

/// Depth of the scope stack, counting paused scopes.
pub fn scope_depth() -> usize {
    TAPE_STACK.with(|s| s.borrow().len())
}

/// Run `f` with `tape` as the current tape.
///
/// The previous current tape is restored when `f` returns or panics.
pub fn with<R>(tape: &GradientTape, f: impl FnOnce(&GradientTape) -> R) -> R {
    with_trace(tape, Trace::Record, f)
}

/// Like [`with`], choosing whether ops are recorded.
pub fn with_trace<R>(tape: &GradientTape, trace: Trace, f: impl FnOnce(&GradientTape) -> R) -> R {
    let entry = match trace {
        Trace::Record => Some(tape.clone()),
        Trace::Pause => None,
    };
    let _guard = ScopeGuard::push(entry);
    f(tape)
}

/// Run `f` with recording suspended on every enclosing tape.
pub fn without_recording<R>(f: impl FnOnce() -> R) -> R {
    let _guard = ScopeGuard::push(None);
    f()
}

/// Invoke `traced` on `args` with `tape` active.
///
/// # Example
///
/// ```
/// use gradtape::{GradientTape, Trace, TracedFunction, Variable, ops, with_traced};
///
/// let square = TracedFunction::new("square", |xs: &[Variable]| Ok(vec![ops::mul(&xs[0], &xs[0])?]));
/// let x = Variable::new(3.0);
/// let tape = GradientTape::new();
/// let out = with_traced(&tape, &square, &[x.clone()], Trace::Record).unwrap();
/// assert_eq!(tape.gradient(&out[0], &x).unwrap().item(), Some(6.0));
/// ```
pub fn with_traced(
    tape: &GradientTape,
    traced: &TracedFunction,
    args: &[Variable],
    trace: Trace,
) -> Result<Vec<Variable>> {
    with_trace(tape, trace, |_| traced.call(args))
}
