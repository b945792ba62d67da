//! Traced-function wrapper.
//!
//! A [`TracedFunction`] re-invokes its closure on every call; it keeps no
//! compiled plan. What it does keep is the call signature, so callers can
//! see how many times it ran and with which input shapes.

use std::cell::RefCell;
use std::fmt;

use super::variable::Variable;
use crate::dtype::DType;
use crate::error::{GradError, Result};

/// Shape and dtype of one argument of a traced call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArgSignature {
    pub shape: Vec<usize>,
    pub dtype: DType,
}

impl ArgSignature {
    fn of(var: &Variable) -> Self {
        Self {
            shape: var.shape(),
            dtype: var.dtype(),
        }
    }
}

#[derive(Debug, Default)]
struct TraceLog {
    count: usize,
    arity: Option<usize>,
    last_signature: Option<Vec<ArgSignature>>,
}

type TracedFn = dyn Fn(&[Variable]) -> Result<Vec<Variable>>;

/// Wraps a closure over variables so it can be replayed under a tape.
pub struct TracedFunction {
    name: String,
    f: Box<TracedFn>,
    log: RefCell<TraceLog>,
}

impl TracedFunction {
    pub fn new<F>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&[Variable]) -> Result<Vec<Variable>> + 'static,
    {
        Self {
            name: name.into(),
            f: Box::new(f),
            log: RefCell::new(TraceLog::default()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Invoke the closure on `args`.
    ///
    /// Ops are recorded on whatever tape is current; see
    /// [`with_traced`](super::with_traced).
    ///
    /// # Errors
    ///
    /// Returns `Arity` if `args` has a different length than on the first
    /// call, and propagates any error from the closure.
    pub fn call(&self, args: &[Variable]) -> Result<Vec<Variable>> {
        {
            let mut state = self.log.borrow_mut();
            match state.arity {
                Some(expected) if expected != args.len() => {
                    return Err(GradError::Arity {
                        op: "traced function",
                        expected,
                        actual: args.len(),
                    });
                }
                Some(_) => {}
                None => state.arity = Some(args.len()),
            }
            state.count += 1;
            state.last_signature = Some(args.iter().map(ArgSignature::of).collect());
            log::trace!("traced function {} call #{}", self.name, state.count);
        }
        (self.f)(args)
    }

    /// How many times the closure has been invoked.
    pub fn trace_count(&self) -> usize {
        self.log.borrow().count
    }

    /// Argument count fixed by the first call.
    pub fn arity(&self) -> Option<usize> {
        self.log.borrow().arity
    }

    pub fn last_signature(&self) -> Option<Vec<ArgSignature>> {
        self.log.borrow().last_signature.clone()
    }
}

impl fmt::Debug for TracedFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TracedFunction")
            .field("name", &self.name)
            .field("trace_count", &self.trace_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Tensor;
    use crate::autodiff::ops::add;

    fn double() -> TracedFunction {
        TracedFunction::new("double", |xs: &[Variable]| Ok(vec![add(&xs[0], &xs[0])?]))
    }

    #[test]
    fn test_counts_and_signature() {
        let f = double();
        assert_eq!(f.trace_count(), 0);
        f.call(&[Variable::new(Tensor::ones(&[2, 3]))]).unwrap();
        f.call(&[Variable::new(Tensor::ones(&[4]))]).unwrap();
        assert_eq!(f.trace_count(), 2);
        assert_eq!(f.arity(), Some(1));
        let sig = f.last_signature().unwrap();
        assert_eq!(sig[0].shape, vec![4]);
        assert_eq!(sig[0].dtype, DType::Float64);
    }

    #[test]
    fn test_arity_mismatch() {
        let f = double();
        f.call(&[Variable::new(1.0)]).unwrap();
        let err = f.call(&[Variable::new(1.0), Variable::new(2.0)]).unwrap_err();
        assert!(matches!(
            err,
            GradError::Arity {
                expected: 1,
                actual: 2,
                ..
            }
        ));
        assert_eq!(f.trace_count(), 1);
    }
}
