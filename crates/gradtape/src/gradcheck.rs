//! Finite-difference checking of tape gradients.
//!
//! The checked function may return any shape; both the numeric and the
//! tape gradient are taken of the sum of its output.

use crate::autodiff::{GradientTape, Variable, ops, with, without_recording};
use crate::error::{GradError, Result};
use crate::tensor::Tensor;

/// Step and tolerances for a gradient check.
#[derive(Clone, Copy, Debug)]
pub struct GradientCheckConfig {
    /// Central-difference step.
    pub epsilon: f64,
    /// Relative tolerance.
    pub rtol: f64,
    /// Absolute tolerance.
    pub atol: f64,
}

impl Default for GradientCheckConfig {
    fn default() -> Self {
        GradientCheckConfig {
            epsilon: 1e-6,
            rtol: 1e-4,
            atol: 1e-6,
        }
    }
}

/// Outcome of checking one input.
#[derive(Clone, Debug)]
pub struct GradientCheckResult {
    /// Position of the input in the argument list.
    pub input: usize,
    pub max_abs_diff: f64,
    pub max_rel_diff: f64,
    /// Every element satisfied `|tape - numeric| <= atol + rtol * |numeric|`.
    pub passed: bool,
}

fn sum_of_output<F>(f: &F, inputs: &[Tensor]) -> Result<f64>
where
    F: Fn(&[Variable]) -> Result<Variable>,
{
    let vars: Vec<Variable> = inputs.iter().cloned().map(Variable::new).collect();
    let y = f(&vars)?;
    Ok(y.tensor().data().iter().sum())
}

/// Central-difference gradient of `sum(f(inputs))` with respect to
/// `inputs[index]`.
///
/// Runs with recording paused, so it can be called inside a tape scope
/// without polluting the tape.
///
/// # Errors
///
/// `InvalidArgument` if `index` is out of range; otherwise whatever `f`
/// returns.
pub fn numeric_gradient<F>(f: F, inputs: &[Tensor], index: usize, config: &GradientCheckConfig) -> Result<Tensor>
where
    F: Fn(&[Variable]) -> Result<Variable>,
{
    let Some(input) = inputs.get(index) else {
        return Err(GradError::InvalidArgument {
            op: "numeric_gradient",
            message: format!("input index {index} out of range for {} inputs", inputs.len()),
        });
    };

    without_recording(|| {
        let mut grad = Vec::with_capacity(input.len());
        let mut perturbed = inputs.to_vec();
        for i in 0..input.len() {
            let x = input.data()[i];

            perturbed[index].data_mut()[i] = x + config.epsilon;
            let plus = sum_of_output(&f, &perturbed)?;
            perturbed[index].data_mut()[i] = x - config.epsilon;
            let minus = sum_of_output(&f, &perturbed)?;
            perturbed[index].data_mut()[i] = x;

            grad.push((plus - minus) / (2.0 * config.epsilon));
        }
        Tensor::from_vec(grad, input.shape())
    })
}

/// Compare the tape gradient of `sum(f(inputs))` against central
/// differences, one result per input.
///
/// # Errors
///
/// Propagates errors from `f` and from the gradient computation, e.g.
/// `NoGradient` if an input does not reach the output.
///
/// # Example
///
/// ```
/// use gradtape::gradcheck::{GradientCheckConfig, check_gradients};
/// use gradtape::{Tensor, ops};
///
/// let inputs = [Tensor::from(vec![0.5, 1.5]), Tensor::from(vec![2.0, -1.0])];
/// let results = check_gradients(
///     |xs| ops::mul(&ops::exp(&xs[0])?, &xs[1]),
///     &inputs,
///     &GradientCheckConfig::default(),
/// )
/// .unwrap();
/// assert!(results.iter().all(|r| r.passed));
/// ```
pub fn check_gradients<F>(f: F, inputs: &[Tensor], config: &GradientCheckConfig) -> Result<Vec<GradientCheckResult>>
where
    F: Fn(&[Variable]) -> Result<Variable>,
{
    let vars: Vec<Variable> = inputs.iter().cloned().map(Variable::new).collect();
    let tape = GradientTape::new();
    let target = with(&tape, |_| ops::reduce_sum(&f(&vars)?, None, false))?;
    let analytic = tape.gradient(&target, &vars)?;

    let mut results = Vec::with_capacity(inputs.len());
    for (index, tape_grad) in analytic.iter().enumerate() {
        let numeric = numeric_gradient(&f, inputs, index, config)?;
        let mut max_abs_diff: f64 = 0.0;
        let mut max_rel_diff: f64 = 0.0;
        let mut passed = true;
        for (&a, &n) in tape_grad.data().iter().zip(numeric.data()) {
            let abs = (a - n).abs();
            max_abs_diff = max_abs_diff.max(abs);
            max_rel_diff = max_rel_diff.max(abs / n.abs().max(f64::EPSILON));
            passed &= abs <= config.atol + config.rtol * n.abs();
        }
        log::debug!("gradcheck input {index}: max_abs_diff={max_abs_diff:e} passed={passed}");
        results.push(GradientCheckResult {
            input: index,
            max_abs_diff,
            max_rel_diff,
            passed,
        });
    }
    Ok(results)
}
