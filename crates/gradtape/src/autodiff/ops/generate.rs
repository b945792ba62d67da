//! Value generators. None of these carry a gradient.

use rand::SeedableRng;
use rand::rngs::StdRng;

use super::{int_list, invoke_undifferentiable};
use crate::autodiff::graph::Operation;
use crate::autodiff::variable::{IntoOperand, Undifferentiable};
use crate::dtype::DType;
use crate::error::{GradError, Result};
use crate::tensor::Tensor;
use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq)]
enum Distribution {
    Uniform { low: f64, high: f64 },
    Normal { mean: f64, stddev: f64 },
}

#[derive(Debug)]
enum Generate {
    /// Shape from the operand, constant fill.
    Fill { value: f64, dtype: DType },
    /// Shape and dtype from the operand, constant fill.
    FillLike { value: f64 },
    Random { dist: Distribution, seed: Option<u64> },
}

fn shape_operand(op: &'static str, value: &Value) -> Result<Vec<usize>> {
    int_list(op, value)?
        .into_iter()
        .map(|d| {
            usize::try_from(d).map_err(|_| GradError::InvalidArgument {
                op,
                message: format!("negative dimension {d}"),
            })
        })
        .collect()
}

impl Operation for Generate {
    fn name(&self) -> &'static str {
        match self {
            Generate::Fill { .. } => "fill",
            Generate::FillLike { .. } => "fill_like",
            Generate::Random {
                dist: Distribution::Uniform { .. },
                ..
            } => "random_uniform",
            Generate::Random {
                dist: Distribution::Normal { .. },
                ..
            } => "random_normal",
        }
    }

    fn forward(&self, inputs: &[&Value]) -> Result<Vec<Value>> {
        let out = match *self {
            Generate::Fill { value, dtype } => {
                let shape = shape_operand(self.name(), inputs[0])?;
                Tensor::full_with_dtype(&shape, value, dtype)
            }
            Generate::FillLike { value } => {
                let like = inputs[0];
                Tensor::full_with_dtype(&like.shape(), value, like.dtype())
            }
            Generate::Random { dist, seed } => {
                let shape = shape_operand(self.name(), inputs[0])?;
                let mut rng = StdRng::seed_from_u64(seed.unwrap_or_else(rand::random));
                match dist {
                    Distribution::Uniform { low, high } => Tensor::uniform_with_rng(&shape, low, high, &mut rng),
                    Distribution::Normal { mean, stddev } => Tensor::normal_with_rng(&shape, mean, stddev, &mut rng),
                }
            }
        };
        Ok(vec![out.into()])
    }

    fn is_differentiable(&self) -> bool {
        false
    }
}

/// Float64 zeros of `shape` (an integer list or a shape tuple).
///
/// # Example
///
/// ```
/// use gradtape::{Tensor, Variable, ops};
///
/// let x = Variable::new(Tensor::ones(&[2, 3]));
/// let z = ops::zeros(&ops::shape(&x).unwrap()).unwrap();
/// assert_eq!(z.shape(), vec![2, 3]);
/// assert!(!z.is_backpropagatable());
/// ```
pub fn zeros(shape: impl IntoOperand) -> Result<Undifferentiable> {
    fill(shape, 0.0)
}

/// Float64 ones of `shape`.
pub fn ones(shape: impl IntoOperand) -> Result<Undifferentiable> {
    fill(shape, 1.0)
}

/// Float64 array of `shape` filled with `value`.
pub fn fill(shape: impl IntoOperand, value: f64) -> Result<Undifferentiable> {
    invoke_undifferentiable(
        Generate::Fill {
            value,
            dtype: DType::Float64,
        },
        vec![shape.into_operand()],
    )
}

/// Zeros with the shape and dtype of `x`.
pub fn zeros_like(x: impl IntoOperand) -> Result<Undifferentiable> {
    invoke_undifferentiable(Generate::FillLike { value: 0.0 }, vec![x.into_operand()])
}

/// Ones with the shape and dtype of `x`.
pub fn ones_like(x: impl IntoOperand) -> Result<Undifferentiable> {
    invoke_undifferentiable(Generate::FillLike { value: 1.0 }, vec![x.into_operand()])
}

/// Samples from `U[low, high)`; a `seed` makes the draw reproducible.
pub fn random_uniform(shape: impl IntoOperand, low: f64, high: f64, seed: Option<u64>) -> Result<Undifferentiable> {
    invoke_undifferentiable(
        Generate::Random {
            dist: Distribution::Uniform { low, high },
            seed,
        },
        vec![shape.into_operand()],
    )
}

/// Samples from `N(mean, stddev²)`; a `seed` makes the draw reproducible.
pub fn random_normal(
    shape: impl IntoOperand,
    mean: f64,
    stddev: f64,
    seed: Option<u64>,
) -> Result<Undifferentiable> {
    invoke_undifferentiable(
        Generate::Random {
            dist: Distribution::Normal { mean, stddev },
            seed,
        },
        vec![shape.into_operand()],
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::autodiff::variable::Variable;

    #[test]
    fn test_zeros_from_list() {
        let z = zeros(vec![2i64, 2]).unwrap();
        assert_eq!(z.tensor().data(), &[0.0; 4]);
        assert_eq!(z.dtype(), DType::Float64);
    }

    #[test]
    fn test_like_keeps_dtype() {
        let x = Variable::with_dtype(Tensor::ones(&[3]), DType::Int32);
        let z = zeros_like(&x).unwrap();
        assert_eq!(z.dtype(), DType::Int32);
        assert_eq!(z.shape(), vec![3]);
        assert_eq!(ones_like(&x).unwrap().tensor().data(), &[1.0; 3]);
    }

    #[test]
    fn test_negative_shape_rejected() {
        assert!(zeros(vec![2i64, -1]).is_err());
    }

    #[test]
    fn test_seeded_random_is_reproducible() {
        let a = random_normal(vec![4i64], 0.0, 1.0, Some(7)).unwrap();
        let b = random_normal(vec![4i64], 0.0, 1.0, Some(7)).unwrap();
        assert_eq!(a.tensor(), b.tensor());
        let u = random_uniform(vec![100i64], -1.0, 1.0, Some(1)).unwrap();
        assert!(u.tensor().data().iter().all(|&v| (-1.0..1.0).contains(&v)));
    }

    #[test]
    fn test_fill_scalar_shape() {
        let f = fill(Vec::<i64>::new(), 2.5).unwrap();
        assert_eq!(f.item(), Some(2.5));
        assert!(f.shape().is_empty());
    }
}
