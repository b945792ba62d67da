use super::invoke_one;
use crate::autodiff::graph::{BackwardContext, Operation};
use crate::autodiff::variable::{IntoOperand, Variable};
use crate::backend::matmul as gemm;
use crate::error::Result;
use crate::tensor::Tensor;
use crate::value::Value;

#[derive(Debug)]
struct MatMul {
    transpose_a: bool,
    transpose_b: bool,
}

impl Operation for MatMul {
    fn name(&self) -> &'static str {
        "matmul"
    }

    fn forward(&self, inputs: &[&Value]) -> Result<Vec<Value>> {
        let a = inputs[0].as_tensor();
        let b = inputs[1].as_tensor();
        Ok(vec![gemm(&a, &b, self.transpose_a, self.transpose_b)?.into()])
    }

    fn backward(&self, ctx: &BackwardContext<'_>, grads: &[Tensor]) -> Result<Vec<Option<Tensor>>> {
        let g = &grads[0];
        let a = ctx.input(0);
        let b = ctx.input(1);
        let (ta, tb) = (self.transpose_a, self.transpose_b);
        let da = if ta {
            gemm(&b, g, tb, true)?
        } else {
            gemm(g, &b, false, !tb)?
        };
        let db = if tb {
            gemm(g, &a, true, ta)?
        } else {
            gemm(&a, g, !ta, false)?
        };
        Ok(vec![Some(da), Some(db)])
    }
}

/// Batched matrix product over the trailing two axes.
///
/// Leading axes are batch axes and broadcast against each other. The
/// transpose flags swap the trailing two axes of the respective operand.
///
/// # Example
///
/// ```
/// use gradtape::{GradientTape, Tensor, Variable, ops, with};
///
/// let a = Variable::new(Tensor::from_vec(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], &[2, 3]).unwrap());
/// let b = Variable::new(Tensor::from_vec(vec![7.0, 8.0, 9.0, 10.0, 11.0, 12.0], &[3, 2]).unwrap());
/// let tape = GradientTape::new();
/// let c = with(&tape, |_| ops::matmul(&a, &b, false, false)).unwrap();
/// assert_eq!(c.tensor().data(), &[58.0, 64.0, 139.0, 154.0]);
///
/// let g = tape.gradient(&c, [&a, &b]).unwrap();
/// assert_eq!(g[0].data(), &[15.0, 19.0, 23.0, 15.0, 19.0, 23.0]);
/// assert_eq!(g[1].data(), &[5.0, 5.0, 7.0, 7.0, 9.0, 9.0]);
/// ```
pub fn matmul(
    a: impl IntoOperand,
    b: impl IntoOperand,
    transpose_a: bool,
    transpose_b: bool,
) -> Result<Variable> {
    invoke_one(
        MatMul {
            transpose_a,
            transpose_b,
        },
        vec![a.into_operand(), b.into_operand()],
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::autodiff::{GradientTape, with};
    use crate::error::GradError;

    fn mat(data: &[f64], shape: &[usize]) -> Variable {
        Variable::new(Tensor::from_vec(data.to_vec(), shape).unwrap())
    }

    #[test]
    fn test_transposed_gradients_match_plain() {
        let a = mat(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0], &[2, 3]);
        let b = mat(&[7.0, 8.0, 9.0, 10.0, 11.0, 12.0], &[3, 2]);
        // Same product through transposed storage: a = at^T, b = bt^T.
        let at = mat(&[1.0, 4.0, 2.0, 5.0, 3.0, 6.0], &[3, 2]);
        let bt = mat(&[7.0, 9.0, 11.0, 8.0, 10.0, 12.0], &[2, 3]);

        let tape = GradientTape::persistent();
        let (c, ct) = with(&tape, |_| {
            (
                matmul(&a, &b, false, false).unwrap(),
                matmul(&at, &bt, true, true).unwrap(),
            )
        });
        assert_eq!(c.tensor().data(), ct.tensor().data());

        let ga = tape.gradient(&c, &a).unwrap();
        let gat = tape.gradient(&ct, &at).unwrap();
        assert_eq!(gat.shape(), &[3, 2]);
        assert_eq!(gat.permutedims(&[1, 0]).unwrap().data(), ga.data());

        let gb = tape.gradient(&c, &b).unwrap();
        let gbt = tape.gradient(&ct, &bt).unwrap();
        assert_eq!(gbt.permutedims(&[1, 0]).unwrap().data(), gb.data());
    }

    #[test]
    fn test_batched_gradient_has_batch_shape() {
        let a = Variable::new(Tensor::ones(&[4, 2, 3]));
        let b = Variable::new(Tensor::ones(&[3, 5]));
        let tape = GradientTape::new();
        let c = with(&tape, |_| matmul(&a, &b, false, false)).unwrap();
        assert_eq!(c.shape(), vec![4, 2, 5]);
        let g = tape.gradient(&c, [&a, &b]).unwrap();
        assert_eq!(g[0].shape(), &[4, 2, 3]);
        // b is shared by all four batches.
        assert_eq!(g[1].shape(), &[3, 5]);
        assert!(g[1].data().iter().all(|&v| v == 8.0));
    }

    #[test]
    fn test_inner_dimension_mismatch() {
        let err = matmul(Tensor::ones(&[2, 3]), Tensor::ones(&[2, 3]), false, false).unwrap_err();
        assert!(matches!(err, GradError::ShapeMismatch { op: "matmul", .. }));
    }
}
