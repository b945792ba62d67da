//! Integration tests for the autodiff engine.
//!
//! Tape gradients are compared against central differences, and the
//! single-op backward path is exercised without a tape.

use approx::assert_relative_eq;
use gradtape::autodiff::{apply_operation, clear_graph, graph_len};
use gradtape::gradcheck::{GradientCheckConfig, check_gradients};
use gradtape::{
    BackwardContext, ErrorKind, GradError, GradientTape, Operation, Result, TapeOptions, Tensor, Value, Variable, ops,
    with,
};
use proptest::prelude::*;

fn tensor(data: &[f64], shape: &[usize]) -> Tensor {
    Tensor::from_vec(data.to_vec(), shape).unwrap()
}

/// Deterministic, tie-free test data in roughly [-1, 1].
fn wavy(shape: &[usize], phase: f64) -> Tensor {
    let n: usize = shape.iter().product();
    let data = (0..n).map(|i| (i as f64 * 0.73 + phase).sin()).collect();
    Tensor::from_vec(data, shape).unwrap()
}

fn assert_passes<F>(name: &str, f: F, inputs: &[Tensor])
where
    F: Fn(&[Variable]) -> Result<Variable>,
{
    let results = check_gradients(f, inputs, &GradientCheckConfig::default()).unwrap();
    for r in results {
        assert!(
            r.passed,
            "{name}: input {} max_abs_diff={} max_rel_diff={}",
            r.input, r.max_abs_diff, r.max_rel_diff
        );
    }
}

#[test]
fn test_gradcheck_unary_math() {
    let positive = [tensor(&[0.5, 1.2, 2.0, 3.1], &[2, 2])];
    let signed = [tensor(&[-1.3, 0.4, 2.2, -0.7], &[2, 2])];

    assert_passes("exp", |xs| ops::exp(&xs[0]), &signed);
    assert_passes("log", |xs| ops::log(&xs[0]), &positive);
    assert_passes("sqrt", |xs| ops::sqrt(&xs[0]), &positive);
    assert_passes("tanh", |xs| ops::tanh(&xs[0]), &signed);
    assert_passes("sigmoid", |xs| ops::sigmoid(&xs[0]), &signed);
    assert_passes("square", |xs| ops::square(&xs[0]), &signed);
    assert_passes("pow", |xs| ops::pow(&xs[0], 3.0), &signed);
    assert_passes("neg", |xs| ops::neg(&xs[0]), &signed);
    assert_passes("abs", |xs| ops::abs(&xs[0]), &signed);
    assert_passes("relu", |xs| ops::relu(&xs[0]), &signed);
    assert_passes("clip", |xs| ops::clip_by_value(&xs[0], -1.0, 1.0), &signed);
}

#[test]
fn test_gradcheck_arithmetic() {
    let inputs = [wavy(&[2, 3], 0.1), wavy(&[3], 1.7)];
    assert_passes("add", |xs| ops::add(&xs[0], &xs[1]), &inputs);
    assert_passes("sub", |xs| ops::sub(&xs[0], &xs[1]), &inputs);
    assert_passes("mul", |xs| ops::mul(&xs[0], &xs[1]), &inputs);
    assert_passes(
        "div",
        |xs| ops::div(&xs[0], &ops::add(&ops::square(&xs[1])?, 1.0)?),
        &inputs,
    );

    let with_alpha = [wavy(&[2, 3], 0.3), wavy(&[3], 2.0), Tensor::scalar(1.5)];
    assert_passes(
        "increment",
        |xs| ops::increment_with_alpha(&xs[0], &xs[1], &xs[2]),
        &with_alpha,
    );

    let scaled = [Tensor::from(vec![0.8]), wavy(&[2, 2], 0.0)];
    assert_passes("scale", |xs| ops::scale(&xs[0], &xs[1]), &scaled);
}

#[test]
fn test_gradcheck_matmul() {
    let plain = [wavy(&[2, 3], 0.0), wavy(&[3, 4], 1.0)];
    assert_passes("matmul", |xs| ops::matmul(&xs[0], &xs[1], false, false), &plain);

    let transposed = [wavy(&[3, 2], 0.2), wavy(&[4, 3], 1.1)];
    assert_passes("matmul_tt", |xs| ops::matmul(&xs[0], &xs[1], true, true), &transposed);

    let batched = [wavy(&[2, 2, 3], 0.5), wavy(&[3, 2], 2.5)];
    assert_passes(
        "matmul_batched",
        |xs| ops::matmul(&xs[0], &xs[1], false, false),
        &batched,
    );
}

#[test]
fn test_gradcheck_reductions() {
    let inputs = [wavy(&[2, 3, 2], 0.4)];
    assert_passes("sum", |xs| ops::reduce_sum(&xs[0], Some(&[1]), false), &inputs);
    assert_passes("mean", |xs| ops::reduce_mean(&xs[0], Some(&[0, 2]), true), &inputs);
    assert_passes("max", |xs| ops::reduce_max(&xs[0], Some(&[-1]), false), &inputs);
    // Weighting makes the summed output sensitive to every position.
    let weights = wavy(&[3], 3.0);
    assert_passes(
        "weighted_mean",
        |xs| ops::mul(&ops::reduce_mean(&xs[0], Some(&[0, 2]), false)?, weights.clone()),
        &inputs,
    );
}

#[test]
fn test_gradcheck_structure() {
    let x = [wavy(&[2, 3, 2], 0.9)];
    let w = wavy(&[2, 3, 2], 2.2);
    let weighted = |v: Variable, shape: &[usize]| -> Result<Variable> {
        let n: usize = shape.iter().product();
        let weights = Tensor::from_vec((1..=n).map(|i| i as f64).collect(), shape)?;
        ops::mul(&v, weights)
    };

    assert_passes(
        "reshape",
        |xs| weighted(ops::reshape(&xs[0], [0i64, -1])?, &[2, 6]),
        &x,
    );
    assert_passes(
        "transpose",
        |xs| weighted(ops::transpose(&xs[0], Some(&[2, 0, 1]))?, &[2, 2, 3]),
        &x,
    );
    assert_passes(
        "expand_squeeze",
        |xs| ops::squeeze(&ops::mul(&ops::expand_dims(&xs[0], 1)?, w.clone())?, None),
        &x,
    );
    assert_passes(
        "slice",
        |xs| weighted(ops::slice(&xs[0], &[0, 1, 0], &[-1, 2, 1])?, &[2, 2, 1]),
        &x,
    );
    assert_passes(
        "split",
        |xs| {
            let parts = ops::split(&xs[0], [1usize, 2], Some(1))?;
            weighted(parts[1].clone(), &[2, 2, 2])
        },
        &x,
    );
    assert_passes(
        "concat",
        |xs| weighted(ops::concat([&xs[0], &ops::square(&xs[0])?], 0)?, &[4, 3, 2]),
        &x,
    );
    assert_passes(
        "repeat",
        |xs| weighted(ops::repeat(&xs[0], 2i64, 1, true)?, &[2, 6, 2]),
        &x,
    );
    assert_passes("get", |xs| weighted(ops::get(&xs[0], -1)?, &[3, 2]), &x);
    assert_passes(
        "get_range",
        |xs| weighted(ops::get_range(&xs[0], 0, 2)?, &[2, 3, 2]),
        &x,
    );
}

#[test]
fn test_gradcheck_where() {
    let inputs = [wavy(&[4], 0.0), wavy(&[4], 1.0)];
    assert_passes(
        "where",
        |xs| {
            let cond = ops::greater(&xs[0], &xs[1])?;
            ops::where_(cond, ops::square(&xs[0])?, ops::mul(&xs[1], 3.0)?)
        },
        &inputs,
    );
}

#[test]
fn test_creator_backward_without_tape() {
    let a = Variable::new(wavy(&[2, 3], 0.0));
    let b = Variable::new(Tensor::from(vec![1.0, 2.0, 3.0]));
    let y = ops::mul(&a, &b).unwrap();

    let creator = y.creator().unwrap();
    assert_eq!(creator.name().unwrap(), "mul");
    assert_eq!(creator.inputs().unwrap().len(), 2);

    let grads = creator.backward(&Tensor::ones(&[2, 3])).unwrap();
    let da = grads[0].as_ref().unwrap();
    let db = grads[1].as_ref().unwrap();
    assert_eq!(da.data(), &[1.0, 2.0, 3.0, 1.0, 2.0, 3.0]);
    assert_eq!(db.shape(), &[3]);
    for (j, got) in db.data().iter().enumerate() {
        let want = a.tensor().get(&[0, j]).unwrap() + a.tensor().get(&[1, j]).unwrap();
        assert_relative_eq!(*got, want, epsilon = 1e-12);
    }

    let err = creator.backward(&Tensor::ones(&[3])).unwrap_err();
    assert!(matches!(err, GradError::ShapeMismatch { .. }));
}

#[test]
fn test_multi_output_creator_seeds_other_outputs_with_zeros() {
    let x = Variable::new(tensor(&[1.0, 2.0, 3.0, 4.0], &[4]));
    let parts = ops::split(&x, 2usize, None).unwrap();
    let creator = parts[1].creator().unwrap();
    assert_eq!(creator.num_outputs().unwrap(), 2);
    let grads = creator.backward(&Tensor::full(&[2], 5.0)).unwrap();
    assert_eq!(grads[0].as_ref().unwrap().data(), &[0.0, 0.0, 5.0, 5.0]);
}

#[test]
fn test_leaf_has_no_creator() {
    let x = Variable::new(1.0);
    assert!(x.is_leaf());
    assert!(x.creator().is_none());
}

#[test]
fn test_tape_is_consumed_unless_persistent() {
    let x = Variable::new(2.0);

    let tape = GradientTape::new();
    let y = with(&tape, |_| ops::mul(&x, &x)).unwrap();
    assert_eq!(tape.gradient(&y, &x).unwrap().item(), Some(4.0));
    let err = tape.gradient(&y, &x).unwrap_err();
    assert!(matches!(err, GradError::TapeConsumed));
    assert_eq!(err.kind(), ErrorKind::Tape);

    let tape = GradientTape::with_options(TapeOptions { persistent: true });
    let y = with(&tape, |_| ops::mul(&x, &x)).unwrap();
    assert_eq!(tape.gradient(&y, &x).unwrap().item(), Some(4.0));
    assert_eq!(tape.gradient(&y, &x).unwrap().item(), Some(4.0));
}

#[test]
fn test_only_recorded_ops_are_traversed() {
    let x = Variable::new(2.0);
    // Built outside any tape: forward-only.
    let h = ops::mul(&x, 3.0).unwrap();
    let tape = GradientTape::new();
    let y = with(&tape, |_| ops::mul(&h, 2.0)).unwrap();
    assert!(matches!(tape.gradient(&y, &x), Err(GradError::NoGradient { .. })));

    let tape = GradientTape::new();
    let y = with(&tape, |_| ops::mul(&h, 2.0)).unwrap();
    assert_eq!(tape.gradient(&y, &h).unwrap().item(), Some(2.0));
}

#[test]
fn test_clear_graph_makes_creators_stale() {
    let x = Variable::new(Tensor::from(vec![1.0, 2.0]));
    let y = ops::mul(&x, 2.0).unwrap();
    let creator = y.creator().unwrap();
    clear_graph();

    assert_eq!(y.tensor().data(), &[2.0, 4.0]);
    let err = creator.backward(&Tensor::ones(&[2])).unwrap_err();
    assert!(matches!(err, GradError::StaleCreator { .. }));
}

#[test]
fn test_forward_only_ops_are_freed() {
    let before = graph_len();
    for _ in 0..1000 {
        let x = Variable::new(1.0);
        let _y = ops::mul(&x, 2.0).unwrap();
    }
    assert_eq!(graph_len(), before);
}

#[test]
fn test_ops_freed_after_tape_and_outputs_drop() {
    let before = graph_len();
    let x = Variable::new(Tensor::from(vec![1.0, 2.0]));
    {
        let tape = GradientTape::new();
        let y = with(&tape, |_| ops::reduce_sum(&ops::square(&x)?, None, false)).unwrap();
        assert_eq!(graph_len(), before + 2);
        tape.gradient(&y, &x).unwrap();
        // The consumed tape released its nodes; `y` still holds the chain.
        assert_eq!(graph_len(), before + 2);
    }
    assert_eq!(graph_len(), before);

    let config = GradientCheckConfig::default();
    check_gradients(|xs| ops::tanh(&xs[0]), &[x.tensor()], &config).unwrap();
    assert_eq!(graph_len(), before);
}

#[derive(Debug)]
struct Cube;

impl Operation for Cube {
    fn name(&self) -> &'static str {
        "cube"
    }

    fn forward(&self, inputs: &[&Value]) -> Result<Vec<Value>> {
        let x = inputs[0].as_tensor();
        let data = x.data().iter().map(|v| v * v * v).collect();
        Ok(vec![Tensor::from_vec(data, x.shape())?.into()])
    }

    fn backward(&self, ctx: &BackwardContext<'_>, grads: &[Tensor]) -> Result<Vec<Option<Tensor>>> {
        let x = ctx.input(0);
        let data = x
            .data()
            .iter()
            .zip(grads[0].data())
            .map(|(v, g)| 3.0 * v * v * g)
            .collect();
        Ok(vec![Some(Tensor::from_vec(data, x.shape())?)])
    }
}

#[test]
fn test_custom_operation_joins_graph() {
    let inputs = [wavy(&[3], 0.2)];
    assert_passes(
        "cube",
        |xs| {
            let mut out = apply_operation(Cube, vec![xs[0].clone()])?;
            Ok(out.swap_remove(0))
        },
        &inputs,
    );
}

fn broadcast_pair() -> impl Strategy<Value = (Vec<usize>, Vec<usize>)> {
    prop::collection::vec((1usize..=3, any::<bool>()), 1..=3).prop_flat_map(|dims| {
        let full: Vec<usize> = dims.iter().map(|&(d, _)| d).collect();
        let squeezed: Vec<usize> = dims.iter().map(|&(d, one)| if one { 1 } else { d }).collect();
        let len = squeezed.len();
        (Just(full), (0..=len).prop_map(move |drop| squeezed[drop..].to_vec()))
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_broadcast_gradients_match_finite_differences((a_shape, b_shape) in broadcast_pair(), swap in any::<bool>()) {
        let (a_shape, b_shape) = if swap { (b_shape, a_shape) } else { (a_shape, b_shape) };
        let inputs = [wavy(&a_shape, 0.3), wavy(&b_shape, 1.9)];
        let f = |xs: &[Variable]| -> Result<Variable> {
            let prod = ops::mul(&xs[0], &xs[1])?;
            let quot = ops::div(&xs[0], &ops::add(&ops::square(&xs[1])?, 1.0)?)?;
            ops::sub(&prod, &quot)
        };

        let a = Variable::new(inputs[0].clone());
        let b = Variable::new(inputs[1].clone());
        let tape = GradientTape::new();
        let y = with(&tape, |_| f(&[a.clone(), b.clone()])).unwrap();
        let grads = tape.gradient(&y, [&a, &b]).unwrap();
        prop_assert_eq!(grads[0].shape(), a_shape.as_slice());
        prop_assert_eq!(grads[1].shape(), b_shape.as_slice());

        let results = check_gradients(f, &inputs, &GradientCheckConfig::default()).unwrap();
        prop_assert!(results.iter().all(|r| r.passed));
    }
}
