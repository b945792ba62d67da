//! Mask propagation through ops.

use crate::value::{MaskedTensor, Value};

/// How an operation's outputs pick up validity masks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MaskPolicy {
    /// Outputs are plain values.
    #[default]
    Drop,
    /// Outputs take the mask of the first masked input.
    InheritFirst,
    /// The op builds masked outputs itself; they pass through untouched.
    Explicit,
}

/// Apply `policy` to freshly computed `outputs`.
///
/// An inherited mask is only attached to outputs whose leading axis still
/// has the mask's length; other outputs stay plain.
pub(crate) fn apply_mask_policy(policy: MaskPolicy, inputs: &[&Value], outputs: Vec<Value>) -> Vec<Value> {
    match policy {
        MaskPolicy::Explicit => outputs,
        MaskPolicy::Drop => outputs.into_iter().map(Value::unmasked).collect(),
        MaskPolicy::InheritFirst => {
            let mask = inputs.iter().find_map(|v| v.mask());
            outputs
                .into_iter()
                .map(|out| match mask {
                    Some(mask) => attach(out.unmasked(), mask),
                    None => out.unmasked(),
                })
                .collect()
        }
    }
}

fn attach(value: Value, mask: &[bool]) -> Value {
    match value {
        Value::Tensor(t) if t.shape().first() == Some(&mask.len()) => {
            Value::Masked(MaskedTensor::from_parts_unchecked(t, mask.to_vec()))
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Tensor;

    fn masked(shape: &[usize], mask: Vec<bool>) -> Value {
        Value::Masked(MaskedTensor::new(Tensor::zeros(shape), mask).unwrap())
    }

    #[test]
    fn test_drop_strips() {
        let input = masked(&[2], vec![true, false]);
        let out = apply_mask_policy(MaskPolicy::Drop, &[&input], vec![input.clone()]);
        assert!(out[0].mask().is_none());
    }

    #[test]
    fn test_inherit_first_masked_input() {
        let plain = Value::Tensor(Tensor::zeros(&[2, 3]));
        let first = masked(&[2, 3], vec![false, true]);
        let second = masked(&[2, 3], vec![true, true]);
        let out = apply_mask_policy(
            MaskPolicy::InheritFirst,
            &[&plain, &first, &second],
            vec![Value::Tensor(Tensor::ones(&[2, 3]))],
        );
        assert_eq!(out[0].mask(), Some(&[false, true][..]));
    }

    #[test]
    fn test_inherit_skips_mismatched_length() {
        let input = masked(&[2, 3], vec![true, false]);
        let out = apply_mask_policy(
            MaskPolicy::InheritFirst,
            &[&input],
            vec![Value::Tensor(Tensor::ones(&[3])), Value::scalar(1.0)],
        );
        assert!(out[0].mask().is_none());
        assert!(out[1].mask().is_none());
    }
}
