//! Loss functions: `mse`, `mae`, `huber`, `cross_entropy` (expects
//! probabilities), `softmax_cross_entropy` (expects raw logits, fused for
//! numerical stability). Every loss reduces to a scalar, averaged over the
//! leading "batch" dimensions.
//!
//! Labels never carry gradients in practice, so rather than make `target` a
//! second tracked autograd input (which would need its own, rarely-useful
//! backward formula), each loss stores `target` directly inside
//! [`crate::autograd::OpKind::Loss`] and only `pred` participates in the DAG.

use crate::autograd::{LossKind, OpKind};
use crate::eval;
use crate::ops::support::softmax_vec;
use crate::shape::Shape;
use crate::tensor::Tensor;

fn check_same_shape(pred: &Tensor, target: &Tensor) {
    if pred.shape().dims() != target.shape().dims() {
        crate::diagnostics::fatal_shape("loss", pred.shape(), target.shape());
    }
}

fn finish(value: f32, kind: LossKind, pred: &Tensor, target: &Tensor) -> Tensor {
    let mut out = Tensor::from_data(Shape::scalar(), vec![value], false);
    if !eval::is_active() && pred.requires_grad() {
        out.set_grad_node(OpKind::Loss { kind, target: target.detach() }, &[pred.clone()]);
    }
    out
}

/// Mean squared error: `mean((pred - target)^2)`.
pub fn mse(pred: &Tensor, target: &Tensor) -> Tensor {
    check_same_shape(pred, target);
    let (p, t) = (pred.to_vec(), target.to_vec());
    let n = p.len() as f32;
    let value = p.iter().zip(t.iter()).map(|(&x, &y)| (x - y).powi(2)).sum::<f32>() / n;
    finish(value, LossKind::Mse, pred, target)
}

/// Mean absolute error: `mean(|pred - target|)`.
pub fn mae(pred: &Tensor, target: &Tensor) -> Tensor {
    check_same_shape(pred, target);
    let (p, t) = (pred.to_vec(), target.to_vec());
    let n = p.len() as f32;
    let value = p.iter().zip(t.iter()).map(|(&x, &y)| (x - y).abs()).sum::<f32>() / n;
    finish(value, LossKind::Mae, pred, target)
}

/// Huber loss with threshold `delta`: quadratic for `|diff| <= delta`,
/// linear beyond it.
pub fn huber(pred: &Tensor, target: &Tensor, delta: f32) -> Tensor {
    check_same_shape(pred, target);
    let (p, t) = (pred.to_vec(), target.to_vec());
    let n = p.len() as f32;
    let value = p
        .iter()
        .zip(t.iter())
        .map(|(&x, &y)| {
            let diff = x - y;
            if diff.abs() <= delta {
                0.5 * diff * diff
            } else {
                delta * (diff.abs() - 0.5 * delta)
            }
        })
        .sum::<f32>()
        / n;
    finish(value, LossKind::Huber(delta), pred, target)
}

/// `ε` protecting `log(0)` in [`cross_entropy`] (`spec.md` §4.3).
const CROSS_ENTROPY_EPS: f32 = 1e-7;

/// Cross-entropy assuming `pred` already holds per-class probabilities:
/// `-mean_batch(sum_classes(target * ln(pred + eps)))`.
pub fn cross_entropy(pred: &Tensor, target: &Tensor) -> Tensor {
    check_same_shape(pred, target);
    if pred.rank() == 0 {
        crate::diagnostics::fatal("domain violation: cross_entropy needs at least a class axis");
    }
    let (p, t) = (pred.to_vec(), target.to_vec());
    let class_axis = pred.rank() - 1;
    let classes = pred.shape().dims()[class_axis] as f32;
    let batch = pred.numel() as f32 / classes;
    let value = -p.iter().zip(t.iter()).map(|(&x, &y)| y * (x + CROSS_ENTROPY_EPS).ln()).sum::<f32>() / batch;
    finish(value, LossKind::CrossEntropy, pred, target)
}

/// Cross-entropy fused with softmax over the last axis of raw `logits`, for
/// numerical stability (`spec.md` §4.3's "never materialize softmax then
/// cross-entropy separately").
pub fn softmax_cross_entropy(logits: &Tensor, target: &Tensor) -> Tensor {
    check_same_shape(logits, target);
    if logits.rank() == 0 {
        crate::diagnostics::fatal("domain violation: softmax_cross_entropy needs at least a class axis");
    }
    let class_axis = logits.rank() - 1;
    let data = logits.to_vec();
    let t = target.to_vec();
    let probs = softmax_vec(&data, &logits.shape(), class_axis);
    let classes = logits.shape().dims()[class_axis] as f32;
    let batch = logits.numel() as f32 / classes;
    let value = -probs.iter().zip(t.iter()).map(|(&p, &y)| y * p.max(f32::MIN_POSITIVE).ln()).sum::<f32>() / batch;
    finish(value, LossKind::SoftmaxCrossEntropy, logits, target)
}

/// Per-element `d(loss)/d(pred)` before the scalar upstream gradient is
/// applied (see `crate::autograd::scale_by_upstream`).
pub(crate) fn loss_local_grad(kind: &LossKind, pred: &Tensor, target: &Tensor) -> Tensor {
    let p = pred.to_vec();
    let t = target.to_vec();
    let n = p.len() as f32;
    let data: Vec<f32> = match kind {
        LossKind::Mse => p.iter().zip(t.iter()).map(|(&x, &y)| 2.0 * (x - y) / n).collect(),
        LossKind::Mae => p
            .iter()
            .zip(t.iter())
            .map(|(&x, &y)| {
                let diff = x - y;
                if diff > 0.0 {
                    1.0 / n
                } else if diff < 0.0 {
                    -1.0 / n
                } else {
                    0.0
                }
            })
            .collect(),
        LossKind::Huber(delta) => p
            .iter()
            .zip(t.iter())
            .map(|(&x, &y)| {
                let diff = x - y;
                if diff.abs() <= *delta {
                    diff / n
                } else {
                    delta * diff.signum() / n
                }
            })
            .collect(),
        LossKind::CrossEntropy => {
            let class_axis = pred.rank() - 1;
            let classes = pred.shape().dims()[class_axis] as f32;
            let batch = n / classes;
            p.iter().zip(t.iter()).map(|(&x, &y)| -y / (x + CROSS_ENTROPY_EPS) / batch).collect()
        }
        LossKind::SoftmaxCrossEntropy => {
            let class_axis = pred.rank() - 1;
            let classes = pred.shape().dims()[class_axis] as f32;
            let batch = n / classes;
            let probs = softmax_vec(&p, &pred.shape(), class_axis);
            probs.iter().zip(t.iter()).map(|(&pr, &y)| (pr - y) / batch).collect()
        }
    };
    Tensor::from_data(pred.shape(), data, false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::autograd::{backward, grad};

    #[test]
    fn mse_zero_when_equal() {
        let p = Tensor::from_data(Shape::new(&[3]), vec![1.0, 2.0, 3.0], false);
        let t = Tensor::from_data(Shape::new(&[3]), vec![1.0, 2.0, 3.0], false);
        assert_eq!(mse(&p, &t).to_vec(), vec![0.0]);
    }

    #[test]
    fn mse_backward_matches_formula() {
        let p = Tensor::from_data(Shape::new(&[2]), vec![2.0, 0.0], true);
        let t = Tensor::from_data(Shape::new(&[2]), vec![0.0, 0.0], false);
        let loss = mse(&p, &t);
        backward(&loss, None);
        assert_eq!(grad(&p).unwrap().to_vec(), vec![2.0, 0.0]);
    }

    #[test]
    fn softmax_cross_entropy_matches_cross_entropy_of_softmax() {
        let logits = Tensor::from_data(Shape::new(&[3]), vec![1.0, 2.0, 0.5], false);
        let target = Tensor::from_data(Shape::new(&[3]), vec![0.0, 1.0, 0.0], false);
        let fused = softmax_cross_entropy(&logits, &target).to_vec()[0];
        let probs = crate::ops::activation::softmax(&logits, -1);
        let staged = cross_entropy(&probs, &target).to_vec()[0];
        assert!((fused - staged).abs() < 1e-5);
    }

    #[test]
    fn cross_entropy_finite_when_prediction_is_zero() {
        let p = Tensor::from_data(Shape::new(&[2]), vec![0.0, 1.0], true);
        let t = Tensor::from_data(Shape::new(&[2]), vec![1.0, 0.0], false);
        let loss = cross_entropy(&p, &t);
        assert!(loss.to_vec()[0].is_finite());
        backward(&loss, None);
        assert!(grad(&p).unwrap().to_vec().iter().all(|g| g.is_finite()));
    }
}
