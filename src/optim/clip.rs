//! Gradient clipping, applied in place to each parameter's accumulated
//! gradient after `backward()` and before an optimizer step.
//!
//! Grounded in the `clip_grad_norm`-style helpers of `other_examples/`'s
//! `luckboy-neurina` Adam trainer, generalized to the four clipping modes
//! `spec.md` calls out: global L2 norm, absolute value, range, and sign.

use crate::autograd::grad;
use crate::tensor::Tensor;

/// Rescales every gradient in `params` so the combined L2 norm across all of
/// them does not exceed `max_norm`. A no-op if the norm is already within
/// bounds.
pub fn clip_grad_norm(params: &[Tensor], max_norm: f32) {
    let grads: Vec<Tensor> = params.iter().filter_map(grad).collect();
    if grads.is_empty() {
        return;
    }
    let total_sq: f32 = grads.iter().map(|g| g.to_vec().iter().map(|v| v * v).sum::<f32>()).sum();
    let norm = total_sq.sqrt();
    if norm <= max_norm || norm == 0.0 {
        return;
    }
    let scale = max_norm / norm;
    for g in &grads {
        let mut buf = g.data_mut();
        for v in buf.iter_mut() {
            *v *= scale;
        }
    }
}

/// Clamps every gradient element's absolute value to `max_abs`
/// (i.e. to `[-max_abs, max_abs]`).
pub fn clip_grad_abs(params: &[Tensor], max_abs: f32) {
    for p in params {
        if let Some(g) = grad(p) {
            let mut buf = g.data_mut();
            for v in buf.iter_mut() {
                *v = v.clamp(-max_abs, max_abs);
            }
        }
    }
}

/// Clamps every gradient element to `[min, max]`.
pub fn clip_grad_range(params: &[Tensor], min: f32, max: f32) {
    for p in params {
        if let Some(g) = grad(p) {
            let mut buf = g.data_mut();
            for v in buf.iter_mut() {
                *v = v.clamp(min, max);
            }
        }
    }
}

/// Replaces every gradient element with its sign (`-1.0`, `0.0`, or `1.0`).
pub fn clip_grad_sign(params: &[Tensor]) {
    for p in params {
        if let Some(g) = grad(p) {
            let mut buf = g.data_mut();
            for v in buf.iter_mut() {
                *v = if *v > 0.0 {
                    1.0
                } else if *v < 0.0 {
                    -1.0
                } else {
                    0.0
                };
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shape::Shape;

    #[test]
    fn clip_by_norm_scales_down_when_over() {
        let a = Tensor::from_data(Shape::new(&[2]), vec![0.0, 0.0], true);
        a.set(&[0], 3.0);
        a.set(&[1], 4.0);
        let g = Tensor::from_data(Shape::new(&[2]), vec![3.0, 4.0], false);
        a.grad_node().unwrap().borrow_mut().accumulated_grad = Some(g);
        clip_grad_norm(&[a.clone()], 1.0);
        let gv = grad(&a).unwrap().to_vec();
        assert!((gv[0] - 0.6).abs() < 1e-5);
        assert!((gv[1] - 0.8).abs() < 1e-5);
    }

    #[test]
    fn clip_by_abs_clamps_each_element() {
        let a = Tensor::from_data(Shape::new(&[2]), vec![0.0, 0.0], true);
        let g = Tensor::from_data(Shape::new(&[2]), vec![-5.0, 2.0], false);
        a.grad_node().unwrap().borrow_mut().accumulated_grad = Some(g);
        clip_grad_abs(&[a.clone()], 1.0);
        assert_eq!(grad(&a).unwrap().to_vec(), vec![-1.0, 1.0]);
    }

    #[test]
    fn clip_sign_replaces_with_sign() {
        let a = Tensor::from_data(Shape::new(&[3]), vec![0.0; 3], true);
        let g = Tensor::from_data(Shape::new(&[3]), vec![-2.0, 0.0, 5.0], false);
        a.grad_node().unwrap().borrow_mut().accumulated_grad = Some(g);
        clip_grad_sign(&[a.clone()]);
        assert_eq!(grad(&a).unwrap().to_vec(), vec![-1.0, 0.0, 1.0]);
    }
}
