//! Elementwise activations (`relu`, `sigmoid`, `tanh`, `exp`, `log`, `sin`,
//! `cos`, `tan`, `elu`, `selu`) plus `softmax`, whose backward is a
//! Jacobian-vector product rather than a simple `f`/`df` pointwise pairing.

use crate::autograd::{OpKind, UnaryOp, UnaryOpKind};
use crate::eval;
use crate::ops::support::group_bases;
use crate::tensor::Tensor;

fn unary_forward(kind: UnaryOpKind, a: &Tensor) -> Tensor {
    let data: Vec<f32> = a.to_vec().iter().map(|&x| kind.f(x)).collect();
    let mut out = Tensor::from_data(a.shape(), data, false);
    if !eval::is_active() && a.requires_grad() {
        out.set_grad_node(OpKind::Unary(kind), &[a.clone()]);
    }
    out
}

pub fn relu(a: &Tensor) -> Tensor {
    unary_forward(UnaryOpKind::Relu, a)
}

pub fn sigmoid(a: &Tensor) -> Tensor {
    unary_forward(UnaryOpKind::Sigmoid, a)
}

pub fn tanh(a: &Tensor) -> Tensor {
    unary_forward(UnaryOpKind::Tanh, a)
}

pub fn exp(a: &Tensor) -> Tensor {
    unary_forward(UnaryOpKind::Exp, a)
}

pub fn log(a: &Tensor) -> Tensor {
    unary_forward(UnaryOpKind::Log, a)
}

pub fn sin(a: &Tensor) -> Tensor {
    unary_forward(UnaryOpKind::Sin, a)
}

pub fn cos(a: &Tensor) -> Tensor {
    unary_forward(UnaryOpKind::Cos, a)
}

pub fn tan(a: &Tensor) -> Tensor {
    unary_forward(UnaryOpKind::Tan, a)
}

/// Exponential linear unit with parameter `alpha`.
pub fn elu(a: &Tensor, alpha: f32) -> Tensor {
    unary_forward(UnaryOpKind::Elu(alpha), a)
}

/// Scaled exponential linear unit (fixed self-normalizing constants).
pub fn selu(a: &Tensor) -> Tensor {
    unary_forward(UnaryOpKind::Selu, a)
}

/// Softmax along `axis` (supports negative indexing). Numerically stabilized
/// by subtracting the per-group max before exponentiating.
pub fn softmax(a: &Tensor, axis: i32) -> Tensor {
    let axis = a.shape().normalize_axis(axis);
    let strides = a.shape().strides();
    let stride = strides[axis];
    let size = a.shape().dims()[axis];
    let data = a.to_vec();
    let mut out = data.clone();
    for base in group_bases(&a.shape(), axis) {
        let mut maxv = f32::NEG_INFINITY;
        for k in 0..size {
            maxv = maxv.max(data[base + k * stride]);
        }
        let mut sum = 0.0f32;
        for k in 0..size {
            let e = (data[base + k * stride] - maxv).exp();
            out[base + k * stride] = e;
            sum += e;
        }
        for k in 0..size {
            out[base + k * stride] /= sum;
        }
    }
    let mut result = Tensor::from_data(a.shape(), out, false);
    if !eval::is_active() && a.requires_grad() {
        result.set_grad_node(OpKind::Softmax(axis), &[a.clone()]);
    }
    result
}

/// Jacobian-vector product for softmax: `grad_i = y_i * (upstream_i - sum_j
/// upstream_j * y_j)` within each group along `axis`.
pub(crate) fn softmax_jvp(output: &Tensor, upstream: &Tensor, axis: usize) -> Tensor {
    let y = output.to_vec();
    let g = upstream.to_vec();
    let stride = output.shape().strides()[axis];
    let size = output.shape().dims()[axis];
    let mut out = vec![0.0f32; y.len()];
    for base in group_bases(&output.shape(), axis) {
        let mut dot = 0.0f32;
        for k in 0..size {
            dot += g[base + k * stride] * y[base + k * stride];
        }
        for k in 0..size {
            let idx = base + k * stride;
            out[idx] = y[idx] * (g[idx] - dot);
        }
    }
    Tensor::from_data(output.shape(), out, false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::autograd::{backward, grad};
    use crate::shape::Shape;

    #[test]
    fn softmax_rows_sum_to_one() {
        let a = Tensor::from_data(Shape::new(&[2, 3]), vec![1.0, 2.0, 3.0, 1.0, 1.0, 1.0], false);
        let s = softmax(&a, -1);
        let v = s.to_vec();
        assert!((v[0] + v[1] + v[2] - 1.0).abs() < 1e-5);
        assert!((v[3] + v[4] + v[5] - 1.0).abs() < 1e-5);
        assert!((v[3] - v[4]).abs() < 1e-6);
    }

    #[test]
    fn relu_zeroes_negative_gradient() {
        let a = Tensor::from_data(Shape::new(&[2]), vec![-1.0, 2.0], true);
        let r = relu(&a);
        backward(&r, Some(Tensor::ones(Shape::new(&[2]), false)));
        assert_eq!(grad(&a).unwrap().to_vec(), vec![0.0, 1.0]);
    }

    #[test]
    fn sigmoid_backward_matches_y_times_one_minus_y() {
        let a = Tensor::from_data(Shape::new(&[1]), vec![0.0], true);
        let s = sigmoid(&a);
        backward(&s, None);
        let y = s.to_vec()[0];
        assert!((grad(&a).unwrap().to_vec()[0] - y * (1.0 - y)).abs() < 1e-6);
    }
}

/// Finite-difference checks per `spec.md` §8, one per elementwise activation.
#[cfg(test)]
mod finite_difference_tests {
    use super::*;
    use crate::autograd::{backward, grad};
    use crate::shape::Shape;
    use crate::tests::{assert_close, finite_difference, FD_TOLERANCE};
    use proptest::prelude::*;

    fn check(op: impl Fn(&Tensor) -> Tensor, f: impl Fn(f32) -> f32, x: f32) {
        let t = Tensor::from_data(Shape::new(&[1]), vec![x], true);
        let out = op(&t);
        backward(&out, None);
        let g = grad(&t).unwrap().to_vec();
        let fd = finite_difference(&[x], |v| f(v[0]));
        assert_close(&g, &fd, FD_TOLERANCE);
    }

    proptest! {
        #[test]
        fn sigmoid_matches_finite_difference(x in -5.0f32..5.0) {
            check(sigmoid, |v| 1.0 / (1.0 + (-v).exp()), x);
        }

        #[test]
        fn tanh_matches_finite_difference(x in -5.0f32..5.0) {
            check(tanh, |v| v.tanh(), x);
        }

        #[test]
        fn exp_matches_finite_difference(x in -3.0f32..3.0) {
            check(exp, |v| v.exp(), x);
        }

        #[test]
        fn log_matches_finite_difference(x in 0.1f32..10.0) {
            check(log, |v| v.ln(), x);
        }

        #[test]
        fn sin_matches_finite_difference(x in -3.0f32..3.0) {
            check(sin, |v| v.sin(), x);
        }

        #[test]
        fn cos_matches_finite_difference(x in -3.0f32..3.0) {
            check(cos, |v| v.cos(), x);
        }

        #[test]
        fn relu_matches_finite_difference(x in prop_oneof![-5.0f32..(-0.1), 0.1f32..5.0]) {
            check(relu, |v| v.max(0.0), x);
        }
    }
}
