//! Binary elementwise operators: `add`, `sub`, `mul`, `div`, `pow`.
//!
//! Grounded in `dfdx`'s `src/tensor_ops/add/mod.rs` (`BinaryAddKernelOp`,
//! `TryAdd`) generalized from its const-generic, same-shape-only operands to
//! `spec.md` §3's broadcasting rule.

use crate::autograd::{BinaryOp, BinaryOpKind, OpKind};
use crate::eval;
use crate::ops::support::{broadcast_result_shape, expand_to};
use crate::tensor::Tensor;

fn binary_forward(kind: BinaryOpKind, a: &Tensor, b: &Tensor) -> Tensor {
    let out_shape = broadcast_result_shape(a.shape(), b.shape());
    let ea = expand_to(a, out_shape);
    let eb = expand_to(b, out_shape);
    let data: Vec<f32> = ea
        .to_vec()
        .iter()
        .zip(eb.to_vec().iter())
        .map(|(&x, &y)| kind.f(x, y))
        .collect();
    let mut out = Tensor::from_data(out_shape, data, false);
    if !eval::is_active() && (a.requires_grad() || b.requires_grad()) {
        out.set_grad_node(OpKind::Binary(kind), &[a.clone(), b.clone()]);
    }
    out
}

/// `a + b`, with `spec.md` §3 broadcasting.
pub fn add(a: &Tensor, b: &Tensor) -> Tensor {
    binary_forward(BinaryOpKind::Add, a, b)
}

/// `a - b`.
pub fn sub(a: &Tensor, b: &Tensor) -> Tensor {
    binary_forward(BinaryOpKind::Sub, a, b)
}

/// `a * b`, elementwise (not matrix product — see [`crate::ops::matmul`]).
pub fn mul(a: &Tensor, b: &Tensor) -> Tensor {
    binary_forward(BinaryOpKind::Mul, a, b)
}

/// `a / b`, elementwise.
pub fn div(a: &Tensor, b: &Tensor) -> Tensor {
    binary_forward(BinaryOpKind::Div, a, b)
}

/// `a.powf(b)`, elementwise.
pub fn pow(a: &Tensor, b: &Tensor) -> Tensor {
    binary_forward(BinaryOpKind::Pow, a, b)
}


/// Finite-difference checks per `spec.md` §8 ("analytic gradient ≈ central
/// difference within a small tolerance, for every differentiable operator").
#[cfg(test)]
mod finite_difference_tests {
    use super::*;
    use crate::autograd::{backward, grad};
    use crate::shape::Shape;
    use crate::tests::{assert_close, finite_difference, FD_TOLERANCE};
    use proptest::prelude::*;

    fn check(op: impl Fn(&Tensor, &Tensor) -> Tensor, f: impl Fn(f32, f32) -> f32, a: f32, b: f32) {
        let ta = Tensor::from_data(Shape::new(&[1]), vec![a], true);
        let tb = Tensor::from_data(Shape::new(&[1]), vec![b], true);
        let out = op(&ta, &tb);
        backward(&out, None);
        let ga = grad(&ta).unwrap().to_vec();
        let gb = grad(&tb).unwrap().to_vec();
        let fd_a = finite_difference(&[a], |x| f(x[0], b));
        let fd_b = finite_difference(&[b], |x| f(a, x[0]));
        assert_close(&ga, &fd_a, FD_TOLERANCE);
        assert_close(&gb, &fd_b, FD_TOLERANCE);
    }

    proptest! {
        #[test]
        fn add_matches_finite_difference(a in -10.0f32..10.0, b in -10.0f32..10.0) {
            check(add, |x, y| x + y, a, b);
        }

        #[test]
        fn sub_matches_finite_difference(a in -10.0f32..10.0, b in -10.0f32..10.0) {
            check(sub, |x, y| x - y, a, b);
        }

        #[test]
        fn mul_matches_finite_difference(a in -10.0f32..10.0, b in -10.0f32..10.0) {
            check(mul, |x, y| x * y, a, b);
        }

        #[test]
        fn div_matches_finite_difference(a in -10.0f32..10.0, b in 1.0f32..10.0) {
            check(div, |x, y| x / y, a, b);
        }

        #[test]
        fn pow_matches_finite_difference(a in 0.5f32..5.0, b in 0.5f32..3.0) {
            check(pow, |x, y| x.powf(y), a, b);
        }
    }
}
