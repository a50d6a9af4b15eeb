//! `tensorlite`: a small, self-contained tensor library with reverse-mode
//! automatic differentiation, sized for training shallow neural networks on
//! tabular data.
//!
//! The public surface is a flat collection of free functions operating on
//! [`Tensor`] handles (`spec.md` §6), backed by:
//! - [`shape`] — broadcasting/reduction shape algebra
//! - [`pool`] — the region-based allocator (`spec.md` §4.1)
//! - [`eval`] — the process-wide no-grad scope stack
//! - [`autograd`] — the implicit tape (`GradNode`/`OpKind`) and `backward`
//! - [`ops`] — the operator library: binary/unary/activation/reduction/
//!   matmul/loss
//! - [`optim`] — SGD, AdaGrad, RMSProp, Adam, and gradient clipping

mod autograd;
mod diagnostics;
pub mod eval;
pub mod ops;
pub mod optim;
pub mod pool;
pub mod shape;
mod tensor;

pub use autograd::{backward, grad, zero_grad};
pub use shape::Shape;
pub use tensor::Tensor;

pub use ops::activation::{cos, elu, exp, log, relu, selu, sigmoid, sin, softmax, tan, tanh};
pub use ops::binary::{add, div, mul, pow, sub};
pub use ops::loss::{cross_entropy, huber, mae, mse, softmax_cross_entropy};
pub use ops::matmul::matmul;
pub use ops::reduction::{max_all, max_axis, mean_all, mean_axis, min_all, min_axis, sum_all, sum_axis};
pub use ops::unary::{abs, neg, reciprocal, square, transpose, unsqueeze};

pub use eval::{eval_begin, eval_end, with_eval};
pub use optim::clip::{clip_grad_abs, clip_grad_norm, clip_grad_range, clip_grad_sign};
pub use optim::{AdaGrad, Adam, RmsProp, Sgd};
pub use pool::{begin_malloc, end_malloc, finalize, free, initialize, DEFAULT_POOL};

/// Shared test helpers, following `dfdx`'s `crate::tests` convention of a
/// single module with `assert_close`/device-style helpers that every
/// per-operator test module imports, rather than duplicating assertion logic
/// per file.
#[cfg(test)]
pub(crate) mod tests {
    /// Step size for the central-difference gradient check in `spec.md` §8.
    pub const FD_EPS: f32 = 1e-3;
    /// Tolerance for comparing an analytic gradient to its finite-difference
    /// estimate.
    pub const FD_TOLERANCE: f32 = 1e-2;

    pub fn assert_close(a: &[f32], b: &[f32], tolerance: f32) {
        for (&l, &r) in a.iter().zip(b.iter()) {
            assert!((l - r).abs() <= tolerance, "lhs != rhs | {l} != {r}\n{a:?}\n{b:?}");
        }
    }

    /// Central finite-difference gradient of `f` at every element of `x`.
    pub fn finite_difference(x: &[f32], f: impl Fn(&[f32]) -> f32) -> Vec<f32> {
        let mut out = vec![0.0; x.len()];
        for i in 0..x.len() {
            let mut plus = x.to_vec();
            plus[i] += FD_EPS;
            let mut minus = x.to_vec();
            minus[i] -= FD_EPS;
            out[i] = (f(&plus) - f(&minus)) / (2.0 * FD_EPS);
        }
        out
    }
}

#[cfg(test)]
mod integration_tests {
    use super::*;

    #[test]
    fn end_to_end_linear_layer_trains_down() {
        pool::initialize();
        let w = Tensor::glorot_init(Shape::new(&[2, 1]), 2, 1, true);
        let x = Tensor::from_data(Shape::new(&[1, 2]), vec![1.0, -1.0], false);
        let y = Tensor::from_data(Shape::new(&[1, 1]), vec![0.5], false);

        let mut last_loss = f32::INFINITY;
        for _ in 0..50 {
            zero_grad(&w);
            let pred = matmul(&x, &w);
            let loss = mse(&pred, &y);
            backward(&loss, None);
            let g = grad(&w).unwrap();
            let wd = w.to_vec();
            let gd = g.to_vec();
            let updated: Vec<f32> = wd.iter().zip(gd.iter()).map(|(&v, &gv)| v - 0.1 * gv).collect();
            for (i, v) in updated.iter().enumerate() {
                w.set(&[i, 0], *v);
            }
            last_loss = loss.to_vec()[0];
        }
        assert!(last_loss < 1.0);
    }
}
