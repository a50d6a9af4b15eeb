//! Adam: running first (`m`) and second (`v`) moment estimates with
//! bias correction.
//!
//! Update formula grounded in `other_examples/`'s
//! `luckboy-neurina` Adam trainer (`v`/`s` moment names, bias-corrected
//! `eta`), adapted to this crate's per-tensor gradient model.

use std::collections::HashMap;
use std::rc::Rc;

use crate::autograd::grad;
use crate::tensor::Tensor;

fn param_key(t: &Tensor) -> usize {
    Rc::as_ptr(&t.buf) as usize
}

struct Moments {
    m: Vec<f32>,
    v: Vec<f32>,
    t: i32,
}

pub struct Adam {
    lr: f32,
    beta1: f32,
    beta2: f32,
    eps: f32,
    moments: HashMap<usize, Moments>,
}

impl Adam {
    pub fn new(lr: f32, beta1: f32, beta2: f32, eps: f32) -> Self {
        crate::optim::require_non_negative("lr", lr);
        crate::optim::require_unit_interval("beta1", beta1);
        crate::optim::require_unit_interval("beta2", beta2);
        crate::optim::require_non_negative("eps", eps);
        Adam { lr, beta1, beta2, eps, moments: HashMap::new() }
    }

    pub fn step(&mut self, param: &Tensor) {
        let g = match grad(param) {
            Some(g) => g.to_vec(),
            None => return,
        };
        let state = self.moments.entry(param_key(param)).or_insert_with(|| Moments {
            m: vec![0.0; g.len()],
            v: vec![0.0; g.len()],
            t: 0,
        });
        state.t += 1;
        let bias1 = 1.0 - self.beta1.powi(state.t);
        let bias2 = 1.0 - self.beta2.powi(state.t);

        let mut data = param.data_mut();
        for i in 0..data.len() {
            state.m[i] = self.beta1 * state.m[i] + (1.0 - self.beta1) * g[i];
            state.v[i] = self.beta2 * state.v[i] + (1.0 - self.beta2) * g[i] * g[i];
            let m_hat = state.m[i] / bias1;
            let v_hat = state.v[i] / bias2;
            data[i] -= self.lr * m_hat / (v_hat.sqrt() + self.eps);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shape::Shape;

    #[test]
    fn first_step_direction_follows_gradient_sign() {
        let w = Tensor::from_data(Shape::new(&[1]), vec![0.0], true);
        w.grad_node().unwrap().borrow_mut().accumulated_grad =
            Some(Tensor::from_data(Shape::new(&[1]), vec![1.0], false));
        let mut opt = Adam::new(0.1, 0.9, 0.999, 1e-8);
        opt.step(&w);
        assert!(w.to_vec()[0] < 0.0);
    }

    #[test]
    fn converges_toward_zero_on_constant_gradient_sign() {
        let w = Tensor::from_data(Shape::new(&[1]), vec![5.0], true);
        let mut opt = Adam::new(0.5, 0.9, 0.999, 1e-8);
        for _ in 0..50 {
            w.grad_node().unwrap().borrow_mut().accumulated_grad =
                Some(Tensor::from_data(Shape::new(&[1]), vec![1.0], false));
            opt.step(&w);
        }
        assert!(w.to_vec()[0] < 0.0);
    }

    #[test]
    #[should_panic(expected = "[0, 1)")]
    fn beta_out_of_range_is_fatal() {
        Adam::new(0.1, 1.0, 0.999, 1e-8);
    }
}
