//! AdaGrad: per-parameter learning rates that shrink with the running sum of
//! squared gradients.

use std::collections::HashMap;
use std::rc::Rc;

use crate::autograd::grad;
use crate::tensor::Tensor;

fn param_key(t: &Tensor) -> usize {
    Rc::as_ptr(&t.buf) as usize
}

pub struct AdaGrad {
    lr: f32,
    eps: f32,
    weight_decay: f32,
    sum_sq: HashMap<usize, Vec<f32>>,
}

impl AdaGrad {
    /// `weight_decay` adds `weight_decay * param` to the gradient before it's
    /// squared into the running sum, per `spec.md` §4.5's optional L2 term.
    pub fn new(lr: f32, eps: f32, weight_decay: f32) -> Self {
        crate::optim::require_non_negative("lr", lr);
        crate::optim::require_non_negative("eps", eps);
        crate::optim::require_non_negative("weight_decay", weight_decay);
        AdaGrad { lr, eps, weight_decay, sum_sq: HashMap::new() }
    }

    pub fn step(&mut self, param: &Tensor) {
        let g = match grad(param) {
            Some(g) => g.to_vec(),
            None => return,
        };
        let s = self.sum_sq.entry(param_key(param)).or_insert_with(|| vec![0.0; g.len()]);
        let mut data = param.data_mut();
        for i in 0..data.len() {
            let gi = if self.weight_decay > 0.0 { g[i] + self.weight_decay * data[i] } else { g[i] };
            s[i] += gi * gi;
            data[i] -= self.lr * gi / (s[i].sqrt() + self.eps);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shape::Shape;

    #[test]
    fn first_step_matches_plain_scaled_gradient() {
        let w = Tensor::from_data(Shape::new(&[1]), vec![1.0], true);
        w.grad_node().unwrap().borrow_mut().accumulated_grad =
            Some(Tensor::from_data(Shape::new(&[1]), vec![2.0], false));
        let mut opt = AdaGrad::new(1.0, 1e-8, 0.0);
        opt.step(&w);
        let expected = 1.0 - 2.0 / (4.0f32.sqrt() + 1e-8);
        assert!((w.to_vec()[0] - expected).abs() < 1e-5);
    }

    #[test]
    #[should_panic(expected = "non-negative")]
    fn negative_eps_is_fatal() {
        AdaGrad::new(0.1, -1e-8, 0.0);
    }

    #[test]
    #[should_panic(expected = "non-negative")]
    fn negative_weight_decay_is_fatal() {
        AdaGrad::new(0.1, 1e-8, -0.1);
    }

    #[test]
    fn weight_decay_pulls_parameter_down_more_than_plain_step() {
        let w_plain = Tensor::from_data(Shape::new(&[1]), vec![1.0], true);
        w_plain.grad_node().unwrap().borrow_mut().accumulated_grad =
            Some(Tensor::from_data(Shape::new(&[1]), vec![0.1], false));
        let mut plain = AdaGrad::new(1.0, 1e-8, 0.0);
        plain.step(&w_plain);

        let w_decayed = Tensor::from_data(Shape::new(&[1]), vec![1.0], true);
        w_decayed.grad_node().unwrap().borrow_mut().accumulated_grad =
            Some(Tensor::from_data(Shape::new(&[1]), vec![0.1], false));
        let mut decayed = AdaGrad::new(1.0, 1e-8, 0.5);
        decayed.step(&w_decayed);

        assert!(w_decayed.to_vec()[0] < w_plain.to_vec()[0]);
    }
}
