//! RMSProp: AdaGrad with an exponentially decayed (rather than unbounded)
//! running sum of squared gradients.

use std::collections::HashMap;
use std::rc::Rc;

use crate::autograd::grad;
use crate::tensor::Tensor;

fn param_key(t: &Tensor) -> usize {
    Rc::as_ptr(&t.buf) as usize
}

pub struct RmsProp {
    lr: f32,
    decay: f32,
    eps: f32,
    avg_sq: HashMap<usize, Vec<f32>>,
}

impl RmsProp {
    pub fn new(lr: f32, decay: f32, eps: f32) -> Self {
        crate::optim::require_non_negative("lr", lr);
        crate::optim::require_unit_interval("decay", decay);
        crate::optim::require_non_negative("eps", eps);
        RmsProp { lr, decay, eps, avg_sq: HashMap::new() }
    }

    pub fn step(&mut self, param: &Tensor) {
        let g = match grad(param) {
            Some(g) => g.to_vec(),
            None => return,
        };
        let avg = self.avg_sq.entry(param_key(param)).or_insert_with(|| vec![0.0; g.len()]);
        let mut data = param.data_mut();
        for i in 0..data.len() {
            avg[i] = self.decay * avg[i] + (1.0 - self.decay) * g[i] * g[i];
            data[i] -= self.lr * g[i] / (avg[i].sqrt() + self.eps);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shape::Shape;

    #[test]
    fn decays_running_average_of_squares() {
        let w = Tensor::from_data(Shape::new(&[1]), vec![0.0], true);
        let mut opt = RmsProp::new(0.1, 0.9, 1e-8);
        for _ in 0..5 {
            w.grad_node().unwrap().borrow_mut().accumulated_grad =
                Some(Tensor::from_data(Shape::new(&[1]), vec![1.0], false));
            opt.step(&w);
        }
        assert!(w.to_vec()[0] < 0.0);
        assert!(w.to_vec()[0] > -1.0);
    }

    #[test]
    #[should_panic(expected = "[0, 1)")]
    fn decay_out_of_range_is_fatal() {
        RmsProp::new(0.1, 1.0, 1e-8);
    }
}
