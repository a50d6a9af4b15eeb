//! Stochastic gradient descent, with optional momentum.

use std::collections::HashMap;
use std::rc::Rc;

use crate::autograd::grad;
use crate::tensor::Tensor;

fn param_key(t: &Tensor) -> usize {
    Rc::as_ptr(&t.buf) as usize
}

/// `w -= lr * (momentum * v + g)`, where `v` is the running velocity kept
/// per parameter (keyed by buffer identity, so the same `Sgd` instance can
/// drive any number of independent parameters).
pub struct Sgd {
    lr: f32,
    momentum: f32,
    velocity: HashMap<usize, Vec<f32>>,
}

impl Sgd {
    pub fn new(lr: f32, momentum: f32) -> Self {
        crate::optim::require_non_negative("lr", lr);
        crate::optim::require_unit_interval("momentum", momentum);
        Sgd { lr, momentum, velocity: HashMap::new() }
    }

    /// Applies one update to `param` using its currently accumulated
    /// gradient. A no-op if `param` has no accumulated gradient.
    pub fn step(&mut self, param: &Tensor) {
        let g = match grad(param) {
            Some(g) => g.to_vec(),
            None => return,
        };
        let mut data = param.data_mut();
        if self.momentum != 0.0 {
            let v = self.velocity.entry(param_key(param)).or_insert_with(|| vec![0.0; g.len()]);
            for i in 0..data.len() {
                v[i] = self.momentum * v[i] + g[i];
                data[i] -= self.lr * v[i];
            }
        } else {
            for i in 0..data.len() {
                data[i] -= self.lr * g[i];
            }
        }
    }
}
