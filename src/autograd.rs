//! The autograd engine: [`GradNode`]/[`OpKind`] (the implicit tape) and the
//! reverse-mode [`backward`] traversal.
//!
//! Grounded in `dfdx`'s `src/tensor_ops/utilities/cpu_kernels.rs`
//! (`UnaryDerivative`/`BinaryDerivative`, renamed [`UnaryOp`]/[`BinaryOp`]
//! here) and `src/gradients.rs` (tape/accumulation). Unlike `dfdx`'s tape of
//! boxed closures over a shared `Gradients` map, this crate gives every
//! tensor an owned `Rc<RefCell<GradNode>>` forming the DAG directly —
//! `spec.md` §9's REDESIGN FLAGS call for tagged-variant op dispatch
//! (`OpKind`) in place of the original's op-name string dispatch, which reads
//! more naturally as a `match` over owned nodes than as a side-table keyed by
//! tensor id.

use std::rc::Rc;

use crate::ops::support::{broadcast_result_shape, expand_to, shape_recover, squeeze, unsqueeze};
use crate::shape::Shape;
use crate::tensor::Tensor;

/// Binary elementwise operator kinds. Each carries its own forward/backward
/// formulas via [`BinaryOp`], mirroring `dfdx`'s `BinaryDerivative<E>`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) enum BinaryOpKind {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
}

impl BinaryOp for BinaryOpKind {
    fn f(&self, x: f32, y: f32) -> f32 {
        match self {
            BinaryOpKind::Add => x + y,
            BinaryOpKind::Sub => x - y,
            BinaryOpKind::Mul => x * y,
            BinaryOpKind::Div => x / y,
            BinaryOpKind::Pow => x.powf(y),
        }
    }

    fn dfdx(&self, x: f32, y: f32) -> f32 {
        match self {
            BinaryOpKind::Add => 1.0,
            BinaryOpKind::Sub => 1.0,
            BinaryOpKind::Mul => y,
            BinaryOpKind::Div => 1.0 / y,
            // Both partials are defined as 0 at x <= 0 to avoid NaNs from
            // ln(x)/pow(negative, non-integer).
            BinaryOpKind::Pow => if x <= 0.0 { 0.0 } else { y * x.powf(y - 1.0) },
        }
    }

    fn dfdy(&self, x: f32, y: f32) -> f32 {
        match self {
            BinaryOpKind::Add => 1.0,
            BinaryOpKind::Sub => -1.0,
            BinaryOpKind::Mul => x,
            BinaryOpKind::Div => -x / (y * y),
            BinaryOpKind::Pow => if x <= 0.0 { 0.0 } else { x.powf(y) * x.ln() },
        }
    }
}

/// Unary elementwise operator kinds. `Elu`/`Selu` carry their `α` parameter.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) enum UnaryOpKind {
    Neg,
    Abs,
    Square,
    Reciprocal,
    Relu,
    Sigmoid,
    Tanh,
    Exp,
    Log,
    Sin,
    Cos,
    Tan,
    Elu(f32),
    Selu,
}

const SELU_ALPHA: f32 = 1.673_263_2;
const SELU_SCALE: f32 = 1.050_701;

impl UnaryOp for UnaryOpKind {
    fn f(&self, x: f32) -> f32 {
        match self {
            UnaryOpKind::Neg => -x,
            UnaryOpKind::Abs => x.abs(),
            UnaryOpKind::Square => x * x,
            UnaryOpKind::Reciprocal => 1.0 / x,
            UnaryOpKind::Relu => x.max(0.0),
            UnaryOpKind::Sigmoid => 1.0 / (1.0 + (-x).exp()),
            UnaryOpKind::Tanh => x.tanh(),
            UnaryOpKind::Exp => x.exp(),
            UnaryOpKind::Log => x.ln(),
            UnaryOpKind::Sin => x.sin(),
            UnaryOpKind::Cos => x.cos(),
            UnaryOpKind::Tan => x.tan(),
            UnaryOpKind::Elu(alpha) => {
                if x > 0.0 {
                    x
                } else {
                    alpha * (x.exp() - 1.0)
                }
            }
            UnaryOpKind::Selu => {
                if x > 0.0 {
                    SELU_SCALE * x
                } else {
                    SELU_SCALE * SELU_ALPHA * (x.exp() - 1.0)
                }
            }
        }
    }

    /// `x` is the forward input, `fx` is the cached forward output `f(x)`.
    /// Most derivatives here are cheaper to express in terms of `fx`
    /// (`DF_USES_FX` in `dfdx` terms), which is why both are threaded through.
    fn df(&self, x: f32, fx: f32) -> f32 {
        match self {
            UnaryOpKind::Neg => -1.0,
            UnaryOpKind::Abs => {
                if x >= 0.0 {
                    1.0
                } else {
                    -1.0
                }
            }
            UnaryOpKind::Square => 2.0 * x,
            UnaryOpKind::Reciprocal => -1.0 / (x * x),
            UnaryOpKind::Relu => {
                if x > 0.0 {
                    1.0
                } else {
                    0.0
                }
            }
            UnaryOpKind::Sigmoid => fx * (1.0 - fx),
            UnaryOpKind::Tanh => 1.0 - fx * fx,
            UnaryOpKind::Exp => fx,
            UnaryOpKind::Log => 1.0 / x,
            UnaryOpKind::Sin => x.cos(),
            UnaryOpKind::Cos => -x.sin(),
            UnaryOpKind::Tan => 1.0 + fx * fx,
            UnaryOpKind::Elu(alpha) => {
                if x > 0.0 {
                    1.0
                } else {
                    fx + alpha
                }
            }
            UnaryOpKind::Selu => {
                if x > 0.0 {
                    SELU_SCALE
                } else {
                    fx + SELU_SCALE * SELU_ALPHA
                }
            }
        }
    }
}

/// Elementwise loss kinds; each carries the (untracked) target tensor
/// alongside, since labels never accumulate their own gradient.
#[derive(Clone)]
pub(crate) enum LossKind {
    Mse,
    Mae,
    Huber(f32),
    CrossEntropy,
    SoftmaxCrossEntropy,
}

/// The `f`/`df` pairing `dfdx`'s `UnaryDerivative<E>` uses for elementwise
/// kernels: `f` is the forward formula, `df(x, fx)` its derivative, given
/// both the input and the (already-computed) output.
pub(crate) trait UnaryOp {
    fn f(&self, x: f32) -> f32;
    fn df(&self, x: f32, fx: f32) -> f32;
}

/// Analogous to `dfdx`'s `BinaryDerivative<E>`: `f(x, y)` forward, `dfdx`/
/// `dfdy` the partials with respect to each operand.
pub(crate) trait BinaryOp {
    fn f(&self, x: f32, y: f32) -> f32;
    fn dfdx(&self, x: f32, y: f32) -> f32;
    fn dfdy(&self, x: f32, y: f32) -> f32;
}

/// Tagged-variant operator dispatch (`spec.md` §9 REDESIGN FLAGS), replacing
/// the source's op-name string switch.
#[derive(Clone)]
pub(crate) enum OpKind {
    Leaf,
    Binary(BinaryOpKind),
    Unary(UnaryOpKind),
    Matmul,
    SumAxis(usize),
    MeanAxis(usize),
    SumAll,
    MeanAll,
    MaxAxis { axis: usize, winners: Rc<Vec<usize>> },
    MinAxis { axis: usize, winners: Rc<Vec<usize>> },
    MaxAll { winners: Rc<Vec<usize>> },
    MinAll { winners: Rc<Vec<usize>> },
    Transpose(usize, usize),
    Unsqueeze(usize),
    Softmax(usize),
    Loss { kind: LossKind, target: Tensor },
}

/// A node in the implicit backward DAG. Every tracked [`Tensor`] owns one of
/// these via `Rc<RefCell<_>>`; `spec.md` §3 calls for it to be destroyed
/// along with its owning pool, which falls out for free here since the pool
/// holds the other strong reference (`src/pool.rs`).
pub(crate) struct GradNode {
    pub(crate) accumulated_grad: Option<Tensor>,
    pub(crate) op: OpKind,
    pub(crate) inputs: [Option<Tensor>; 4],
    pub(crate) input_count: usize,
}

impl GradNode {
    pub(crate) fn leaf() -> Self {
        GradNode {
            accumulated_grad: None,
            op: OpKind::Leaf,
            inputs: [None, None, None, None],
            input_count: 0,
        }
    }

    pub(crate) fn new(op: OpKind, inputs: &[Tensor]) -> Self {
        assert!(inputs.len() <= 4, "internal error: operator with more than 4 autograd inputs");
        let mut arr: [Option<Tensor>; 4] = [None, None, None, None];
        for (slot, t) in arr.iter_mut().zip(inputs.iter()) {
            *slot = Some(t.clone());
        }
        GradNode {
            accumulated_grad: None,
            op,
            inputs: arr,
            input_count: inputs.len(),
        }
    }
}

/// Reads back the gradient accumulated on `t` during the last [`backward`]
/// call, if any.
pub fn grad(t: &Tensor) -> Option<Tensor> {
    t.grad_node().and_then(|n| n.borrow().accumulated_grad.clone())
}

/// Clears the accumulated gradient on `t` without detaching it from the tape.
pub fn zero_grad(t: &Tensor) {
    if let Some(n) = t.grad_node() {
        n.borrow_mut().accumulated_grad = None;
    }
}

/// Runs reverse-mode differentiation starting at `root`.
///
/// `spec.md` §4.4: if `upstream` is `None`, `root` must be a scalar (exactly
/// one element) and the seed gradient defaults to `1.0`; otherwise `upstream`
/// must match `root`'s shape exactly.
pub fn backward(root: &Tensor, upstream: Option<Tensor>) {
    let seed = match upstream {
        Some(g) => {
            if g.shape().dims() != root.shape().dims() {
                crate::diagnostics::fatal_shape("backward seed", g.shape(), root.shape());
            }
            g
        }
        None => {
            if root.numel() != 1 {
                crate::diagnostics::fatal(format!(
                    "domain violation: backward() with no upstream gradient requires a scalar root, got shape {:?}",
                    root.shape()
                ));
            }
            Tensor::ones(root.shape(), false)
        }
    };
    backward_rec(root, seed);
}

fn backward_rec(t: &Tensor, grad: Tensor) {
    let node_rc = match t.grad_node() {
        Some(n) => n.clone(),
        None => return,
    };

    {
        let mut node = node_rc.borrow_mut();
        node.accumulated_grad = Some(match node.accumulated_grad.take() {
            Some(acc) => elementwise_add_same_shape(&acc, &grad),
            None => grad.clone(),
        });
    }

    let (op, inputs, input_count) = {
        let node = node_rc.borrow();
        (node.op.clone(), node.inputs.clone(), node.input_count)
    };

    for (i, slot) in inputs.iter().enumerate().take(input_count) {
        let x_i = slot.as_ref().expect("internal error: input_count exceeds populated inputs");
        if !x_i.requires_grad() {
            continue;
        }
        let local = combine(&op, t, x_i, &grad, i);
        backward_rec(x_i, local);
    }
}

fn elementwise_add_same_shape(a: &Tensor, b: &Tensor) -> Tensor {
    let shape = broadcast_result_shape(a.shape(), b.shape());
    let ea = expand_to(a, shape);
    let eb = expand_to(b, shape);
    let data: Vec<f32> = ea.to_vec().iter().zip(eb.to_vec().iter()).map(|(x, y)| x + y).collect();
    Tensor::from_data(shape, data, false)
}

/// Broadcast-multiplies `local` by `upstream`, then sum-reduces the result
/// back down to `target_shape`. The shared tail of every elementwise branch
/// in [`combine`] (`spec.md` §4.2/§4.3: local gradient times incoming
/// gradient, then shape recovery).
fn scale_by_upstream(local: Tensor, upstream: &Tensor, target_shape: Shape) -> Tensor {
    let shape = broadcast_result_shape(local.shape(), upstream.shape());
    let el = expand_to(&local, shape);
    let eu = expand_to(upstream, shape);
    let data: Vec<f32> = el.to_vec().iter().zip(eu.to_vec().iter()).map(|(x, y)| x * y).collect();
    shape_recover(Tensor::from_data(shape, data, false), target_shape)
}

fn combine(op: &OpKind, output: &Tensor, x_i: &Tensor, upstream: &Tensor, input_index: usize) -> Tensor {
    match op {
        OpKind::Leaf => unreachable!("leaf nodes have no inputs to recurse into"),
        OpKind::Binary(kind) => {
            let node = output.grad_node().expect("binary op output must be tracked");
            let node = node.borrow();
            let (a, b) = (
                node.inputs[0].clone().expect("binary op missing lhs"),
                node.inputs[1].clone().expect("binary op missing rhs"),
            );
            drop(node);
            let out_shape = output.shape();
            let ea = expand_to(&a, out_shape);
            let eb = expand_to(&b, out_shape);
            let (da, db) = (ea.to_vec(), eb.to_vec());
            let local: Vec<f32> = da
                .iter()
                .zip(db.iter())
                .map(|(&x, &y)| if input_index == 0 { kind.dfdx(x, y) } else { kind.dfdy(x, y) })
                .collect();
            let local = Tensor::from_data(out_shape, local, false);
            scale_by_upstream(local, upstream, x_i.shape())
        }
        OpKind::Unary(kind) => {
            let xs = x_i.to_vec();
            let fxs = output.to_vec();
            let local: Vec<f32> = xs.iter().zip(fxs.iter()).map(|(&x, &fx)| kind.df(x, fx)).collect();
            let local = Tensor::from_data(x_i.shape(), local, false);
            scale_by_upstream(local, upstream, x_i.shape())
        }
        OpKind::Matmul => crate::ops::matmul::matmul_backward(output, input_index, x_i, upstream),
        OpKind::SumAxis(axis) => {
            let up = unsqueeze(upstream, *axis);
            let local = Tensor::ones(x_i.shape(), false);
            scale_by_upstream(local, &up, x_i.shape())
        }
        OpKind::MeanAxis(axis) => {
            let up = unsqueeze(upstream, *axis);
            let n = x_i.shape().dims()[*axis] as f32;
            let local = fill(x_i.shape(), 1.0 / n);
            scale_by_upstream(local, &up, x_i.shape())
        }
        OpKind::SumAll => {
            let local = Tensor::ones(x_i.shape(), false);
            scale_by_upstream(local, upstream, x_i.shape())
        }
        OpKind::MeanAll => {
            let local = fill(x_i.shape(), 1.0 / x_i.numel() as f32);
            scale_by_upstream(local, upstream, x_i.shape())
        }
        OpKind::MaxAxis { winners, .. } | OpKind::MinAxis { winners, .. } => {
            scatter_axis(x_i.shape(), winners, upstream)
        }
        OpKind::MaxAll { winners } | OpKind::MinAll { winners } => scatter_all(x_i.shape(), winners, upstream),
        OpKind::Transpose(a, b) => crate::ops::unary::transpose(upstream, *a, *b),
        OpKind::Unsqueeze(axis) => squeeze(upstream, *axis),
        OpKind::Softmax(axis) => crate::ops::activation::softmax_jvp(output, upstream, *axis),
        OpKind::Loss { kind, target } => {
            let local = crate::ops::loss::loss_local_grad(kind, x_i, target);
            scale_by_upstream(local, upstream, x_i.shape())
        }
    }
}

fn fill(shape: Shape, value: f32) -> Tensor {
    Tensor::from_data(shape, vec![value; shape.numel()], false)
}

/// Scatters `upstream` (one value per reduced-out position) back to the
/// winning index in each group, for axis-reduce max/min.
fn scatter_axis(target_shape: Shape, winners: &[usize], upstream: &Tensor) -> Tensor {
    let mut out = vec![0.0f32; target_shape.numel()];
    let up = upstream.to_vec();
    for (o, &widx) in winners.iter().enumerate() {
        out[widx] += up[o];
    }
    Tensor::from_data(target_shape, out, false)
}

/// Scatters a single upstream scalar evenly across every tied winner, for
/// whole-tensor max/min.
fn scatter_all(target_shape: Shape, winners: &[usize], upstream: &Tensor) -> Tensor {
    let mut out = vec![0.0f32; target_shape.numel()];
    let up = upstream.to_vec()[0];
    let share = up / winners.len() as f32;
    for &widx in winners {
        out[widx] += share;
    }
    Tensor::from_data(target_shape, out, false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_backward_seeds_one() {
        let a = Tensor::from_data(Shape::new(&[1]), vec![3.0], true);
        let b = Tensor::from_data(Shape::new(&[1]), vec![1.0], true);
        let mut out = Tensor::from_data(Shape::new(&[1]), vec![4.0], false);
        out.set_grad_node(OpKind::Binary(BinaryOpKind::Add), &[a.clone(), b.clone()]);
        backward(&out, None);
        assert_eq!(grad(&a).unwrap().to_vec(), vec![1.0]);
        assert_eq!(grad(&b).unwrap().to_vec(), vec![1.0]);
    }

    #[test]
    fn broadcast_add_grad_recovers_lhs_shape() {
        let a = Tensor::from_data(Shape::new(&[1]), vec![2.0], true);
        let b = Tensor::from_data(Shape::new(&[3]), vec![1.0, 2.0, 3.0], true);
        let out_shape = broadcast_result_shape(a.shape(), b.shape());
        let ea = expand_to(&a, out_shape);
        let eb = expand_to(&b, out_shape);
        let data: Vec<f32> = ea.to_vec().iter().zip(eb.to_vec().iter()).map(|(x, y)| x + y).collect();
        let mut out = Tensor::from_data(out_shape, data, false);
        out.set_grad_node(OpKind::Binary(BinaryOpKind::Add), &[a.clone(), b.clone()]);
        backward(&out, Some(Tensor::ones(out_shape, false)));
        assert_eq!(grad(&a).unwrap().to_vec(), vec![3.0]);
        assert_eq!(grad(&b).unwrap().to_vec(), vec![1.0, 1.0, 1.0]);
    }
}
