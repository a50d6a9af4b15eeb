//! The core [`Tensor`] type: a rank-≤4 shape over a flat, pool-owned,
//! reference-shared buffer, plus an optional autograd [`GradNode`].
//!
//! `spec.md` §3 describes tensor handles as cheap to copy and non-owning of
//! their backing storage; `Rc<RefCell<Vec<f32>>>` is the safe-Rust rendition
//! of that (see `src/pool.rs` for the allocation/ownership story).

use std::cell::{Ref, RefCell, RefMut};
use std::fmt;
use std::rc::Rc;

use rand::distributions::Uniform;
use rand::Rng;

use crate::autograd::{GradNode, OpKind};
use crate::diagnostics::fatal;
use crate::pool;
use crate::shape::Shape;

/// A dense, rank-≤4, row-major `f32` tensor.
///
/// Cloning a `Tensor` is O(1): the clone shares the same backing buffer and
/// (if present) the same gradient node, matching `spec.md`'s "handles are
/// freely copyable" ownership model.
#[derive(Clone)]
pub struct Tensor {
    pub(crate) shape: Shape,
    pub(crate) buf: Rc<RefCell<Vec<f32>>>,
    pub(crate) grad_node: Option<Rc<RefCell<GradNode>>>,
}

impl Tensor {
    /// Builds a tensor directly from an existing buffer. Used internally by
    /// operator kernels; `buf.borrow().len()` must equal `shape.numel()`.
    pub(crate) fn from_buf(shape: Shape, buf: Rc<RefCell<Vec<f32>>>) -> Self {
        debug_assert_eq!(buf.borrow().len(), shape.numel());
        Tensor {
            shape,
            buf,
            grad_node: None,
        }
    }

    /// A zero-filled tensor of `shape`. `track_grad` attaches an empty leaf
    /// gradient node so the tensor can accumulate gradients during backward.
    ///
    /// `spec.md` §9 flags the source's habit of filling every new tensor
    /// with noise even when the caller immediately overwrites it; this
    /// constructor (and safe Rust generally) makes zero-fill the only
    /// sensible meaning of "new, uninitialized" — see [`Tensor::new_random`]
    /// for the explicit randomized constructor.
    pub fn new(shape: Shape, track_grad: bool) -> Self {
        let buf = pool::alloc_f32(shape.numel());
        let mut t = Tensor::from_buf(shape, buf);
        if track_grad {
            t.attach_leaf();
        }
        t
    }

    /// Alias for [`Tensor::new`]; all-zero data.
    pub fn zeros(shape: Shape, track_grad: bool) -> Self {
        Tensor::new(shape, track_grad)
    }

    /// A tensor of `shape` filled with ones.
    pub fn ones(shape: Shape, track_grad: bool) -> Self {
        let t = Tensor::new(shape, false);
        for x in t.buf.borrow_mut().iter_mut() {
            *x = 1.0;
        }
        if track_grad {
            t.with_leaf()
        } else {
            t
        }
    }

    /// A tensor of `shape` filled with values drawn uniformly from
    /// `[-1.0, 1.0)`. The explicit random-fill constructor called for by
    /// `spec.md` §9.
    pub fn new_random(shape: Shape, track_grad: bool) -> Self {
        let mut rng = rand::thread_rng();
        let dist = Uniform::new(-1.0f32, 1.0f32);
        let t = Tensor::new(shape, false);
        for x in t.buf.borrow_mut().iter_mut() {
            *x = rng.sample(dist);
        }
        if track_grad {
            t.with_leaf()
        } else {
            t
        }
    }

    /// Glorot/Xavier-uniform initialization: values drawn from
    /// `Uniform(-bound, bound)` with `bound = sqrt(6 / (fan_in + fan_out))`.
    pub fn glorot_init(shape: Shape, fan_in: usize, fan_out: usize, track_grad: bool) -> Self {
        let bound = (6.0 / (fan_in + fan_out) as f32).sqrt();
        let mut rng = rand::thread_rng();
        let dist = Uniform::new(-bound, bound);
        let t = Tensor::new(shape, false);
        for x in t.buf.borrow_mut().iter_mut() {
            *x = rng.sample(dist);
        }
        if track_grad {
            t.with_leaf()
        } else {
            t
        }
    }

    /// Builds a tensor from explicit row-major data.
    pub fn from_data(shape: Shape, data: Vec<f32>, track_grad: bool) -> Self {
        if data.len() != shape.numel() {
            fatal(format!(
                "shape violation: {} values provided for shape {shape:?} ({} expected)",
                data.len(),
                shape.numel()
            ));
        }
        let t = Tensor::from_buf(shape, Rc::new(RefCell::new(data)));
        if track_grad {
            t.with_leaf()
        } else {
            t
        }
    }

    fn attach_leaf(&mut self) {
        self.grad_node = Some(pool::alloc_rc(GradNode::leaf()));
    }

    fn with_leaf(mut self) -> Self {
        self.attach_leaf();
        self
    }

    pub fn shape(&self) -> Shape {
        self.shape
    }

    pub fn rank(&self) -> usize {
        self.shape.rank()
    }

    pub fn numel(&self) -> usize {
        self.shape.numel()
    }

    pub fn requires_grad(&self) -> bool {
        self.grad_node.is_some()
    }

    pub(crate) fn grad_node(&self) -> Option<&Rc<RefCell<GradNode>>> {
        self.grad_node.as_ref()
    }

    pub(crate) fn set_grad_node(&mut self, op: OpKind, inputs: &[Tensor]) {
        self.grad_node = Some(pool::alloc_rc(GradNode::new(op, inputs)));
    }

    pub fn data(&self) -> Ref<'_, Vec<f32>> {
        self.buf.borrow()
    }

    pub fn data_mut(&self) -> RefMut<'_, Vec<f32>> {
        self.buf.borrow_mut()
    }

    pub fn to_vec(&self) -> Vec<f32> {
        self.buf.borrow().clone()
    }

    fn linear_index(&self, idx: &[usize]) -> usize {
        let r = self.shape.rank();
        if idx.len() != r {
            fatal(format!(
                "domain violation: {} indices provided for rank-{r} tensor",
                idx.len()
            ));
        }
        let strides = self.shape.strides();
        let mut lin = 0usize;
        for (i, &ix) in idx.iter().enumerate() {
            if ix >= self.shape.0[i] {
                fatal(format!(
                    "domain violation: index {ix} out of range for axis {i} of shape {:?}",
                    self.shape
                ));
            }
            lin += ix * strides[i];
        }
        lin
    }

    /// Reads the element at `idx` (up to four indices, per the tensor's rank).
    pub fn get(&self, idx: &[usize]) -> f32 {
        let lin = self.linear_index(idx);
        self.buf.borrow()[lin]
    }

    /// Writes `value` at `idx`.
    pub fn set(&self, idx: &[usize], value: f32) {
        let lin = self.linear_index(idx);
        self.buf.borrow_mut()[lin] = value;
    }

    /// `detach(t)`: a copy-alias that shares the same buffer but has no
    /// gradient node, i.e. it is no longer part of any tape.
    pub fn detach(&self) -> Tensor {
        Tensor {
            shape: self.shape,
            buf: self.buf.clone(),
            grad_node: None,
        }
    }

    /// Human-readable dump (truncated for large tensors), for debugging.
    pub fn print(&self) {
        println!("{self:?}");
    }
}

impl fmt::Debug for Tensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let data = self.buf.borrow();
        write!(f, "Tensor(shape={:?}, grad={}) [", self.shape, self.requires_grad())?;
        for (i, v) in data.iter().take(8).enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{v:.4}")?;
        }
        if data.len() > 8 {
            write!(f, ", ...")?;
        }
        write!(f, "]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zeros_has_right_shape_and_values() {
        let t = Tensor::zeros(Shape::new(&[2, 3]), false);
        assert_eq!(t.numel(), 6);
        assert_eq!(t.to_vec(), vec![0.0; 6]);
    }

    #[test]
    fn get_set_round_trip() {
        let t = Tensor::zeros(Shape::new(&[2, 2]), false);
        t.set(&[1, 0], 5.0);
        assert_eq!(t.get(&[1, 0]), 5.0);
        assert_eq!(t.get(&[0, 0]), 0.0);
    }

    #[test]
    fn detach_shares_buffer_and_drops_grad_node() {
        let t = Tensor::new_random(Shape::new(&[3]), true);
        let d = t.detach();
        assert!(!d.requires_grad());
        t.set(&[0], 42.0);
        assert_eq!(d.get(&[0]), 42.0, "detach must alias the same buffer");
    }

    #[test]
    fn glorot_bound_respected() {
        let bound = (6.0f32 / (10.0 + 5.0)).sqrt();
        let t = Tensor::glorot_init(Shape::new(&[10, 5]), 10, 5, false);
        for v in t.to_vec() {
            assert!(v.abs() <= bound);
        }
    }
}
