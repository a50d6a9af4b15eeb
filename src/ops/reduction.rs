//! Reductions: `sum`/`mean` (whole-tensor or along one axis) and
//! `max`/`min` (whole-tensor or along one axis, both with the winning index
//! recorded for backward scatter).
//!
//! `spec.md` §9 REDESIGN FLAGS calls for separate `_all`/`_axis` entry
//! points rather than one reduction function overloaded by an `Option<axis>`
//! parameter — mirrors `dfdx`'s split between `sum()` (all axes, via
//! `Axes4<0,1,2,3>`-style full reduction) and `sum_axes::<Axis<I>>()` in
//! `src/tensor_ops/impl_sum_axes.rs`, generalized to runtime axes.

use std::rc::Rc;

use crate::autograd::OpKind;
use crate::eval;
use crate::tensor::Tensor;

/// Reduces every element to a single scalar via `combine`, built up
/// iteratively (`seed`, then folded over the remaining elements).
fn reduce_all(a: &Tensor, seed: f32, combine: impl Fn(f32, f32) -> f32) -> f32 {
    a.to_vec().into_iter().fold(seed, combine)
}

fn reduce_axis_generic(
    a: &Tensor,
    axis: usize,
    init: f32,
    fold: impl Fn(f32, f32) -> f32,
) -> (Tensor, Vec<f32>) {
    let in_shape = a.shape();
    let out_shape = in_shape.without_axis(axis);
    let in_strides = in_shape.strides();
    let size = in_shape.dims()[axis];
    let data = a.to_vec();
    let out_rank = out_shape.rank();
    let out_dims = out_shape.dims().to_vec();
    let total = out_shape.numel();
    let mut out = vec![0.0f32; total];
    let mut coord = vec![0usize; out_rank];

    for oi in 0..total.max(1) {
        let mut full_coord = Vec::with_capacity(out_rank + 1);
        full_coord.extend_from_slice(&coord[..axis.min(out_rank)]);
        full_coord.push(0);
        full_coord.extend_from_slice(&coord[axis.min(out_rank)..]);
        let base: usize = full_coord.iter().zip(in_strides.iter()).map(|(&c, &s)| c * s).sum();
        let mut acc = init;
        for k in 0..size {
            acc = fold(acc, data[base + k * in_strides[axis]]);
        }
        out[oi] = acc;
        if out_rank == 0 {
            break;
        }
        for i in (0..out_rank).rev() {
            coord[i] += 1;
            if coord[i] < out_dims[i] {
                break;
            }
            coord[i] = 0;
        }
    }
    (Tensor::from_data(out_shape, out, false), data)
}

/// Sum of every element. Per convention, `reduce_all` never returns a rank-0
/// scalar — the result is shape `[1]`.
pub fn sum_all(a: &Tensor) -> Tensor {
    let value = reduce_all(a, 0.0, |acc, x| acc + x);
    let mut out = Tensor::from_data(crate::shape::Shape::new(&[1]), vec![value], false);
    if !eval::is_active() && a.requires_grad() {
        out.set_grad_node(OpKind::SumAll, &[a.clone()]);
    }
    out
}

/// Mean of every element, shape `[1]` (see [`sum_all`]).
pub fn mean_all(a: &Tensor) -> Tensor {
    let value = reduce_all(a, 0.0, |acc, x| acc + x) / a.numel() as f32;
    let mut out = Tensor::from_data(crate::shape::Shape::new(&[1]), vec![value], false);
    if !eval::is_active() && a.requires_grad() {
        out.set_grad_node(OpKind::MeanAll, &[a.clone()]);
    }
    out
}

/// Sum along `axis` (negative indices supported), dropping that axis.
pub fn sum_axis(a: &Tensor, axis: i32) -> Tensor {
    let axis = a.shape().normalize_axis(axis);
    let (mut out, _) = reduce_axis_generic(a, axis, 0.0, |acc, x| acc + x);
    if !eval::is_active() && a.requires_grad() {
        out.set_grad_node(OpKind::SumAxis(axis), &[a.clone()]);
    }
    out
}

/// Mean along `axis`.
pub fn mean_axis(a: &Tensor, axis: i32) -> Tensor {
    let axis = a.shape().normalize_axis(axis);
    let size = a.shape().dims()[axis] as f32;
    let (sum, _) = reduce_axis_generic(a, axis, 0.0, |acc, x| acc + x);
    let data: Vec<f32> = sum.to_vec().iter().map(|&s| s / size).collect();
    let mut out = Tensor::from_data(sum.shape(), data, false);
    if !eval::is_active() && a.requires_grad() {
        out.set_grad_node(OpKind::MeanAxis(axis), &[a.clone()]);
    }
    out
}

/// Maximum over the whole tensor (scalar result). Ties split the upstream
/// gradient evenly among every tied position on the way back.
pub fn max_all(a: &Tensor) -> Tensor {
    extreme_all(a, true)
}

/// Minimum over the whole tensor.
pub fn min_all(a: &Tensor) -> Tensor {
    extreme_all(a, false)
}

fn extreme_all(a: &Tensor, want_max: bool) -> Tensor {
    let data = a.to_vec();
    let best = data.iter().copied().fold(
        if want_max { f32::NEG_INFINITY } else { f32::INFINITY },
        |acc, x| if want_max { acc.max(x) } else { acc.min(x) },
    );
    let winners: Vec<usize> = data
        .iter()
        .enumerate()
        .filter(|(_, &v)| v == best)
        .map(|(i, _)| i)
        .collect();
    let mut out = Tensor::from_data(crate::shape::Shape::new(&[1]), vec![best], false);
    if !eval::is_active() && a.requires_grad() {
        let op = if want_max {
            OpKind::MaxAll { winners: Rc::new(winners) }
        } else {
            OpKind::MinAll { winners: Rc::new(winners) }
        };
        out.set_grad_node(op, &[a.clone()]);
    }
    out
}

/// Maximum along `axis`, dropping that axis. The first occurrence of the
/// maximum within each group is recorded as the backward scatter target.
pub fn max_axis(a: &Tensor, axis: i32) -> Tensor {
    extreme_axis(a, axis, true)
}

/// Minimum along `axis`.
pub fn min_axis(a: &Tensor, axis: i32) -> Tensor {
    extreme_axis(a, axis, false)
}

fn extreme_axis(a: &Tensor, axis: i32, want_max: bool) -> Tensor {
    let axis = a.shape().normalize_axis(axis);
    let in_shape = a.shape();
    let out_shape = in_shape.without_axis(axis);
    let in_strides = in_shape.strides();
    let size = in_shape.dims()[axis];
    let data = a.to_vec();
    let out_rank = out_shape.rank();
    let out_dims = out_shape.dims().to_vec();
    let total = out_shape.numel();
    let mut out = vec![0.0f32; total];
    let mut winners = vec![0usize; total];
    let mut coord = vec![0usize; out_rank];

    for oi in 0..total.max(1) {
        let mut full_coord = Vec::with_capacity(out_rank + 1);
        full_coord.extend_from_slice(&coord[..axis.min(out_rank)]);
        full_coord.push(0);
        full_coord.extend_from_slice(&coord[axis.min(out_rank)..]);
        let base: usize = full_coord.iter().zip(in_strides.iter()).map(|(&c, &s)| c * s).sum();
        let mut best = if want_max { f32::NEG_INFINITY } else { f32::INFINITY };
        let mut best_idx = base;
        for k in 0..size {
            let idx = base + k * in_strides[axis];
            let v = data[idx];
            let better = if want_max { v > best } else { v < best };
            if better {
                best = v;
                best_idx = idx;
            }
        }
        out[oi] = best;
        winners[oi] = best_idx;
        if out_rank == 0 {
            break;
        }
        for i in (0..out_rank).rev() {
            coord[i] += 1;
            if coord[i] < out_dims[i] {
                break;
            }
            coord[i] = 0;
        }
    }

    let mut result = Tensor::from_data(out_shape, out, false);
    if !eval::is_active() && a.requires_grad() {
        let op = if want_max {
            OpKind::MaxAxis { axis, winners: Rc::new(winners) }
        } else {
            OpKind::MinAxis { axis, winners: Rc::new(winners) }
        };
        result.set_grad_node(op, &[a.clone()]);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::autograd::{backward, grad};
    use crate::shape::Shape;

    #[test]
    fn sum_axis_matches_manual() {
        let a = Tensor::from_data(Shape::new(&[2, 3]), vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], false);
        let s = sum_axis(&a, 1);
        assert_eq!(s.to_vec(), vec![6.0, 15.0]);
    }

    #[test]
    fn sum_axis_backward_broadcasts_ones() {
        let a = Tensor::from_data(Shape::new(&[2, 3]), vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], true);
        let s = sum_axis(&a, 1);
        backward(&s, Some(Tensor::ones(s.shape(), false)));
        assert_eq!(grad(&a).unwrap().to_vec(), vec![1.0; 6]);
    }

    #[test]
    fn max_all_picks_correct_value_and_scatters_grad() {
        let a = Tensor::from_data(Shape::new(&[3]), vec![1.0, 9.0, 3.0], true);
        let m = max_all(&a);
        assert_eq!(m.to_vec(), vec![9.0]);
        backward(&m, None);
        assert_eq!(grad(&a).unwrap().to_vec(), vec![0.0, 1.0, 0.0]);
    }

    #[test]
    fn max_all_splits_ties() {
        let a = Tensor::from_data(Shape::new(&[3]), vec![9.0, 9.0, 1.0], true);
        let m = max_all(&a);
        backward(&m, None);
        assert_eq!(grad(&a).unwrap().to_vec(), vec![0.5, 0.5, 0.0]);
    }
}
