//! Shape-algebra operations that act on tensor data: broadcast expansion and
//! its inverse (gradient shape recovery), axis insertion/removal. These back
//! both the forward broadcasting done by `src/ops/binary.rs` and the
//! backward-pass shape recovery described in `spec.md` §4.2.

use crate::shape::{broadcast_shapes, Shape, MAX_RANK};
use crate::tensor::Tensor;

/// Computes the flat-buffer index of `coord` (a full-rank coordinate, rank
/// == `shape.rank()`) within a tensor of `shape`, treating any axis where
/// `shape`'s extent is 1 as a broadcast axis (index contribution 0).
fn broadcast_src_index(coord: &[usize; MAX_RANK], shape: &Shape, rank: usize) -> usize {
    let padded = shape.to_padded(rank);
    let mut strides = [0usize; MAX_RANK];
    let mut acc = 1usize;
    for i in (0..rank).rev() {
        strides[i] = acc;
        acc *= padded[i];
    }
    let mut idx = 0usize;
    for i in 0..rank {
        let c = if padded[i] == 1 { 0 } else { coord[i] };
        idx += c * strides[i];
    }
    idx
}

fn each_coord(shape: &Shape, rank: usize, mut visit: impl FnMut(&[usize; MAX_RANK])) {
    let padded = shape.to_padded(rank);
    let mut coord = [0usize; MAX_RANK];
    let total: usize = padded[..rank].iter().product::<usize>().max(1);
    if rank == 0 {
        visit(&coord);
        return;
    }
    for _ in 0..total {
        visit(&coord);
        for i in (0..rank).rev() {
            coord[i] += 1;
            if coord[i] < padded[i] {
                break;
            }
            coord[i] = 0;
        }
    }
}

/// Physically expands `t` to `target` (must be broadcast-compatible with
/// `t`'s shape and at least as large on every axis). Returns `t` itself
/// (still an `Rc` clone, no copy) when the shapes already match.
pub(crate) fn expand_to(t: &Tensor, target: Shape) -> Tensor {
    if t.shape() == target {
        return t.clone();
    }
    let rank = target.rank();
    let src = t.data();
    let mut out = vec![0.0f32; target.numel()];
    let mut i = 0usize;
    each_coord(&target, rank, |coord| {
        out[i] = src[broadcast_src_index(coord, &t.shape(), rank)];
        i += 1;
    });
    drop(src);
    Tensor::from_data(target, out, false)
}

/// Given two shapes, returns the broadcast result shape or panics (fatal
/// shape violation) if they are incompatible.
pub(crate) fn broadcast_result_shape(a: Shape, b: Shape) -> Shape {
    broadcast_shapes(a, b).unwrap_or_else(|| {
        crate::diagnostics::fatal_shape("broadcast", a, b);
    })
}

/// The inverse of broadcasting: sum-reduces `grad` (whose shape is some
/// broadcast result) back down to `target`, which must be `grad`'s shape
/// after zero or more axes were broadcast-expanded from size 1 (or omitted
/// entirely, for leading axes).
///
/// `spec.md` §4.2: iterate dimensions from last to first; wherever `target`
/// has extent 1 and `grad` has extent > 1, sum along that axis; wherever
/// `target` has fewer leading dimensions, sum and drop them.
pub(crate) fn shape_recover(grad: Tensor, target: Shape) -> Tensor {
    if grad.shape().dims() == target.dims() {
        return grad;
    }
    let rank = grad.shape().rank();
    let padded_target = target.to_padded(rank);
    let data = grad.data();
    let mut out = vec![0.0f32; target.numel()];
    each_coord(&grad.shape(), rank, |coord| {
        let src_idx = {
            let padded = grad.shape().to_padded(rank);
            let mut strides = [0usize; MAX_RANK];
            let mut acc = 1usize;
            for i in (0..rank).rev() {
                strides[i] = acc;
                acc *= padded[i];
            }
            let mut idx = 0usize;
            for i in 0..rank {
                idx += coord[i] * strides[i];
            }
            idx
        };
        let dst_idx = broadcast_src_index(coord, &target, rank);
        let _ = padded_target;
        out[dst_idx] += data[src_idx];
    });
    drop(data);
    Tensor::from_data(target, out, false)
}

/// `unsqueeze(t, axis)`: inserts a size-1 axis at `axis`. Same element
/// count and values, just a reshape.
pub(crate) fn unsqueeze(t: &Tensor, axis: usize) -> Tensor {
    let new_shape = t.shape().with_inserted_axis(axis);
    Tensor::from_data(new_shape, t.to_vec(), false)
}

/// Inverse of [`unsqueeze`]: removes a size-1 axis. Fatal if the axis isn't
/// actually size 1.
pub(crate) fn squeeze(t: &Tensor, axis: usize) -> Tensor {
    let dims = t.shape().dims();
    assert_eq!(dims[axis], 1, "domain violation: squeeze on a non-unit axis");
    let new_shape = t.shape().without_axis(axis);
    Tensor::from_data(new_shape, t.to_vec(), false)
}

/// Stable softmax over `axis`, computed directly on plain buffers (no
/// tensor/tape involvement) so loss kernels can reuse it without growing the
/// tape through an intermediate `softmax` call.
pub(crate) fn softmax_vec(data: &[f32], shape: &Shape, axis: usize) -> Vec<f32> {
    let stride = shape.strides()[axis];
    let size = shape.dims()[axis];
    let mut out = data.to_vec();
    for base in group_bases(shape, axis) {
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
    out
}

/// Base linear indices of every group along `axis`: the set of flat indices
/// whose `axis` coordinate is zero. Each group spans `base, base + stride,
/// ..., base + (size - 1) * stride` where `stride = shape.strides()[axis]`
/// and `size = shape.dims()[axis]`. Used by softmax and the axis-reductions
/// to walk "all the other axes" without materializing full coordinates.
pub(crate) fn group_bases(shape: &Shape, axis: usize) -> Vec<usize> {
    let stride = shape.strides()[axis];
    let size = shape.dims()[axis];
    let total = shape.numel();
    let mut bases = Vec::with_capacity(total / size.max(1));
    for idx in 0..total {
        if (idx / stride) % size == 0 {
            bases.push(idx);
        }
    }
    bases
}
