//! Unary elementwise operators (`neg`, `abs`, `square`, `reciprocal`) plus the
//! structural reshapes `transpose` and `unsqueeze`.

use crate::autograd::{OpKind, UnaryOp, UnaryOpKind};
use crate::eval;
use crate::ops::support;
use crate::shape::{Shape, MAX_RANK};
use crate::tensor::Tensor;

fn unary_forward(kind: UnaryOpKind, a: &Tensor) -> Tensor {
    let data: Vec<f32> = a.to_vec().iter().map(|&x| kind.f(x)).collect();
    let mut out = Tensor::from_data(a.shape(), data, false);
    if !eval::is_active() && a.requires_grad() {
        out.set_grad_node(OpKind::Unary(kind), &[a.clone()]);
    }
    out
}

/// `-a`.
pub fn neg(a: &Tensor) -> Tensor {
    unary_forward(UnaryOpKind::Neg, a)
}

/// `|a|`.
pub fn abs(a: &Tensor) -> Tensor {
    unary_forward(UnaryOpKind::Abs, a)
}

/// `a * a`.
pub fn square(a: &Tensor) -> Tensor {
    unary_forward(UnaryOpKind::Square, a)
}

/// `1 / a`.
pub fn reciprocal(a: &Tensor) -> Tensor {
    unary_forward(UnaryOpKind::Reciprocal, a)
}

/// Swaps axes `i` and `j` of `a`, permuting the underlying data (not a view).
pub fn transpose(a: &Tensor, i: usize, j: usize) -> Tensor {
    let r = a.rank();
    if i >= r || j >= r {
        crate::diagnostics::fatal(format!("domain violation: transpose axes ({i}, {j}) out of range for rank {r}"));
    }
    let dims = a.shape().dims().to_vec();
    let mut out_dims = dims.clone();
    out_dims.swap(i, j);
    let out_shape = Shape::new(&out_dims);

    let in_strides = a.shape().strides();
    let mut out_strides = [0usize; MAX_RANK];
    {
        let mut acc = 1usize;
        for k in (0..r).rev() {
            out_strides[k] = acc;
            acc *= out_dims[k];
        }
    }

    let src = a.to_vec();
    let mut dst = vec![0.0f32; src.len()];
    let mut coord = vec![0usize; r];
    for _ in 0..src.len().max(1) {
        let mut src_coord = coord.clone();
        src_coord.swap(i, j);
        let src_idx: usize = src_coord.iter().zip(in_strides.iter()).map(|(&c, &s)| c * s).sum();
        let dst_idx: usize = coord.iter().zip(out_strides.iter()).map(|(&c, &s)| c * s).sum();
        dst[dst_idx] = src[src_idx];
        if r == 0 {
            break;
        }
        for k in (0..r).rev() {
            coord[k] += 1;
            if coord[k] < out_dims[k] {
                break;
            }
            coord[k] = 0;
        }
    }

    let mut out = Tensor::from_data(out_shape, dst, false);
    if !eval::is_active() && a.requires_grad() {
        out.set_grad_node(OpKind::Transpose(i, j), &[a.clone()]);
    }
    out
}

/// Inserts a size-1 axis at `axis`.
pub fn unsqueeze(a: &Tensor, axis: usize) -> Tensor {
    let mut out = support::unsqueeze(a, axis);
    if !eval::is_active() && a.requires_grad() {
        out.set_grad_node(OpKind::Unsqueeze(axis), &[a.clone()]);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::autograd::{backward, grad};

    #[test]
    fn transpose_2d_matches_manual() {
        let a = Tensor::from_data(Shape::new(&[2, 3]), (0..6).map(|x| x as f32).collect(), false);
        let t = transpose(&a, 0, 1);
        assert_eq!(t.shape().dims(), &[3, 2]);
        assert_eq!(t.to_vec(), vec![0.0, 3.0, 1.0, 4.0, 2.0, 5.0]);
    }

    #[test]
    fn transpose_backward_swaps_grad_back() {
        let a = Tensor::from_data(Shape::new(&[2, 3]), (0..6).map(|x| x as f32).collect(), true);
        let t = transpose(&a, 0, 1);
        backward(&t, Some(Tensor::ones(t.shape(), false)));
        assert_eq!(grad(&a).unwrap().to_vec(), vec![1.0; 6]);
    }

    #[test]
    fn square_backward_is_2x() {
        let a = Tensor::from_data(Shape::new(&[1]), vec![4.0], true);
        let s = square(&a);
        backward(&s, None);
        assert_eq!(grad(&a).unwrap().to_vec(), vec![8.0]);
    }
}
