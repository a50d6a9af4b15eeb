//! Matrix multiplication, batched over any leading axes of the left operand
//! against a plain rank-2 right operand (`spec.md`'s weight-matrix shape).
//!
//! Forward and the two backward contractions are all expressed as calls into
//! `matrixmultiply::sgemm`, the same BLAS-less GEMM kernel `dfdx`'s CPU
//! backend uses in `src/tensor_ops/matmul/cpu_kernel.rs` — transposes are
//! expressed as stride tricks rather than physical copies.

use crate::autograd::OpKind;
use crate::diagnostics::fatal;
use crate::eval;
use crate::shape::Shape;
use crate::tensor::Tensor;

fn batch_count(dims: &[usize]) -> usize {
    dims.iter().product::<usize>().max(1)
}

/// `a @ b`. `a` may have any number of leading batch dimensions; `b` must be
/// rank 2 `[inner, p]` and is implicitly broadcast across `a`'s batch.
pub fn matmul(a: &Tensor, b: &Tensor) -> Tensor {
    let ar = a.rank();
    if ar < 2 {
        fatal(format!("domain violation: matmul lhs must be at least rank 2, got {ar}"));
    }
    if b.rank() != 2 {
        fatal(format!("domain violation: matmul rhs must be rank 2, got {}", b.rank()));
    }
    let a_dims = a.shape().dims();
    let (n, inner) = (a_dims[ar - 2], a_dims[ar - 1]);
    let b_dims = b.shape().dims();
    let (inner_b, p) = (b_dims[0], b_dims[1]);
    if inner != inner_b {
        fatal(format!(
            "shape violation: matmul inner dimensions disagree ({inner} vs {inner_b})"
        ));
    }
    let batch = batch_count(&a_dims[..ar - 2]);

    let mut out_dims = a_dims[..ar - 2].to_vec();
    out_dims.push(n);
    out_dims.push(p);
    let out_shape = Shape::new(&out_dims);

    let adata = a.to_vec();
    let bdata = b.to_vec();
    let mut out = vec![0.0f32; out_shape.numel()];
    for bi in 0..batch {
        let a_slice = &adata[bi * n * inner..(bi + 1) * n * inner];
        let out_slice = &mut out[bi * n * p..(bi + 1) * n * p];
        unsafe {
            matrixmultiply::sgemm(
                n,
                inner,
                p,
                1.0,
                a_slice.as_ptr(),
                inner as isize,
                1,
                bdata.as_ptr(),
                p as isize,
                1,
                0.0,
                out_slice.as_mut_ptr(),
                p as isize,
                1,
            );
        }
    }

    let mut result = Tensor::from_data(out_shape, out, false);
    if !eval::is_active() && (a.requires_grad() || b.requires_grad()) {
        result.set_grad_node(OpKind::Matmul, &[a.clone(), b.clone()]);
    }
    result
}

/// `input_index == 0` recovers `dL/dA = upstream @ B^T` (per batch);
/// `input_index == 1` recovers `dL/dB = sum_batch(A^T @ upstream)`, since `B`
/// carries no batch dimension of its own.
pub(crate) fn matmul_backward(output: &Tensor, input_index: usize, x_i: &Tensor, upstream: &Tensor) -> Tensor {
    let node = output.grad_node().expect("matmul output must be tracked");
    let node = node.borrow();
    let a = node.inputs[0].clone().expect("matmul missing lhs");
    let b = node.inputs[1].clone().expect("matmul missing rhs");
    drop(node);

    let ar = a.rank();
    let a_dims = a.shape().dims();
    let (n, inner) = (a_dims[ar - 2], a_dims[ar - 1]);
    let p = b.shape().dims()[1];
    let batch = batch_count(&a_dims[..ar - 2]);

    let adata = a.to_vec();
    let bdata = b.to_vec();
    let updata = upstream.to_vec();

    if input_index == 0 {
        let mut out = vec![0.0f32; a.numel()];
        for bi in 0..batch {
            let up_slice = &updata[bi * n * p..(bi + 1) * n * p];
            let out_slice = &mut out[bi * n * inner..(bi + 1) * n * inner];
            unsafe {
                // B^T viewed via strides: B is (inner, p) row-major, so B^T's
                // row stride is 1 and column stride is p.
                matrixmultiply::sgemm(
                    n,
                    p,
                    inner,
                    1.0,
                    up_slice.as_ptr(),
                    p as isize,
                    1,
                    bdata.as_ptr(),
                    1,
                    p as isize,
                    0.0,
                    out_slice.as_mut_ptr(),
                    inner as isize,
                    1,
                );
            }
        }
        Tensor::from_data(a.shape(), out, false)
    } else {
        let mut out = vec![0.0f32; inner * p];
        for bi in 0..batch {
            let a_slice = &adata[bi * n * inner..(bi + 1) * n * inner];
            let up_slice = &updata[bi * n * p..(bi + 1) * n * p];
            let mut tmp = vec![0.0f32; inner * p];
            unsafe {
                // A^T viewed via strides: A is (n, inner) row-major, so A^T's
                // row stride is 1 and column stride is `inner`.
                matrixmultiply::sgemm(
                    inner,
                    n,
                    p,
                    1.0,
                    a_slice.as_ptr(),
                    1,
                    inner as isize,
                    up_slice.as_ptr(),
                    p as isize,
                    1,
                    0.0,
                    tmp.as_mut_ptr(),
                    p as isize,
                    1,
                );
            }
            for (o, t) in out.iter_mut().zip(tmp.iter()) {
                *o += t;
            }
        }
        let _ = x_i;
        Tensor::from_data(b.shape(), out, false)
    }
}
