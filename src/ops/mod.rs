//! Operator library: one submodule per operator family, each exposing the
//! flat free functions that make up the public tensor API (`spec.md` §6).
//!
//! Every op follows the same three-step shape: (1) skip tape attachment
//! if [`crate::eval::is_active`] or no operand requires grad, (2) run the
//! forward kernel over plain `Vec<f32>` buffers, (3) attach a
//! [`crate::autograd::GradNode`] carrying the *original*, pre-broadcast
//! operands so [`crate::autograd::backward`] can redo the broadcast
//! expansion itself when it computes local gradients.

pub(crate) mod support;

pub mod activation;
pub mod binary;
pub mod loss;
pub mod matmul;
pub mod reduction;
pub mod unary;
