//! Minimal tape-based autograd
//!
//! Only what the selective loss needs: a flat f32 [`Tensor`] with a shared
//! gradient cell, a [`BackwardOp`] hook per graph node, stop-gradient via
//! [`Tensor::detach`], and the reductions used on per-sequence losses.

mod backward;
mod ops;
mod tensor;


pub use backward::BackwardOp;
pub use ops::{mean, sum};
pub use tensor::Tensor;

/// Run the backward pass from `tensor`.
///
/// With `grad_output = None` the seed gradient is all ones, which is the
/// usual choice for a scalar loss.
pub fn backward(tensor: &mut Tensor, grad_output: Option<ndarray::Array1<f32>>) {
    let seed = grad_output.unwrap_or_else(|| ndarray::Array1::ones(tensor.len()));
    tensor.set_grad(seed);

    if let Some(op) = tensor.backward_op() {
        op.backward();
    }
}
