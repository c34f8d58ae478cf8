//! Reductions with backward passes

use super::tensor::GradCell;
use super::{BackwardOp, Tensor};
use ndarray::Array1;
use std::rc::Rc;

/// Sum all elements into a length-1 tensor
pub fn sum(a: &Tensor) -> Tensor {
    reduce(a, a.data().sum(), 1.0)
}

/// Arithmetic mean of all elements as a length-1 tensor.
///
/// Used to turn per-sequence losses into a batch loss. An empty input gives 0.
pub fn mean(a: &Tensor) -> Tensor {
    if a.is_empty() {
        return reduce(a, 0.0, 0.0);
    }
    let n = a.len() as f32;
    reduce(a, a.data().sum() / n, 1.0 / n)
}

fn reduce(a: &Tensor, value: f32, weight: f32) -> Tensor {
    let mut result = Tensor::new(Array1::from(vec![value]), a.requires_grad());

    if a.requires_grad() {
        result.set_backward_op(Rc::new(ReduceBackward {
            a: a.clone(),
            weight,
            result_grad: result.grad_cell(),
        }));
    }

    result
}

struct ReduceBackward {
    a: Tensor,
    weight: f32,
    result_grad: GradCell,
}

impl BackwardOp for ReduceBackward {
    fn backward(&self) {
        if let Some(grad) = self.result_grad.borrow().as_ref() {
            // every input element contributes `weight` to the single output
            let grad_a = Array1::from_elem(self.a.len(), grad[0] * self.weight);
            self.a.accumulate_grad(grad_a);

            if let Some(op) = self.a.backward_op() {
                op.backward();
            }
        }
    }
}
