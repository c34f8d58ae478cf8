//! Token-level cross-entropy with an ignore index
//!
//! `loss_i = logsumexp(z_i) - z_i[c_i]` for every position whose label is not
//! the ignore index. Gradient w.r.t. the logits row is
//! `weight * (softmax(z_i) - onehot(c_i))`, zero on ignored rows.

use super::logits::Logits;
use super::selection::{check_shapes, label_class};
use crate::autograd::{BackwardOp, Tensor};
use crate::error::{Error, Result};
use ndarray::{Array1, Array2, ArrayView1};
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::rc::Rc;

/// How token losses are combined into the output tensor
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reduction {
    /// One value: mean over every non-ignored position in the batch
    #[default]
    Mean,
    /// One value: sum over every non-ignored position
    Sum,
    /// `B` values: mean over the non-ignored positions of each sequence.
    /// A sequence with nothing left contributes 0.
    PerSequence,
}

impl Reduction {
    fn output_len(self, batch: usize) -> usize {
        match self {
            Reduction::Mean | Reduction::Sum => 1,
            Reduction::PerSequence => batch,
        }
    }
}

/// `log(sum(exp(row)))`, shifted by the row max
fn log_sum_exp(row: ArrayView1<'_, f32>) -> f32 {
    let max = row.fold(f32::NEG_INFINITY, |a, &b| a.max(b));
    if max == f32::NEG_INFINITY {
        return max;
    }
    max + row.mapv(|x| (x - max).exp()).sum().ln()
}

/// One contributing position
struct Target {
    /// Flattened position `b * L + l`
    index: usize,
    class: usize,
    /// Slot in the output tensor
    output: usize,
    /// d(output) / d(token loss)
    weight: f32,
    /// softmax of the logits row, kept for the backward pass
    probs: Option<Array1<f32>>,
}

/// Cross-entropy of `logits` against `labels`, skipping `ignore_index`.
///
/// Ignored positions count in neither the numerator nor the divisor. With
/// [`Reduction::Mean`] a batch where every position is ignored is an error
/// instead of `NaN`.
pub fn masked_cross_entropy(
    logits: &Logits,
    labels: &Array2<i64>,
    ignore_index: i64,
    reduction: Reduction,
) -> Result<Tensor> {
    let shape = logits.shape();
    check_shapes(shape, shape, labels.dim())?;
    let requires_grad = logits.requires_grad();

    let mut targets = Vec::new();
    let mut token_losses = Vec::new();
    let mut row_counts = vec![0usize; shape.batch];

    for ((b, l), &label) in labels.indexed_iter() {
        let Some(class) = label_class(label, ignore_index, shape.vocab, b, l)? else {
            continue;
        };
        let index = b * shape.seq_len + l;
        let row = logits.row(index);
        let lse = log_sum_exp(row);

        token_losses.push(lse - row[class]);
        row_counts[b] += 1;
        targets.push(Target {
            index,
            class,
            output: 0,
            weight: 1.0,
            probs: requires_grad.then(|| row.mapv(|x| (x - lse).exp())),
        });
    }

    let values = match reduction {
        Reduction::Mean => {
            if targets.is_empty() {
                return Err(Error::NoValidTargets { ignore_index });
            }
            let n = targets.len() as f32;
            for target in &mut targets {
                target.weight = 1.0 / n;
            }
            vec![token_losses.iter().sum::<f32>() / n]
        }
        Reduction::Sum => vec![token_losses.iter().sum::<f32>()],
        Reduction::PerSequence => {
            let mut per_row = vec![0.0f32; shape.batch];
            for (target, loss) in targets.iter_mut().zip(&token_losses) {
                let b = target.index / shape.seq_len;
                let n = row_counts[b] as f32;
                target.output = b;
                target.weight = 1.0 / n;
                per_row[b] += loss / n;
            }
            per_row
        }
    };
    debug_assert_eq!(values.len(), reduction.output_len(shape.batch));

    let mut result = Tensor::from_vec(values, requires_grad);
    if requires_grad {
        result.set_backward_op(Rc::new(CrossEntropyBackward {
            logits: logits.tensor().clone(),
            vocab: shape.vocab,
            targets,
            result_grad: result.grad_cell(),
        }));
    }
    Ok(result)
}

struct CrossEntropyBackward {
    logits: Tensor,
    vocab: usize,
    targets: Vec<Target>,
    result_grad: Rc<RefCell<Option<Array1<f32>>>>,
}

impl BackwardOp for CrossEntropyBackward {
    fn backward(&self) {
        if let Some(grad_output) = self.result_grad.borrow().as_ref() {
            let mut grad = Array1::<f32>::zeros(self.logits.len());

            for target in &self.targets {
                let Some(probs) = target.probs.as_ref() else {
                    continue;
                };
                let scale = grad_output[target.output] * target.weight;
                let start = target.index * self.vocab;
                for (v, &p) in probs.iter().enumerate() {
                    let onehot = if v == target.class { 1.0 } else { 0.0 };
                    grad[start + v] += scale * (p - onehot);
                }
            }

            self.logits.accumulate_grad(grad);

            if let Some(op) = self.logits.backward_op() {
                op.backward();
            }
        }
    }
}
