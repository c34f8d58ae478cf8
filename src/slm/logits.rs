//! Shape-carrying wrapper around flattened `(B, L, V)` logits

use crate::autograd::Tensor;
use crate::error::{Error, Result};
use ndarray::{s, Array3, ArrayView1};

/// Dimensions of a logits tensor: batch, sequence length, vocabulary
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogitsShape {
    pub batch: usize,
    pub seq_len: usize,
    pub vocab: usize,
}

impl LogitsShape {
    /// Create a shape from its three dimensions
    pub fn new(batch: usize, seq_len: usize, vocab: usize) -> Self {
        Self {
            batch,
            seq_len,
            vocab,
        }
    }

    /// Number of token positions, `B * L`
    pub fn positions(&self) -> usize {
        self.batch * self.seq_len
    }

    /// Total number of logits, `B * L * V`
    pub fn numel(&self) -> usize {
        self.positions() * self.vocab
    }

    /// Dimensions as `[B, L, V]`, for error reporting
    pub fn to_vec(self) -> Vec<usize> {
        vec![self.batch, self.seq_len, self.vocab]
    }
}

/// Per-token logits of one model.
///
/// Values live in a flat [`Tensor`] so that gradients reach the caller's
/// tensor; row `i` of the flattened `(B * L, V)` view belongs to batch
/// `i / L`, position `i % L`.
#[derive(Debug, Clone)]
pub struct Logits {
    tensor: Tensor,
    shape: LogitsShape,
}

impl Logits {
    /// Flatten an owned `(B, L, V)` array (logical row-major order)
    pub fn new(data: Array3<f32>, requires_grad: bool) -> Self {
        let (batch, seq_len, vocab) = data.dim();
        let flat: Vec<f32> = data.iter().copied().collect();
        Self {
            tensor: Tensor::from_vec(flat, requires_grad),
            shape: LogitsShape::new(batch, seq_len, vocab),
        }
    }

    /// Wrap an existing tensor, e.g. the output of a model forward pass.
    ///
    /// The tensor is shared, not copied, so gradients computed through the
    /// returned `Logits` land in `tensor`.
    pub fn from_tensor(tensor: Tensor, shape: LogitsShape) -> Result<Self> {
        if tensor.len() != shape.numel() {
            return Err(Error::ShapeMismatch {
                expected: shape.to_vec(),
                got: vec![tensor.len()],
            });
        }
        Ok(Self { tensor, shape })
    }

    /// Get the `(B, L, V)` shape
    pub fn shape(&self) -> LogitsShape {
        self.shape
    }

    /// Get the underlying flat tensor
    pub fn tensor(&self) -> &Tensor {
        &self.tensor
    }

    /// Check if the logits track gradients
    pub fn requires_grad(&self) -> bool {
        self.tensor.requires_grad()
    }

    /// Same values, outside the gradient graph
    pub fn detach(&self) -> Logits {
        Logits {
            tensor: self.tensor.detach(),
            shape: self.shape,
        }
    }

    /// Vocabulary row of flattened position `index` (`b * L + l`)
    pub fn row(&self, index: usize) -> ArrayView1<'_, f32> {
        let v = self.shape.vocab;
        self.tensor.data().slice(s![index * v..(index + 1) * v])
    }

    /// Logit for class `class` at flattened position `index`
    pub fn at(&self, index: usize, class: usize) -> f32 {
        self.tensor.data()[index * self.shape.vocab + class]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;

    #[test]
    fn test_flatten_is_row_major() {
        let data = Array3::from_shape_fn((2, 3, 4), |(b, l, v)| (b * 100 + l * 10 + v) as f32);
        let logits = Logits::new(data, false);

        assert_eq!(logits.shape(), LogitsShape::new(2, 3, 4));
        // flattened index 4 is batch 1, position 1
        assert_eq!(logits.row(4).to_vec(), vec![110.0, 111.0, 112.0, 113.0]);
        assert_eq!(logits.at(5, 2), 122.0);
    }

    #[test]
    fn test_from_tensor_checks_length() {
        let tensor = Tensor::zeros(10, true);
        let err = Logits::from_tensor(tensor, LogitsShape::new(1, 3, 4)).unwrap_err();
        assert!(matches!(err, Error::ShapeMismatch { .. }));
    }

    #[test]
    fn test_from_tensor_shares_gradient() {
        let tensor = Tensor::zeros(6, true);
        let logits = Logits::from_tensor(tensor.clone(), LogitsShape::new(1, 2, 3)).unwrap();
        logits.tensor().set_grad(ndarray::Array1::ones(6));
        assert!(tensor.grad().is_some());
    }

    #[test]
    fn test_detach_keeps_values() {
        let logits = Logits::new(Array3::from_elem((1, 2, 2), 0.5), true);
        let detached = logits.detach();
        assert!(!detached.requires_grad());
        assert_eq!(detached.shape(), logits.shape());
        assert_eq!(detached.tensor().data(), logits.tensor().data());
    }

    #[test]
    fn test_detach_does_not_copy_logits() {
        let logits = Logits::new(Array3::from_elem((2, 8, 64), 1.0), true);
        let detached = logits.detach();
        assert_eq!(
            logits.tensor().data().as_ptr(),
            detached.tensor().data().as_ptr()
        );
    }

    #[test]
    fn test_shape_counts() {
        let shape = LogitsShape::new(2, 3, 5);
        assert_eq!(shape.positions(), 6);
        assert_eq!(shape.numel(), 30);
        assert_eq!(shape.to_vec(), vec![2, 3, 5]);
    }
}
