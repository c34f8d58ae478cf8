//! Selective Language Modeling loss

use super::cross_entropy::{masked_cross_entropy, Reduction};
use super::logits::Logits;
use super::selection::{check_proportion, keep_count, TokenSelection, IGNORE_INDEX};
use crate::autograd::Tensor;
use crate::config::SlmSpec;
use crate::error::Result;
use ndarray::Array2;
use tracing::debug;

/// Cross-entropy restricted to the tokens where the student lags the teacher
///
/// # Formula
///
/// ```text
/// excess[b, l] = teacher[b, l, y] - student[b, l, y]        (raw logits, no grad)
/// keep[b, l]   = excess[b, l] >= kth_largest(excess[b, :])  k = floor(p * L)
/// L            = CE(student, y) over kept positions
/// ```
///
/// # Example
///
/// ```
/// use entrenar_slm::slm::{Logits, SelectiveLoss};
/// use entrenar_slm::backward;
/// use ndarray::{array, Array3};
///
/// let student = Logits::new(Array3::from_elem((1, 4, 3), 0.0), true);
/// let teacher = Logits::new(Array3::from_elem((1, 4, 3), 1.0), false);
/// let labels = array![[0, 1, 2, 0]];
///
/// let loss_fn = SelectiveLoss::new(0.5)?;
/// let mut loss = loss_fn.forward(&student, &teacher, &labels)?;
/// assert!(loss.data()[0] > 0.0);
///
/// backward(&mut loss, None);
/// assert!(student.tensor().grad().is_some());
/// # Ok::<(), entrenar_slm::Error>(())
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct SelectiveLoss {
    proportion_to_keep: f64,
    ignore_index: i64,
    reduction: Reduction,
}

impl SelectiveLoss {
    /// Keep `proportion_to_keep` of each sequence, in `(0, 1]`.
    ///
    /// Whether the proportion yields at least one token depends on the
    /// sequence length, so that check happens per call.
    pub fn new(proportion_to_keep: f64) -> Result<Self> {
        check_proportion(proportion_to_keep)?;
        Ok(Self {
            proportion_to_keep,
            ignore_index: IGNORE_INDEX,
            reduction: Reduction::default(),
        })
    }

    /// Build from a validated configuration
    pub fn from_spec(spec: &SlmSpec) -> Result<Self> {
        Ok(Self::new(spec.proportion_to_keep)?
            .with_ignore_index(spec.ignore_index)
            .with_reduction(spec.reduction))
    }

    /// Use `ignore_index` instead of `-100` as the excluded label
    pub fn with_ignore_index(mut self, ignore_index: i64) -> Self {
        self.ignore_index = ignore_index;
        self
    }

    /// Set how token losses are combined
    pub fn with_reduction(mut self, reduction: Reduction) -> Self {
        self.reduction = reduction;
        self
    }

    /// Fraction of each sequence trained on
    pub fn proportion_to_keep(&self) -> f64 {
        self.proportion_to_keep
    }

    /// Label value excluded from the loss
    pub fn ignore_index(&self) -> i64 {
        self.ignore_index
    }

    /// Reduction applied to token losses
    pub fn reduction(&self) -> Reduction {
        self.reduction
    }

    /// Positions kept per sequence of length `seq_len`
    pub fn keep_count(&self, seq_len: usize) -> Result<usize> {
        keep_count(self.proportion_to_keep, seq_len)
    }

    /// Rank tokens by excess loss without computing the loss
    pub fn select(
        &self,
        student: &Logits,
        teacher: &Logits,
        labels: &Array2<i64>,
    ) -> Result<TokenSelection> {
        TokenSelection::compute(
            student,
            teacher,
            labels,
            self.proportion_to_keep,
            self.ignore_index,
        )
    }

    /// Compute the loss; gradients reach `student` only
    pub fn forward(
        &self,
        student: &Logits,
        teacher: &Logits,
        labels: &Array2<i64>,
    ) -> Result<Tensor> {
        self.forward_with_selection(student, teacher, labels)
            .map(|(loss, _)| loss)
    }

    /// Compute the loss and return the selection it was computed on
    pub fn forward_with_selection(
        &self,
        student: &Logits,
        teacher: &Logits,
        labels: &Array2<i64>,
    ) -> Result<(Tensor, TokenSelection)> {
        let selection = self.select(student, teacher, labels)?;
        let loss = masked_cross_entropy(
            student,
            &selection.labels,
            self.ignore_index,
            self.reduction,
        )?;

        debug!(
            reduction = ?self.reduction,
            kept = selection.num_kept(),
            loss = ?loss.data().as_slice(),
            "selective loss"
        );
        Ok((loss, selection))
    }
}

/// SLM loss with the default ignore index (`-100`) and a global mean.
///
/// Returns a length-1 tensor.
pub fn slm_loss(
    student: &Logits,
    teacher: &Logits,
    labels: &Array2<i64>,
    proportion_to_keep: f64,
) -> Result<Tensor> {
    SelectiveLoss::new(proportion_to_keep)?.forward(student, teacher, labels)
}
