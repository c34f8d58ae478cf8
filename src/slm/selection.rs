//! Excess-loss ranking and top-k token selection
//!
//! Everything here runs on detached logits: selection decides which labels
//! survive, it never contributes gradient.

use super::logits::{Logits, LogitsShape};
use crate::error::{Error, Result};
use ndarray::{Array1, Array2, ArrayView1, Axis, Zip};
use tracing::{debug, trace};

/// Label value that excludes a position from the loss
pub const IGNORE_INDEX: i64 = -100;

/// `true` for a proportion in `(0, 1]`; `NaN` is rejected
pub(crate) fn proportion_in_range(proportion: f64) -> bool {
    proportion > 0.0 && proportion <= 1.0
}

/// Reject a keep proportion outside `(0, 1]`
pub(crate) fn check_proportion(proportion: f64) -> Result<()> {
    if !proportion_in_range(proportion) {
        return Err(Error::InvalidParameter(format!(
            "proportion_to_keep must be in (0, 1], got {proportion}"
        )));
    }
    Ok(())
}

/// Number of positions kept per sequence: `floor(proportion * seq_len)`.
///
/// Fails for a proportion outside `(0, 1]` and when the product rounds
/// down to zero.
pub fn keep_count(proportion: f64, seq_len: usize) -> Result<usize> {
    check_proportion(proportion)?;

    let k = (proportion * seq_len as f64).floor() as usize;
    if k == 0 {
        return Err(Error::DegenerateKeepCount {
            proportion,
            seq_len,
        });
    }
    Ok(k)
}

/// Check that student, teacher and labels agree on `(B, L, V)`
pub(crate) fn check_shapes(
    student: LogitsShape,
    teacher: LogitsShape,
    labels: (usize, usize),
) -> Result<()> {
    if student != teacher {
        return Err(Error::ShapeMismatch {
            expected: student.to_vec(),
            got: teacher.to_vec(),
        });
    }
    if (student.batch, student.seq_len) != labels {
        return Err(Error::ShapeMismatch {
            expected: vec![student.batch, student.seq_len],
            got: vec![labels.0, labels.1],
        });
    }
    if student.batch == 0 || student.vocab == 0 {
        return Err(Error::InvalidParameter(format!(
            "logits need a non-empty batch and vocabulary, got {:?}",
            student.to_vec()
        )));
    }
    Ok(())
}

/// Resolve a label to a vocabulary column.
///
/// `Ok(None)` for the ignore sentinel, an error for anything else outside
/// `[0, vocab)`.
pub(crate) fn label_class(
    label: i64,
    ignore_index: i64,
    vocab: usize,
    batch: usize,
    position: usize,
) -> Result<Option<usize>> {
    if label == ignore_index {
        return Ok(None);
    }
    match usize::try_from(label) {
        Ok(class) if class < vocab => Ok(Some(class)),
        _ => Err(Error::LabelOutOfRange {
            batch,
            position,
            label,
            vocab,
        }),
    }
}

/// Per-position excess loss, `(B, L)`.
///
/// `excess = (-student[label]) - (-teacher[label])` on raw logits. Positions
/// whose label is already `ignore_index` get `-inf` so they rank below every
/// real token.
pub fn excess_loss(
    student: &Logits,
    teacher: &Logits,
    labels: &Array2<i64>,
    ignore_index: i64,
) -> Result<Array2<f32>> {
    let shape = student.shape();
    check_shapes(shape, teacher.shape(), labels.dim())?;

    let student = student.detach();
    let teacher = teacher.detach();

    let mut excess = Array2::<f32>::zeros(labels.dim());
    for ((b, l), &label) in labels.indexed_iter() {
        let index = b * shape.seq_len + l;
        excess[[b, l]] = match label_class(label, ignore_index, shape.vocab, b, l)? {
            Some(class) => {
                let student_loss = -student.at(index, class);
                let teacher_loss = -teacher.at(index, class);
                student_loss - teacher_loss
            }
            None => f32::NEG_INFINITY,
        };
    }
    Ok(excess)
}

/// k-th largest value of `row` (1-based `k`, `k <= row.len()`)
fn kth_largest(row: ArrayView1<'_, f32>, k: usize) -> f32 {
    let mut values = row.to_vec();
    let (_, kth, _) = values.select_nth_unstable_by(k - 1, |a, b| b.total_cmp(a));
    *kth
}

/// Outcome of ranking one batch: which labels survive and why
#[derive(Debug, Clone)]
pub struct TokenSelection {
    /// Excess loss per position, `(B, L)`
    pub excess_loss: Array2<f32>,
    /// k-th largest excess loss of each row, `(B,)`
    pub thresholds: Array1<f32>,
    /// Copy of the input labels with dropped positions set to `ignore_index`
    pub labels: Array2<i64>,
    /// Positions requested per row
    pub keep_count: usize,
    pub ignore_index: i64,
}

impl TokenSelection {
    /// Rank positions by excess loss and mask everything below each row's
    /// k-th largest value.
    ///
    /// Ties at the threshold are all kept, so a row can keep more than `k`
    /// positions. The input `labels` are left untouched.
    pub fn compute(
        student: &Logits,
        teacher: &Logits,
        labels: &Array2<i64>,
        proportion_to_keep: f64,
        ignore_index: i64,
    ) -> Result<Self> {
        let shape = student.shape();
        check_shapes(shape, teacher.shape(), labels.dim())?;
        let k = keep_count(proportion_to_keep, shape.seq_len)?;

        let excess = excess_loss(student, teacher, labels, ignore_index)?;
        let thresholds: Array1<f32> = excess
            .axis_iter(Axis(0))
            .map(|row| kth_largest(row, k))
            .collect();

        let mut masked = labels.clone();
        for (b, (row, &threshold)) in masked
            .axis_iter_mut(Axis(0))
            .zip(thresholds.iter())
            .enumerate()
        {
            trace!(row = b, threshold, "excess loss threshold");
            Zip::from(row)
                .and(excess.row(b))
                .for_each(|label, &value| {
                    if value < threshold {
                        *label = ignore_index;
                    }
                });
        }

        let selection = Self {
            excess_loss: excess,
            thresholds,
            labels: masked,
            keep_count: k,
            ignore_index,
        };
        debug!(
            batch = shape.batch,
            seq_len = shape.seq_len,
            vocab = shape.vocab,
            keep_count = k,
            kept = selection.num_kept(),
            "selected tokens by excess loss"
        );
        Ok(selection)
    }

    /// `true` where the masked label still points at a vocabulary entry
    pub fn kept_mask(&self) -> Array2<bool> {
        self.labels.mapv(|label| label != self.ignore_index)
    }

    /// Whether position `position` of row `batch` survived selection
    pub fn is_kept(&self, batch: usize, position: usize) -> bool {
        self.labels[[batch, position]] != self.ignore_index
    }

    /// Kept positions in each batch row
    pub fn kept_per_row(&self) -> Vec<usize> {
        self.labels
            .axis_iter(Axis(0))
            .map(|row| row.iter().filter(|&&l| l != self.ignore_index).count())
            .collect()
    }

    /// Kept positions over the whole batch
    pub fn num_kept(&self) -> usize {
        self.labels
            .iter()
            .filter(|&&l| l != self.ignore_index)
            .count()
    }
}
