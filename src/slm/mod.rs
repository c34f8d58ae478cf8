//! Selective Language Modeling (SLM) loss
//!
//! Distillation by token selection: instead of matching the teacher's whole
//! distribution, the student trains with plain cross-entropy on the tokens
//! where it does worst relative to the teacher.
//!
//! ## Pipeline
//!
//! 1. **Excess loss**: per token, `teacher[y] - student[y]` on the raw logits
//!    of the true label, computed on detached copies
//! 2. **Selection**: per sequence, keep tokens whose excess loss reaches the
//!    k-th largest value, `k = floor(proportion_to_keep * L)`
//! 3. **Loss**: cross-entropy of the student logits on the kept tokens, with
//!    every other position set to the ignore index (`-100`)
//!
//! ## Example
//!
//! ```
//! use entrenar_slm::slm::{slm_loss, Logits, IGNORE_INDEX};
//! use ndarray::{array, Array3};
//!
//! let student = Logits::new(Array3::from_elem((2, 4, 5), 0.1), true);
//! let teacher = Logits::new(Array3::from_elem((2, 4, 5), 0.3), false);
//! let labels = array![[1, 2, 3, 4], [0, 1, IGNORE_INDEX, IGNORE_INDEX]];
//!
//! let loss = slm_loss(&student, &teacher, &labels, 0.5)?;
//! assert_eq!(loss.len(), 1);
//! # Ok::<(), entrenar_slm::Error>(())
//! ```

mod cross_entropy;
mod logits;
mod loss;
mod selection;


pub use cross_entropy::{masked_cross_entropy, Reduction};
pub use logits::{Logits, LogitsShape};
pub use loss::{slm_loss, SelectiveLoss};
pub use selection::{excess_loss, keep_count, TokenSelection, IGNORE_INDEX};
pub(crate) use selection::proportion_in_range;
