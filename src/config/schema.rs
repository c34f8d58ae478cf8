//! YAML schema for the selective loss

use crate::slm::{Reduction, IGNORE_INDEX};
use serde::{Deserialize, Serialize};

/// Top-level configuration file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlmConfig {
    /// Selective loss settings
    pub slm: SlmSpec,
}

/// Selective loss settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlmSpec {
    /// Fraction of each sequence trained on, in (0, 1]
    pub proportion_to_keep: f64,

    /// Label value excluded from the loss
    #[serde(default = "default_ignore_index")]
    pub ignore_index: i64,

    /// mean | sum | per_sequence
    #[serde(default)]
    pub reduction: Reduction,
}

fn default_ignore_index() -> i64 {
    IGNORE_INDEX
}

impl SlmSpec {
    pub fn new(proportion_to_keep: f64) -> Self {
        Self {
            proportion_to_keep,
            ignore_index: IGNORE_INDEX,
            reduction: Reduction::default(),
        }
    }
}
