//! Error types for entrenar-slm

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Shape mismatch: expected {expected:?}, got {got:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        got: Vec<usize>,
    },

    #[error("Label {label} at (batch {batch}, position {position}) is outside vocabulary of size {vocab}")]
    LabelOutOfRange {
        batch: usize,
        position: usize,
        label: i64,
        vocab: usize,
    },

    #[error(
        "Keep count is zero: floor({proportion} * {seq_len}) < 1, raise proportion_to_keep or sequence length"
    )]
    DegenerateKeepCount { proportion: f64, seq_len: usize },

    #[error("No target position left after masking with ignore index {ignore_index}")]
    NoValidTargets { ignore_index: i64 },

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
}

pub type Result<T> = std::result::Result<T, Error>;
