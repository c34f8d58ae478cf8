//! # entrenar-slm: Selective Language Modeling loss
//!
//! Token-selective distillation: the student is trained with ordinary
//! cross-entropy, but only on the tokens where its loss most exceeds the
//! teacher's.
//!
//! ## Architecture
//!
//! - **autograd**: Minimal tape-based automatic differentiation
//! - **slm**: Excess-loss ranking, top-k token selection, masked cross-entropy
//! - **config**: Declarative YAML configuration

pub mod autograd;
pub mod config;
pub mod slm;

pub mod error;

// Re-export commonly used types
pub use autograd::{backward, Tensor};
pub use error::{Error, Result};
pub use slm::{slm_loss, Logits, Reduction, SelectiveLoss, TokenSelection, IGNORE_INDEX};
