//! Declarative YAML configuration
//!
//! # Example
//!
//! ```yaml
//! slm:
//!   proportion_to_keep: 0.6
//!   ignore_index: -100      # optional
//!   reduction: mean         # mean | sum | per_sequence
//! ```

mod load;
mod schema;
mod validate;


pub use load::{load_config, parse_config};
pub use schema::{SlmConfig, SlmSpec};
pub use validate::{validate_config, ValidationError};
