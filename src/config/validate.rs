//! Configuration validation

use super::schema::SlmSpec;
use crate::slm::proportion_in_range;

#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("Invalid proportion_to_keep: {0} (must be in (0, 1])")]
    InvalidProportion(f64),

    #[error("Invalid ignore_index: {0} (must be negative so it cannot collide with a vocabulary id)")]
    InvalidIgnoreIndex(i64),
}

/// Validate a selective loss specification
///
/// Checks:
/// - `proportion_to_keep` lies in (0, 1]
/// - `ignore_index` is negative
pub fn validate_config(spec: &SlmSpec) -> Result<(), ValidationError> {
    if !proportion_in_range(spec.proportion_to_keep) {
        return Err(ValidationError::InvalidProportion(spec.proportion_to_keep));
    }

    if spec.ignore_index >= 0 {
        return Err(ValidationError::InvalidIgnoreIndex(spec.ignore_index));
    }

    Ok(())
}
