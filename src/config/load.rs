//! Loading the selective loss configuration from YAML

use super::schema::{SlmConfig, SlmSpec};
use super::validate::validate_config;
use crate::error::{Error, Result};
use std::fs;
use std::path::Path;

/// Parse and validate a YAML document
pub fn parse_config(yaml: &str) -> Result<SlmSpec> {
    let config: SlmConfig = serde_yaml::from_str(yaml)
        .map_err(|e| Error::ConfigError(format!("Failed to parse YAML config: {e}")))?;

    validate_config(&config.slm).map_err(|e| Error::ConfigError(format!("Invalid config: {e}")))?;

    Ok(config.slm)
}

/// Read, parse and validate a YAML configuration file
///
/// # Example
///
/// ```no_run
/// use entrenar_slm::config::load_config;
/// use entrenar_slm::slm::SelectiveLoss;
///
/// let spec = load_config("slm.yaml")?;
/// let loss_fn = SelectiveLoss::from_spec(&spec)?;
/// # Ok::<(), entrenar_slm::Error>(())
/// ```
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<SlmSpec> {
    let yaml = fs::read_to_string(path.as_ref())?;
    let spec = parse_config(&yaml)?;

    tracing::debug!(
        path = %path.as_ref().display(),
        proportion_to_keep = spec.proportion_to_keep,
        ignore_index = spec.ignore_index,
        reduction = ?spec.reduction,
        "loaded selective loss config"
    );
    Ok(spec)
}
