//! Update pipeline configuration.

use rowmap_core::{Error, Result};
use serde::{Deserialize, Serialize};

/// Batch size used when none is configured.
pub const DEFAULT_MAX_BATCH_SIZE: usize = 42;

/// Settings shared by identity maps, ordering and batching for one save.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UpdateConfig {
    /// Include key values in identity conflict errors and logs
    pub sensitive_data_logging: bool,
    /// Maximum commands per batch (default: 42)
    pub max_batch_size: Option<usize>,
    /// Batches with fewer commands are not worth batching
    pub min_batch_size: usize,
}

impl Default for UpdateConfig {
    fn default() -> Self {
        Self {
            sensitive_data_logging: false,
            max_batch_size: None,
            min_batch_size: 1,
        }
    }
}

impl UpdateConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable or disable sensitive data logging.
    pub fn sensitive_data_logging(mut self, enabled: bool) -> Self {
        self.sensitive_data_logging = enabled;
        self
    }

    /// Set the maximum batch size.
    pub fn max_batch_size(mut self, size: usize) -> Self {
        self.max_batch_size = Some(size);
        self
    }

    /// Set the minimum batch size.
    pub fn min_batch_size(mut self, size: usize) -> Self {
        self.min_batch_size = size;
        self
    }

    /// The maximum batch size in effect.
    pub fn effective_max_batch_size(&self) -> usize {
        self.max_batch_size.unwrap_or(DEFAULT_MAX_BATCH_SIZE)
    }

    /// Check the settings are usable.
    pub fn validate(&self) -> Result<()> {
        if self.max_batch_size == Some(0) {
            return Err(Error::config("max_batch_size must be at least 1"));
        }
        if self.min_batch_size > self.effective_max_batch_size() {
            return Err(Error::config(format!(
                "min_batch_size ({}) exceeds max_batch_size ({})",
                self.min_batch_size,
                self.effective_max_batch_size()
            )));
        }
        Ok(())
    }

    /// Parse and validate a JSON configuration document.
    ///
    /// Missing fields take their default values.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        tracing::debug!(
            sensitive_data_logging = config.sensitive_data_logging,
            max_batch_size = config.effective_max_batch_size(),
            min_batch_size = config.min_batch_size,
            "Loaded update configuration"
        );
        Ok(config)
    }

    /// Serialize to a JSON document.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| Error::Serde(e.to_string()))
    }
}
