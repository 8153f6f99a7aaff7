//! Service configuration.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use redacta_core::{RedactaError, Result};
use redacta_trainer::{DEFAULT_DATASET, DEFAULT_MODEL_DIR, TrainerConfig};

/// Configuration for [`RedactionService`](crate::RedactionService).
///
/// Every field has a default, so a config file only needs the values it
/// changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Where the trained model is persisted and loaded from.
    pub model_dir: PathBuf,
    /// Dataset used when a train request carries no examples.
    pub dataset_path: PathBuf,
    /// Upper bound on a single inference call, in milliseconds.
    pub inference_timeout_ms: u64,
    /// Whether the fallback model runs the built-in pattern recognizers.
    pub patterns_enabled: bool,
    /// Training loop settings; `iterations` is the default for requests
    /// that do not name one.
    pub trainer: TrainerConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            model_dir: PathBuf::from(DEFAULT_MODEL_DIR),
            dataset_path: PathBuf::from(DEFAULT_DATASET),
            inference_timeout_ms: 5000,
            patterns_enabled: true,
            trainer: TrainerConfig::default(),
        }
    }
}

impl ServiceConfig {
    /// Create a configuration with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Read a JSON configuration file.
    ///
    /// # Errors
    ///
    /// `RedactaError::MissingResource` if the file does not exist,
    /// `RedactaError::Json` if it does not parse.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(RedactaError::MissingResource {
                path: path.to_path_buf(),
            });
        }
        let config = serde_json::from_str(&fs::read_to_string(path)?)?;
        tracing::debug!(path = %path.display(), "loaded service config");
        Ok(config)
    }

    pub fn with_model_dir(mut self, model_dir: impl Into<PathBuf>) -> Self {
        self.model_dir = model_dir.into();
        self
    }

    pub fn with_dataset_path(mut self, dataset_path: impl Into<PathBuf>) -> Self {
        self.dataset_path = dataset_path.into();
        self
    }

    pub fn with_inference_timeout(mut self, timeout: Duration) -> Self {
        self.inference_timeout_ms = timeout.as_millis().try_into().unwrap_or(u64::MAX);
        self
    }

    pub fn with_patterns(mut self, enabled: bool) -> Self {
        self.patterns_enabled = enabled;
        self
    }

    pub fn with_trainer(mut self, trainer: TrainerConfig) -> Self {
        self.trainer = trainer;
        self
    }

    pub fn inference_timeout(&self) -> Duration {
        Duration::from_millis(self.inference_timeout_ms)
    }

    pub fn default_iterations(&self) -> usize {
        self.trainer.iterations
    }
}
