//! # Model Handle
//!
//! Owns the live engine as an immutable snapshot. Readers clone the current
//! `Arc` under a shared lock and run inference without holding it; a new
//! model is swapped in under the exclusive lock once it is fully trained and
//! persisted, so no reader ever sees a partially updated model.

use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use crate::engine::NerEngine;
use crate::error::{RedactaError, Result};

/// Swappable owner of the process's model instance.
#[derive(Debug)]
pub struct ModelHandle<E> {
    current: RwLock<Arc<E>>,
    model_dir: PathBuf,
}

impl<E: NerEngine> ModelHandle<E> {
    /// Wrap an already constructed engine.
    pub fn new(engine: E, model_dir: impl Into<PathBuf>) -> Self {
        Self {
            current: RwLock::new(Arc::new(engine)),
            model_dir: model_dir.into(),
        }
    }

    /// Load the trained model from `model_dir`, or build the fallback.
    ///
    /// A missing directory selects the fallback silently; a directory that
    /// exists but cannot be read logs a warning and falls back as well.
    ///
    /// # Errors
    ///
    /// `RedactaError::ModelUnavailable` if the fallback cannot be built either.
    pub fn init<F>(model_dir: impl Into<PathBuf>, fallback: F) -> Result<Self>
    where
        F: FnOnce() -> Result<E>,
    {
        let model_dir = model_dir.into();

        if model_dir.exists() {
            match E::load(&model_dir) {
                Ok(engine) => {
                    tracing::info!(path = %model_dir.display(), "loaded trained model");
                    return Ok(Self::new(engine, model_dir));
                }
                Err(err) => {
                    tracing::warn!(
                        path = %model_dir.display(),
                        error = %err,
                        "trained model unreadable, using fallback model"
                    );
                }
            }
        } else {
            tracing::info!(path = %model_dir.display(), "no trained model, using fallback model");
        }

        let engine = fallback().map_err(|err| RedactaError::ModelUnavailable(err.to_string()))?;
        Ok(Self::new(engine, model_dir))
    }

    /// The current model.
    pub fn snapshot(&self) -> Result<Arc<E>> {
        let guard = self.current.read().map_err(|_| RedactaError::LockPoisoned)?;
        Ok(Arc::clone(&guard))
    }

    /// Replace the current model.
    ///
    /// Readers holding an older snapshot finish on it undisturbed.
    pub fn install(&self, engine: E) -> Result<()> {
        let mut guard = self.current.write().map_err(|_| RedactaError::LockPoisoned)?;
        *guard = Arc::new(engine);
        Ok(())
    }

    /// Re-read the persisted model and install it.
    pub fn reload(&self) -> Result<()> {
        let engine = E::load(&self.model_dir)?;
        self.install(engine)?;
        tracing::info!(path = %self.model_dir.display(), "model reloaded");
        Ok(())
    }

    /// Where trained models are persisted.
    pub fn model_dir(&self) -> &Path {
        &self.model_dir
    }

    /// Release the handle, returning the last installed model.
    pub fn teardown(self) -> Result<Arc<E>> {
        self.current
            .into_inner()
            .map_err(|_| RedactaError::LockPoisoned)
    }
}
