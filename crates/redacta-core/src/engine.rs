//! # NER Engine Capability
//!
//! The seam between redaction/evaluation logic and whatever performs
//! inference and training. Everything outside this trait's implementors
//! treats the engine as a black box returning labeled spans.

use std::path::Path;

use crate::error::Result;
use crate::span::EntitySpan;
use crate::types::{LossSummary, TrainingDoc};

/// An inference and training backend for named entity recognition.
pub trait NerEngine: Send + Sync {
    /// Entity spans detected in `text`, with offsets into `text`.
    fn predict(&self, text: &str) -> Result<Vec<EntitySpan>>;

    /// Labels the engine can currently emit.
    fn labels(&self) -> Vec<String>;

    /// Register a label before training on examples that use it.
    ///
    /// Returns `true` if the label was new.
    fn add_label(&mut self, label: &str) -> bool;

    /// Update parameters on one minibatch, returning the batch losses.
    fn fit(&mut self, batch: &[TrainingDoc]) -> Result<LossSummary>;

    /// Write the engine to the directory `dir`, creating it if needed.
    fn save(&self, dir: &Path) -> Result<()>;

    /// Read an engine previously written with [`NerEngine::save`].
    fn load(dir: &Path) -> Result<Self>
    where
        Self: Sized;
}
