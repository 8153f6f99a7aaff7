//! # Redacta Trainer
//!
//! Dataset loading and the training loop that fits a [`NerEngine`] on
//! `{text, redacted_text}` examples.
//!
//! [`NerEngine`]: redacta_core::NerEngine

pub mod data;
pub mod trainer;

pub use data::{PreparedData, load_dataset, prepare_examples};
pub use trainer::{Trainer, TrainerConfig, TrainingReport};

use std::path::Path;

use anyhow::Context;
use redacta_core::{CancellationToken, NerEngine, PiiTagger, save_atomically};

/// Default dataset location.
pub const DEFAULT_DATASET: &str = "data/pii_data.json";
/// Default location of the trained model.
pub const DEFAULT_MODEL_DIR: &str = "models/pii_ner";

/// Train the bundled tagger on a dataset file and persist it.
///
/// Continues from the model already in `model_dir` when there is one.
pub fn run_training(
    dataset: &Path,
    model_dir: &Path,
    config: TrainerConfig,
) -> anyhow::Result<TrainingReport> {
    let examples = load_dataset(dataset)
        .with_context(|| format!("loading training data from {}", dataset.display()))?;

    let mut tagger = if model_dir.exists() {
        PiiTagger::load(model_dir)
            .with_context(|| format!("loading model from {}", model_dir.display()))?
    } else {
        PiiTagger::pretrained()?
    };

    let trainer = Trainer::new(config)?;
    let report = trainer.train(&mut tagger, &examples, &CancellationToken::new())?;

    save_atomically(&tagger, model_dir)
        .with_context(|| format!("saving model to {}", model_dir.display()))?;

    Ok(report)
}
