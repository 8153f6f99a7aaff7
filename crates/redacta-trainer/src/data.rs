//! Data loading for `{text, redacted_text}` training data.

use std::fs;
use std::path::Path;

use serde::Deserialize;

use redacta_core::{EntitySpan, LabelExtractor, LabeledExample, RedactaError, Result, TrainingDoc};

/// Accepted dataset file shapes.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum DatasetFile {
    Examples(Vec<LabeledExample>),
    Wrapped { training_data: Vec<LabeledExample> },
}

/// Load a dataset from a JSON file.
///
/// The file holds either an array of examples or an object with a
/// `training_data` array, the same shape a train request carries.
pub fn load_dataset<P: AsRef<Path>>(path: P) -> Result<Vec<LabeledExample>> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(RedactaError::MissingResource {
            path: path.to_path_buf(),
        });
    }

    let content = fs::read_to_string(path)?;
    let examples = match serde_json::from_str(&content)? {
        DatasetFile::Examples(examples) => examples,
        DatasetFile::Wrapped { training_data } => training_data,
    };

    tracing::info!(path = %path.display(), examples = examples.len(), "loaded dataset");
    Ok(examples)
}

/// Examples turned into engine input, plus how many were dropped.
#[derive(Debug, Clone, Default)]
pub struct PreparedData {
    pub docs: Vec<TrainingDoc>,
    pub skipped: usize,
}

impl PreparedData {
    /// Every label used by the prepared docs, in first-seen order.
    pub fn labels(&self) -> Vec<String> {
        let mut labels: Vec<String> = Vec::new();
        for span in self.docs.iter().flat_map(|doc| &doc.spans) {
            if !labels.contains(&span.label) {
                labels.push(span.label.clone());
            }
        }
        labels
    }
}

/// Align every example's markers to its raw text.
///
/// Examples that cannot be aligned, or whose spans do not fit the raw text,
/// are skipped with a warning.
pub fn prepare_examples(extractor: &LabelExtractor, examples: &[LabeledExample]) -> PreparedData {
    let mut prepared = PreparedData::default();

    for (idx, example) in examples.iter().enumerate() {
        match aligned_spans(extractor, example) {
            Ok(spans) => prepared
                .docs
                .push(TrainingDoc::new(example.text.clone(), spans)),
            Err(err) => {
                tracing::warn!(example = idx, error = %err, "skipping training example");
                prepared.skipped += 1;
            }
        }
    }

    prepared
}

fn aligned_spans(extractor: &LabelExtractor, example: &LabeledExample) -> Result<Vec<EntitySpan>> {
    let spans = extractor.align(&example.text, &example.redacted_text)?;
    for span in &spans {
        span.validate(&example.text)?;
    }
    Ok(spans)
}
