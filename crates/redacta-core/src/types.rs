//! Shared data types for training and evaluation.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::span::EntitySpan;

/// A labeled pair: raw text and the same text with entities replaced by
/// `[CATEGORY]` markers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabeledExample {
    /// The raw text
    pub text: String,
    /// The raw text with every entity replaced by its bracketed category
    pub redacted_text: String,
}

impl LabeledExample {
    /// Create a new labeled example.
    pub fn new(text: impl Into<String>, redacted_text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            redacted_text: redacted_text.into(),
        }
    }
}

/// A raw text with entity spans aligned to its own offsets, ready for an
/// engine update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrainingDoc {
    pub text: String,
    pub spans: Vec<EntitySpan>,
}

impl TrainingDoc {
    pub fn new(text: impl Into<String>, spans: Vec<EntitySpan>) -> Self {
        Self {
            text: text.into(),
            spans,
        }
    }
}

/// Per-component loss values, accumulated over one training pass.
pub type LossSummary = BTreeMap<String, f32>;

/// Add every entry of `batch` into `total`.
pub fn accumulate_losses(total: &mut LossSummary, batch: &LossSummary) {
    for (component, loss) in batch {
        *total.entry(component.clone()).or_insert(0.0) += loss;
    }
}
