//! # Evaluation Metrics
//!
//! Category-level precision, recall and F1 of predicted entity labels
//! against the labels found in annotated text. Comparison is by category
//! only; positions are ignored.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::engine::NerEngine;
use crate::error::{RedactaError, Result};
use crate::labels::LabelExtractor;
use crate::span::{EntitySpan, resolve_overlaps};
use crate::types::LabeledExample;

// ============================================================================
// Per-category counts
// ============================================================================

/// True positive / false positive / false negative tallies for one category.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryCounts {
    pub true_positives: usize,
    pub false_positives: usize,
    pub false_negatives: usize,
}

impl CategoryCounts {
    /// TP / (TP + FP), 0 when nothing was predicted
    pub fn precision(&self) -> f64 {
        ratio(
            self.true_positives,
            self.true_positives + self.false_positives,
        )
    }

    /// TP / (TP + FN), 0 when nothing was expected
    pub fn recall(&self) -> f64 {
        ratio(
            self.true_positives,
            self.true_positives + self.false_negatives,
        )
    }

    /// Harmonic mean of precision and recall, 0 when both are 0
    pub fn f1(&self) -> f64 {
        let p = self.precision();
        let r = self.recall();
        if p + r == 0.0 {
            0.0
        } else {
            2.0 * p * r / (p + r)
        }
    }
}

fn ratio(numerator: usize, denominator: usize) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

// ============================================================================
// Result
// ============================================================================

/// Aggregate accuracy plus per-category precision, recall and F1.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsResult {
    pub accuracy: f64,
    pub precision: BTreeMap<String, f64>,
    pub recall: BTreeMap<String, f64>,
    pub f1: BTreeMap<String, f64>,
}

// ============================================================================
// Evaluator
// ============================================================================

/// Accumulates label comparisons one example at a time.
///
/// Within an example labels are compared as sets: a category counts once as
/// a true positive, false negative or false positive no matter how often it
/// repeats. Accuracy divides the size of the per-example set intersection by
/// the number of ground-truth labels *with* repeats, so an example such as
/// `[NAME] and [NAME]` predicted as `{NAME}` scores 1/2.
#[derive(Debug, Clone, Default)]
pub struct Evaluator {
    counts: BTreeMap<String, CategoryCounts>,
    total_entities: usize,
    correct_entities: usize,
    examples: usize,
}

impl Evaluator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one example's ground-truth and predicted labels.
    pub fn observe<T, P>(&mut self, truth: &[T], predicted: &[P])
    where
        T: AsRef<str>,
        P: AsRef<str>,
    {
        let truth_set: BTreeSet<&str> = truth.iter().map(AsRef::as_ref).collect();
        let predicted_set: BTreeSet<&str> = predicted.iter().map(AsRef::as_ref).collect();

        for category in truth_set.union(&predicted_set) {
            self.counts.entry((*category).to_string()).or_default();
        }

        for category in &truth_set {
            let counts = self.counts.entry((*category).to_string()).or_default();
            if predicted_set.contains(category) {
                counts.true_positives += 1;
            } else {
                counts.false_negatives += 1;
            }
        }
        for category in predicted_set.difference(&truth_set) {
            self.counts
                .entry((*category).to_string())
                .or_default()
                .false_positives += 1;
        }

        self.total_entities += truth.len();
        self.correct_entities += truth_set.intersection(&predicted_set).count();
        self.examples += 1;
    }

    /// Counts gathered so far, by category.
    pub fn counts(&self) -> &BTreeMap<String, CategoryCounts> {
        &self.counts
    }

    /// Number of examples observed.
    pub fn examples(&self) -> usize {
        self.examples
    }

    /// Compute the final metrics.
    ///
    /// # Errors
    ///
    /// `RedactaError::InvalidInput` if no example was observed.
    pub fn finish(self) -> Result<MetricsResult> {
        if self.examples == 0 {
            return Err(RedactaError::InvalidInput(
                "test data cannot be empty".into(),
            ));
        }

        let mut precision = BTreeMap::new();
        let mut recall = BTreeMap::new();
        let mut f1 = BTreeMap::new();
        for (category, counts) in &self.counts {
            precision.insert(category.clone(), counts.precision());
            recall.insert(category.clone(), counts.recall());
            f1.insert(category.clone(), counts.f1());
        }

        Ok(MetricsResult {
            accuracy: ratio(self.correct_entities, self.total_entities),
            precision,
            recall,
            f1,
        })
    }
}

/// Labels scored for one prediction.
///
/// Overlaps are resolved first, exactly as before redaction, so a category
/// only counts if it would appear in the redacted text.
pub fn scored_labels(spans: Vec<EntitySpan>) -> Vec<String> {
    resolve_overlaps(spans)
        .into_iter()
        .map(|span| span.label)
        .collect()
}

/// Evaluate `engine` on labeled examples.
///
/// Ground truth comes from the markers in each `redacted_text`; predictions
/// from running the engine over each `text`.
///
/// # Errors
///
/// `RedactaError::InvalidInput` for an empty test set; any engine failure is
/// propagated.
pub fn evaluate<E: NerEngine + ?Sized>(
    engine: &E,
    examples: &[LabeledExample],
) -> Result<MetricsResult> {
    if examples.is_empty() {
        return Err(RedactaError::InvalidInput(
            "test data cannot be empty".into(),
        ));
    }

    let extractor = LabelExtractor::new()?;
    let mut evaluator = Evaluator::new();
    for example in examples {
        let truth = extractor.categories(&example.redacted_text);
        let predicted = scored_labels(engine.predict(&example.text)?);
        evaluator.observe(&truth, &predicted);
    }

    let observed = evaluator.examples();
    let metrics = evaluator.finish()?;
    tracing::debug!(
        examples = observed,
        accuracy = metrics.accuracy,
        "evaluation complete"
    );
    Ok(metrics)
}
