//! # PII Tagger
//!
//! The bundled [`NerEngine`]: a CRF sequence tagger trained on labeled
//! examples, backed by regex recognizers for PII with a fixed surface form.
//! Learned entities win over pattern matches; pattern matches fill in
//! wherever the tagger found nothing.

pub mod model;
pub mod patterns;
pub mod tags;
pub mod tokenizer;
pub mod viterbi;

pub use model::{CrfModel, DEFAULT_FEATURE_BUCKETS};
pub use patterns::PatternRecognizer;
pub use tags::{BioTag, TagSet};
pub use tokenizer::{Token, Tokenizer};
pub use viterbi::ViterbiDecoder;

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::engine::NerEngine;
use crate::error::{RedactaError, Result};
use crate::span::{EntitySpan, resolve_overlaps};
use crate::types::{LossSummary, TrainingDoc};

const CONFIG_FILE: &str = "config.json";
const WEIGHTS_FILE: &str = "model.safetensors";
const FORMAT_VERSION: u32 = 1;

/// Loss component reported by [`PiiTagger::fit`].
pub const NER_LOSS: &str = "ner";

/// On-disk description of a saved tagger, stored next to the weights.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct TaggerConfig {
    format_version: u32,
    labels: Vec<String>,
    feature_buckets: usize,
    patterns_enabled: bool,
    learning_rate: f32,
}

/// CRF tagger plus optional pattern recognizers.
#[derive(Debug, Clone)]
pub struct PiiTagger {
    tokenizer: Tokenizer,
    model: CrfModel,
    patterns: Option<PatternRecognizer>,
    learning_rate: f32,
}

impl PiiTagger {
    /// An untrained tagger without pattern recognizers.
    pub fn blank() -> Self {
        Self {
            tokenizer: Tokenizer::new(),
            model: CrfModel::default(),
            patterns: None,
            learning_rate: 1.0,
        }
    }

    /// The generic starting model: untrained tagger, built-in patterns on.
    ///
    /// # Examples
    /// ```
    /// use redacta_core::{NerEngine, tagger::PiiTagger};
    ///
    /// let tagger = PiiTagger::pretrained().unwrap();
    /// let spans = tagger.predict("Mail support@company.com today").unwrap();
    /// assert_eq!(spans[0].label, "EMAIL");
    /// ```
    pub fn pretrained() -> Result<Self> {
        Self::blank().with_patterns(true)
    }

    /// Turn the pattern recognizers on or off.
    pub fn with_patterns(mut self, enabled: bool) -> Result<Self> {
        self.patterns = if enabled {
            Some(PatternRecognizer::new()?)
        } else {
            None
        };
        Ok(self)
    }

    /// Use a different number of hashed feature buckets.
    ///
    /// Resets learned weights; labels are kept.
    pub fn with_feature_buckets(mut self, buckets: usize) -> Self {
        let labels = self.model.tags().labels().to_vec();
        self.model = CrfModel::new(buckets);
        for label in &labels {
            self.model.add_label(label);
        }
        self
    }

    pub fn patterns_enabled(&self) -> bool {
        self.patterns.is_some()
    }

    pub fn model(&self) -> &CrfModel {
        &self.model
    }

    /// Spans found by the CRF alone.
    pub fn predict_learned(&self, text: &str) -> Result<Vec<EntitySpan>> {
        if self.model.tags().num_labels() == 0 {
            return Ok(Vec::new());
        }
        let tokens = self.tokenizer.tokenize(text)?;
        let tags = self.model.predict(&tokens)?;
        Ok(self.model.tags().decode(&tokens, &tags))
    }
}

impl Default for PiiTagger {
    fn default() -> Self {
        Self::blank()
    }
}

impl NerEngine for PiiTagger {
    fn predict(&self, text: &str) -> Result<Vec<EntitySpan>> {
        let mut spans = self.predict_learned(text)?;

        if let Some(patterns) = &self.patterns {
            let matched = resolve_overlaps(patterns.recognize(text));
            let extra: Vec<EntitySpan> = matched
                .into_iter()
                .filter(|candidate| !spans.iter().any(|kept| kept.overlaps(candidate)))
                .collect();
            spans.extend(extra);
            spans.sort_by_key(|span| span.start);
        }

        tracing::debug!(entities = spans.len(), "prediction complete");
        Ok(spans)
    }

    fn labels(&self) -> Vec<String> {
        let mut labels = self.model.tags().labels().to_vec();
        if let Some(patterns) = &self.patterns {
            for label in patterns.labels() {
                if !labels.contains(&label) {
                    labels.push(label);
                }
            }
        }
        labels
    }

    fn add_label(&mut self, label: &str) -> bool {
        self.model.add_label(label)
    }

    fn fit(&mut self, batch: &[TrainingDoc]) -> Result<LossSummary> {
        let mut loss = 0.0;
        for doc in batch {
            let tokens = self.tokenizer.tokenize(&doc.text)?;
            for span in &doc.spans {
                if self.model.tags().position(&span.label).is_none() {
                    return Err(RedactaError::InvalidInput(format!(
                        "label {} not registered before training",
                        span.label
                    )));
                }
            }
            let gold = self.model.tags().encode(&tokens, &doc.spans);
            loss += self.model.train_step(&tokens, &gold, self.learning_rate)?;
        }
        Ok(LossSummary::from([(NER_LOSS.to_string(), loss)]))
    }

    fn save(&self, dir: &Path) -> Result<()> {
        fs::create_dir_all(dir)?;

        let config = TaggerConfig {
            format_version: FORMAT_VERSION,
            labels: self.model.tags().labels().to_vec(),
            feature_buckets: self.model.buckets(),
            patterns_enabled: self.patterns_enabled(),
            learning_rate: self.learning_rate,
        };
        fs::write(dir.join(CONFIG_FILE), serde_json::to_string_pretty(&config)?)?;
        self.model.save(&dir.join(WEIGHTS_FILE))?;
        Ok(())
    }

    fn load(dir: &Path) -> Result<Self> {
        let config_path = dir.join(CONFIG_FILE);
        if !config_path.exists() {
            return Err(RedactaError::MissingResource { path: config_path });
        }
        let config: TaggerConfig = serde_json::from_str(&fs::read_to_string(&config_path)?)?;
        if config.format_version != FORMAT_VERSION {
            return Err(RedactaError::ModelUnavailable(format!(
                "unsupported model format version {}",
                config.format_version
            )));
        }

        let model = CrfModel::load(&dir.join(WEIGHTS_FILE), &config.labels)?;
        if model.buckets() != config.feature_buckets {
            return Err(RedactaError::CandleError(format!(
                "weights have {} feature buckets, config says {}",
                model.buckets(),
                config.feature_buckets
            )));
        }

        Self {
            tokenizer: Tokenizer::new(),
            model,
            patterns: None,
            learning_rate: config.learning_rate,
        }
        .with_patterns(config.patterns_enabled)
    }
}
