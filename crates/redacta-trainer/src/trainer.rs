//! Training loop over any [`NerEngine`].

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use redacta_core::{
    CancellationToken, LabelExtractor, LabeledExample, LossSummary, NerEngine, RedactaError,
    Result, TrainingDoc, accumulate_losses,
};

use crate::data::prepare_examples;

/// Knobs for a training run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainerConfig {
    /// Full passes over the examples.
    pub iterations: usize,
    /// First minibatch size.
    pub batch_start: f64,
    /// Largest minibatch size.
    pub batch_stop: f64,
    /// Growth factor between consecutive minibatches.
    pub batch_compound: f64,
    /// Fixes the shuffle order when set.
    pub seed: Option<u64>,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            iterations: 20,
            batch_start: 4.0,
            batch_stop: 32.0,
            batch_compound: 1.001,
            seed: None,
        }
    }
}

impl TrainerConfig {
    pub fn with_iterations(mut self, iterations: usize) -> Self {
        self.iterations = iterations;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Minibatch sizes growing from `batch_start` towards `batch_stop`.
    pub fn batch_sizes(&self) -> impl Iterator<Item = usize> + use<> {
        let (start, stop, compound) = (self.batch_start, self.batch_stop, self.batch_compound);
        let growing = stop >= start;
        std::iter::successors(Some(start), move |&size| {
            let next = size * compound;
            Some(if growing { next.min(stop) } else { next.max(stop) })
        })
        .map(|size| (size as usize).max(1))
    }
}

/// Outcome of a completed training run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingReport {
    pub message: String,
    /// Losses summed over the last pass.
    pub losses: LossSummary,
    pub iterations: usize,
    pub examples_used: usize,
    pub examples_skipped: usize,
    pub labels: Vec<String>,
}

pub struct Trainer {
    config: TrainerConfig,
    extractor: LabelExtractor,
}

impl Trainer {
    pub fn new(config: TrainerConfig) -> Result<Self> {
        Ok(Self {
            config,
            extractor: LabelExtractor::new()?,
        })
    }

    pub fn config(&self) -> &TrainerConfig {
        &self.config
    }

    /// Train `engine` in place on `examples`.
    ///
    /// The engine is not persisted here; callers decide where the trained
    /// model goes.
    ///
    /// # Errors
    ///
    /// - `RedactaError::InvalidInput` if `examples` is empty or none of them
    ///   can be aligned. The engine is untouched in that case.
    /// - `RedactaError::Cancelled` if `cancel` fires between iterations or
    ///   minibatches.
    pub fn train<E: NerEngine + ?Sized>(
        &self,
        engine: &mut E,
        examples: &[LabeledExample],
        cancel: &CancellationToken,
    ) -> Result<TrainingReport> {
        if examples.is_empty() {
            return Err(RedactaError::InvalidInput(
                "no training examples provided".to_string(),
            ));
        }

        let prepared = prepare_examples(&self.extractor, examples);
        if prepared.docs.is_empty() {
            return Err(RedactaError::InvalidInput(format!(
                "all {} training examples were skipped",
                prepared.skipped
            )));
        }

        let labels = prepared.labels();
        for label in &labels {
            if engine.add_label(label) {
                tracing::debug!(label = %label, "registered label");
            }
        }

        let seed = self.config.seed.unwrap_or_else(clock_seed);
        let mut rng = oorandom::Rand64::new(u128::from(seed));
        let mut order: Vec<usize> = (0..prepared.docs.len()).collect();
        let mut losses = LossSummary::new();

        tracing::info!(
            examples = prepared.docs.len(),
            skipped = prepared.skipped,
            iterations = self.config.iterations,
            "starting training"
        );

        for iteration in 0..self.config.iterations {
            if cancel.is_cancelled() {
                tracing::warn!(iteration, "training cancelled");
                return Err(RedactaError::Cancelled);
            }

            shuffle(&mut order, &mut rng);
            losses = self.run_pass(engine, &prepared.docs, &order, cancel)?;

            tracing::info!(
                iteration = iteration + 1,
                total = self.config.iterations,
                losses = ?losses,
                "training iteration complete"
            );
        }

        Ok(TrainingReport {
            message: format!(
                "Model trained on {} examples for {} iterations",
                prepared.docs.len(),
                self.config.iterations
            ),
            losses,
            iterations: self.config.iterations,
            examples_used: prepared.docs.len(),
            examples_skipped: prepared.skipped,
            labels,
        })
    }

    fn run_pass<E: NerEngine + ?Sized>(
        &self,
        engine: &mut E,
        docs: &[TrainingDoc],
        order: &[usize],
        cancel: &CancellationToken,
    ) -> Result<LossSummary> {
        let mut losses = LossSummary::new();
        let mut sizes = self.config.batch_sizes();
        let mut remaining = order;

        while !remaining.is_empty() {
            if cancel.is_cancelled() {
                tracing::warn!("training cancelled mid-pass");
                return Err(RedactaError::Cancelled);
            }

            let size = sizes.next().unwrap_or(1).min(remaining.len());
            let (indices, rest) = remaining.split_at(size);
            let batch: Vec<TrainingDoc> = indices.iter().map(|&idx| docs[idx].clone()).collect();
            accumulate_losses(&mut losses, &engine.fit(&batch)?);
            remaining = rest;
        }

        Ok(losses)
    }
}

/// Fisher-Yates shuffle.
fn shuffle(items: &mut [usize], rng: &mut oorandom::Rand64) {
    for i in (1..items.len()).rev() {
        let j = rng.rand_range(0..(i as u64 + 1)) as usize;
        items.swap(i, j);
    }
}

fn clock_seed() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| elapsed.as_nanos() as u64)
}
