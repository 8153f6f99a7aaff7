//! # Redaction Service
//!
//! The three operations (redact, train, evaluate) over a shared model.
//!
//! Inference runs on tokio's blocking pool against an immutable snapshot of
//! the current model, each call bounded by the configured timeout. Training
//! is serialized by a single gate, works on a private copy of the model and
//! only swaps the result in after it has been persisted, so concurrent
//! redactions see either the old model or the new one and nothing between.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use redacta_core::{
    CancellationToken, EntitySpan, Evaluator, LabelExtractor, LabeledExample, MetricsResult,
    ModelHandle, NerEngine, PiiTagger, RedactaError, Result, redact, resolve_overlaps,
    save_atomically, scored_labels,
};
use redacta_trainer::{Trainer, TrainingReport, load_dataset};

use crate::config::ServiceConfig;

/// Result of a redact call on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedactResponse {
    pub redacted_text: String,
}

/// Examples to train on. An empty list selects the configured dataset.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainRequest {
    #[serde(default)]
    pub training_data: Vec<LabeledExample>,
    #[serde(default)]
    pub iterations: Option<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvaluateRequest {
    #[serde(default)]
    pub test_data: Vec<LabeledExample>,
}

/// PII redaction over a swappable NER model.
pub struct RedactionService<E = PiiTagger> {
    config: ServiceConfig,
    handle: Arc<ModelHandle<E>>,
    extractor: LabelExtractor,
    training_gate: Arc<Mutex<()>>,
}

/// Cancels a training run whose caller stopped waiting for it.
struct CancelOnDrop(Option<CancellationToken>);

impl CancelOnDrop {
    fn disarm(mut self) {
        self.0 = None;
    }
}

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        if let Some(cancel) = self.0.take() {
            tracing::warn!("train caller went away, cancelling run");
            cancel.cancel();
        }
    }
}

impl RedactionService<PiiTagger> {
    /// Start from the trained model in `config.model_dir`, or from the
    /// pretrained tagger if there is none.
    ///
    /// # Errors
    ///
    /// `RedactaError::ModelUnavailable` if no model can be loaded or built.
    pub fn from_config(config: ServiceConfig) -> Result<Self> {
        let patterns = config.patterns_enabled;
        let handle = ModelHandle::init(&config.model_dir, || {
            PiiTagger::blank().with_patterns(patterns)
        })?;
        Self::with_handle(handle, config)
    }
}

impl<E> RedactionService<E>
where
    E: NerEngine + Clone + 'static,
{
    /// Serve `engine` directly, persisting trained models to `config.model_dir`.
    pub fn with_engine(engine: E, config: ServiceConfig) -> Result<Self> {
        let handle = ModelHandle::new(engine, &config.model_dir);
        Self::with_handle(handle, config)
    }

    fn with_handle(handle: ModelHandle<E>, config: ServiceConfig) -> Result<Self> {
        Ok(Self {
            config,
            handle: Arc::new(handle),
            extractor: LabelExtractor::new()?,
            training_gate: Arc::new(Mutex::new(())),
        })
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// The model currently serving requests.
    pub fn model(&self) -> Result<Arc<E>> {
        self.handle.snapshot()
    }

    /// Entity spans in `text`, overlaps already resolved.
    pub async fn predict(&self, text: &str) -> Result<Vec<EntitySpan>> {
        let engine = self.handle.snapshot()?;
        let text = text.to_string();
        let timeout = self.config.inference_timeout();

        let task = tokio::task::spawn_blocking(move || engine.predict(&text));
        let spans = tokio::time::timeout(timeout, task)
            .await
            .map_err(|_| RedactaError::Timeout(timeout))?
            .map_err(|e| RedactaError::TaskFailed(e.to_string()))??;

        Ok(resolve_overlaps(spans))
    }

    /// Replace every detected entity in `text` with its `[LABEL]` placeholder.
    pub async fn redact(&self, text: &str) -> Result<String> {
        let spans = self.predict(text).await?;
        tracing::debug!(entities = spans.len(), "redacting");
        redact(text, &spans)
    }

    /// Train a copy of the current model, persist it and swap it in.
    ///
    /// Only one training run proceeds at a time; others wait their turn.
    /// The gate stays held until the run has finished on the blocking pool,
    /// even if the returned future is dropped. Dropping the future cancels
    /// the run. On any failure, including cancellation, both the persisted
    /// model and the serving model are left as they were.
    ///
    /// # Errors
    ///
    /// - `RedactaError::MissingResource` if the request is empty and the
    ///   configured dataset file does not exist.
    /// - `RedactaError::InvalidInput` if there is nothing to train on.
    /// - `RedactaError::Cancelled` if `cancel` fires.
    pub async fn train(
        &self,
        request: TrainRequest,
        cancel: CancellationToken,
    ) -> Result<TrainingReport> {
        let gate = Arc::clone(&self.training_gate).lock_owned().await;
        let abandon = CancelOnDrop(Some(cancel.clone()));

        let iterations = request
            .iterations
            .unwrap_or_else(|| self.config.default_iterations());
        let trainer = Trainer::new(self.config.trainer.clone().with_iterations(iterations))?;
        let dataset_path = self.config.dataset_path.clone();
        let handle = Arc::clone(&self.handle);
        let mut engine = {
            let snapshot = handle.snapshot()?;
            E::clone(&snapshot)
        };

        let task = tokio::task::spawn_blocking(move || {
            let _gate = gate;
            let examples = if request.training_data.is_empty() {
                tracing::info!(path = %dataset_path.display(), "no examples in request, using dataset");
                load_dataset(&dataset_path)?
            } else {
                request.training_data
            };

            let report = trainer.train(&mut engine, &examples, &cancel)?;
            if cancel.is_cancelled() {
                return Err(RedactaError::Cancelled);
            }
            save_atomically(&engine, handle.model_dir())?;
            handle.install(engine)?;
            Ok::<_, RedactaError>(report)
        });

        let result = task.await;
        abandon.disarm();
        let report = result.map_err(|e| RedactaError::TaskFailed(e.to_string()))??;

        tracing::info!(
            examples = report.examples_used,
            iterations = report.iterations,
            "trained model installed"
        );
        Ok(report)
    }

    /// Score the current model against annotated examples.
    ///
    /// # Errors
    ///
    /// `RedactaError::InvalidInput` if `test_data` is empty.
    pub async fn evaluate(&self, request: EvaluateRequest) -> Result<MetricsResult> {
        if request.test_data.is_empty() {
            return Err(RedactaError::InvalidInput(
                "no test examples provided".to_string(),
            ));
        }

        let mut evaluator = Evaluator::new();
        for example in &request.test_data {
            let truth = self.extractor.categories(&example.redacted_text);
            let predicted = scored_labels(self.predict(&example.text).await?);
            evaluator.observe(&truth, &predicted);
        }

        let observed = evaluator.examples();
        let metrics = evaluator.finish()?;
        tracing::info!(
            examples = observed,
            accuracy = metrics.accuracy,
            "evaluation complete"
        );
        Ok(metrics)
    }

    /// Re-read the persisted model and serve it.
    pub async fn reload(&self) -> Result<()> {
        let gate = Arc::clone(&self.training_gate).lock_owned().await;
        let handle = Arc::clone(&self.handle);
        tokio::task::spawn_blocking(move || {
            let _gate = gate;
            handle.reload()
        })
        .await
        .map_err(|e| RedactaError::TaskFailed(e.to_string()))?
    }

    /// Stop serving and hand back the last installed model.
    ///
    /// # Errors
    ///
    /// `RedactaError::ModelUnavailable` while a training run still holds
    /// the model.
    pub fn shutdown(self) -> Result<Arc<E>> {
        Arc::try_unwrap(self.handle)
            .map_err(|_| {
                RedactaError::ModelUnavailable("training run still in progress".to_string())
            })?
            .teardown()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use redacta_core::{LossSummary, TrainingDoc};
    use redacta_trainer::TrainerConfig;
    use std::path::Path;
    use std::time::Duration;

    /// Tags every occurrence of fixed words.
    #[derive(Debug, Clone, Default)]
    struct KeywordEngine {
        keywords: Vec<(String, String)>,
        delay: Option<Duration>,
    }

    impl KeywordEngine {
        fn with(keywords: &[(&str, &str)]) -> Self {
            Self {
                keywords: keywords
                    .iter()
                    .map(|(w, l)| (w.to_string(), l.to_string()))
                    .collect(),
                delay: None,
            }
        }
    }

    impl NerEngine for KeywordEngine {
        fn predict(&self, text: &str) -> Result<Vec<EntitySpan>> {
            if let Some(delay) = self.delay {
                std::thread::sleep(delay);
            }
            let mut spans = Vec::new();
            for (word, label) in &self.keywords {
                for (start, matched) in text.match_indices(word.as_str()) {
                    spans.push(EntitySpan::new(start, start + matched.len(), label.as_str()));
                }
            }
            Ok(spans)
        }

        fn labels(&self) -> Vec<String> {
            self.keywords.iter().map(|(_, l)| l.clone()).collect()
        }

        fn add_label(&mut self, _label: &str) -> bool {
            false
        }

        fn fit(&mut self, _batch: &[TrainingDoc]) -> Result<LossSummary> {
            if let Some(delay) = self.delay {
                std::thread::sleep(delay);
            }
            Ok(LossSummary::new())
        }

        fn save(&self, dir: &Path) -> Result<()> {
            std::fs::create_dir_all(dir)?;
            Ok(())
        }

        fn load(_dir: &Path) -> Result<Self> {
            Ok(Self::with(&[("reloaded", "MARKER")]))
        }
    }

    fn config(dir: &Path) -> ServiceConfig {
        ServiceConfig::new()
            .with_model_dir(dir.join("pii_ner"))
            .with_dataset_path(dir.join("pii_data.json"))
            .with_trainer(TrainerConfig::default().with_seed(3))
    }

    #[tokio::test]
    async fn test_redact_with_fallback_model() {
        let tmp = tempfile::tempdir().unwrap();
        let service = RedactionService::from_config(config(tmp.path())).unwrap();

        let redacted = service
            .redact("Contact us at support@company.com or call (02) 9876 5432 for assistance.")
            .await
            .unwrap();
        assert_eq!(
            redacted,
            "Contact us at [EMAIL] or call [PHONE_NUMBER] for assistance."
        );
    }

    #[tokio::test]
    async fn test_redact_resolves_overlapping_predictions() {
        let tmp = tempfile::tempdir().unwrap();
        let engine = KeywordEngine::with(&[("John Smith", "NAME"), ("Smith", "SURNAME")]);
        let service = RedactionService::with_engine(engine, config(tmp.path())).unwrap();

        let redacted = service.redact("Ask John Smith.").await.unwrap();
        assert_eq!(redacted, "Ask [NAME].");
    }

    #[tokio::test]
    async fn test_redact_empty_text() {
        let tmp = tempfile::tempdir().unwrap();
        let service = RedactionService::from_config(config(tmp.path())).unwrap();
        assert_eq!(service.redact("").await.unwrap(), "");
    }

    #[tokio::test]
    async fn test_inference_timeout() {
        let tmp = tempfile::tempdir().unwrap();
        let engine = KeywordEngine {
            delay: Some(Duration::from_millis(300)),
            ..KeywordEngine::default()
        };
        let config = config(tmp.path()).with_inference_timeout(Duration::from_millis(10));
        let service = RedactionService::with_engine(engine, config).unwrap();

        let err = service.redact("anything").await.unwrap_err();
        assert!(matches!(err, RedactaError::Timeout(_)));
    }

    #[tokio::test]
    async fn test_train_empty_request_without_dataset() {
        let tmp = tempfile::tempdir().unwrap();
        let service = RedactionService::from_config(config(tmp.path())).unwrap();

        let err = service
            .train(TrainRequest::default(), CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, RedactaError::MissingResource { .. }));
        assert!(!tmp.path().join("pii_ner").exists());
    }

    #[tokio::test]
    async fn test_train_empty_dataset_is_invalid_input() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("pii_data.json"), "[]").unwrap();
        let service = RedactionService::from_config(config(tmp.path())).unwrap();

        let err = service
            .train(TrainRequest::default(), CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, RedactaError::InvalidInput(_)));
        assert!(!tmp.path().join("pii_ner").exists());
    }

    #[tokio::test]
    async fn test_train_persists_and_swaps_model() {
        let tmp = tempfile::tempdir().unwrap();
        let service = RedactionService::from_config(config(tmp.path())).unwrap();
        assert!(!service.model().unwrap().labels().contains(&"NAME".to_string()));

        let request = TrainRequest {
            training_data: vec![
                LabeledExample::new("Maria Garcia is the new CEO.", "[NAME] is the new CEO."),
                LabeledExample::new(
                    "John Smith works at Acme Corporation in New York.",
                    "[NAME] works at [ORGANIZATION] in [LOCATION].",
                ),
            ],
            iterations: Some(50),
        };
        let report = service
            .train(request, CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.iterations, 50);
        assert!(report.losses.contains_key("ner"));
        assert!(tmp.path().join("pii_ner").join("config.json").exists());
        assert!(service.model().unwrap().labels().contains(&"NAME".to_string()));

        let redacted = service.redact("Maria Garcia is the new CEO.").await.unwrap();
        assert_eq!(redacted, "[NAME] is the new CEO.");

        // A fresh service picks up the persisted model.
        let restarted = RedactionService::from_config(config(tmp.path())).unwrap();
        assert!(restarted.model().unwrap().labels().contains(&"NAME".to_string()));
    }

    #[tokio::test]
    async fn test_train_uses_dataset_when_request_is_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let examples = vec![LabeledExample::new("Hi Maria.", "Hi [NAME].")];
        std::fs::write(
            tmp.path().join("pii_data.json"),
            serde_json::to_string(&examples).unwrap(),
        )
        .unwrap();
        let service = RedactionService::from_config(config(tmp.path())).unwrap();

        let request = TrainRequest {
            iterations: Some(2),
            ..TrainRequest::default()
        };
        let report = service.train(request, CancellationToken::new()).await.unwrap();
        assert_eq!(report.examples_used, 1);
        assert_eq!(report.labels, vec!["NAME"]);
    }

    #[tokio::test]
    async fn test_cancelled_training_leaves_model_untouched() {
        let tmp = tempfile::tempdir().unwrap();
        let service = RedactionService::from_config(config(tmp.path())).unwrap();
        let before = service.model().unwrap();

        let cancel = CancellationToken::new();
        cancel.cancel();
        let request = TrainRequest {
            training_data: vec![LabeledExample::new("Hi Maria.", "Hi [NAME].")],
            iterations: Some(5),
        };
        let err = service.train(request, cancel).await.unwrap_err();

        assert!(matches!(err, RedactaError::Cancelled));
        assert!(!tmp.path().join("pii_ner").exists());
        assert!(Arc::ptr_eq(&before, &service.model().unwrap()));
    }

    #[tokio::test]
    async fn test_abandoned_training_is_cancelled_and_not_persisted() {
        let tmp = tempfile::tempdir().unwrap();
        let engine = KeywordEngine {
            delay: Some(Duration::from_millis(20)),
            ..KeywordEngine::with(&[("Maria", "NAME")])
        };
        let service = RedactionService::with_engine(engine, config(tmp.path())).unwrap();
        let before = service.model().unwrap();

        let request = TrainRequest {
            training_data: vec![LabeledExample::new("Hi Maria.", "Hi [NAME]."); 20],
            iterations: Some(50),
        };
        let cancel = CancellationToken::new();
        let outcome = tokio::time::timeout(
            Duration::from_millis(30),
            service.train(request, cancel.clone()),
        )
        .await;
        assert!(outcome.is_err());
        assert!(cancel.is_cancelled());

        // The gate is only released once the blocking run has stopped.
        let _gate = service.training_gate.lock().await;
        assert!(!tmp.path().join("pii_ner").exists());
        assert!(Arc::ptr_eq(&before, &service.model().unwrap()));
    }

    #[tokio::test]
    async fn test_completed_training_leaves_token_alone() {
        let tmp = tempfile::tempdir().unwrap();
        let engine = KeywordEngine::with(&[("Maria", "NAME")]);
        let service = RedactionService::with_engine(engine, config(tmp.path())).unwrap();

        let cancel = CancellationToken::new();
        let request = TrainRequest {
            training_data: vec![LabeledExample::new("Hi Maria.", "Hi [NAME].")],
            iterations: Some(1),
        };
        service.train(request, cancel.clone()).await.unwrap();

        assert!(!cancel.is_cancelled());
        assert!(tmp.path().join("pii_ner").exists());
    }

    #[tokio::test]
    async fn test_evaluate_matches_core_evaluate() {
        let tmp = tempfile::tempdir().unwrap();
        let engine = KeywordEngine::with(&[("John Smith", "NAME"), ("Smith", "SURNAME")]);
        let test_data = vec![LabeledExample::new("John Smith", "[NAME]")];
        let expected = redacta_core::evaluate(&engine, &test_data).unwrap();
        let service = RedactionService::with_engine(engine, config(tmp.path())).unwrap();

        let metrics = service
            .evaluate(EvaluateRequest { test_data })
            .await
            .unwrap();
        assert_eq!(metrics, expected);
        assert_eq!(metrics.precision.len(), 1);
    }

    #[tokio::test]
    async fn test_evaluate_empty_is_invalid_input() {
        let tmp = tempfile::tempdir().unwrap();
        let service = RedactionService::from_config(config(tmp.path())).unwrap();

        let err = service
            .evaluate(EvaluateRequest::default())
            .await
            .unwrap_err();
        assert!(matches!(err, RedactaError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_evaluate_perfect_prediction() {
        let tmp = tempfile::tempdir().unwrap();
        let engine = KeywordEngine::with(&[("A", "NAME")]);
        let service = RedactionService::with_engine(engine, config(tmp.path())).unwrap();

        let metrics = service
            .evaluate(EvaluateRequest {
                test_data: vec![LabeledExample::new("A", "[NAME]")],
            })
            .await
            .unwrap();

        assert_eq!(metrics.accuracy, 1.0);
        assert_eq!(metrics.precision["NAME"], 1.0);
        assert_eq!(metrics.recall["NAME"], 1.0);
        assert_eq!(metrics.f1["NAME"], 1.0);
    }

    #[tokio::test]
    async fn test_evaluate_partial_prediction() {
        let tmp = tempfile::tempdir().unwrap();
        let engine = KeywordEngine::with(&[("Maria", "NAME")]);
        let service = RedactionService::with_engine(engine, config(tmp.path())).unwrap();

        let metrics = service
            .evaluate(EvaluateRequest {
                test_data: vec![LabeledExample::new(
                    "Maria at maria@example.com",
                    "[NAME] at [EMAIL]",
                )],
            })
            .await
            .unwrap();

        assert_eq!(metrics.accuracy, 0.5);
        assert_eq!(metrics.recall["NAME"], 1.0);
        assert_eq!(metrics.recall["EMAIL"], 0.0);
    }

    #[tokio::test]
    async fn test_reload_installs_persisted_model() {
        let tmp = tempfile::tempdir().unwrap();
        let service =
            RedactionService::with_engine(KeywordEngine::default(), config(tmp.path())).unwrap();

        service.reload().await.unwrap();
        assert_eq!(service.model().unwrap().labels(), vec!["MARKER"]);

        let model = service.shutdown().unwrap();
        assert_eq!(model.labels(), vec!["MARKER"]);
    }
}
