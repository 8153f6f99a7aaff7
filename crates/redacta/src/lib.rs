//! # Redacta
//!
//! NER-based PII redaction as a service: redact text, retrain the model
//! from `{text, redacted_text}` examples, and evaluate it against a labeled
//! test set.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use redacta::{RedactionService, ServiceConfig};
//!
//! # async fn run() -> redacta::Result<()> {
//! let service = RedactionService::from_config(ServiceConfig::default())?;
//! let redacted = service.redact("Email support@company.com today").await?;
//! assert_eq!(redacted, "Email [EMAIL] today");
//! # Ok(())
//! # }
//! ```
pub mod config;
pub mod service;

pub use config::ServiceConfig;
pub use service::{EvaluateRequest, RedactResponse, RedactionService, TrainRequest};

// Re-export primary API
pub use redacta_core::{
    CancellationToken, EntitySpan, LabelExtractor, LabeledExample, MetricsResult, NerEngine,
    PiiTagger, RedactaError, Result, redact,
};
pub use redacta_trainer::{TrainerConfig, TrainingReport, load_dataset};
