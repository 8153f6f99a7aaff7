//! # Redacta Core
//!
//! PII redaction primitives: entity spans and placeholder substitution,
//! bracket-annotation parsing, span-level evaluation metrics, and the
//! bundled CRF tagger behind the [`NerEngine`] trait.
//!
//! ## Quick Start
//!
//! ```rust
//! use redacta_core::{NerEngine, PiiTagger, redact};
//!
//! let tagger = PiiTagger::pretrained().unwrap();
//! let text = "Contact us at support@company.com for assistance.";
//! let spans = tagger.predict(text).unwrap();
//!
//! assert_eq!(
//!     redact(text, &spans).unwrap(),
//!     "Contact us at [EMAIL] for assistance."
//! );
//! ```
pub mod cancel;
pub mod engine;
pub mod error;
pub mod handle;
pub mod labels;
pub mod metrics;
pub mod persist;
pub mod redact;
pub mod span;
pub mod tagger;
pub mod types;

// Re-export primary API
pub use cancel::CancellationToken;
pub use engine::NerEngine;
pub use error::{RedactaError, Result};
pub use handle::ModelHandle;
pub use labels::LabelExtractor;
pub use metrics::{CategoryCounts, Evaluator, MetricsResult, evaluate, scored_labels};
pub use persist::save_atomically;
pub use redact::{placeholder, redact};
pub use span::{EntitySpan, resolve_overlaps};
pub use tagger::PiiTagger;
pub use types::{LabeledExample, LossSummary, TrainingDoc, accumulate_losses};
