use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Errors that can occur during Redacta operations.
#[derive(Debug, Error)]
pub enum RedactaError {
    /// A training or test set was empty, or a request carried nothing usable.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A required file (default dataset, model config) does not exist.
    #[error("missing resource: {}", path.display())]
    MissingResource {
        /// The path that was looked up.
        path: PathBuf,
    },

    /// Neither the trained model nor the fallback model could be loaded.
    #[error("no model available: {0}")]
    ModelUnavailable(String),

    /// A span lies outside the text, is empty, or cuts a UTF-8 character.
    #[error("invalid span {start}..{end} for text of length {len}")]
    InvalidSpan {
        /// Span start offset.
        start: usize,
        /// Span end offset.
        end: usize,
        /// Length of the text the span was checked against.
        len: usize,
    },

    /// Two spans handed to the redactor share at least one byte.
    #[error("overlapping spans {first:?} and {second:?}")]
    OverlappingSpans {
        /// The earlier span as `(start, end)`.
        first: (usize, usize),
        /// The later span as `(start, end)`.
        second: (usize, usize),
    },

    /// Annotated text could not be aligned back to its raw text.
    #[error("annotated text does not align with raw text: {0}")]
    Misaligned(String),

    /// The pre-tokenizer rejected the input.
    #[error("tokenizer error: {0}")]
    TokenizerError(String),

    /// Candle tensor or safetensors failure.
    #[error("tensor error: {0}")]
    CandleError(String),

    /// A regex pattern failed to compile (should not happen with static patterns).
    #[error("regex compilation error: {0}")]
    RegexError(#[from] regex::Error),

    /// Filesystem failure.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding or decoding failure.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// An inference call ran past its deadline.
    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    /// A training run was cancelled before completion.
    #[error("operation cancelled")]
    Cancelled,

    /// A background task panicked or was aborted.
    #[error("background task failed: {0}")]
    TaskFailed(String),

    /// A thread panicked while holding the model lock.
    #[error("model lock poisoned")]
    LockPoisoned,
}

impl From<candle_core::Error> for RedactaError {
    fn from(err: candle_core::Error) -> Self {
        RedactaError::CandleError(err.to_string())
    }
}

/// Result type alias for Redacta operations.
pub type Result<T> = std::result::Result<T, RedactaError>;
