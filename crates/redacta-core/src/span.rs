//! # Entity Spans
//!
//! Byte-offset spans over a text, as produced by an NER engine or recovered
//! from annotated text.

use serde::{Deserialize, Serialize};

use crate::error::{RedactaError, Result};

/// A labeled region `start..end` of a text.
///
/// Offsets are UTF-8 byte offsets into the `&str` the span was produced for.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntitySpan {
    /// Inclusive start offset
    pub start: usize,
    /// Exclusive end offset
    pub end: usize,
    /// Category label, e.g. `NAME` or `EMAIL`
    pub label: String,
}

impl EntitySpan {
    /// Create a new span.
    pub fn new(start: usize, end: usize, label: impl Into<String>) -> Self {
        Self {
            start,
            end,
            label: label.into(),
        }
    }

    /// Length of the span in bytes.
    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    /// Whether the span covers no bytes.
    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    /// Whether the two spans share at least one byte.
    pub fn overlaps(&self, other: &EntitySpan) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// Check `0 <= start < end <= text.len()` and that both offsets fall on
    /// char boundaries.
    pub fn validate(&self, text: &str) -> Result<()> {
        if self.start >= self.end
            || self.end > text.len()
            || !text.is_char_boundary(self.start)
            || !text.is_char_boundary(self.end)
        {
            return Err(RedactaError::InvalidSpan {
                start: self.start,
                end: self.end,
                len: text.len(),
            });
        }
        Ok(())
    }

    /// The covered slice of `text`, if the span is valid for it.
    pub fn slice<'a>(&self, text: &'a str) -> Option<&'a str> {
        text.get(self.start..self.end)
    }
}

/// Reduce a span list to a disjoint set.
///
/// Spans are taken in order of ascending start, longer span first on equal
/// starts; a span that overlaps one already kept is dropped. The result is
/// sorted by start.
pub fn resolve_overlaps(mut spans: Vec<EntitySpan>) -> Vec<EntitySpan> {
    spans.sort_by(|a, b| a.start.cmp(&b.start).then(b.end.cmp(&a.end)));

    let mut kept: Vec<EntitySpan> = Vec::with_capacity(spans.len());
    for span in spans {
        if span.is_empty() {
            continue;
        }
        match kept.last() {
            Some(last) if last.end > span.start => {
                tracing::debug!(
                    dropped = ?(span.start, span.end, &span.label),
                    kept = ?(last.start, last.end, &last.label),
                    "dropping overlapping span"
                );
            }
            _ => kept.push(span),
        }
    }
    kept
}
