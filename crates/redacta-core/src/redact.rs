//! # Redactor
//!
//! Replaces entity spans with bracketed category placeholders.

use crate::error::{RedactaError, Result};
use crate::span::EntitySpan;

/// The placeholder written in place of an entity: `[LABEL]`.
pub fn placeholder(label: &str) -> String {
    format!("[{label}]")
}

/// Replace each span of `text` with `[label]`.
///
/// Spans must be valid for `text` and pairwise disjoint; overlapping input is
/// rejected rather than producing corrupted output. Run engine output
/// through [`resolve_overlaps`](crate::span::resolve_overlaps) first when it
/// may overlap.
///
/// # Examples
/// ```
/// use redacta_core::{redact, EntitySpan};
///
/// let text = "Contact Sarah Thompson today.";
/// let spans = vec![EntitySpan::new(8, 22, "NAME")];
/// assert_eq!(redact(text, &spans).unwrap(), "Contact [NAME] today.");
/// ```
pub fn redact(text: &str, spans: &[EntitySpan]) -> Result<String> {
    if spans.is_empty() {
        return Ok(text.to_string());
    }

    let mut ordered: Vec<&EntitySpan> = spans.iter().collect();
    ordered.sort_by(|a, b| b.start.cmp(&a.start));

    for span in &ordered {
        span.validate(text)?;
    }
    // Descending order: each span must end at or before the previous one starts.
    for pair in ordered.windows(2) {
        let (later, earlier) = (pair[0], pair[1]);
        if earlier.end > later.start {
            return Err(RedactaError::OverlappingSpans {
                first: (earlier.start, earlier.end),
                second: (later.start, later.end),
            });
        }
    }

    let mut redacted = text.to_string();
    for span in ordered {
        redacted.replace_range(span.start..span.end, &placeholder(&span.label));
    }
    Ok(redacted)
}
