//! # Bracket Marker Labels
//!
//! Recovers category labels from annotated text such as
//! `"[NAME] is the new CEO."`, and aligns the markers back onto the raw text
//! the annotation was made from.

use regex::Regex;

use crate::error::{RedactaError, Result};
use crate::span::EntitySpan;

/// Scanner for `[CATEGORY]` markers.
#[derive(Debug, Clone)]
pub struct LabelExtractor {
    re_marker: Regex,
}

impl LabelExtractor {
    /// Constructs a new `LabelExtractor` with the marker pattern compiled.
    ///
    /// # Errors
    ///
    /// Returns `RedactaError::RegexError` if the pattern fails to compile
    /// (should never happen with the static pattern defined here).
    pub fn new() -> Result<Self> {
        Ok(Self {
            re_marker: Regex::new(r"\[([^\]]*)\]")?,
        })
    }

    /// All markers of `annotated`, left to right.
    ///
    /// Offsets refer to the annotated text itself and cover the brackets.
    /// Unmatched brackets produce no marker.
    ///
    /// # Examples
    /// ```
    /// use redacta_core::LabelExtractor;
    ///
    /// let extractor = LabelExtractor::new().unwrap();
    /// let markers = extractor.extract("Contact [NAME] at [EMAIL].");
    /// assert_eq!(markers.len(), 2);
    /// assert_eq!((markers[0].start, markers[0].end), (8, 14));
    /// assert_eq!(markers[1].label, "EMAIL");
    /// ```
    pub fn extract(&self, annotated: &str) -> Vec<EntitySpan> {
        self.re_marker
            .captures_iter(annotated)
            .filter_map(|caps| {
                let whole = caps.get(0)?;
                let label = caps.get(1)?;
                Some(EntitySpan::new(whole.start(), whole.end(), label.as_str()))
            })
            .collect()
    }

    /// Category labels of `annotated` in order of occurrence, duplicates kept.
    pub fn categories(&self, annotated: &str) -> Vec<String> {
        self.re_marker
            .captures_iter(annotated)
            .filter_map(|caps| caps.get(1).map(|m| m.as_str().to_string()))
            .collect()
    }

    /// Spans over `raw` for each marker of `annotated`.
    ///
    /// Walks both strings with a cursor each: literal text between markers
    /// must match `raw` exactly, and a marker covers the raw text up to the
    /// first following occurrence of the next literal segment. The last
    /// marker extends to where the trailing literal begins as a suffix of
    /// `raw`.
    ///
    /// # Errors
    ///
    /// `RedactaError::Misaligned` when literal text differs, two markers are
    /// adjacent, a marker would cover nothing, or a label is empty.
    pub fn align(&self, raw: &str, annotated: &str) -> Result<Vec<EntitySpan>> {
        let markers = self.extract(annotated);
        let mut spans = Vec::with_capacity(markers.len());
        let mut raw_cursor = 0;
        let mut annotated_cursor = 0;

        for (i, marker) in markers.iter().enumerate() {
            if marker.label.trim().is_empty() {
                return Err(RedactaError::Misaligned(format!(
                    "empty category marker at offset {}",
                    marker.start
                )));
            }

            let leading = &annotated[annotated_cursor..marker.start];
            if !raw[raw_cursor..].starts_with(leading) {
                return Err(RedactaError::Misaligned(format!(
                    "literal {leading:?} not found at raw offset {raw_cursor}"
                )));
            }
            raw_cursor += leading.len();
            let entity_start = raw_cursor;

            let next_marker = markers.get(i + 1);
            let following_end = next_marker.map_or(annotated.len(), |m| m.start);
            let following = &annotated[marker.end..following_end];

            let entity_end = match next_marker {
                Some(_) if following.is_empty() => {
                    return Err(RedactaError::Misaligned(format!(
                        "adjacent markers at offset {} cannot be separated",
                        marker.end
                    )));
                }
                Some(_) => {
                    let first_char = raw[entity_start..].chars().next().ok_or_else(|| {
                        RedactaError::Misaligned(format!(
                            "raw text ends before [{}]",
                            marker.label
                        ))
                    })?;
                    let search_from = entity_start + first_char.len_utf8();
                    raw[search_from..]
                        .find(following)
                        .map(|pos| search_from + pos)
                        .ok_or_else(|| {
                            RedactaError::Misaligned(format!(
                                "literal {following:?} after [{}] not found",
                                marker.label
                            ))
                        })?
                }
                None => {
                    if !raw.ends_with(following) {
                        return Err(RedactaError::Misaligned(format!(
                            "raw text does not end with {following:?}"
                        )));
                    }
                    raw.len() - following.len()
                }
            };

            if entity_end <= entity_start {
                return Err(RedactaError::Misaligned(format!(
                    "[{}] covers no raw text",
                    marker.label
                )));
            }

            spans.push(EntitySpan::new(entity_start, entity_end, marker.label.as_str()));
            raw_cursor = entity_end;
            annotated_cursor = marker.end;
        }

        if raw[raw_cursor..] != annotated[annotated_cursor..] {
            return Err(RedactaError::Misaligned(format!(
                "trailing text differs after raw offset {raw_cursor}"
            )));
        }

        Ok(spans)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::redact::redact;

    fn extractor() -> LabelExtractor {
        LabelExtractor::new().unwrap()
    }

    #[test]
    fn test_extract_order_and_offsets() {
        let annotated = "[NAME] works at [ORGANIZATION] in [ADDRESS].";
        let markers = extractor().extract(annotated);

        let labels: Vec<_> = markers.iter().map(|m| m.label.as_str()).collect();
        assert_eq!(labels, vec!["NAME", "ORGANIZATION", "ADDRESS"]);
        assert_eq!((markers[0].start, markers[0].end), (0, 6));
        assert_eq!(&annotated[markers[1].start..markers[1].end], "[ORGANIZATION]");
    }

    #[test]
    fn test_extract_no_markers() {
        assert!(extractor().extract("Plain text without markers.").is_empty());
    }

    #[test]
    fn test_extract_malformed_brackets() {
        let ex = extractor();
        assert!(ex.extract("an unmatched [ bracket").is_empty());
        assert!(ex.extract("an unmatched ] bracket").is_empty());

        let markers = ex.extract("broken ] then [EMAIL] then [ dangling");
        assert_eq!(markers.len(), 1);
        assert_eq!(markers[0].label, "EMAIL");
    }

    #[test]
    fn test_categories_keep_duplicates() {
        let categories = extractor().categories("[NAME] met [NAME] at [ADDRESS]");
        assert_eq!(categories, vec!["NAME", "NAME", "ADDRESS"]);
    }

    #[test]
    fn test_extract_counts_constructed_markers() {
        let raw = "Send your documents to legal@acme.com or visit our office at 456 Business Ave.";
        let spans = vec![
            EntitySpan::new(23, 37, "EMAIL"),
            EntitySpan::new(61, 77, "ADDRESS"),
        ];
        let annotated = redact(raw, &spans).unwrap();
        let markers = extractor().extract(&annotated);
        assert_eq!(markers.len(), spans.len());
        assert_eq!(markers[0].label, "EMAIL");
        assert_eq!(markers[1].label, "ADDRESS");
    }

    #[test]
    fn test_align_single_marker() {
        let spans = extractor()
            .align("Maria Garcia is the new CEO.", "[NAME] is the new CEO.")
            .unwrap();
        assert_eq!(spans, vec![EntitySpan::new(0, 12, "NAME")]);
    }

    #[test]
    fn test_align_multiple_markers() {
        let raw = "Please contact Sarah Thompson at sarah.thompson@company.com.au or 0422 111 222 to schedule a meeting.";
        let annotated = "Please contact [NAME] at [EMAIL] or [PHONE_NUMBER] to schedule a meeting.";
        let spans = extractor().align(raw, annotated).unwrap();

        let covered: Vec<_> = spans.iter().map(|s| &raw[s.start..s.end]).collect();
        assert_eq!(
            covered,
            vec!["Sarah Thompson", "sarah.thompson@company.com.au", "0422 111 222"]
        );
    }

    #[test]
    fn test_align_trailing_marker() {
        let raw = "The company is located at 202 Grenfell Street, Adelaide, SA 5000.";
        let annotated = "The company is located at [ADDRESS].";
        let spans = extractor().align(raw, annotated).unwrap();
        assert_eq!(&raw[spans[0].start..spans[0].end], "202 Grenfell Street, Adelaide, SA 5000");
    }

    #[test]
    fn test_align_roundtrips_through_redact() {
        let raw = "John Smith works at Acme Corporation in New York.";
        let annotated = "[NAME] works at [ORGANIZATION] in [ADDRESS].";
        let spans = extractor().align(raw, annotated).unwrap();
        assert_eq!(redact(raw, &spans).unwrap(), annotated);
    }

    #[test]
    fn test_align_no_markers_requires_identical_text() {
        let ex = extractor();
        assert!(ex.align("same text", "same text").unwrap().is_empty());
        assert!(ex.align("same text", "other text").is_err());
    }

    #[test]
    fn test_align_rejects_adjacent_markers() {
        let err = extractor().align("JohnSmith", "[FIRST][LAST]").unwrap_err();
        assert!(matches!(err, RedactaError::Misaligned(_)));
    }

    #[test]
    fn test_align_rejects_literal_mismatch() {
        let err = extractor()
            .align("Maria Garcia is the new CEO.", "[NAME] was the new CEO.")
            .unwrap_err();
        assert!(matches!(err, RedactaError::Misaligned(_)));
    }

    #[test]
    fn test_align_rejects_empty_label() {
        let err = extractor().align("Maria here", "[] here").unwrap_err();
        assert!(matches!(err, RedactaError::Misaligned(_)));
    }
}
