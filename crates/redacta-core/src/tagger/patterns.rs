use regex::Regex;

use crate::error::Result;
use crate::span::EntitySpan;

/// Regex recognizers for PII with a fixed surface form.
///
/// These need no training and give an untrained tagger something to
/// redact; learned entities take priority over them when both fire on the
/// same text.
#[derive(Debug, Clone)]
pub struct PatternRecognizer {
    patterns: Vec<(String, Regex)>,
}

impl PatternRecognizer {
    /// Constructs a new `PatternRecognizer` with the built-in patterns.
    ///
    /// # Errors
    ///
    /// Returns `RedactaError::RegexError` if any pattern fails to compile
    /// (should never happen with the static patterns defined here).
    pub fn new() -> Result<Self> {
        let patterns = vec![
            (
                "EMAIL".to_string(),
                Regex::new(r"(?i)\b[a-z0-9._%+-]+@[a-z0-9-]+(?:\.[a-z0-9-]+)*\.[a-z]{2,}\b")?,
            ),
            (
                "URL".to_string(),
                Regex::new(r"(?i)\bhttps?://[^\s<>]*[^\s<>.,;:!?)\]]")?,
            ),
            (
                "IP_ADDRESS".to_string(),
                Regex::new(r"\b(?:(?:25[0-5]|2[0-4]\d|1?\d?\d)\.){3}(?:25[0-5]|2[0-4]\d|1?\d?\d)\b")?,
            ),
            (
                "CREDIT_CARD".to_string(),
                Regex::new(r"\b(?:\d{4}[ -]?){3}\d{4}\b")?,
            ),
            (
                "PHONE_NUMBER".to_string(),
                Regex::new(
                    r"(?:\+\d{1,3}[ .-]?|\(\d{1,4}\)[ ]?)?\b\d{2,4}[ .-]\d{3,4}(?:[ .-]\d{3,4})?\b",
                )?,
            ),
        ];
        Ok(Self { patterns })
    }

    /// Labels this recognizer can emit.
    pub fn labels(&self) -> Vec<String> {
        self.patterns.iter().map(|(label, _)| label.clone()).collect()
    }

    /// All matches of all patterns, possibly overlapping.
    pub fn recognize(&self, text: &str) -> Vec<EntitySpan> {
        self.patterns
            .iter()
            .flat_map(|(label, re)| {
                re.find_iter(text)
                    .map(move |m| EntitySpan::new(m.start(), m.end(), label.as_str()))
            })
            .collect()
    }
}
