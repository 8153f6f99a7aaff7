//! # Tokenizer for the CRF Tagger
//!
//! Splits text into word and punctuation tokens with byte offsets into the
//! original string. Splitting itself is delegated to the `tokenizers`
//! crate's `Whitespace` pre-tokenizer (`\w+|[^\w\s]+`).

use tokenizers::pre_tokenizers::whitespace::Whitespace;
use tokenizers::{OffsetReferential, OffsetType, PreTokenizedString, PreTokenizer};

use crate::error::{RedactaError, Result};

/// A token extracted from text with positional information.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    /// The token text as it appears in the input
    pub text: String,
    /// Start byte offset in the original string
    pub start: usize,
    /// End byte offset in the original string
    pub end: usize,
    /// Token index in the sequence
    pub index: usize,
}

/// Word-level tokenizer.
#[derive(Debug, Clone, Default)]
pub struct Tokenizer {
    pre_tokenizer: Whitespace,
}

impl Tokenizer {
    /// Create a new tokenizer instance.
    pub fn new() -> Self {
        Self::default()
    }

    /// Tokenize text into a sequence of tokens.
    ///
    /// # Examples
    /// ```
    /// use redacta_core::tagger::Tokenizer;
    ///
    /// let tokenizer = Tokenizer::new();
    /// let tokens = tokenizer.tokenize("Contact sarah@acme.com today").unwrap();
    /// assert_eq!(tokens[0].text, "Contact");
    /// assert_eq!((tokens[0].start, tokens[0].end), (0, 7));
    /// ```
    pub fn tokenize(&self, input: &str) -> Result<Vec<Token>> {
        if input.is_empty() {
            return Ok(Vec::new());
        }

        let mut pretokenized = PreTokenizedString::from(input);
        self.pre_tokenizer
            .pre_tokenize(&mut pretokenized)
            .map_err(|e| RedactaError::TokenizerError(e.to_string()))?;

        let tokens = pretokenized
            .get_splits(OffsetReferential::Original, OffsetType::Byte)
            .into_iter()
            .filter(|(text, _, _)| !text.is_empty())
            .enumerate()
            .map(|(index, (text, (start, end), _))| Token {
                text: text.to_string(),
                start,
                end,
                index,
            })
            .collect();

        Ok(tokens)
    }
}
