//! # BIO Tags for Named Entity Recognition
//!
//! Defines the tag set for sequence labeling over an open set of entity
//! categories, using the BIO (Begin-Inside-Outside) scheme. Tag indices are
//! stable as labels are added: `O` is 0, and label `k` owns `B` at `2k + 1`
//! and `I` at `2k + 2`.

use std::collections::HashMap;
use std::fmt;

use crate::span::EntitySpan;
use crate::tagger::tokenizer::Token;

/// A BIO tag referring to a label by its position in the [`TagSet`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BioTag {
    Begin(usize),
    Inside(usize),
    Outside,
}

impl BioTag {
    /// Get the tag index for weight lookups.
    pub fn index(&self) -> usize {
        match self {
            BioTag::Outside => 0,
            BioTag::Begin(label) => 2 * label + 1,
            BioTag::Inside(label) => 2 * label + 2,
        }
    }

    /// Get tag from index.
    pub fn from_index(idx: usize, num_labels: usize) -> Option<Self> {
        match idx {
            0 => Some(BioTag::Outside),
            i if i > 2 * num_labels => None,
            i if i % 2 == 1 => Some(BioTag::Begin((i - 1) / 2)),
            i => Some(BioTag::Inside((i - 2) / 2)),
        }
    }

    /// Check if this is an "Inside" tag.
    pub fn is_inside(&self) -> bool {
        matches!(self, BioTag::Inside(_))
    }

    /// Position of the label this tag belongs to.
    pub fn label(&self) -> Option<usize> {
        match self {
            BioTag::Begin(label) | BioTag::Inside(label) => Some(*label),
            BioTag::Outside => None,
        }
    }

    /// Check if transitioning from `from` tag to `to` tag is valid.
    ///
    /// `I-X` may only follow `B-X` or `I-X`.
    pub fn is_valid_transition(from: BioTag, to: BioTag) -> bool {
        match to {
            BioTag::Inside(label) => from.label() == Some(label),
            _ => true,
        }
    }

    /// Whether a sequence may start with this tag.
    pub fn can_start(&self) -> bool {
        !self.is_inside()
    }
}

/// The labels known to a model and the tags derived from them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagSet {
    labels: Vec<String>,
    positions: HashMap<String, usize>,
}

impl TagSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a tag set from labels in order, skipping duplicates.
    pub fn from_labels<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut set = Self::new();
        for label in labels {
            set.insert(label.as_ref());
        }
        set
    }

    /// Add a label. Returns `false` if it was already known.
    pub fn insert(&mut self, label: &str) -> bool {
        if self.positions.contains_key(label) {
            return false;
        }
        self.positions.insert(label.to_string(), self.labels.len());
        self.labels.push(label.to_string());
        true
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn num_labels(&self) -> usize {
        self.labels.len()
    }

    /// Total number of distinct tags.
    pub fn num_tags(&self) -> usize {
        2 * self.labels.len() + 1
    }

    pub fn position(&self, label: &str) -> Option<usize> {
        self.positions.get(label).copied()
    }

    pub fn tag(&self, idx: usize) -> Option<BioTag> {
        BioTag::from_index(idx, self.num_labels())
    }

    /// Human-readable tag name, e.g. `B-NAME`.
    pub fn name(&self, tag: BioTag) -> String {
        match tag {
            BioTag::Outside => "O".to_string(),
            BioTag::Begin(label) => format!("B-{}", self.label_name(label)),
            BioTag::Inside(label) => format!("I-{}", self.label_name(label)),
        }
    }

    fn label_name(&self, label: usize) -> &str {
        self.labels.get(label).map_or("?", String::as_str)
    }

    /// Gold tag indices for `tokens` given entity spans over the same text.
    ///
    /// A token belongs to a span if they share any byte. Spans with unknown
    /// labels are ignored.
    pub fn encode(&self, tokens: &[Token], spans: &[EntitySpan]) -> Vec<usize> {
        let mut tags = vec![BioTag::Outside.index(); tokens.len()];

        for span in spans {
            let Some(label) = self.position(&span.label) else {
                continue;
            };
            let mut first = true;
            for (i, token) in tokens.iter().enumerate() {
                if token.start < span.end && token.end > span.start {
                    let tag = if first {
                        BioTag::Begin(label)
                    } else {
                        BioTag::Inside(label)
                    };
                    tags[i] = tag.index();
                    first = false;
                }
            }
        }

        tags
    }

    /// Assemble entity spans from decoded tag indices.
    ///
    /// A `B-X` starts an entity that absorbs following `I-X` tokens; its span
    /// runs from the first token's start to the last token's end. A stray
    /// `I-X` is treated as a `B-X`.
    pub fn decode(&self, tokens: &[Token], tag_indices: &[usize]) -> Vec<EntitySpan> {
        let tags: Vec<BioTag> = tag_indices
            .iter()
            .map(|&idx| self.tag(idx).unwrap_or(BioTag::Outside))
            .collect();

        let mut entities = Vec::new();
        let mut i = 0;
        while i < tags.len().min(tokens.len()) {
            let Some(label) = tags[i].label() else {
                i += 1;
                continue;
            };

            let start = tokens[i].start;
            let mut end = tokens[i].end;
            i += 1;

            while i < tags.len().min(tokens.len()) && tags[i] == BioTag::Inside(label) {
                end = tokens[i].end;
                i += 1;
            }

            entities.push(EntitySpan::new(start, end, self.label_name(label)));
        }

        entities
    }
}

impl fmt::Display for TagSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<String> = (0..self.num_tags())
            .filter_map(|idx| self.tag(idx))
            .map(|tag| self.name(tag))
            .collect();
        write!(f, "{}", names.join(" "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tagger::tokenizer::Tokenizer;

    fn tag_set() -> TagSet {
        TagSet::from_labels(["NAME", "EMAIL"])
    }

    #[test]
    fn test_tag_index_roundtrip() {
        let set = tag_set();
        for idx in 0..set.num_tags() {
            let tag = set.tag(idx).unwrap();
            assert_eq!(tag.index(), idx);
        }
        assert_eq!(set.tag(set.num_tags()), None);
    }

    #[test]
    fn test_tag_names() {
        let set = tag_set();
        assert_eq!(set.to_string(), "O B-NAME I-NAME B-EMAIL I-EMAIL");
    }

    #[test]
    fn test_insert_keeps_indices_stable() {
        let mut set = tag_set();
        let before = set.position("EMAIL");
        assert!(set.insert("ADDRESS"));
        assert!(!set.insert("NAME"));
        assert_eq!(set.position("EMAIL"), before);
        assert_eq!(set.num_tags(), 7);
    }

    #[test]
    fn test_valid_transitions() {
        assert!(BioTag::is_valid_transition(BioTag::Begin(0), BioTag::Inside(0)));
        assert!(BioTag::is_valid_transition(BioTag::Inside(0), BioTag::Inside(0)));
        assert!(BioTag::is_valid_transition(BioTag::Outside, BioTag::Begin(1)));
        assert!(BioTag::is_valid_transition(BioTag::Inside(1), BioTag::Outside));
    }

    #[test]
    fn test_invalid_transitions() {
        assert!(!BioTag::is_valid_transition(BioTag::Outside, BioTag::Inside(0)));
        assert!(!BioTag::is_valid_transition(BioTag::Begin(1), BioTag::Inside(0)));
        assert!(!BioTag::is_valid_transition(BioTag::Inside(0), BioTag::Inside(1)));
        assert!(!BioTag::Inside(0).can_start());
    }

    #[test]
    fn test_encode_decode() {
        let set = tag_set();
        let text = "Contact Sarah Thompson at sarah@acme.com today";
        let tokens = Tokenizer::new().tokenize(text).unwrap();
        let spans = vec![
            EntitySpan::new(8, 22, "NAME"),
            EntitySpan::new(26, 40, "EMAIL"),
        ];

        let gold = set.encode(&tokens, &spans);
        let names: Vec<String> = gold
            .iter()
            .map(|&idx| set.name(set.tag(idx).unwrap()))
            .collect();
        assert_eq!(
            names,
            vec!["O", "B-NAME", "I-NAME", "O", "B-EMAIL", "I-EMAIL", "I-EMAIL", "I-EMAIL", "I-EMAIL", "O"]
        );

        assert_eq!(set.decode(&tokens, &gold), spans);
    }

    #[test]
    fn test_decode_adjacent_entities() {
        let set = tag_set();
        let tokens = Tokenizer::new().tokenize("Alice Bob").unwrap();
        let tags = vec![BioTag::Begin(0).index(), BioTag::Begin(0).index()];

        let spans = set.decode(&tokens, &tags);
        assert_eq!(
            spans,
            vec![EntitySpan::new(0, 5, "NAME"), EntitySpan::new(6, 9, "NAME")]
        );
    }
}
