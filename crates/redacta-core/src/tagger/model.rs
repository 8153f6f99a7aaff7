//! CRF model for sequence labeling.
//! Hashed lexical features with structured-perceptron updates.

use std::collections::HashMap;
use std::path::Path;

use candle_core::{Device, Tensor};

use crate::error::{RedactaError, Result};
use crate::tagger::tags::TagSet;
use crate::tagger::tokenizer::Token;
use crate::tagger::viterbi::ViterbiDecoder;

/// Default number of hashed feature buckets per tag.
pub const DEFAULT_FEATURE_BUCKETS: usize = 1 << 14;

const EMISSION_TENSOR: &str = "emission";
const TRANSITION_TENSOR: &str = "transition";

#[derive(Debug, Clone)]
pub struct CrfModel {
    tags: TagSet,
    buckets: usize,
    /// `[num_tags * buckets]`, row per tag
    emission: Vec<f32>,
    /// `[num_tags * num_tags]`, `from * num_tags + to`
    transition: Vec<f32>,
}

impl CrfModel {
    pub fn new(buckets: usize) -> Self {
        let buckets = buckets.max(1);
        let tags = TagSet::new();
        let num_tags = tags.num_tags();

        Self {
            tags,
            buckets,
            emission: vec![0.0; num_tags * buckets],
            transition: vec![0.0; num_tags * num_tags],
        }
    }

    pub fn tags(&self) -> &TagSet {
        &self.tags
    }

    pub fn buckets(&self) -> usize {
        self.buckets
    }

    /// Register a label, growing the weight tables with zeroed rows.
    pub fn add_label(&mut self, label: &str) -> bool {
        let old_tags = self.tags.num_tags();
        if !self.tags.insert(label) {
            return false;
        }
        let num_tags = self.tags.num_tags();

        self.emission.resize(num_tags * self.buckets, 0.0);

        let mut transition = vec![0.0f32; num_tags * num_tags];
        for from in 0..old_tags {
            for to in 0..old_tags {
                transition[from * num_tags + to] = self.transition[from * old_tags + to];
            }
        }
        self.transition = transition;
        true
    }

    /// Feature bucket ids for every token.
    fn extract_features(&self, tokens: &[Token]) -> Vec<Vec<usize>> {
        let lowered: Vec<String> = tokens.iter().map(|t| t.text.to_lowercase()).collect();
        let shapes: Vec<String> = tokens.iter().map(|t| word_shape(&t.text)).collect();

        (0..tokens.len())
            .map(|i| {
                let token = &tokens[i].text;
                let lower = &lowered[i];
                let mut features = vec![
                    "bias".to_string(),
                    format!("w={lower}"),
                    format!("shape={}", shapes[i]),
                    format!("pre3={}", prefix(lower, 3)),
                    format!("suf3={}", suffix(lower, 3)),
                    format!("suf2={}", suffix(lower, 2)),
                ];

                if token.chars().next().is_some_and(char::is_uppercase) {
                    features.push("is_title".into());
                }
                if token.chars().any(|c| c.is_ascii_digit()) {
                    features.push("has_digit".into());
                }
                if token.chars().all(|c| !c.is_alphanumeric()) {
                    features.push(format!("punct={token}"));
                }

                // Context features
                match i.checked_sub(1) {
                    Some(p) => {
                        features.push(format!("w-1={}", lowered[p]));
                        features.push(format!("shape-1={}", shapes[p]));
                        features.push(format!("w-1|w={}|{lower}", lowered[p]));
                    }
                    None => features.push("BOS".into()),
                }
                match lowered.get(i + 1) {
                    Some(next) => {
                        features.push(format!("w+1={next}"));
                        features.push(format!("shape+1={}", shapes[i + 1]));
                    }
                    None => features.push("EOS".into()),
                }
                if let Some(p2) = i.checked_sub(2) {
                    features.push(format!("w-2={}", lowered[p2]));
                }

                features
                    .iter()
                    .map(|f| (fnv1a(f.as_bytes()) % self.buckets as u64) as usize)
                    .collect()
            })
            .collect()
    }

    fn emissions(&self, features: &[Vec<usize>]) -> Vec<Vec<f32>> {
        let num_tags = self.tags.num_tags();
        features
            .iter()
            .map(|ids| {
                (0..num_tags)
                    .map(|tag| {
                        let row = tag * self.buckets;
                        ids.iter().map(|&f| self.emission[row + f]).sum()
                    })
                    .collect()
            })
            .collect()
    }

    fn transition_matrix(&self) -> Vec<Vec<f32>> {
        let num_tags = self.tags.num_tags();
        self.transition
            .chunks(num_tags)
            .map(<[f32]>::to_vec)
            .collect()
    }

    fn sequence_score(&self, emissions: &[Vec<f32>], tags: &[usize]) -> f32 {
        let num_tags = self.tags.num_tags();
        let mut score = 0.0;
        for (pos, &tag) in tags.iter().enumerate() {
            score += emissions[pos][tag];
            if pos > 0 {
                score += self.transition[tags[pos - 1] * num_tags + tag];
            }
        }
        score
    }

    fn decode(&self, features: &[Vec<usize>]) -> Result<(Vec<Vec<f32>>, Vec<usize>)> {
        let emissions = self.emissions(features);
        let decoder = ViterbiDecoder::new(&self.tags);
        let path = decoder.decode(&emissions, &self.transition_matrix())?;
        Ok((emissions, path))
    }

    /// Most likely tag indices for `tokens`.
    pub fn predict(&self, tokens: &[Token]) -> Result<Vec<usize>> {
        if tokens.is_empty() {
            return Ok(Vec::new());
        }
        let features = self.extract_features(tokens);
        Ok(self.decode(&features)?.1)
    }

    /// One perceptron update towards `gold`.
    ///
    /// Returns the structured hinge loss `score(pred) - score(gold)` measured
    /// before the update; it is zero when the prediction already matches.
    pub fn train_step(&mut self, tokens: &[Token], gold: &[usize], lr: f32) -> Result<f32> {
        if tokens.is_empty() {
            return Ok(0.0);
        }
        if gold.len() != tokens.len() {
            return Err(RedactaError::InvalidInput(format!(
                "{} gold tags for {} tokens",
                gold.len(),
                tokens.len()
            )));
        }
        let num_tags = self.tags.num_tags();
        if let Some(&bad) = gold.iter().find(|&&tag| tag >= num_tags) {
            return Err(RedactaError::InvalidInput(format!(
                "gold tag {bad} outside tag set of {num_tags}"
            )));
        }

        let features = self.extract_features(tokens);
        let (emissions, pred) = self.decode(&features)?;
        if pred == gold {
            return Ok(0.0);
        }
        let loss = (self.sequence_score(&emissions, &pred) - self.sequence_score(&emissions, gold))
            .max(0.0);

        for (pos, ids) in features.iter().enumerate() {
            let (g, p) = (gold[pos], pred[pos]);
            if g != p {
                for &f in ids {
                    self.emission[g * self.buckets + f] += lr;
                    self.emission[p * self.buckets + f] -= lr;
                }
            }
            if pos > 0 {
                let (gp, pp) = (gold[pos - 1], pred[pos - 1]);
                if (gp, g) != (pp, p) {
                    self.transition[gp * num_tags + g] += lr;
                    self.transition[pp * num_tags + p] -= lr;
                }
            }
        }

        Ok(loss)
    }

    /// Weights as named tensors.
    pub fn to_tensors(&self) -> Result<HashMap<String, Tensor>> {
        let num_tags = self.tags.num_tags();
        let device = Device::Cpu;
        let emission = Tensor::from_vec(self.emission.clone(), (num_tags, self.buckets), &device)?;
        let transition = Tensor::from_vec(self.transition.clone(), (num_tags, num_tags), &device)?;

        Ok(HashMap::from([
            (EMISSION_TENSOR.to_string(), emission),
            (TRANSITION_TENSOR.to_string(), transition),
        ]))
    }

    /// Rebuild a model from `labels` and tensors written by [`CrfModel::to_tensors`].
    pub fn from_tensors(labels: &[String], tensors: &HashMap<String, Tensor>) -> Result<Self> {
        let tags = TagSet::from_labels(labels);
        let num_tags = tags.num_tags();

        let emission = tensors.get(EMISSION_TENSOR).ok_or_else(|| {
            RedactaError::CandleError(format!("missing tensor {EMISSION_TENSOR}"))
        })?;
        let transition = tensors.get(TRANSITION_TENSOR).ok_or_else(|| {
            RedactaError::CandleError(format!("missing tensor {TRANSITION_TENSOR}"))
        })?;

        let (emission_tags, buckets) = emission.dims2()?;
        let transition_dims = transition.dims2()?;
        if emission_tags != num_tags || transition_dims != (num_tags, num_tags) || buckets == 0 {
            return Err(RedactaError::CandleError(format!(
                "tensor shapes {:?}/{:?} do not fit {} labels",
                (emission_tags, buckets),
                transition_dims,
                labels.len()
            )));
        }

        Ok(Self {
            tags,
            buckets,
            emission: emission.flatten_all()?.to_vec1::<f32>()?,
            transition: transition.flatten_all()?.to_vec1::<f32>()?,
        })
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        candle_core::safetensors::save(&self.to_tensors()?, path)?;
        Ok(())
    }

    pub fn load(path: &Path, labels: &[String]) -> Result<Self> {
        if !path.exists() {
            return Err(RedactaError::MissingResource {
                path: path.to_path_buf(),
            });
        }
        let tensors = candle_core::safetensors::load(path, &Device::Cpu)?;
        Self::from_tensors(labels, &tensors)
    }
}

impl Default for CrfModel {
    fn default() -> Self {
        Self::new(DEFAULT_FEATURE_BUCKETS)
    }
}

/// Collapse a word to its character classes: `Garcia` -> `Xx`, `0422` -> `d`.
fn word_shape(token: &str) -> String {
    let mut shape = String::new();
    for c in token.chars() {
        let class = if c.is_uppercase() {
            'X'
        } else if c.is_lowercase() {
            'x'
        } else if c.is_ascii_digit() {
            'd'
        } else {
            c
        };
        if !shape.ends_with(class) {
            shape.push(class);
        }
    }
    shape
}

fn prefix(s: &str, n: usize) -> &str {
    s.char_indices().nth(n).map_or(s, |(idx, _)| &s[..idx])
}

fn suffix(s: &str, n: usize) -> &str {
    let count = s.chars().count();
    if count <= n {
        return s;
    }
    s.char_indices().nth(count - n).map_or(s, |(idx, _)| &s[idx..])
}

/// FNV-1a; stable across builds so persisted weights stay addressable.
fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for &b in bytes {
        hash ^= u64::from(b);
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::span::EntitySpan;
    use crate::tagger::tokenizer::Tokenizer;

    fn tokens(text: &str) -> Vec<Token> {
        Tokenizer::new().tokenize(text).unwrap()
    }

    #[test]
    fn test_word_shape_and_affixes() {
        assert_eq!(word_shape("Garcia"), "Xx");
        assert_eq!(word_shape("0422"), "d");
        assert_eq!(word_shape("CEO"), "X");
        assert_eq!(prefix("thompson", 3), "tho");
        assert_eq!(suffix("thompson", 3), "son");
        assert_eq!(suffix("au", 3), "au");
        assert_eq!(prefix("josé", 4), "josé");
    }

    #[test]
    fn test_untrained_model_predicts_outside() {
        let mut model = CrfModel::new(256);
        model.add_label("NAME");
        let pred = model.predict(&tokens("Maria Garcia is here")).unwrap();
        assert_eq!(pred, vec![0, 0, 0, 0]);
    }

    #[test]
    fn test_train_step_learns_sequence() {
        let mut model = CrfModel::new(4096);
        model.add_label("NAME");

        let text = "Maria Garcia is the new CEO.";
        let toks = tokens(text);
        let gold = model.tags().encode(&toks, &[EntitySpan::new(0, 12, "NAME")]);

        let mut last_loss = f32::MAX;
        for _ in 0..50 {
            last_loss = model.train_step(&toks, &gold, 1.0).unwrap();
        }

        assert_eq!(last_loss, 0.0);
        assert_eq!(model.predict(&toks).unwrap(), gold);
    }

    #[test]
    fn test_train_step_rejects_bad_gold() {
        let mut model = CrfModel::new(64);
        let toks = tokens("two tokens");
        assert!(model.train_step(&toks, &[0], 1.0).is_err());
        assert!(model.train_step(&toks, &[0, 7], 1.0).is_err());
    }

    #[test]
    fn test_add_label_preserves_transitions() {
        let mut model = CrfModel::new(16);
        model.add_label("NAME");
        // B-NAME -> I-NAME
        model.transition[3 + 2] = 4.0;

        assert!(model.add_label("EMAIL"));
        assert!(!model.add_label("NAME"));
        assert_eq!(model.transition[5 + 2], 4.0);
        assert_eq!(model.emission.len(), 5 * 16);
    }

    #[test]
    fn test_tensor_roundtrip() {
        let mut model = CrfModel::new(32);
        model.add_label("NAME");
        model.emission[5] = 1.5;
        model.transition[2] = -0.5;

        let tensors = model.to_tensors().unwrap();
        let restored = CrfModel::from_tensors(&["NAME".to_string()], &tensors).unwrap();

        assert_eq!(restored.emission, model.emission);
        assert_eq!(restored.transition, model.transition);
        assert_eq!(restored.buckets(), 32);
    }

    #[test]
    fn test_from_tensors_rejects_label_mismatch() {
        let mut model = CrfModel::new(8);
        model.add_label("NAME");
        let tensors = model.to_tensors().unwrap();

        let labels = vec!["NAME".to_string(), "EMAIL".to_string()];
        assert!(CrfModel::from_tensors(&labels, &tensors).is_err());
    }
}
