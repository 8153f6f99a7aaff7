//! # Viterbi Decoding for CRF
//!
//! Implements the Viterbi algorithm for finding the most likely tag sequence
//! given emission scores and BIO transition constraints.

use crate::error::{RedactaError, Result};
use crate::tagger::tags::{BioTag, TagSet};

/// Viterbi decoder for CRF tag sequences.
#[derive(Debug, Clone)]
pub struct ViterbiDecoder {
    num_tags: usize,
    /// `valid[prev][curr]`
    valid: Vec<Vec<bool>>,
    can_start: Vec<bool>,
}

impl ViterbiDecoder {
    /// Create a decoder with constraints pre-computed for `tags`.
    pub fn new(tags: &TagSet) -> Self {
        let num_tags = tags.num_tags();
        let all: Vec<BioTag> = (0..num_tags).filter_map(|idx| tags.tag(idx)).collect();

        let valid = all
            .iter()
            .map(|&prev| {
                all.iter()
                    .map(|&curr| BioTag::is_valid_transition(prev, curr))
                    .collect()
            })
            .collect();
        let can_start = all.iter().map(BioTag::can_start).collect();

        Self {
            num_tags,
            valid,
            can_start,
        }
    }

    /// Decode the optimal tag sequence.
    ///
    /// # Arguments
    /// * `emission_scores` - Matrix of shape [seq_len, num_tags] with emission scores
    /// * `transition_matrix` - Matrix of shape [num_tags, num_tags] with transition scores
    ///
    /// # Returns
    /// The optimal tag sequence as indices. Forbidden transitions and
    /// forbidden start tags are never chosen.
    pub fn decode(
        &self,
        emission_scores: &[Vec<f32>],
        transition_matrix: &[Vec<f32>],
    ) -> Result<Vec<usize>> {
        let seq_len = emission_scores.len();
        if seq_len == 0 {
            return Ok(Vec::new());
        }

        if emission_scores.iter().any(|row| row.len() != self.num_tags) {
            return Err(RedactaError::CandleError(format!(
                "emission score dimension mismatch: expected {} tags",
                self.num_tags
            )));
        }
        if transition_matrix.len() != self.num_tags
            || transition_matrix.iter().any(|row| row.len() != self.num_tags)
        {
            return Err(RedactaError::CandleError(format!(
                "transition matrix dimension mismatch: expected {0}x{0}",
                self.num_tags
            )));
        }

        // DP table
        let mut dp: Vec<Vec<f32>> = vec![vec![f32::NEG_INFINITY; self.num_tags]; seq_len];
        let mut backptr: Vec<Vec<Option<usize>>> = vec![vec![None; self.num_tags]; seq_len];

        // Initialize
        for tag in 0..self.num_tags {
            if self.can_start[tag] {
                dp[0][tag] = emission_scores[0][tag];
            }
        }

        // Forward pass with constraints
        for pos in 1..seq_len {
            for curr_tag in 0..self.num_tags {
                let mut best_score = f32::NEG_INFINITY;
                let mut best_prev = None;

                for prev_tag in 0..self.num_tags {
                    if !self.valid[prev_tag][curr_tag] {
                        continue;
                    }

                    let score = dp[pos - 1][prev_tag]
                        + transition_matrix[prev_tag][curr_tag]
                        + emission_scores[pos][curr_tag];

                    if score > best_score {
                        best_score = score;
                        best_prev = Some(prev_tag);
                    }
                }

                dp[pos][curr_tag] = best_score;
                backptr[pos][curr_tag] = best_prev;
            }
        }

        // Backtrack
        let mut best_final_tag = 0;
        let mut best_final_score = f32::NEG_INFINITY;
        for tag in 0..self.num_tags {
            if dp[seq_len - 1][tag] > best_final_score {
                best_final_score = dp[seq_len - 1][tag];
                best_final_tag = tag;
            }
        }

        let mut path = vec![best_final_tag];
        let mut curr_tag = best_final_tag;

        for pos in (1..seq_len).rev() {
            curr_tag = backptr[pos][curr_tag].unwrap_or(0);
            path.push(curr_tag);
        }

        path.reverse();
        Ok(path)
    }
}
