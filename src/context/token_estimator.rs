//! Token estimation without calling the model

use super::models::{Transcript, Turn};
use crate::error::{ContextError, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tiktoken_rs::{cl100k_base, CoreBPE};

/// Token estimator trait for different tokenization strategies
pub trait TokenEstimator: Send + Sync {
    /// Estimate the number of tokens in the given text
    fn estimate(&self, text: &str) -> usize;

    /// Estimate tokens for multiple texts
    fn estimate_batch(&self, texts: &[&str]) -> Vec<usize> {
        texts.iter().map(|t| self.estimate(t)).collect()
    }

    /// Sum of per-turn estimates
    fn estimate_turns(&self, turns: &[Turn]) -> usize {
        turns.iter().map(|t| self.estimate(&t.content)).sum()
    }

    fn estimate_transcript(&self, transcript: &Transcript) -> usize {
        self.estimate_turns(transcript.turns())
    }
}

/// Which estimator the service uses for threshold decisions
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EstimatorKind {
    #[default]
    Heuristic,
    Tiktoken,
}

/// Build the configured estimator
pub fn build_estimator(kind: EstimatorKind) -> Result<Arc<dyn TokenEstimator>> {
    match kind {
        EstimatorKind::Heuristic => Ok(Arc::new(HeuristicEstimator::default())),
        EstimatorKind::Tiktoken => Ok(Arc::new(TiktokenEstimator::new()?)),
    }
}

/// Character/word heuristic estimator
///
/// Takes the larger of `ceil(chars / chars_per_token)` and
/// `ceil(words / words_per_token)`, so neither dense prose nor short,
/// punctuation-heavy input is undercounted. Characters are Unicode scalar
/// values; words are whitespace-separated runs.
#[derive(Debug, Clone)]
pub struct HeuristicEstimator {
    chars_per_token: f64,
    words_per_token: f64,
}

impl HeuristicEstimator {
    pub fn new(chars_per_token: f64, words_per_token: f64) -> Self {
        Self {
            chars_per_token,
            words_per_token,
        }
    }
}

impl Default for HeuristicEstimator {
    fn default() -> Self {
        Self::new(4.0, 0.75)
    }
}

impl TokenEstimator for HeuristicEstimator {
    fn estimate(&self, text: &str) -> usize {
        if text.is_empty() {
            return 0;
        }
        let chars = text.chars().count();
        let words = text.split_whitespace().count();

        let by_chars = (chars as f64 / self.chars_per_token).ceil() as usize;
        let by_words = (words as f64 / self.words_per_token).ceil() as usize;
        by_chars.max(by_words)
    }
}

/// Tiktoken-based token estimator using cl100k_base (GPT-4, GPT-3.5-turbo)
pub struct TiktokenEstimator {
    bpe: Arc<CoreBPE>,
}

impl TiktokenEstimator {
    /// Create a new tiktoken estimator with cl100k_base encoding
    pub fn new() -> Result<Self> {
        let bpe = cl100k_base().map_err(|e| {
            ContextError::Configuration(format!("Failed to load cl100k_base: {}", e))
        })?;
        Ok(Self { bpe: Arc::new(bpe) })
    }
}

impl TokenEstimator for TiktokenEstimator {
    fn estimate(&self, text: &str) -> usize {
        self.bpe.encode_with_special_tokens(text).len()
    }
}
