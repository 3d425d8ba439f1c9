//! Threshold monitoring: decides when history must be compressed
//!
//! Occupancy is `(transcript tokens + pending turn tokens) / max context`.
//! Compression is due once occupancy reaches the configured fraction.

use super::models::Transcript;
use super::token_estimator::TokenEstimator;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

/// Threshold configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThresholdConfig {
    pub max_context_tokens: usize,
    pub compression_fraction: f64,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            max_context_tokens: 128_000,
            compression_fraction: 0.70,
        }
    }
}

impl ThresholdConfig {
    /// Validate that the threshold configuration is usable
    pub fn validate(&self) -> Result<(), ThresholdError> {
        if self.max_context_tokens == 0 {
            return Err(ThresholdError::ZeroContext);
        }
        if !(self.compression_fraction > 0.0 && self.compression_fraction <= 1.0) {
            return Err(ThresholdError::FractionOutOfRange(self.compression_fraction));
        }
        Ok(())
    }

    /// Token count at which compression triggers
    pub fn compression_point(&self) -> usize {
        (self.max_context_tokens as f64 * self.compression_fraction).ceil() as usize
    }
}

/// Threshold configuration errors
#[derive(Debug, Error)]
pub enum ThresholdError {
    #[error("Maximum context size must be greater than zero")]
    ZeroContext,

    #[error("Compression fraction {0} must be in (0, 1]")]
    FractionOutOfRange(f64),
}

/// Result of one threshold evaluation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdCheck {
    pub transcript_tokens: usize,
    pub pending_tokens: usize,
    pub projected_tokens: usize,
    pub max_context_tokens: usize,
    /// projected / max
    pub occupancy: f64,
    pub should_compress: bool,
    pub tokens_until_compression: usize,
}

impl ThresholdCheck {
    pub fn percentage(&self) -> f64 {
        self.occupancy * 100.0
    }
}

/// Pure occupancy calculator
pub struct ThresholdMonitor {
    config: ThresholdConfig,
    estimator: Arc<dyn TokenEstimator>,
}

impl ThresholdMonitor {
    /// Create a new threshold monitor
    pub fn new(
        config: ThresholdConfig,
        estimator: Arc<dyn TokenEstimator>,
    ) -> Result<Self, ThresholdError> {
        config.validate()?;
        Ok(Self { config, estimator })
    }

    /// Evaluate a transcript plus the pending user utterance
    pub fn check(&self, transcript: &Transcript, pending: &str) -> ThresholdCheck {
        let transcript_tokens = self.estimator.estimate_transcript(transcript);
        let pending_tokens = self.estimator.estimate(pending);
        self.check_tokens(transcript_tokens, pending_tokens)
    }

    /// Evaluate pre-computed token counts
    pub fn check_tokens(&self, transcript_tokens: usize, pending_tokens: usize) -> ThresholdCheck {
        let projected_tokens = transcript_tokens + pending_tokens;
        let occupancy = self.occupancy(projected_tokens);

        ThresholdCheck {
            transcript_tokens,
            pending_tokens,
            projected_tokens,
            max_context_tokens: self.config.max_context_tokens,
            occupancy,
            should_compress: occupancy >= self.config.compression_fraction,
            tokens_until_compression: self.tokens_until_compression(projected_tokens),
        }
    }

    pub fn occupancy(&self, tokens: usize) -> f64 {
        tokens as f64 / self.config.max_context_tokens as f64
    }

    pub fn tokens_until_compression(&self, tokens: usize) -> usize {
        self.config.compression_point().saturating_sub(tokens)
    }

    /// Get the configuration
    pub fn config(&self) -> &ThresholdConfig {
        &self.config
    }
}
