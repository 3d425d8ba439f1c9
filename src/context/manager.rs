//! Per-turn context orchestration
//!
//! One call to [`ContextManager::prepare_turn`] walks the turn from
//! estimation through optional compression to the assembled prompt.
//! [`ContextManager::reconcile`] runs after the completion returns and folds
//! the service's reported usage into the caller-facing [`ContextUsage`].
//! The manager holds no session state; every input is passed in.

use super::assembler::PromptAssembler;
use super::compressor::{Compressor, CompressorConfig};
use super::models::{CompressionStats, ContextUsage, Transcript, Turn};
use super::threshold::{ThresholdCheck, ThresholdMonitor};
use super::token_estimator::{build_estimator, TokenEstimator};
use crate::completion::{CompletionService, TokenUsage};
use crate::config::ContextConfig;
use crate::error::{ContextError, Result};
use crate::metrics::METRICS;
use std::sync::Arc;
use tracing::{debug, info};

/// Everything the caller needs to issue the narrative call
#[derive(Debug, Clone)]
pub struct PreparedTurn {
    /// Ordered messages for the completion service
    pub messages: Vec<Turn>,
    /// History after any compression, without the new user turn
    pub history: Transcript,
    /// Threshold evaluation taken before compression
    pub check: ThresholdCheck,
    /// Present when compression was attempted, whether or not it succeeded
    pub compression: Option<CompressionStats>,
}

impl PreparedTurn {
    pub fn compression_occurred(&self) -> bool {
        self.compression.as_ref().is_some_and(CompressionStats::succeeded)
    }
}

/// Context manager tying estimation, compression and assembly together
pub struct ContextManager {
    estimator: Arc<dyn TokenEstimator>,
    monitor: ThresholdMonitor,
    compressor: Compressor,
    assembler: PromptAssembler,
}

impl ContextManager {
    /// Create a new context manager from its parts
    pub fn new(
        estimator: Arc<dyn TokenEstimator>,
        monitor: ThresholdMonitor,
        compressor: Compressor,
        assembler: PromptAssembler,
    ) -> Self {
        Self {
            estimator,
            monitor,
            compressor,
            assembler,
        }
    }

    /// Build a manager from configuration
    pub fn from_config(config: &ContextConfig, completion: Arc<dyn CompletionService>) -> Result<Self> {
        let estimator = build_estimator(config.estimator)?;
        let monitor = ThresholdMonitor::new(config.threshold(), estimator.clone())
            .map_err(|e| ContextError::Configuration(e.to_string()))?;

        let compressor = Compressor::new(
            CompressorConfig {
                keep_recent_count: config.keep_recent_count,
                summary_max_tokens: config.summary_max_tokens,
                summary_temperature: config.summary_temperature,
                max_key_moments: config.max_key_moments,
                max_player_actions: config.max_player_actions,
                max_memory_events: config.max_memory_events,
            },
            completion,
            estimator.clone(),
        );

        Ok(Self::new(
            estimator,
            monitor,
            compressor,
            PromptAssembler::new(config.fold_anchor),
        ))
    }

    /// Estimated tokens of a transcript
    pub fn estimate_transcript(&self, transcript: &Transcript) -> usize {
        self.estimator.estimate_transcript(transcript)
    }

    /// Threshold evaluation without side effects
    pub fn check(&self, transcript: &Transcript, user_input: &str) -> ThresholdCheck {
        self.monitor.check(transcript, user_input)
    }

    /// Run estimation, compression if due, and prompt assembly for one turn
    ///
    /// Compression failures never fail the turn: the original history is
    /// used and the failure is reported in `compression`.
    pub async fn prepare_turn(
        &self,
        transcript: Transcript,
        user_input: &str,
        system_instruction: &str,
        memory_events: &[String],
    ) -> PreparedTurn {
        let check = self.monitor.check(&transcript, user_input);
        METRICS.record_occupancy(check.occupancy);

        debug!(
            "Context analysis: transcript={} pending={} projected={} max={} occupancy={:.1}%",
            check.transcript_tokens,
            check.pending_tokens,
            check.projected_tokens,
            check.max_context_tokens,
            check.percentage()
        );

        let (history, compression) = if check.should_compress {
            info!(
                "Token threshold reached ({:.1}%), compressing history",
                check.percentage()
            );
            let outcome = self.compressor.compress(transcript, memory_events).await;
            (outcome.transcript, Some(outcome.stats))
        } else {
            (transcript, None)
        };

        let messages = self.assembler.assemble(system_instruction, &history, user_input);

        PreparedTurn {
            messages,
            history,
            check,
            compression,
        }
    }

    /// Fold actual usage from the narrative call into the occupancy report
    ///
    /// `current_tokens` is the estimate of the processed history plus the
    /// service-reported total for this call.
    pub fn reconcile(&self, prepared: &PreparedTurn, usage: &TokenUsage) -> ContextUsage {
        let mut report = self.usage_for(&prepared.history, usage.total_tokens);
        report.compression_occurred = prepared.compression_occurred();
        report.compression_stats = prepared.compression.clone();
        report
    }

    /// Occupancy report for a transcript with no call in flight
    pub fn progress(&self, transcript: &Transcript) -> ContextUsage {
        self.usage_for(transcript, 0)
    }

    /// Occupancy of `history` plus `call_tokens` reported by the service
    pub fn usage_for(&self, history: &Transcript, call_tokens: usize) -> ContextUsage {
        let config = self.monitor.config();
        let current_tokens = self.estimate_transcript(history) + call_tokens;

        ContextUsage {
            current_tokens,
            max_tokens: config.max_context_tokens,
            percentage: self.monitor.occupancy(current_tokens) * 100.0,
            compression_occurred: false,
            compression_stats: None,
            tokens_until_compression: self.monitor.tokens_until_compression(current_tokens),
            last_message_tokens: call_tokens,
            messages_in_history: history.len(),
            next_compression_at: config.compression_point(),
        }
    }

    pub fn estimator(&self) -> &Arc<dyn TokenEstimator> {
        &self.estimator
    }
}
