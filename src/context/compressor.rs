//! History compression: collapses the middle of a transcript into one summary
//!
//! The anchor and the most recent `keep_recent_count` turns always survive
//! verbatim. Compression is best-effort: if the summary call fails, the
//! transcript comes back untouched and the failure is recorded in the stats.

use super::key_moments::{extract_key_moments, KeyMoments};
use super::models::{CompressionStats, Transcript, Turn};
use super::token_estimator::TokenEstimator;
use crate::completion::{CompletionPurpose, CompletionRequest, CompletionService};
use crate::metrics::METRICS;
use std::sync::Arc;
use tracing::{debug, info, warn};

const SUMMARIZER_INSTRUCTIONS: &str = "You are an expert at summarizing interactive story \
conversations while preserving all key narrative elements, player choices, and story progression.";

/// Used when the service returns an empty summary
const EMPTY_SUMMARY: &str = "Previous conversation events occurred.";

/// Compressor configuration
#[derive(Debug, Clone)]
pub struct CompressorConfig {
    pub keep_recent_count: usize,
    pub summary_max_tokens: usize,
    pub summary_temperature: f32,
    pub max_key_moments: usize,
    pub max_player_actions: usize,
    pub max_memory_events: usize,
}

impl Default for CompressorConfig {
    fn default() -> Self {
        Self {
            keep_recent_count: 30,
            summary_max_tokens: 800,
            summary_temperature: 0.2,
            max_key_moments: 10,
            max_player_actions: 15,
            max_memory_events: 5,
        }
    }
}

/// Transcript after a compression pass plus what happened
#[derive(Debug, Clone)]
pub struct CompressionOutcome {
    pub transcript: Transcript,
    pub stats: CompressionStats,
}

impl CompressionOutcome {
    fn unchanged(transcript: Transcript) -> Self {
        let stats = CompressionStats::unchanged(transcript.len());
        Self { transcript, stats }
    }

    pub fn compressed(&self) -> bool {
        self.stats.succeeded()
    }
}

/// LLM-backed history compressor
pub struct Compressor {
    config: CompressorConfig,
    completion: Arc<dyn CompletionService>,
    estimator: Arc<dyn TokenEstimator>,
}

impl Compressor {
    pub fn new(
        config: CompressorConfig,
        completion: Arc<dyn CompletionService>,
        estimator: Arc<dyn TokenEstimator>,
    ) -> Self {
        Self {
            config,
            completion,
            estimator,
        }
    }

    /// Collapse everything between the anchor and the recent tail into one summary turn
    ///
    /// `memory_events` are short descriptions of notable story facts that the
    /// summary must keep.
    pub async fn compress(&self, transcript: Transcript, memory_events: &[String]) -> CompressionOutcome {
        let keep = self.config.keep_recent_count;
        if transcript.len() <= keep {
            debug!(
                "Transcript has {} turns, within the {}-turn tail; nothing to compress",
                transcript.len(),
                keep
            );
            return CompressionOutcome::unchanged(transcript);
        }

        let anchor_len = transcript.anchor_len();
        let tail_start = transcript.len() - keep;
        if tail_start <= anchor_len {
            return CompressionOutcome::unchanged(transcript);
        }

        let middle = &transcript.turns()[anchor_len..tail_start];
        let moments = extract_key_moments(middle);
        let prompt = self.build_prompt(middle, &moments, memory_events);

        let request = CompletionRequest::new(
            CompletionPurpose::Compression,
            vec![Turn::system(SUMMARIZER_INSTRUCTIONS), Turn::user(prompt)],
        )
        .max_tokens(self.config.summary_max_tokens)
        .temperature(self.config.summary_temperature);

        info!(
            "Compressing {} of {} turns ({} key moments, {} player actions)",
            middle.len(),
            transcript.len(),
            moments.moments.len(),
            moments.player_actions.len()
        );

        let summary = match self.completion.complete(request).await {
            Ok(completion) => {
                let text = completion.content.trim();
                if text.is_empty() {
                    EMPTY_SUMMARY.to_string()
                } else {
                    text.to_string()
                }
            }
            Err(e) => {
                warn!("Compression failed, keeping original transcript: {}", e);
                METRICS.record_compression(false, 0);
                let stats = CompressionStats::failed(transcript.len(), e.to_string());
                return CompressionOutcome { transcript, stats };
            }
        };

        let original_tokens = self.estimator.estimate_turns(middle) as i64;
        let summary_tokens = self.estimator.estimate(&summary) as i64;
        let messages_compressed = middle.len();
        let original_count = transcript.len();

        let mut turns = transcript.into_turns();
        let tail = turns.split_off(tail_start);
        turns.truncate(anchor_len);
        turns.push(Turn::compressed_summary(messages_compressed, &summary));
        turns.extend(tail);

        let tokens_removed = original_tokens - summary_tokens;
        let stats = CompressionStats {
            original_count,
            compressed_count: turns.len(),
            tokens_removed,
            compression_ratio: ratio_percent(tokens_removed, original_tokens),
            messages_compressed,
            key_moments_preserved: moments.moments.len(),
            player_actions_preserved: moments.player_actions.len(),
            error: None,
        };

        info!(
            "Compression completed: {} -> {} turns, ~{} tokens removed ({}%)",
            stats.original_count, stats.compressed_count, stats.tokens_removed, stats.compression_ratio
        );
        METRICS.record_compression(true, tokens_removed);

        CompressionOutcome {
            transcript: Transcript::from_turns(turns),
            stats,
        }
    }

    /// Build the summarization prompt for the middle block
    fn build_prompt(&self, middle: &[Turn], moments: &KeyMoments, memory_events: &[String]) -> String {
        let key_moments = last_n(&moments.moments, self.config.max_key_moments).join("\n");
        let player_actions = last_n(&moments.player_actions, self.config.max_player_actions).join("\n");

        let memory_text = if memory_events.is_empty() {
            String::new()
        } else {
            format!(
                "\n\nKey memories from the story: {}",
                last_n(memory_events, self.config.max_memory_events).join("; ")
            )
        };

        let conversation = middle
            .iter()
            .map(|t| format!("{}: {}", t.role, t.content))
            .collect::<Vec<_>>()
            .join("\n\n");

        format!(
            "Summarize this conversation history while preserving ALL of these critical elements:\n\n\
            PRESERVE THESE KEY MOMENTS:\n{}\n\n\
            PRESERVE THESE PLAYER ACTIONS:\n{}{}\n\n\
            CONVERSATION TO COMPRESS:\n{}\n\n\
            Create a detailed summary that:\n\
            1. Preserves all major player decisions and their consequences\n\
            2. Maintains key character interactions and relationships\n\
            3. Keeps important plot developments and world state changes\n\
            4. Maintains the narrative flow and emotional beats\n\
            5. Preserves specific dialogue that was meaningful\n\n\
            Summary (be comprehensive but concise):",
            key_moments, player_actions, memory_text, conversation
        )
    }

    /// Get the configuration
    pub fn config(&self) -> &CompressorConfig {
        &self.config
    }
}

fn last_n<T>(items: &[T], n: usize) -> &[T] {
    &items[items.len().saturating_sub(n)..]
}

/// Percentage with one decimal place; zero when there was nothing to remove
fn ratio_percent(removed: i64, original: i64) -> f64 {
    if original <= 0 {
        return 0.0;
    }
    (removed as f64 / original as f64 * 1000.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::completion::{Completion, CompletionError, TokenUsage};
    use crate::context::token_estimator::HeuristicEstimator;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct FixedSummary {
        reply: Result<String, ()>,
        prompts: Mutex<Vec<CompletionRequest>>,
    }

    impl FixedSummary {
        fn ok(text: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: Ok(text.to_string()),
                prompts: Mutex::new(Vec::new()),
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                reply: Err(()),
                prompts: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl CompletionService for FixedSummary {
        async fn complete(&self, request: CompletionRequest) -> Result<Completion, CompletionError> {
            self.prompts.lock().unwrap().push(request);
            match &self.reply {
                Ok(text) => Ok(Completion {
                    content: text.clone(),
                    usage: TokenUsage::new(100, 20),
                    model: "test".to_string(),
                }),
                Err(()) => Err(CompletionError::Api {
                    status: 500,
                    body: "boom".to_string(),
                }),
            }
        }

        fn model(&self) -> &str {
            "test"
        }
    }

    fn story(turns: usize) -> Transcript {
        let mut transcript = Transcript::with_anchor("You narrate Pride and Prejudice.");
        for i in 1..turns {
            if i % 2 == 1 {
                transcript.push(Turn::user(format!("I decide to visit room {}", i)));
            } else {
                transcript.push(Turn::assistant(format!("Room {} is quiet. {}", i, "x".repeat(300))));
            }
        }
        transcript
    }

    fn compressor(service: Arc<FixedSummary>, keep: usize) -> Compressor {
        let config = CompressorConfig {
            keep_recent_count: keep,
            ..Default::default()
        };
        Compressor::new(config, service, Arc::new(HeuristicEstimator::default()))
    }

    #[tokio::test]
    async fn test_short_transcript_is_noop() {
        let service = FixedSummary::ok("unused");
        let compressor = compressor(service.clone(), 30);
        let original = story(10);

        let outcome = compressor.compress(original.clone(), &[]).await;
        assert_eq!(outcome.transcript, original);
        assert_eq!(outcome.stats.tokens_removed, 0);
        assert!(!outcome.compressed());
        assert!(service.prompts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_anchor_and_tail_preserved() {
        let service = FixedSummary::ok("Elizabeth explored the house.");
        let compressor = compressor(service, 30);
        let original = story(50);

        let outcome = compressor.compress(original.clone(), &[]).await;
        let turns = outcome.transcript.turns();

        assert_eq!(turns.len(), 32);
        assert_eq!(turns[0], original.turns()[0]);
        assert!(turns[1].is_compressed_summary());
        assert!(turns[1].content.contains("19 messages compressed"));
        assert!(turns[1].content.ends_with("Elizabeth explored the house."));
        assert_eq!(&turns[2..], original.tail(30));

        assert_eq!(outcome.stats.original_count, 50);
        assert_eq!(outcome.stats.compressed_count, 32);
        assert_eq!(outcome.stats.messages_compressed, 19);
        assert!(outcome.stats.tokens_removed > 0);
        assert!(outcome.compressed());
    }

    #[tokio::test]
    async fn test_failure_returns_original() {
        let service = FixedSummary::failing();
        let compressor = compressor(service, 30);
        let original = story(50);

        let outcome = compressor.compress(original.clone(), &[]).await;
        assert_eq!(outcome.transcript, original);
        assert!(outcome.stats.error.as_deref().unwrap().contains("500"));
        assert_eq!(outcome.stats.tokens_removed, 0);
        assert!(!outcome.compressed());
    }

    #[tokio::test]
    async fn test_without_anchor_collapses_from_start() {
        let service = FixedSummary::ok("Summary.");
        let compressor = compressor(service, 4);
        let original = Transcript::from_turns(
            (0..10).map(|i| Turn::user(format!("turn {}", i))).collect(),
        );

        let outcome = compressor.compress(original.clone(), &[]).await;
        let turns = outcome.transcript.turns();
        assert_eq!(turns.len(), 5);
        assert!(turns[0].is_compressed_summary());
        assert_eq!(&turns[1..], original.tail(4));
    }

    #[tokio::test]
    async fn test_anchor_plus_tail_only_is_noop() {
        let service = FixedSummary::ok("unused");
        let compressor = compressor(service, 4);
        let original = story(5);

        let outcome = compressor.compress(original.clone(), &[]).await;
        assert_eq!(outcome.transcript, original);
        assert!(!outcome.compressed());
    }

    #[tokio::test]
    async fn test_prompt_carries_moments_and_memories() {
        let service = FixedSummary::ok("Summary.");
        let compressor = compressor(service.clone(), 4);
        let original = story(12);
        let memories = vec!["Darcy insulted Elizabeth at the ball".to_string()];

        compressor.compress(original, &memories).await;

        let prompts = service.prompts.lock().unwrap();
        let request = &prompts[0];
        assert_eq!(request.max_tokens, 800);
        assert_eq!(request.temperature, 0.2);
        assert!(!request.json_response);
        let prompt = &request.messages[1].content;
        assert!(prompt.contains("Player: I decide to visit room 1"));
        assert!(prompt.contains("Key memories from the story: Darcy insulted Elizabeth at the ball"));
        assert!(prompt.contains("user: I decide to visit room 1"));
        assert!(!prompt.contains("You narrate Pride and Prejudice."));
    }

    #[tokio::test]
    async fn test_empty_summary_gets_placeholder() {
        let service = FixedSummary::ok("   ");
        let compressor = compressor(service, 4);
        let outcome = compressor.compress(story(12), &[]).await;
        assert!(outcome.transcript.turns()[1].content.ends_with(EMPTY_SUMMARY));
    }

    #[test]
    fn test_ratio_percent() {
        assert_eq!(ratio_percent(0, 0), 0.0);
        assert_eq!(ratio_percent(750, 1000), 75.0);
        assert_eq!(ratio_percent(1, 3), 33.3);
    }
}
