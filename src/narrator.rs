//! Turn orchestration on top of the context manager
//!
//! The narrator is the caller of the context manager: it owns the retry
//! policy for narration calls, parses the structured output, reports cost,
//! and hands back the extended transcript. A transcript is only extended
//! after a narration call has succeeded.

use crate::completion::{
    Completion, CompletionError, CompletionPurpose, CompletionRequest, CompletionService, TokenUsage,
};
use crate::config::{CompletionConfig, Config, RetryConfig};
use crate::context::key_moments::preview;
use crate::context::{ContextManager, ContextUsage, Transcript, Turn};
use crate::cost::{CostBreakdown, CostCalculator};
use crate::error::{ContextError, Result};
use crate::metrics::METRICS;
use crate::narrative::prompt::{opening_request, summary_instruction};
use crate::narrative::{
    CharacterInfo, CreativityLevel, Importance, MemoryEvent, NarrativeResponse, ParsedResponse, Relationship,
    ResponsePolicy, StoryInfo, StoryPhase, SystemPromptBuilder, WorldState,
};
use crate::session::SessionLocks;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};
use uuid::Uuid;

/// Turns of recent history quoted in the story summary request
const SUMMARY_RECENT_TURNS: usize = 6;

const SUMMARY_TEMPERATURE: f32 = 0.7;

/// One player turn
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContinueRequest {
    pub story: StoryInfo,
    pub character: CharacterInfo,
    #[serde(default)]
    pub conversation_history: Transcript,
    pub player_input: String,
    #[serde(default)]
    pub creativity_level: CreativityLevel,
    #[serde(default)]
    pub memory_context: Vec<MemoryEvent>,
    #[serde(default)]
    pub world_state: WorldState,
    #[serde(default)]
    pub relationships: Vec<Relationship>,
    #[serde(default)]
    pub session_id: Option<String>,
}

/// Start of a new story
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpeningRequest {
    pub story: StoryInfo,
    pub character: CharacterInfo,
    #[serde(default)]
    pub creativity_level: CreativityLevel,
}

/// End-of-story recap
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryRequest {
    pub story: StoryInfo,
    pub character: CharacterInfo,
    #[serde(default)]
    pub conversation_history: Transcript,
    #[serde(default)]
    pub memory_events: Vec<MemoryEvent>,
}

/// Token usage, timing and cost of one call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageReport {
    pub input_tokens: usize,
    pub output_tokens: usize,
    pub total_tokens: usize,
    pub model_type: String,
    pub response_time_ms: u64,
    pub costs: CostBreakdown,
}

impl UsageReport {
    fn zero(model: &str) -> Self {
        Self {
            input_tokens: 0,
            output_tokens: 0,
            total_tokens: 0,
            model_type: model.to_string(),
            response_time_ms: 0,
            costs: CostBreakdown::default(),
        }
    }
}

/// Result of a player turn
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnResult {
    pub turn_id: Uuid,
    pub response: NarrativeResponse,
    /// History after compression plus this exchange
    pub transcript: Transcript,
    pub context_usage: ContextUsage,
    pub tokens_used: usize,
    pub usage: UsageReport,
}

/// Result of an opening scene
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OpeningResult {
    pub response: NarrativeResponse,
    pub transcript: Transcript,
    pub context_usage: ContextUsage,
    pub tokens_used: usize,
    pub usage: UsageReport,
}

/// Result of a story summary
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryResult {
    pub summary: String,
    pub tokens_used: usize,
    pub usage: UsageReport,
    /// True when the summary is the built-in fallback text
    pub fallback: bool,
}

/// Runs narration turns for many independent sessions
pub struct Narrator {
    completion: Arc<dyn CompletionService>,
    context: ContextManager,
    costs: CostCalculator,
    sessions: SessionLocks,
    retry: RetryConfig,
    limits: CompletionConfig,
    max_memory_events: usize,
}

impl Narrator {
    /// Create a narrator from configuration
    pub fn new(config: &Config, completion: Arc<dyn CompletionService>) -> Result<Self> {
        let context = ContextManager::from_config(&config.context, completion.clone())?;
        Ok(Self {
            completion,
            context,
            costs: CostCalculator::new(config.pricing.clone()),
            sessions: SessionLocks::new(),
            retry: config.retry.clone(),
            limits: config.completion.clone(),
            max_memory_events: config.context.max_memory_events,
        })
    }

    pub fn context(&self) -> &ContextManager {
        &self.context
    }

    pub fn sessions(&self) -> &SessionLocks {
        &self.sessions
    }

    pub fn model(&self) -> &str {
        self.completion.model()
    }

    /// Narrate one player turn
    pub async fn continue_conversation(&self, request: ContinueRequest) -> Result<TurnResult> {
        validate_identity(&request.story, &request.character)?;
        if request.player_input.trim().is_empty() {
            return Err(ContextError::Validation("playerInput must not be empty".to_string()));
        }

        let _guard = request
            .session_id
            .as_deref()
            .map(|id| self.sessions.try_acquire(id))
            .transpose()?;

        let start = Instant::now();
        let phase = StoryPhase::from_turn_count(request.conversation_history.len());
        let instruction = SystemPromptBuilder::new(&request.story, &request.character, request.creativity_level)
            .memories(&request.memory_context, self.max_memory_events)
            .relationships(&request.relationships)
            .world_state(&request.world_state)
            .phase(phase)
            .build();

        let memories: Vec<String> = request
            .memory_context
            .iter()
            .map(|m| m.description.clone())
            .filter(|d| !d.is_empty())
            .collect();

        let prepared = self
            .context
            .prepare_turn(
                request.conversation_history,
                &request.player_input,
                &instruction,
                &memories,
            )
            .await;

        let completion_request = CompletionRequest::new(CompletionPurpose::Narrative, prepared.messages.clone())
            .max_tokens(self.limits.narrative_max_tokens)
            .temperature(request.creativity_level.temperature())
            .json_response(true);
        let completion = self.complete_with_retry(completion_request).await?;

        info!("Narrator output: {}", preview(&completion.content, 200));

        let response = ResponsePolicy::turn(&request.story, &request.character)
            .finalize(ParsedResponse::parse(&completion.content));
        let context_usage = self.context.reconcile(&prepared, &completion.usage);
        let usage = self.usage_report(&completion.usage, start);

        let mut transcript = prepared.history;
        transcript.push(Turn::user(request.player_input));
        transcript.push(Turn::assistant(response.response.clone()));

        METRICS.record_turn(usage.costs.total_cost);
        info!(
            "Turn completed: {} messages in history, {:.1}% context used, cost ${}",
            transcript.len(),
            context_usage.percentage,
            usage.costs.total_cost
        );

        Ok(TurnResult {
            turn_id: Uuid::new_v4(),
            response,
            transcript,
            context_usage,
            tokens_used: usage.total_tokens,
            usage,
        })
    }

    /// Narrate the opening scene of a new story
    pub async fn opening_scene(&self, request: OpeningRequest) -> Result<OpeningResult> {
        validate_identity(&request.story, &request.character)?;

        let start = Instant::now();
        let instruction =
            SystemPromptBuilder::new(&request.story, &request.character, request.creativity_level).build_opening();
        let messages = vec![
            Turn::system(instruction),
            Turn::user(opening_request(&request.story, &request.character)),
        ];

        let completion_request = CompletionRequest::new(CompletionPurpose::OpeningScene, messages)
            .max_tokens(self.limits.opening_max_tokens)
            .temperature(request.creativity_level.temperature())
            .json_response(true);
        let completion = self.complete_with_retry(completion_request).await?;

        let mut response = ResponsePolicy::opening(&request.story, &request.character)
            .finalize(ParsedResponse::parse(&completion.content));

        if response.memory_updates.is_empty() {
            let mut opening = MemoryEvent::new(
                format!("{} begins their adventure in {}", request.character.name, request.story.title),
                Importance::Medium,
            );
            opening.id = Some("opening".to_string());
            opening.characters_involved = vec![request.character.name.clone()];
            opening.tags = vec!["beginning".to_string()];
            opening.timestamp = Some(chrono::Utc::now());
            response.memory_updates.push(opening);
        }
        if response.world_state_updates.is_empty() {
            response.world_state_updates = WorldState {
                current_location: Some(format!("Opening scene of {}", request.story.title)),
                time_of_day: Some("morning".to_string()),
                present_npcs: Vec::new(),
                mood_atmosphere: Some("A new adventure begins".to_string()),
            };
        }

        let transcript = Transcript::from_turns(vec![Turn::assistant(response.response.clone())]);
        let context_usage = self.context.usage_for(&transcript, completion.usage.total_tokens);
        let usage = self.usage_report(&completion.usage, start);

        info!(
            "Opening scene generated for {} in {}",
            request.character.name, request.story.title
        );

        Ok(OpeningResult {
            response,
            transcript,
            context_usage,
            tokens_used: usage.total_tokens,
            usage,
        })
    }

    /// Write a personal recap of a finished story
    ///
    /// Never fails on completion errors: a fixed recap with zero usage is
    /// returned instead.
    pub async fn story_summary(&self, request: SummaryRequest) -> Result<SummaryResult> {
        validate_identity(&request.story, &request.character)?;

        let start = Instant::now();
        let instruction = summary_instruction(&request.story, &request.character, &request.memory_events);

        let mut ask = format!(
            "Create a summary for {}'s adventure in {}.",
            request.character.name, request.story.title
        );
        let recent = request.conversation_history.tail(SUMMARY_RECENT_TURNS);
        if !recent.is_empty() {
            ask.push_str("\n\nThe adventure ended like this:\n");
            for turn in recent.iter().filter(|t| !t.is_system()) {
                ask.push_str(&format!("{}: {}\n", turn.role, preview(&turn.content, 200)));
            }
        }

        let completion_request = CompletionRequest::new(
            CompletionPurpose::StorySummary,
            vec![Turn::system(instruction), Turn::user(ask)],
        )
        .max_tokens(self.limits.summary_max_tokens)
        .temperature(SUMMARY_TEMPERATURE);

        match self.completion.complete(completion_request).await {
            Ok(completion) => {
                let usage = self.usage_report(&completion.usage, start);
                Ok(SummaryResult {
                    summary: completion.content.trim().to_string(),
                    tokens_used: usage.total_tokens,
                    usage,
                    fallback: false,
                })
            }
            Err(e) => {
                warn!("Story summary failed, using fallback: {}", e);
                Ok(SummaryResult {
                    summary: format!(
                        "{} completed their adventure in {}. It was a unique and memorable journey \
                         filled with meaningful choices and character growth!",
                        request.character.name, request.story.title
                    ),
                    tokens_used: 0,
                    usage: UsageReport::zero(self.model()),
                    fallback: true,
                })
            }
        }
    }

    /// Send a narration request, retrying transient failures with exponential backoff
    async fn complete_with_retry(&self, request: CompletionRequest) -> std::result::Result<Completion, CompletionError> {
        let mut attempt = 1;
        loop {
            match self.completion.complete(request.clone()).await {
                Ok(completion) => return Ok(completion),
                Err(e) if e.is_transient() && attempt < self.retry.max_attempts => {
                    let delay = self.retry.backoff(attempt) + jitter(self.retry.base_backoff_ms);
                    warn!(
                        "{} attempt {}/{} failed: {}. Retrying in {:?}",
                        request.purpose.as_str(),
                        attempt,
                        self.retry.max_attempts,
                        e,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn usage_report(&self, usage: &TokenUsage, start: Instant) -> UsageReport {
        let model = self.model();
        UsageReport {
            input_tokens: usage.prompt_tokens,
            output_tokens: usage.completion_tokens,
            total_tokens: usage.total_tokens,
            model_type: model.to_string(),
            response_time_ms: start.elapsed().as_millis() as u64,
            costs: self.costs.calculate(usage.prompt_tokens, usage.completion_tokens, model),
        }
    }
}

/// Up to a quarter of the base backoff
fn jitter(base_ms: u64) -> Duration {
    Duration::from_millis(rand::thread_rng().gen_range(0..=base_ms / 4))
}

fn validate_identity(story: &StoryInfo, character: &CharacterInfo) -> Result<()> {
    if story.title.trim().is_empty() {
        return Err(ContextError::Validation("story.title must not be empty".to_string()));
    }
    if character.name.trim().is_empty() {
        return Err(ContextError::Validation("character.name must not be empty".to_string()));
    }
    Ok(())
}
