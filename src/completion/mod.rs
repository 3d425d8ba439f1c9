//! Completion service abstraction
//!
//! The text-generation model is consumed as an opaque service: an ordered
//! list of role-tagged turns in, generated text plus token usage out.

pub mod openai;

pub use openai::OpenAiClient;

use crate::context::models::Turn;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// What a completion call is for; used for metrics labels and logging
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionPurpose {
    Narrative,
    Compression,
    OpeningScene,
    StorySummary,
}

impl CompletionPurpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            CompletionPurpose::Narrative => "narrative",
            CompletionPurpose::Compression => "compression",
            CompletionPurpose::OpeningScene => "opening_scene",
            CompletionPurpose::StorySummary => "story_summary",
        }
    }
}

/// One completion request
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub purpose: CompletionPurpose,
    pub messages: Vec<Turn>,
    pub max_tokens: usize,
    pub temperature: f32,
    /// Ask the service for a JSON object response
    pub json_response: bool,
}

impl CompletionRequest {
    pub fn new(purpose: CompletionPurpose, messages: Vec<Turn>) -> Self {
        Self {
            purpose,
            messages,
            max_tokens: 1000,
            temperature: 0.7,
            json_response: false,
        }
    }

    pub fn max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn json_response(mut self, json: bool) -> Self {
        self.json_response = json;
        self
    }
}

/// Token usage reported by the service
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    #[serde(default)]
    pub prompt_tokens: usize,
    #[serde(default)]
    pub completion_tokens: usize,
    #[serde(default)]
    pub total_tokens: usize,
}

impl TokenUsage {
    pub fn new(prompt_tokens: usize, completion_tokens: usize) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }

    /// Fill in a missing total from its parts
    pub fn normalized(self) -> Self {
        if self.total_tokens == 0 {
            Self::new(self.prompt_tokens, self.completion_tokens)
        } else {
            self
        }
    }
}

/// A successful completion
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub content: String,
    pub usage: TokenUsage,
    pub model: String,
}

/// Completion service errors
#[derive(Debug, thiserror::Error)]
pub enum CompletionError {
    #[error("Initialization error: {0}")]
    Initialization(String),

    #[error("API error: HTTP {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("No content in completion response")]
    EmptyResponse,
}

impl CompletionError {
    /// Whether the same request may succeed if sent again
    pub fn is_transient(&self) -> bool {
        match self {
            CompletionError::Network(_) | CompletionError::Timeout(_) => true,
            CompletionError::Api { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

/// Text-generation service consumed by the context manager and narrator
#[async_trait]
pub trait CompletionService: Send + Sync {
    async fn complete(&self, request: CompletionRequest) -> Result<Completion, CompletionError>;

    /// Model identifier used for cost reporting
    fn model(&self) -> &str;
}
