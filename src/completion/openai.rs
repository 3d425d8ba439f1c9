//! OpenAI-compatible chat completions client

use super::{Completion, CompletionError, CompletionRequest, CompletionService, TokenUsage};
use crate::config::CompletionConfig;
use crate::context::models::Turn;
use crate::metrics::METRICS;
use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, error};

/// Chat completions client
///
/// Sends one request per call; retry policy belongs to the caller.
pub struct OpenAiClient {
    http: Client,
    api_url: String,
    api_key: Option<SecretString>,
    model: String,
}

impl OpenAiClient {
    /// Create a new client from configuration
    pub fn new(config: &CompletionConfig) -> Result<Self, CompletionError> {
        let http = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| CompletionError::Initialization(e.to_string()))?;

        Ok(Self {
            http,
            api_url: config.api_url.clone(),
            api_key: config.resolve_api_key(),
            model: config.model.clone(),
        })
    }

    async fn send(&self, request: &CompletionRequest) -> Result<Completion, CompletionError> {
        let body = ChatCompletionRequest {
            model: &self.model,
            messages: &request.messages,
            max_tokens: Some(request.max_tokens),
            temperature: Some(request.temperature),
            response_format: request.json_response.then_some(ResponseFormat {
                kind: "json_object",
            }),
        };

        let mut req = self.http.post(&self.api_url).json(&body);
        if let Some(api_key) = &self.api_key {
            req = req.bearer_auth(api_key.expose_secret());
        }

        let response = req.send().await.map_err(|e| {
            if e.is_timeout() {
                CompletionError::Timeout(e.to_string())
            } else {
                CompletionError::Network(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(CompletionError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| CompletionError::InvalidResponse(e.to_string()))?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or(CompletionError::EmptyResponse)?;

        Ok(Completion {
            content,
            usage: parsed.usage.unwrap_or_default().normalized(),
            model: parsed.model.unwrap_or_else(|| self.model.clone()),
        })
    }
}

#[async_trait]
impl CompletionService for OpenAiClient {
    async fn complete(&self, request: CompletionRequest) -> Result<Completion, CompletionError> {
        let purpose = request.purpose.as_str();
        let start = Instant::now();

        debug!(
            "Sending {} completion: {} messages, max_tokens={}, temperature={}",
            purpose,
            request.messages.len(),
            request.max_tokens,
            request.temperature
        );

        let result = self.send(&request).await;

        METRICS
            .completion_duration
            .with_label_values(&[purpose])
            .observe(start.elapsed().as_secs_f64());
        METRICS.record_completion(purpose, result.is_ok());

        match &result {
            Ok(completion) => debug!(
                "{} completion succeeded: prompt_tokens={}, completion_tokens={}",
                purpose, completion.usage.prompt_tokens, completion.usage.completion_tokens
            ),
            Err(e) => error!("{} completion failed: {}", purpose, e),
        }

        result
    }

    fn model(&self) -> &str {
        &self.model
    }
}

// OpenAI-compatible API types
#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [Turn],
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    model: Option<String>,
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<TokenUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}
