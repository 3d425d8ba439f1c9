//! Shared test doubles
#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;
use story_context::completion::{
    Completion, CompletionError, CompletionPurpose, CompletionRequest, CompletionService, TokenUsage,
};
use story_context::context::{Transcript, Turn};

/// One scripted answer
pub enum Step {
    Reply(String),
    Api(u16),
    Timeout,
}

/// Completion service that plays back a fixed script, then a default reply
pub struct ScriptedCompletion {
    steps: Mutex<VecDeque<Step>>,
    default_reply: String,
    delay: Duration,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedCompletion {
    pub fn new(steps: Vec<Step>) -> Self {
        Self {
            steps: Mutex::new(steps.into()),
            default_reply: narrative_json(NARRATION),
            delay: Duration::ZERO,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn replying(reply: impl Into<String>) -> Self {
        Self {
            default_reply: reply.into(),
            ..Self::new(Vec::new())
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn requests_for(&self, purpose: CompletionPurpose) -> Vec<CompletionRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.purpose == purpose)
            .collect()
    }
}

#[async_trait]
impl CompletionService for ScriptedCompletion {
    async fn complete(&self, request: CompletionRequest) -> Result<Completion, CompletionError> {
        self.requests.lock().unwrap().push(request);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let step = self.steps.lock().unwrap().pop_front();
        match step.unwrap_or_else(|| Step::Reply(self.default_reply.clone())) {
            Step::Reply(content) => Ok(Completion {
                content,
                usage: TokenUsage::new(1200, 300),
                model: "gpt-4o-mini".to_string(),
            }),
            Step::Api(status) => Err(CompletionError::Api {
                status,
                body: "scripted failure".to_string(),
            }),
            Step::Timeout => Err(CompletionError::Timeout("scripted timeout".to_string())),
        }
    }

    fn model(&self) -> &str {
        "gpt-4o-mini"
    }
}

pub const NARRATION: &str = "Mrs. Bennet flutters into the room with news of Netherfield's new \
    tenant, and Elizabeth catches her sister Jane hiding a hopeful smile behind her embroidery.";

pub fn narrative_json(narration: &str) -> String {
    serde_json::json!({
        "response": narration,
        "suggested_actions": [
            {"id": "ask", "text": "Ask about the new tenant", "type": "dialogue"},
            {"id": "window", "text": "Look out of the window", "type": "exploration"}
        ],
        "memory_updates": [
            {"id": "m1", "description": "News of Mr. Bingley arrives", "importance": "high"}
        ],
        "world_state_updates": {"current_location": "Longbourn parlour", "present_npcs": ["Mrs. Bennet", "Jane"]},
        "relationship_updates": [
            {"character_name": "Jane", "relationship_type": "friend", "trust_level": 85}
        ]
    })
    .to_string()
}

/// Text whose heuristic estimate is exactly `tokens`
pub fn filler(tokens: usize) -> String {
    "x".repeat(tokens * 4)
}

/// Anchor followed by `turns` alternating user/assistant turns of `tokens_each`
pub fn anchored_transcript(anchor_tokens: usize, turns: usize, tokens_each: usize) -> Transcript {
    let mut transcript = Transcript::with_anchor(filler(anchor_tokens));
    for i in 0..turns {
        let body = filler(tokens_each);
        transcript.push(if i % 2 == 0 {
            Turn::user(body)
        } else {
            Turn::assistant(body)
        });
    }
    transcript
}
