//! Heuristic extraction of story beats worth preserving through compression
//!
//! Best-effort only: the result biases the summarization prompt and never
//! filters what gets compressed.

use super::models::{Role, Turn};
use once_cell::sync::Lazy;
use regex::Regex;

static DECISION_WORDS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(choose|decide|ask|tell|go|take|give|help|fight|run|stay|leave)\b")
        .expect("decision word pattern is valid")
});

/// User turns longer than this are treated as deliberate actions
const LONG_ACTION_CHARS: usize = 100;

/// Length of the assistant preview attached to a key moment
const PREVIEW_CHARS: usize = 200;

/// Player actions and the narration that followed them
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KeyMoments {
    /// `"Player: <text>"` for each notable user turn
    pub player_actions: Vec<String>,
    /// `"<user text> → <assistant preview>"` for notable turns with a reply
    pub moments: Vec<String>,
}

impl KeyMoments {
    pub fn is_empty(&self) -> bool {
        self.player_actions.is_empty() && self.moments.is_empty()
    }
}

/// Whether a user utterance reads like a decision
pub fn is_notable_action(text: &str) -> bool {
    DECISION_WORDS.is_match(text) || text.chars().count() > LONG_ACTION_CHARS
}

/// Scan `turns` for notable user actions
pub fn extract_key_moments(turns: &[Turn]) -> KeyMoments {
    let mut found = KeyMoments::default();

    for (i, turn) in turns.iter().enumerate() {
        if turn.role != Role::User || !is_notable_action(&turn.content) {
            continue;
        }
        found.player_actions.push(format!("Player: {}", turn.content));

        if let Some(reply) = turns.get(i + 1).filter(|t| t.role == Role::Assistant) {
            found
                .moments
                .push(format!("{} → {}", turn.content, preview(&reply.content, PREVIEW_CHARS)));
        }
    }

    found
}

/// First `max` characters of `text`, with an ellipsis when truncated
pub fn preview(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}
