//! Data models for conversation context management

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Prefix of the synthetic turn that replaces a compressed block of history
pub const COMPRESSED_CONTEXT_MARKER: &str = "[STORY CONTEXT SUMMARY";

/// Speaker of a turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One role-tagged exchange unit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    /// A `null` body on the wire is read as empty text
    #[serde(default, deserialize_with = "null_as_empty")]
    pub content: String,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

impl Turn {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// Build the synthetic system turn that stands in for `compressed` collapsed turns
    pub fn compressed_summary(compressed: usize, summary: &str) -> Self {
        Self::system(format!(
            "{} - {} messages compressed]\n{}",
            COMPRESSED_CONTEXT_MARKER, compressed, summary
        ))
    }

    pub fn is_system(&self) -> bool {
        self.role == Role::System
    }

    /// Whether this turn was produced by compression rather than by narration
    pub fn is_compressed_summary(&self) -> bool {
        self.is_system() && self.content.starts_with(COMPRESSED_CONTEXT_MARKER)
    }
}

/// Ordered conversation history of one session
///
/// The first turn, when it has the system role, is the anchor: it carries the
/// persistent instructions and is never dropped or moved by compression.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Transcript {
    turns: Vec<Turn>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a session with a system anchor
    pub fn with_anchor(instructions: impl Into<String>) -> Self {
        Self {
            turns: vec![Turn::system(instructions)],
        }
    }

    pub fn from_turns(turns: Vec<Turn>) -> Self {
        Self { turns }
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn into_turns(self) -> Vec<Turn> {
        self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn push(&mut self, turn: Turn) {
        self.turns.push(turn);
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Turn> {
        self.turns.iter()
    }

    pub fn last(&self) -> Option<&Turn> {
        self.turns.last()
    }

    /// The anchor turn, if the transcript starts with one
    pub fn anchor(&self) -> Option<&Turn> {
        self.turns.first().filter(|t| t.is_system())
    }

    /// Number of leading turns occupied by the anchor (0 or 1)
    pub fn anchor_len(&self) -> usize {
        usize::from(self.anchor().is_some())
    }

    /// Turns after the anchor
    pub fn body(&self) -> &[Turn] {
        &self.turns[self.anchor_len()..]
    }

    /// The most recent `n` turns (all of them when `n >= len`)
    pub fn tail(&self, n: usize) -> &[Turn] {
        &self.turns[self.turns.len().saturating_sub(n)..]
    }
}

impl From<Vec<Turn>> for Transcript {
    fn from(turns: Vec<Turn>) -> Self {
        Self::from_turns(turns)
    }
}

impl<'a> IntoIterator for &'a Transcript {
    type Item = &'a Turn;
    type IntoIter = std::slice::Iter<'a, Turn>;

    fn into_iter(self) -> Self::IntoIter {
        self.turns.iter()
    }
}

/// Observability record of one compression attempt
///
/// These numbers are informational; nothing in the same pass reads them back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompressionStats {
    /// Turn count before compression
    pub original_count: usize,
    /// Turn count after compression
    pub compressed_count: usize,
    /// Estimated tokens of the collapsed block minus those of its summary
    pub tokens_removed: i64,
    /// `tokens_removed` as a percentage of the collapsed block, one decimal
    pub compression_ratio: f64,
    pub messages_compressed: usize,
    pub key_moments_preserved: usize,
    pub player_actions_preserved: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CompressionStats {
    /// Stats for a pass that left the transcript as it was
    pub fn unchanged(count: usize) -> Self {
        Self {
            original_count: count,
            compressed_count: count,
            tokens_removed: 0,
            compression_ratio: 0.0,
            messages_compressed: 0,
            key_moments_preserved: 0,
            player_actions_preserved: 0,
            error: None,
        }
    }

    /// Stats for a pass abandoned because the summary could not be produced
    pub fn failed(count: usize, reason: impl Into<String>) -> Self {
        Self {
            error: Some(reason.into()),
            ..Self::unchanged(count)
        }
    }

    pub fn succeeded(&self) -> bool {
        self.error.is_none() && self.messages_compressed > 0
    }
}

/// Caller-facing context occupancy report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextUsage {
    pub current_tokens: usize,
    pub max_tokens: usize,
    /// Occupancy in percent (0-100+)
    pub percentage: f64,
    pub compression_occurred: bool,
    pub compression_stats: Option<CompressionStats>,
    pub tokens_until_compression: usize,
    pub last_message_tokens: usize,
    pub messages_in_history: usize,
    pub next_compression_at: usize,
}
