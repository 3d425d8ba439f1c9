//! Structured narrator output
//!
//! Raw completion text is parsed once into [`ParsedResponse`]. After
//! [`ResponsePolicy::finalize`] every field of the resulting
//! [`NarrativeResponse`] is present and well-formed; nothing downstream
//! has to re-check it.

use super::cleaner::{clean_if_improved, clean_narrative_text, is_narrative_valid};
use super::{CharacterInfo, MemoryEvent, Relationship, StoryInfo, WorldState};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

/// Replacement texts for blank action suggestions, cycled by position
const ACTION_TEXT_FALLBACKS: [&str; 5] = [
    "Continue forward",
    "Look around",
    "Speak up",
    "Take action",
    "Wait and see",
];

/// One action the player can pick next
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuggestedAction {
    pub id: String,
    pub text: String,
    #[serde(rename = "type")]
    pub kind: String,
}

impl SuggestedAction {
    pub fn new(id: &str, text: &str, kind: &str) -> Self {
        Self {
            id: id.to_string(),
            text: text.to_string(),
            kind: kind.to_string(),
        }
    }
}

/// Validated narrator output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NarrativeResponse {
    pub response: String,
    pub suggested_actions: Vec<SuggestedAction>,
    pub memory_updates: Vec<MemoryEvent>,
    pub world_state_updates: WorldState,
    pub relationship_updates: Vec<Relationship>,
}

/// Outcome of parsing raw completion text
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedResponse {
    Ok(NarrativeResponse),
    /// The completion was not the expected JSON object
    Fallback { raw_text: String },
}

impl ParsedResponse {
    /// Parse completion text against the output contract
    ///
    /// Only a document that is not a JSON object falls back to raw text.
    /// Inside an object each field is read on its own: a malformed field or
    /// list element is dropped and the rest of the turn is kept.
    pub fn parse(raw: &str) -> Self {
        match serde_json::from_str::<Value>(raw) {
            Ok(Value::Object(fields)) => ParsedResponse::Ok(WireResponse::from_fields(fields).into_response()),
            Ok(other) => {
                warn!("Narrator output is JSON but not an object ({}), using raw text", kind_of(&other));
                ParsedResponse::Fallback {
                    raw_text: raw.to_string(),
                }
            }
            Err(e) => {
                warn!("Narrator output is not valid JSON ({}), using raw text", e);
                ParsedResponse::Fallback {
                    raw_text: raw.to_string(),
                }
            }
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, ParsedResponse::Fallback { .. })
    }
}

// Top-level fields, still untyped; each is read on its own in `into_response`
#[derive(Debug, Default)]
struct WireResponse {
    response: Value,
    suggested_actions: Value,
    memory_updates: Value,
    world_state_updates: Value,
    relationship_updates: Value,
}

impl WireResponse {
    fn from_fields(mut fields: Map<String, Value>) -> Self {
        let mut take = |primary: &str, alias: &str| match fields.remove(primary) {
            Some(value) if !value.is_null() => value,
            _ => fields.remove(alias).unwrap_or_default(),
        };

        Self {
            response: take("response", "narration"),
            world_state_updates: take("world_state_updates", "world_state"),
            suggested_actions: fields.remove("suggested_actions").unwrap_or_default(),
            memory_updates: fields.remove("memory_updates").unwrap_or_default(),
            relationship_updates: fields.remove("relationship_updates").unwrap_or_default(),
        }
    }

    fn into_response(self) -> NarrativeResponse {
        let response = match self.response {
            Value::String(text) => text,
            Value::Null => String::new(),
            other => {
                warn!("Dropping response field: expected text, got {}", kind_of(&other));
                String::new()
            }
        };

        let suggested_actions = typed_items::<WireAction>("suggested_actions", self.suggested_actions)
            .into_iter()
            .enumerate()
            .map(|(i, action)| normalize_action(i, action))
            .collect();

        let world_state_updates = match self.world_state_updates {
            Value::Null => WorldState::default(),
            value => typed_object("world_state_updates", value).unwrap_or_default(),
        };

        NarrativeResponse {
            response,
            suggested_actions,
            memory_updates: typed_items::<MemoryEvent>("memory_updates", self.memory_updates)
                .into_iter()
                .filter(|m| !m.description.trim().is_empty())
                .collect(),
            world_state_updates,
            relationship_updates: typed_items::<Relationship>("relationship_updates", self.relationship_updates)
                .into_iter()
                .filter(|r| !r.character_name.trim().is_empty())
                .collect(),
        }
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[derive(Debug, Deserialize)]
struct WireAction {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default, rename = "type")]
    kind: Option<String>,
}

/// Elements of a JSON array that read as `T`
fn typed_items<T: DeserializeOwned>(field: &str, value: Value) -> Vec<T> {
    let items = match value {
        Value::Array(items) => items,
        Value::Null => return Vec::new(),
        other => {
            warn!("Dropping {}: expected an array, got {}", field, kind_of(&other));
            return Vec::new();
        }
    };

    items
        .into_iter()
        .filter_map(|item| typed_object(field, item))
        .collect()
}

/// A JSON object read as `T`; other shapes and type mismatches are logged and skipped
fn typed_object<T: DeserializeOwned>(field: &str, value: Value) -> Option<T> {
    if !value.is_object() {
        warn!("Dropping {} entry: expected an object, got {}", field, kind_of(&value));
        return None;
    }
    match serde_json::from_value(value) {
        Ok(typed) => Some(typed),
        Err(e) => {
            warn!("Dropping malformed {} entry: {}", field, e);
            None
        }
    }
}

fn normalize_action(index: usize, action: WireAction) -> SuggestedAction {
    let text = action
        .text
        .filter(|t| !t.trim().is_empty())
        .unwrap_or_else(|| ACTION_TEXT_FALLBACKS[index % ACTION_TEXT_FALLBACKS.len()].to_string());

    SuggestedAction {
        id: action
            .id
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| format!("action-{}", index)),
        text,
        kind: action
            .kind
            .filter(|k| !k.is_empty())
            .unwrap_or_else(|| "dialogue".to_string()),
    }
}

/// Story-specific fallbacks applied when the narrator output is unusable
#[derive(Debug, Clone)]
pub struct ResponsePolicy {
    /// Narration used when the output could not be parsed at all
    pub unparsed_narrative: String,
    /// Narration used when parsed narration fails validation; `None` skips validation
    pub invalid_narrative: Option<String>,
    /// Actions offered when the output could not be parsed
    pub unparsed_actions: Vec<SuggestedAction>,
    /// Actions offered when the parsed output had none
    pub default_actions: Vec<SuggestedAction>,
}

impl ResponsePolicy {
    /// Fallbacks for a regular conversation turn
    pub fn turn(story: &StoryInfo, character: &CharacterInfo) -> Self {
        Self {
            unparsed_narrative: format!(
                "{name} continues their adventure in the world of {title}, where every moment \
                 brings new discoveries and choices that shape their unique journey through \
                 this beloved literary landscape.",
                name = character.name,
                title = story.title
            ),
            invalid_narrative: Some(format!(
                "The conversation deepens as {name} finds themselves more immersed in the world \
                 of {title}. Each exchange reveals new layers of the story, bridging the familiar \
                 narrative with fresh possibilities. The characters around them seem to come \
                 alive, hinting at both the timeless themes of {author}'s work and new paths yet \
                 to be explored.",
                name = character.name,
                title = story.title,
                author = story.author
            )),
            unparsed_actions: vec![
                SuggestedAction::new("continue", "Continue the conversation", "dialogue"),
                SuggestedAction::new("explore", "Look around", "exploration"),
                SuggestedAction::new("think", "Consider your options", "reflection"),
            ],
            default_actions: vec![
                SuggestedAction::new("dialogue", "Engage in conversation", "dialogue"),
                SuggestedAction::new("observe", "Observe your surroundings", "exploration"),
                SuggestedAction::new("act", "Take action", "action"),
            ],
        }
    }

    /// Fallbacks for the opening scene
    pub fn opening(story: &StoryInfo, character: &CharacterInfo) -> Self {
        Self {
            unparsed_narrative: format!(
                "{name} steps into the world of {title}. The scene unfolds with the detail and \
                 atmosphere that made {author}'s work beloved by generations of readers, and the \
                 people of the story go about their lives, unaware that a newcomer's choices are \
                 about to carve a path of their own through this timeless tale.",
                name = character.name,
                title = story.title,
                author = story.author
            ),
            invalid_narrative: None,
            unparsed_actions: vec![
                SuggestedAction::new("explore", "Look around and take in your surroundings", "exploration"),
                SuggestedAction::new("approach", "Approach the nearest character", "dialogue"),
                SuggestedAction::new("observe", "Watch and listen before acting", "observation"),
            ],
            default_actions: vec![
                SuggestedAction::new("explore", "Look around and explore", "exploration"),
                SuggestedAction::new("greet", "Introduce yourself", "dialogue"),
                SuggestedAction::new("observe", "Observe your surroundings", "observation"),
            ],
        }
    }

    /// Turn a parse result into a complete response
    pub fn finalize(&self, parsed: ParsedResponse) -> NarrativeResponse {
        let mut response = match parsed {
            ParsedResponse::Ok(response) => response,
            ParsedResponse::Fallback { raw_text } => {
                let cleaned = clean_narrative_text(&raw_text);
                NarrativeResponse {
                    response: if cleaned.is_empty() {
                        self.unparsed_narrative.clone()
                    } else {
                        cleaned
                    },
                    suggested_actions: self.unparsed_actions.clone(),
                    memory_updates: Vec::new(),
                    world_state_updates: WorldState::default(),
                    relationship_updates: Vec::new(),
                }
            }
        };

        response.response = clean_if_improved(&response.response);
        if response.response.trim().is_empty() {
            response.response = self.unparsed_narrative.clone();
        }
        if let Some(invalid) = &self.invalid_narrative {
            if !is_narrative_valid(&response.response) {
                warn!("Narration failed validation, substituting story fallback");
                response.response = invalid.clone();
            }
        }

        if response.suggested_actions.is_empty() {
            response.suggested_actions = self.default_actions.clone();
        }

        response
    }
}
