//! Narrative configuration supplied by the caller
//!
//! Story, character, memory, relationship and world-state snapshots are
//! consumed as-is and only turned into prompt text. The creativity level
//! picks the narrator persona and the sampling temperature.

pub mod cleaner;
pub mod prompt;
pub mod response;

pub use prompt::SystemPromptBuilder;
pub use response::{NarrativeResponse, ParsedResponse, ResponsePolicy, SuggestedAction};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// The literary work being played
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoryInfo {
    pub title: String,
    #[serde(default)]
    pub author: String,
}

/// The player's character
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CharacterInfo {
    pub name: String,
    #[serde(default)]
    pub personality_traits: Vec<String>,
}

impl CharacterInfo {
    /// Comma-separated traits, or `fallback` when none were given
    pub fn traits_or(&self, fallback: &str) -> String {
        if self.personality_traits.is_empty() {
            fallback.to_string()
        } else {
            self.personality_traits.join(", ")
        }
    }
}

/// How much a memory matters to the story
///
/// Reads any casing; unrecognised labels count as `Medium`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", from = "String")]
pub enum Importance {
    Low,
    #[default]
    Medium,
    High,
}

impl From<String> for Importance {
    fn from(label: String) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "low" | "minor" | "trivial" => Importance::Low,
            "high" | "critical" | "major" | "key" => Importance::High,
            _ => Importance::Medium,
        }
    }
}

/// A notable story fact recorded by the caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryEvent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub importance: Importance,
    #[serde(default, deserialize_with = "null_as_default")]
    pub characters_involved: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl MemoryEvent {
    pub fn new(description: impl Into<String>, importance: Importance) -> Self {
        Self {
            id: None,
            description: description.into(),
            importance,
            characters_involved: Vec::new(),
            tags: Vec::new(),
            timestamp: None,
        }
    }

    /// High and medium memories make it into the end-of-story summary
    pub fn is_significant(&self) -> bool {
        self.importance >= Importance::Medium
    }
}

/// The player's standing with one named character
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    #[serde(default)]
    pub character_name: String,
    #[serde(default = "default_relationship_type")]
    pub relationship_type: String,
    /// 0-100
    #[serde(default = "default_trust_level", deserialize_with = "trust_level_from_any")]
    pub trust_level: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

fn default_relationship_type() -> String { "neutral".to_string() }
fn default_trust_level() -> u32 { 50 }

/// Accepts integers, fractions and numeric strings ("65", "65%"), clamped to 0-100
fn trust_level_from_any<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    let level = match &value {
        Value::Null => return Ok(default_trust_level()),
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().trim_end_matches('%').trim().parse::<f64>().ok(),
        _ => None,
    };

    level
        .filter(|l| l.is_finite())
        .map(|l| l.round().clamp(0.0, 100.0) as u32)
        .ok_or_else(|| serde::de::Error::custom(format!("invalid trust level: {}", value)))
}

/// `null` reads as the type's default
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

impl Relationship {
    pub fn describe(&self) -> String {
        format!(
            "{} ({}, trust: {}%)",
            self.character_name, self.relationship_type, self.trust_level
        )
    }
}

/// Scene snapshot
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorldState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_of_day: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub present_npcs: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mood_atmosphere: Option<String>,
}

impl WorldState {
    pub fn is_empty(&self) -> bool {
        self.current_location.is_none()
            && self.time_of_day.is_none()
            && self.present_npcs.is_empty()
            && self.mood_atmosphere.is_none()
    }
}

/// Narrator freedom tier
///
/// Deserializes from the numbers 1-3; anything else reads as
/// `FlexibleExploration`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "i64", into = "i64")]
pub enum CreativityLevel {
    StoryFocused,
    #[default]
    FlexibleExploration,
    OpenWorld,
}

impl From<i64> for CreativityLevel {
    fn from(level: i64) -> Self {
        match level {
            1 => CreativityLevel::StoryFocused,
            3 => CreativityLevel::OpenWorld,
            _ => CreativityLevel::FlexibleExploration,
        }
    }
}

impl From<CreativityLevel> for i64 {
    fn from(level: CreativityLevel) -> Self {
        level.number()
    }
}

impl CreativityLevel {
    pub fn number(&self) -> i64 {
        match self {
            CreativityLevel::StoryFocused => 1,
            CreativityLevel::FlexibleExploration => 2,
            CreativityLevel::OpenWorld => 3,
        }
    }

    /// Sampling temperature for narration at this tier
    pub fn temperature(&self) -> f32 {
        match self {
            CreativityLevel::StoryFocused => 0.5,
            CreativityLevel::FlexibleExploration => 0.7,
            CreativityLevel::OpenWorld => 0.9,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            CreativityLevel::StoryFocused => "STORY-FOCUSED",
            CreativityLevel::FlexibleExploration => "FLEXIBLE EXPLORATION",
            CreativityLevel::OpenWorld => "OPEN WORLD",
        }
    }
}

/// Coarse position in the story arc, judged from transcript length
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoryPhase {
    Beginning,
    Middle,
    ApproachingClimax,
}

impl StoryPhase {
    pub fn from_turn_count(turns: usize) -> Self {
        match turns {
            0..=4 => StoryPhase::Beginning,
            5..=14 => StoryPhase::Middle,
            _ => StoryPhase::ApproachingClimax,
        }
    }

    /// One paragraph of pacing guidance for the narrator
    pub fn guidance(&self) -> &'static str {
        match self {
            StoryPhase::Beginning => {
                "STORY PHASE: Beginning. Establish the setting and introduce the people \
                 around the player. Plant a hook the player can pull on."
            }
            StoryPhase::Middle => {
                "STORY PHASE: Middle. Deepen the relationships already in play, complicate \
                 the player's goals and let earlier choices come back with consequences."
            }
            StoryPhase::ApproachingClimax => {
                "STORY PHASE: Approaching the climax. Tighten the threads, raise the stakes \
                 and steer toward a decisive moment shaped by what the player has done."
            }
        }
    }
}
