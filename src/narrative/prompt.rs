//! System prompt construction for narration calls

use super::{CharacterInfo, CreativityLevel, MemoryEvent, Relationship, StoryInfo, StoryPhase, WorldState};

/// JSON shape the narrator must answer with on every turn
const TURN_OUTPUT_CONTRACT: &str = r#"Respond with a single JSON object with exactly these fields:
{
  "response": "Two or three paragraphs of narration",
  "suggested_actions": [
    {"id": "action1", "text": "A concrete option for the player", "type": "dialogue"},
    {"id": "action2", "text": "A different option", "type": "exploration"},
    {"id": "action3", "text": "A third option", "type": "action"}
  ],
  "memory_updates": [
    {"id": "mem1", "description": "What happened", "importance": "low|medium|high", "characters_involved": ["Name"], "tags": ["decision"]}
  ],
  "world_state_updates": {
    "current_location": "Where the scene is",
    "present_npcs": ["Names of characters present"]
  },
  "relationship_updates": [
    {"character_name": "Name", "relationship_type": "ally|friend|neutral|suspicious|enemy|romantic", "trust_level": 50, "notes": "Short note"}
  ]
}

Rules for the fields:
- "response" holds narration only, never JSON.
- Add a relationship update for every named character the player deals with. New characters start at trust 50. Trust 0-20 is hostile, 21-40 unfriendly, 41-60 neutral, 61-80 friendly, 81-100 close.
- Record a memory for every decision, discovery or turning point. Use "high" for major plot points."#;

const OPENING_OUTPUT_CONTRACT: &str = r#"Respond with a single JSON object with exactly these fields:
{
  "narration": "Two or three paragraphs (200-400 words) opening the scene",
  "suggested_actions": [
    {"id": "action1", "text": "A concrete option tied to the scene", "type": "dialogue"},
    {"id": "action2", "text": "A different option", "type": "exploration"},
    {"id": "action3", "text": "A third option", "type": "action"}
  ],
  "memory_updates": [
    {"id": "opening", "description": "How the adventure begins", "importance": "medium", "characters_involved": ["Name"], "tags": ["beginning"]}
  ],
  "world_state": {
    "current_location": "Opening location",
    "time_of_day": "morning",
    "present_npcs": ["Names"],
    "mood_atmosphere": "Mood of the scene"
  }
}

"narration" holds story text only, never JSON."#;

/// Builds the system instruction for one narration call
pub struct SystemPromptBuilder<'a> {
    story: &'a StoryInfo,
    character: &'a CharacterInfo,
    level: CreativityLevel,
    memories: &'a [MemoryEvent],
    max_memories: usize,
    relationships: &'a [Relationship],
    world: Option<&'a WorldState>,
    phase: Option<StoryPhase>,
}

impl<'a> SystemPromptBuilder<'a> {
    pub fn new(story: &'a StoryInfo, character: &'a CharacterInfo, level: CreativityLevel) -> Self {
        Self {
            story,
            character,
            level,
            memories: &[],
            max_memories: 5,
            relationships: &[],
            world: None,
            phase: None,
        }
    }

    /// Fold the most recent `max` memories into the prompt
    pub fn memories(mut self, memories: &'a [MemoryEvent], max: usize) -> Self {
        self.memories = memories;
        self.max_memories = max;
        self
    }

    pub fn relationships(mut self, relationships: &'a [Relationship]) -> Self {
        self.relationships = relationships;
        self
    }

    pub fn world_state(mut self, world: &'a WorldState) -> Self {
        self.world = Some(world);
        self
    }

    pub fn phase(mut self, phase: StoryPhase) -> Self {
        self.phase = Some(phase);
        self
    }

    /// Instruction for a regular conversation turn
    pub fn build(&self) -> String {
        let mut sections = vec![self.persona(), self.header()];
        if let Some(phase) = self.phase {
            sections.push(phase.guidance().to_string());
        }
        sections.push(TURN_OUTPUT_CONTRACT.to_string());
        sections.push(format!(
            "Keep the {} narrator personality for the whole response.",
            self.level.label()
        ));
        sections.join("\n\n")
    }

    /// Instruction for the opening scene of a new session
    pub fn build_opening(&self) -> String {
        [
            self.opening_persona(),
            self.header(),
            StoryPhase::Beginning.guidance().to_string(),
            OPENING_OUTPUT_CONTRACT.to_string(),
        ]
        .join("\n\n")
    }

    fn header(&self) -> String {
        let mut header = format!(
            "STORY: {} by {}\nPLAYER CHARACTER: {} ({})",
            self.story.title,
            self.story.author,
            self.character.name,
            self.character.traits_or("adventurous")
        );
        header.push_str(&memory_text(self.memories, self.max_memories));
        header.push_str(&relationship_text(self.relationships));
        if let Some(world) = self.world {
            header.push_str(&world_text(world));
        }
        header
    }

    fn persona(&self) -> String {
        let title = &self.story.title;
        let author = &self.story.author;
        match self.level {
            CreativityLevel::StoryFocused => format!(
                "You narrate {title} as a plot-driven storyteller who keeps the canon on course.\n\
                 - Characters pursue their own goals from {author}'s book and push scenes forward.\n\
                 - Keep time pressure on the player; choices have consequences.\n\
                 - When the player drifts, let the people around them draw the story back.\n\
                 - Dialogue stays in the voice {author} gave each character.\n\
                 Write two or three paragraphs that move the plot."
            ),
            CreativityLevel::FlexibleExploration => format!(
                "You narrate {title} as an attentive guide who follows what the player cares about.\n\
                 - Characters notice the player's interests and respond to them.\n\
                 - Offer several paths forward, each consistent with the world.\n\
                 - Mix canonical events with plausible what-ifs.\n\
                 - Dialogue echoes {author}'s style while staying easy to read.\n\
                 Write two or three paragraphs that answer the player and carry the story on."
            ),
            CreativityLevel::OpenWorld => format!(
                "You narrate {title} as an improv partner: accept the player's idea and build on it.\n\
                 - Any premise goes, including genre shifts, anachronisms or magic.\n\
                 - Characters join in with the player's plans and amplify them.\n\
                 - Keep each character recognisable even as they change.\n\
                 Write two or three energetic paragraphs that run with whatever the player tries."
            ),
        }
    }

    fn opening_persona(&self) -> String {
        let title = &self.story.title;
        let author = &self.story.author;
        let name = &self.character.name;
        match self.level {
            CreativityLevel::StoryFocused => format!(
                "Write the opening scene of {title} the way {author} might have written it.\n\
                 Use a setting and characters from the book, set up a hook tied to its main \
                 conflict, and give {name} a natural place in that world."
            ),
            CreativityLevel::FlexibleExploration => format!(
                "Write an opening scene for {title} that feels faithful but leaves room to roam.\n\
                 Introduce characters who are curious about {name} and make several directions \
                 visible so the player's first choice matters."
            ),
            CreativityLevel::OpenWorld => format!(
                "Write an opening scene that treats {title} as a playground.\n\
                 Feel free to twist the genre or the era. Characters are fascinated by {name} \
                 and eager to follow wherever the player wants to go."
            ),
        }
    }
}

/// `"\n\nKey memories: a; b"` over the last `max` memories, or empty
pub fn memory_text(memories: &[MemoryEvent], max: usize) -> String {
    let recent = &memories[memories.len().saturating_sub(max)..];
    let descriptions: Vec<&str> = recent
        .iter()
        .map(|m| m.description.as_str())
        .filter(|d| !d.is_empty())
        .collect();
    if descriptions.is_empty() {
        return String::new();
    }
    format!("\n\nKey memories: {}", descriptions.join("; "))
}

pub fn relationship_text(relationships: &[Relationship]) -> String {
    if relationships.is_empty() {
        return String::new();
    }
    let described: Vec<String> = relationships.iter().map(Relationship::describe).collect();
    format!("\n\nCurrent relationships: {}", described.join("; "))
}

pub fn world_text(world: &WorldState) -> String {
    if world.is_empty() {
        return String::new();
    }
    let mut lines = Vec::new();
    if let Some(location) = &world.current_location {
        lines.push(format!("Location: {}", location));
    }
    if let Some(time) = &world.time_of_day {
        lines.push(format!("Time of day: {}", time));
    }
    if !world.present_npcs.is_empty() {
        lines.push(format!("Present: {}", world.present_npcs.join(", ")));
    }
    if let Some(mood) = &world.mood_atmosphere {
        lines.push(format!("Mood: {}", mood));
    }
    format!("\n\nCurrent scene:\n{}", lines.join("\n"))
}

/// User message that asks for the opening scene
pub fn opening_request(story: &StoryInfo, character: &CharacterInfo) -> String {
    format!(
        "Create the opening scene for {} entering the world of {}.",
        character.name, story.title
    )
}

/// System instruction for the end-of-story summary
pub fn summary_instruction(story: &StoryInfo, character: &CharacterInfo, memories: &[MemoryEvent]) -> String {
    let events: Vec<String> = memories
        .iter()
        .filter(|m| m.is_significant() && !m.description.is_empty())
        .map(|m| format!("- {}", m.description))
        .collect();
    let events = if events.is_empty() {
        String::new()
    } else {
        format!("\n\nKEY EVENTS FROM THE ADVENTURE:\n{}", events.join("\n"))
    };

    format!(
        "You write a personal recap of a finished interactive story.\n\n\
         STORY DETAILS:\n\
         - Original work: \"{}\" by {}\n\
         - Player character: {}\n\
         - Traits: {}{}\n\n\
         Write two or three paragraphs that celebrate the choices {} made, the relationships \
         they built and the obstacles they got past, and say where their path followed or \
         left the original book. Use the character's name throughout.",
        story.title,
        story.author,
        character.name,
        character.traits_or("Not specified"),
        events,
        character.name
    )
}
