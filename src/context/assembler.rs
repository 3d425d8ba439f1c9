//! Final prompt assembly for one turn

use super::models::{Transcript, Turn};

/// Builds the ordered message list sent to the completion service
///
/// Output is `[instruction] + transcript + [user turn]`. With `fold_anchor`
/// set, the transcript's system anchor is appended to the instruction text
/// and left out of the list so the model sees a single system preamble.
#[derive(Debug, Clone, Copy, Default)]
pub struct PromptAssembler {
    fold_anchor: bool,
}

impl PromptAssembler {
    pub fn new(fold_anchor: bool) -> Self {
        Self { fold_anchor }
    }

    pub fn assemble(&self, instruction: &str, transcript: &Transcript, user_input: &str) -> Vec<Turn> {
        let (instruction, history) = match transcript.anchor() {
            Some(anchor) if self.fold_anchor => (
                format!("{}\n\n{}", instruction, anchor.content),
                transcript.body(),
            ),
            _ => (instruction.to_string(), transcript.turns()),
        };

        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(Turn::system(instruction));
        messages.extend_from_slice(history);
        messages.push(Turn::user(user_input));
        messages
    }
}
