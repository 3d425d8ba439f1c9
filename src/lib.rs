//! Conversation context management for LLM-narrated interactive fiction
//!
//! The core is [`context::ContextManager`]: it estimates the token cost of a
//! session transcript, compresses the middle of the history into a summary
//! when the context window fills up, and assembles the prompt for each turn.
//! [`narrator::Narrator`] drives it per player turn and [`api`] exposes the
//! narrator over HTTP.

pub mod api;
pub mod completion;
pub mod config;
pub mod context;
pub mod cost;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod narrative;
pub mod narrator;
pub mod session;

pub use completion::{CompletionService, OpenAiClient};
pub use config::Config;
pub use context::{ContextManager, Transcript, Turn};
pub use error::{ContextError, Result};
pub use narrator::Narrator;
