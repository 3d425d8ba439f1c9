//! Conversation context management
//!
//! Tracks the token cost of a session transcript, compresses the middle of
//! the history when the context window fills up, and assembles the prompt
//! for each turn.

pub mod assembler;
pub mod compressor;
pub mod key_moments;
pub mod manager;
pub mod models;
pub mod threshold;
pub mod token_estimator;

pub use assembler::PromptAssembler;
pub use compressor::{CompressionOutcome, Compressor, CompressorConfig};
pub use manager::{ContextManager, PreparedTurn};
pub use models::{CompressionStats, ContextUsage, Role, Transcript, Turn};
pub use threshold::{ThresholdCheck, ThresholdConfig, ThresholdMonitor};
pub use token_estimator::{EstimatorKind, HeuristicEstimator, TiktokenEstimator, TokenEstimator};
