//! Service configuration
//!
//! Loaded from an optional TOML file, then overridden by `STORY__`-prefixed
//! environment variables (`STORY__CONTEXT__KEEP_RECENT_COUNT=20`).

use crate::context::token_estimator::EstimatorKind;
use crate::context::threshold::ThresholdConfig;
use crate::error::{ContextError, Result};
use secrecy::SecretString;
use serde::Deserialize;
use std::time::Duration;

pub use crate::cost::{ModelPricing, PricingConfig};

/// Root configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub context: ContextConfig,
    #[serde(default)]
    pub completion: CompletionConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub pricing: PricingConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load from a TOML file plus environment overrides
    pub fn from_file(path: &str) -> Result<Self> {
        Self::load(Some(path))
    }

    /// Load from environment overrides only
    pub fn from_env() -> Result<Self> {
        Self::load(None)
    }

    /// Parse a TOML document (no environment overrides)
    pub fn from_toml_str(toml: &str) -> Result<Self> {
        let config: Config = config::Config::builder()
            .add_source(config::File::from_str(toml, config::FileFormat::Toml))
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    fn load(path: Option<&str>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(true));
        }
        let config: Config = builder
            .add_source(
                config::Environment::with_prefix("STORY")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Validate cross-field constraints
    pub fn validate(&self) -> Result<()> {
        self.context
            .threshold()
            .validate()
            .map_err(|e| ContextError::Configuration(e.to_string()))?;
        if self.context.keep_recent_count == 0 {
            return Err(ContextError::Configuration(
                "context.keep_recent_count must be greater than zero".to_string(),
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(ContextError::Configuration(
                "retry.max_attempts must be greater than zero".to_string(),
            ));
        }
        if !self.pricing.models.contains_key(&self.pricing.default_model) {
            return Err(ContextError::Configuration(format!(
                "pricing.default_model '{}' has no rate entry",
                self.pricing.default_model
            )));
        }
        Ok(())
    }
}

/// Context window management settings
#[derive(Debug, Clone, Deserialize)]
pub struct ContextConfig {
    #[serde(default = "default_max_context_tokens")]
    pub max_context_tokens: usize,

    /// Occupancy at which history is compressed
    #[serde(default = "default_compression_fraction")]
    pub compression_fraction: f64,

    /// Most recent turns always kept verbatim
    #[serde(default = "default_keep_recent_count")]
    pub keep_recent_count: usize,

    #[serde(default = "default_compression_max_tokens")]
    pub summary_max_tokens: usize,

    #[serde(default = "default_compression_temperature")]
    pub summary_temperature: f32,

    #[serde(default)]
    pub estimator: EstimatorKind,

    #[serde(default = "default_max_key_moments")]
    pub max_key_moments: usize,

    #[serde(default = "default_max_player_actions")]
    pub max_player_actions: usize,

    #[serde(default = "default_max_memory_events")]
    pub max_memory_events: usize,

    /// Merge the transcript anchor into the per-turn system instruction
    #[serde(default)]
    pub fold_anchor: bool,
}

fn default_max_context_tokens() -> usize { 128_000 }
fn default_compression_fraction() -> f64 { 0.70 }
fn default_keep_recent_count() -> usize { 30 }
fn default_compression_max_tokens() -> usize { 800 }
fn default_compression_temperature() -> f32 { 0.2 }
fn default_max_key_moments() -> usize { 10 }
fn default_max_player_actions() -> usize { 15 }
fn default_max_memory_events() -> usize { 5 }

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            max_context_tokens: default_max_context_tokens(),
            compression_fraction: default_compression_fraction(),
            keep_recent_count: default_keep_recent_count(),
            summary_max_tokens: default_compression_max_tokens(),
            summary_temperature: default_compression_temperature(),
            estimator: EstimatorKind::default(),
            max_key_moments: default_max_key_moments(),
            max_player_actions: default_max_player_actions(),
            max_memory_events: default_max_memory_events(),
            fold_anchor: false,
        }
    }
}

impl ContextConfig {
    pub fn threshold(&self) -> ThresholdConfig {
        ThresholdConfig {
            max_context_tokens: self.max_context_tokens,
            compression_fraction: self.compression_fraction,
        }
    }
}

/// Completion service connection settings
#[derive(Debug, Clone, Deserialize)]
pub struct CompletionConfig {
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// API key (read from env OPENAI_API_KEY if not set)
    #[serde(default)]
    pub api_key: Option<SecretString>,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    #[serde(default = "default_narrative_max_tokens")]
    pub narrative_max_tokens: usize,

    #[serde(default = "default_opening_max_tokens")]
    pub opening_max_tokens: usize,

    #[serde(default = "default_summary_max_tokens")]
    pub summary_max_tokens: usize,
}

fn default_api_url() -> String { "https://api.openai.com/v1/chat/completions".to_string() }
fn default_model() -> String { "gpt-4o-mini".to_string() }
fn default_timeout_ms() -> u64 { 60_000 }
fn default_narrative_max_tokens() -> usize { 1500 }
fn default_opening_max_tokens() -> usize { 1200 }
fn default_summary_max_tokens() -> usize { 400 }

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            api_key: None,
            model: default_model(),
            timeout_ms: default_timeout_ms(),
            narrative_max_tokens: default_narrative_max_tokens(),
            opening_max_tokens: default_opening_max_tokens(),
            summary_max_tokens: default_summary_max_tokens(),
        }
    }
}

impl CompletionConfig {
    /// Configured key, falling back to OPENAI_API_KEY
    pub fn resolve_api_key(&self) -> Option<SecretString> {
        self.api_key.clone().or_else(|| {
            std::env::var("OPENAI_API_KEY")
                .ok()
                .filter(|k| !k.is_empty())
                .map(SecretString::new)
        })
    }

    /// Get timeout as Duration
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Retry policy for the main narrative call
#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: usize,

    #[serde(default = "default_base_backoff_ms")]
    pub base_backoff_ms: u64,
}

fn default_max_attempts() -> usize { 3 }
fn default_base_backoff_ms() -> u64 { 1000 }

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_backoff_ms: default_base_backoff_ms(),
        }
    }
}

impl RetryConfig {
    /// Backoff before retry number `attempt` (1-based): base * 2^(attempt-1)
    pub fn backoff(&self, attempt: usize) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16) as u32;
        Duration::from_millis(self.base_backoff_ms).saturating_mul(2_u32.pow(exponent))
    }
}

/// HTTP server settings
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

fn default_host() -> String { "0.0.0.0".to_string() }
fn default_port() -> u16 { 8081 }
fn default_max_body_bytes() -> usize { 10 * 1024 * 1024 }

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    #[default]
    Pretty,
}

/// Logging settings
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub format: LogFormat,
}

fn default_log_level() -> String { "info".to_string() }

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}
