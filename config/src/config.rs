//! # Configuration Structures
//!
//! This module defines all configuration structures for the Analysis
//! Orchestration engine.
//!
//! All configuration structures:
//! - Use `serde` for serialization/deserialization
//! - Use `validator` for input validation
//! - Provide sensible defaults usable out of the box

use serde::{Deserialize, Serialize};
use std::time::Duration;
use validator::Validate;

/// Main configuration structure for the Analysis Orchestration engine.
///
/// # M-CANONICAL-DOCS
///
/// ## Purpose
/// Aggregates all engine subsystem configuration: provider selection and
/// transport, retry discipline, response caching, context windowing, and
/// prompt screening. The engine consumes this at construction time and
/// never mutates it afterwards.
///
/// ## Usage
/// ```rust,no_run
/// use config::EngineConfig;
///
/// let config = EngineConfig::default();
/// println!("Model: {}", config.provider.model);
/// ```
///
/// ## Validation
/// All nested configurations must pass their own validation rules.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, Default, PartialEq)]
pub struct EngineConfig {
    /// Provider selection and transport settings
    #[serde(default)]
    #[validate(nested)]
    pub provider: ProviderConfig,

    /// Retry/backoff policy for provider calls
    #[serde(default)]
    #[validate(nested)]
    pub retry: RetryConfig,

    /// Response cache bounds and TTLs
    #[serde(default)]
    #[validate(nested)]
    pub cache: CacheConfig,

    /// Per-session context window and eviction
    #[serde(default)]
    #[validate(nested)]
    pub context: ContextConfig,

    /// Prompt screening rules
    #[serde(default)]
    #[validate(nested)]
    pub prompt: PromptConfig
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[default]
    Gemini,
    Mock
}

/// Provider selection and transport settings.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, PartialEq)]
pub struct ProviderConfig {
    /// Which provider adapter to construct
    #[serde(default)]
    pub kind: ProviderKind,

    /// Model identifier passed to the provider
    #[validate(length(min = 1))]
    pub model: String,

    /// Base URL of the provider API
    #[validate(length(min = 1))]
    pub base_url: String,

    /// Name of the environment variable holding the API key.
    /// The key itself never lives in configuration files.
    pub api_key_env: String,

    /// Timeout applied to each individual call attempt, independent of the
    /// overall request timeout
    #[validate(range(min = 1, max = 600))]
    pub attempt_timeout_seconds: u64,

    /// Overall per-request timeout enforced by the orchestrator
    #[validate(range(min = 1, max = 3600))]
    pub request_timeout_seconds: u64
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            kind: ProviderKind::Gemini,
            model: "gemini-pro".to_string(),
            base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            api_key_env: "AO_PROVIDER_API_KEY".to_string(),
            attempt_timeout_seconds: 30,
            request_timeout_seconds: 120
        }
    }
}

impl ProviderConfig {
    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_secs(self.attempt_timeout_seconds)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }
}

/// Retry/backoff policy for provider calls.
///
/// Exponential backoff with jitter, bounded by `max_retries` additional
/// attempts after the first.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, PartialEq)]
pub struct RetryConfig {
    #[validate(range(max = 10))]
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    #[validate(range(min = 1.0, max = 10.0))]
    pub multiplier: f64,
    pub jitter: bool
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff_ms: 200,
            max_backoff_ms: 10_000,
            multiplier: 2.0,
            jitter: true
        }
    }
}

/// Response cache bounds and TTLs.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, PartialEq)]
pub struct CacheConfig {
    /// LRU entry-count bound
    #[validate(range(min = 1))]
    pub max_entries: usize,

    /// TTL for successful results
    pub ttl_seconds: u64,

    /// Short negative-cache window for failed results
    pub negative_ttl_seconds: u64,

    /// Interval of the background expiry sweep
    #[validate(range(min = 1))]
    pub sweep_interval_seconds: u64
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 256,
            ttl_seconds: 900,
            negative_ttl_seconds: 30,
            sweep_interval_seconds: 60
        }
    }
}

/// Per-session context window and eviction.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, PartialEq)]
pub struct ContextConfig {
    /// Most-recent turns retained per session
    #[validate(range(min = 2))]
    pub max_turns: usize,

    /// Sessions idle longer than this are evicted wholesale
    pub session_ttl_seconds: u64,

    /// Fold overflowed turns into a rolling summary instead of dropping them
    pub summarize_overflow: bool
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            max_turns: 40,
            session_ttl_seconds: 3600,
            summarize_overflow: true
        }
    }
}

/// Screening applied to free-text analysis instructions before any provider
/// work is spent on them.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, PartialEq)]
pub struct PromptConfig {
    /// Minimum length of a free-text instruction
    pub min_instruction_length: usize,

    /// Terms that reject an instruction outright
    pub forbidden_terms: Vec<String>
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            min_instruction_length: 20,
            forbidden_terms: vec![
                "password".to_string(),
                "credential".to_string(),
                "secret key".to_string(),
            ]
        }
    }
}
