//! # Environment Variable Loader
//!
//! Loads configuration from environment variables following 12-factor app
//! principles.
//!
//! # Naming Convention
//! All variables carry the `AO_` prefix:
//! - `AO_PROVIDER_*`: provider selection and transport
//! - `AO_RETRY_*`: retry/backoff policy
//! - `AO_CACHE_*`: response cache bounds
//! - `AO_CONTEXT_*`: context window and eviction
//! - `AO_PROMPT_*`: prompt screening

use crate::config::{EngineConfig, ProviderKind};
use std::env;

fn env_string(name: &str, target: &mut String) {
    if let Ok(value) = env::var(name) {
        *target = value;
    }
}

fn env_parse<T: std::str::FromStr>(name: &str, target: &mut T) {
    if let Ok(value) = env::var(name) {
        if let Ok(parsed) = value.parse::<T>() {
            *target = parsed;
        } else {
            tracing::warn!(variable = name, value = %value, "Ignoring unparsable env override");
        }
    }
}

/// Load configuration from environment variables.
///
/// # M-CANONICAL-DOCS
///
/// ## Purpose
/// Loads configuration from environment variables following 12-factor app
/// principles. Environment variables override defaults and file settings
/// when merged through [`crate::merge_configs`].
///
/// ## Environment Variables
/// ### Provider (`AO_PROVIDER_*`)
/// - `AO_PROVIDER_KIND`: `gemini` or `mock` (default: gemini)
/// - `AO_PROVIDER_MODEL`: model identifier (default: "gemini-pro")
/// - `AO_PROVIDER_BASE_URL`: provider API base URL
/// - `AO_PROVIDER_API_KEY_ENV`: name of the variable holding the API key
/// - `AO_PROVIDER_ATTEMPT_TIMEOUT_SECONDS`: per-attempt timeout (default: 30)
/// - `AO_PROVIDER_REQUEST_TIMEOUT_SECONDS`: overall timeout (default: 120)
///
/// ### Retry (`AO_RETRY_*`)
/// - `AO_RETRY_MAX_RETRIES`: retry ceiling (default: 3)
/// - `AO_RETRY_INITIAL_BACKOFF_MS`: first backoff delay (default: 200)
/// - `AO_RETRY_MAX_BACKOFF_MS`: backoff cap (default: 10000)
/// - `AO_RETRY_MULTIPLIER`: backoff multiplier (default: 2.0)
/// - `AO_RETRY_JITTER`: apply jitter (true/false, default: true)
///
/// ### Cache (`AO_CACHE_*`)
/// - `AO_CACHE_MAX_ENTRIES`: LRU bound (default: 256)
/// - `AO_CACHE_TTL_SECONDS`: success TTL (default: 900)
/// - `AO_CACHE_NEGATIVE_TTL_SECONDS`: failure TTL (default: 30)
/// - `AO_CACHE_SWEEP_INTERVAL_SECONDS`: sweep interval (default: 60)
///
/// ### Context (`AO_CONTEXT_*`)
/// - `AO_CONTEXT_MAX_TURNS`: retained turns per session (default: 40)
/// - `AO_CONTEXT_SESSION_TTL_SECONDS`: idle eviction TTL (default: 3600)
/// - `AO_CONTEXT_SUMMARIZE_OVERFLOW`: summarize dropped turns (default: true)
///
/// ### Prompt (`AO_PROMPT_*`)
/// - `AO_PROMPT_MIN_INSTRUCTION_LENGTH`: minimum free-text length (default: 20)
pub fn load_from_env() -> anyhow::Result<EngineConfig> {
    let mut config = EngineConfig::default();

    if let Ok(kind) = env::var("AO_PROVIDER_KIND") {
        config.provider.kind = match kind.to_lowercase().as_str() {
            "gemini" => ProviderKind::Gemini,
            "mock" => ProviderKind::Mock,
            other => anyhow::bail!("Unknown provider kind: {other}")
        };
    }
    env_string("AO_PROVIDER_MODEL", &mut config.provider.model);
    env_string("AO_PROVIDER_BASE_URL", &mut config.provider.base_url);
    env_string("AO_PROVIDER_API_KEY_ENV", &mut config.provider.api_key_env);
    env_parse(
        "AO_PROVIDER_ATTEMPT_TIMEOUT_SECONDS",
        &mut config.provider.attempt_timeout_seconds
    );
    env_parse(
        "AO_PROVIDER_REQUEST_TIMEOUT_SECONDS",
        &mut config.provider.request_timeout_seconds
    );

    env_parse("AO_RETRY_MAX_RETRIES", &mut config.retry.max_retries);
    env_parse(
        "AO_RETRY_INITIAL_BACKOFF_MS",
        &mut config.retry.initial_backoff_ms
    );
    env_parse("AO_RETRY_MAX_BACKOFF_MS", &mut config.retry.max_backoff_ms);
    env_parse("AO_RETRY_MULTIPLIER", &mut config.retry.multiplier);
    env_parse("AO_RETRY_JITTER", &mut config.retry.jitter);

    env_parse("AO_CACHE_MAX_ENTRIES", &mut config.cache.max_entries);
    env_parse("AO_CACHE_TTL_SECONDS", &mut config.cache.ttl_seconds);
    env_parse(
        "AO_CACHE_NEGATIVE_TTL_SECONDS",
        &mut config.cache.negative_ttl_seconds
    );
    env_parse(
        "AO_CACHE_SWEEP_INTERVAL_SECONDS",
        &mut config.cache.sweep_interval_seconds
    );

    env_parse("AO_CONTEXT_MAX_TURNS", &mut config.context.max_turns);
    env_parse(
        "AO_CONTEXT_SESSION_TTL_SECONDS",
        &mut config.context.session_ttl_seconds
    );
    env_parse(
        "AO_CONTEXT_SUMMARIZE_OVERFLOW",
        &mut config.context.summarize_overflow
    );

    env_parse(
        "AO_PROMPT_MIN_INSTRUCTION_LENGTH",
        &mut config.prompt.min_instruction_length
    );

    Ok(config)
}
