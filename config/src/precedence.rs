//! # Configuration Precedence
//!
//! Merges configuration from multiple sources with precedence rules.
//!
//! # Precedence Order
//! 1. Environment variables (highest priority)
//! 2. Configuration file
//! 3. Default values (lowest priority)

use crate::config::EngineConfig;

/// Merge configuration sources with precedence.
///
/// # M-CANONICAL-DOCS
///
/// ## Purpose
/// Merges configuration from defaults, a configuration file, and the
/// environment, following precedence rules: env > file > defaults.
///
/// ## Merge Granularity
/// Sections are merged as units: a section in an override source replaces
/// the base section only when it differs from the section's default. This
/// keeps `EngineConfig::default()` in an override source from silently
/// resetting file-provided values.
pub fn merge_configs(
    defaults: EngineConfig,
    file_config: EngineConfig,
    env_config: EngineConfig
) -> EngineConfig {
    let mut config = defaults;

    config = merge_with_logging(config, file_config, "file");
    config = merge_with_logging(config, env_config, "env");

    config
}

fn merge_with_logging(
    mut base: EngineConfig,
    override_config: EngineConfig,
    source_name: &str
) -> EngineConfig {
    let default = EngineConfig::default();
    let mut changes: Vec<&str> = Vec::new();

    if override_config.provider != default.provider {
        base.provider = override_config.provider;
        changes.push("provider");
    }
    if override_config.retry != default.retry {
        base.retry = override_config.retry;
        changes.push("retry");
    }
    if override_config.cache != default.cache {
        base.cache = override_config.cache;
        changes.push("cache");
    }
    if override_config.context != default.context {
        base.context = override_config.context;
        changes.push("context");
    }
    if override_config.prompt != default.prompt {
        base.prompt = override_config.prompt;
        changes.push("prompt");
    }

    if !changes.is_empty() {
        tracing::info!("Configuration from {}: {:?}", source_name, changes);
    }

    base
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_overrides_file() {
        let mut file_config = EngineConfig::default();
        file_config.retry.max_retries = 5;

        let mut env_config = EngineConfig::default();
        env_config.retry.max_retries = 7;

        let merged = merge_configs(EngineConfig::default(), file_config, env_config);
        assert_eq!(merged.retry.max_retries, 7);
    }

    #[test]
    fn file_settings_survive_default_env() {
        let mut file_config = EngineConfig::default();
        file_config.cache.max_entries = 64;

        let merged = merge_configs(
            EngineConfig::default(),
            file_config,
            EngineConfig::default()
        );
        assert_eq!(merged.cache.max_entries, 64);
    }

    #[test]
    fn untouched_sections_keep_defaults() {
        let mut file_config = EngineConfig::default();
        file_config.context.max_turns = 8;

        let merged = merge_configs(
            EngineConfig::default(),
            file_config,
            EngineConfig::default()
        );
        assert_eq!(merged.context.max_turns, 8);
        assert_eq!(merged.cache.ttl_seconds, 900);
    }
}
