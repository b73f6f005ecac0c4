//! # Configuration System
//!
//! Centralized configuration management for the Analysis Orchestration
//! engine.
//!
//! This crate provides:
//! - Configuration structures for all engine components
//! - Environment variable loading (12-factor app principles)
//! - Configuration file loading (TOML/YAML)
//! - Configuration precedence (env > file > defaults)
//! - Configuration validation
//!
//! # Best Practices
//!
//! - Uses `validator` crate for input validation
//! - Follows 12-factor app configuration principles
//! - Provides clear error messages for invalid configuration

pub mod config;
pub mod file_loader;
pub mod loader;
pub mod precedence;

pub use config::{
    CacheConfig, ContextConfig, EngineConfig, PromptConfig, ProviderConfig, ProviderKind,
    RetryConfig,
};
pub use file_loader::{ConfigFileError, load_from_file, load_from_toml, load_from_yaml};
pub use loader::load_from_env;
pub use precedence::merge_configs;
pub use validator::Validate;
