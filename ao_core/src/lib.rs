//! # Analysis Orchestration Core
//!
//! Shared types and traits for the Analysis Orchestration engine.
//!
//! This crate provides:
//! - Domain types (sessions, turns, requests, results, fingerprints)
//! - The provider-client and analysis-function trait seams
//! - Provider error classification shared across adapters

pub mod traits;
pub mod types;

// Re-export commonly used types for convenience
pub use traits::{AnalysisFunction, ProviderClient};
pub use types::{
    AnalysisRequest, AnalysisResult, AnalysisStatus, AttemptOutcome, Fingerprint, InsightPayload,
    ProviderCallAttempt, ProviderError, ProviderMetadata, ProviderRequest, ProviderResponse, Role,
    SessionId, Turn
};
