//! Core trait seams for the Analysis Orchestration engine.

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::types::{ProviderError, ProviderRequest, ProviderResponse};

/// Transport to an external language-model provider.
///
/// Implementations adapt one provider's wire format; they classify failures
/// into [`ProviderError`] and never retry internally. Retry discipline lives
/// in the engine's retrying wrapper so policy stays in one place.
#[async_trait]
pub trait ProviderClient: Send + Sync {
    async fn call(&self, request: &ProviderRequest) -> Result<ProviderResponse, ProviderError>;
}

/// A pluggable statistical/ML routine invoked by intent name.
///
/// Parameters arrive already validated against the intent's declared schema.
/// The returned value must conform to the intent's output schema; any error
/// is wrapped by the registry, preserving the cause.
#[async_trait]
pub trait AnalysisFunction: Send + Sync {
    async fn run(&self, params: &Map<String, Value>) -> anyhow::Result<Value>;
}
