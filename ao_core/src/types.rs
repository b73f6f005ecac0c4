use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use strum::{Display, EnumString};

/// Identifier of one conversational session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Content-addressed identity of one cacheable unit of work.
///
/// A fingerprint is a pure function of (intent, parameters, context slice):
/// identical inputs always map to the same fingerprint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Computes the fingerprint for an intent, its parameters, and a hash of
    /// the context slice the prompt will be built from.
    ///
    /// Parameter keys are sorted before hashing so that insertion order of
    /// the parameter map never changes the result.
    pub fn compute(intent: &str, parameters: &Map<String, Value>, context_hash: &str) -> Self {
        let canonical: BTreeMap<&str, &Value> =
            parameters.iter().map(|(k, v)| (k.as_str(), v)).collect();
        let params_json =
            serde_json::to_string(&canonical).unwrap_or_else(|_| String::from("{}"));

        let mut hasher = Sha256::new();
        hasher.update(intent.as_bytes());
        hasher.update(b":");
        hasher.update(params_json.as_bytes());
        hasher.update(b":");
        hasher.update(context_hash.as_bytes());
        Self(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System
}

/// One message/event in a session's ordered history.
///
/// Immutable once appended; `seq` is monotonic within the owning session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<AnalysisResult>,
    pub seq: u64,
    pub created_at: DateTime<Utc>
}

impl Turn {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            result: None,
            seq: 0,
            created_at: Utc::now()
        }
    }

    pub fn with_result(mut self, result: AnalysisResult) -> Self {
        self.result = Some(result);
        self
    }
}

/// A request for one analysis or conversational action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisRequest {
    pub intent: String,
    pub parameters: Map<String, Value>,
    pub session_id: SessionId
}

impl AnalysisRequest {
    pub fn new(
        session_id: SessionId,
        intent: impl Into<String>,
        parameters: Map<String, Value>
    ) -> Self {
        Self {
            intent: intent.into(),
            parameters,
            session_id
        }
    }

    pub fn fingerprint(&self, context_hash: &str) -> Fingerprint {
        Fingerprint::compute(&self.intent, &self.parameters, context_hash)
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumString, Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum AnalysisStatus {
    Success,
    Partial,
    Failed
}

/// Provider-response metadata carried alongside a result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderMetadata {
    pub model: String,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub latency_ms: u64
}

/// The structured outcome of one request. Immutable after creation and
/// cached keyed by fingerprint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub status: AnalysisStatus,
    pub payload: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<ProviderMetadata>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>
}

impl AnalysisResult {
    pub fn success(payload: Value, metadata: Option<ProviderMetadata>) -> Self {
        Self {
            status: AnalysisStatus::Success,
            payload,
            metadata,
            error: None
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            status: AnalysisStatus::Failed,
            payload: Value::Null,
            metadata: None,
            error: Some(error.into())
        }
    }

    pub fn is_failed(&self) -> bool {
        self.status == AnalysisStatus::Failed
    }
}

/// Structured insight extracted from free-text provider output: an overview
/// plus bulleted findings and recommended actions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InsightPayload {
    pub summary: String,
    #[serde(default)]
    pub findings: Vec<String>,
    #[serde(default)]
    pub recommendations: Vec<String>
}

/// Classified failure from a provider adapter.
///
/// `RateLimited` and `Transient` are retryable; `Fatal` (malformed request,
/// auth failure, exhausted quota) is not.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ProviderError {
    #[error("Rate limited: retry after {retry_after_seconds}s")]
    RateLimited { retry_after_seconds: u64 },

    #[error("Transient provider error: {reason}")]
    Transient { reason: String },

    #[error("Fatal provider error: {reason}")]
    Fatal { reason: String }
}

impl ProviderError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimited { .. } | Self::Transient { .. })
    }

    pub fn retry_after(&self) -> Option<u64> {
        if let Self::RateLimited {
            retry_after_seconds
        } = self
        {
            Some(*retry_after_seconds)
        } else {
            None
        }
    }
}

/// A fully rendered request ready to send to a provider.
///
/// Rendering is deterministic: equal inputs produce byte-identical requests,
/// which the fingerprint invariant depends on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderRequest {
    pub model: String,
    pub system_prompt: String,
    pub user_prompt: String
}

/// Raw provider output plus call metadata, before validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderResponse {
    pub text: String,
    pub metadata: ProviderMetadata
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum AttemptOutcome {
    Success,
    RateLimited,
    TransientError,
    FatalError
}

/// One provider call attempt, recorded transiently for observability and
/// retry decisioning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderCallAttempt {
    pub attempt: u32,
    pub at: DateTime<Utc>,
    pub outcome: AttemptOutcome,
    pub backoff_applied_ms: u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn params(pairs: &[(&str, Value)]) -> Map<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn fingerprint_is_deterministic() {
        let p = params(&[("columns", json!(["x", "y"]))]);
        let a = Fingerprint::compute("correlation", &p, "ctx");
        let b = Fingerprint::compute("correlation", &p, "ctx");
        assert_eq!(a, b);
    }

    #[test]
    fn fingerprint_ignores_parameter_insertion_order() {
        let mut forward = Map::new();
        forward.insert("a".to_string(), json!(1));
        forward.insert("b".to_string(), json!(2));

        let mut reverse = Map::new();
        reverse.insert("b".to_string(), json!(2));
        reverse.insert("a".to_string(), json!(1));

        assert_eq!(
            Fingerprint::compute("trend", &forward, "ctx"),
            Fingerprint::compute("trend", &reverse, "ctx")
        );
    }

    #[test]
    fn fingerprint_varies_with_each_input() {
        let p = params(&[("columns", json!(["x"]))]);
        let base = Fingerprint::compute("correlation", &p, "ctx");

        assert_ne!(base, Fingerprint::compute("trend", &p, "ctx"));
        assert_ne!(
            base,
            Fingerprint::compute("correlation", &params(&[("columns", json!(["y"]))]), "ctx")
        );
        assert_ne!(base, Fingerprint::compute("correlation", &p, "other"));
    }

    #[test]
    fn provider_error_classification() {
        let rate_limited = ProviderError::RateLimited {
            retry_after_seconds: 30
        };
        assert!(rate_limited.is_retryable());
        assert_eq!(rate_limited.retry_after(), Some(30));

        let fatal = ProviderError::Fatal {
            reason: "invalid api key".to_string()
        };
        assert!(!fatal.is_retryable());
        assert_eq!(fatal.retry_after(), None);
    }

    #[test]
    fn analysis_result_serde_round_trip() {
        let result = AnalysisResult::success(
            json!({"summary": "ok"}),
            Some(ProviderMetadata {
                model: "gemini-pro".to_string(),
                prompt_tokens: 120,
                completion_tokens: 80,
                latency_ms: 410
            })
        );
        let text = serde_json::to_string(&result).unwrap();
        let back: AnalysisResult = serde_json::from_str(&text).unwrap();
        assert_eq!(back.status, AnalysisStatus::Success);
        assert_eq!(back.payload["summary"], "ok");
    }
}
