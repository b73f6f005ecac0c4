use ao_core::types::ProviderError;
use thiserror::Error;

pub type EngineResult<T> = Result<T, EngineError>;

/// Failure taxonomy for one orchestrated request.
///
/// Cloneable so a shared in-flight failure can be fanned out to every
/// waiter attached to the same fingerprint.
#[derive(Debug, Clone, Error)]
pub enum EngineError {
    /// No prompt template exists for the requested intent. Fatal to the
    /// single request, reported before any provider work is spent.
    #[error("Unknown intent: {intent}")]
    UnknownIntent { intent: String },

    /// Request parameters failed schema validation or prompt screening.
    #[error("Invalid parameters for {intent}: {reason}")]
    InvalidParameters { intent: String, reason: String },

    /// Retries exhausted against the provider.
    #[error("Provider unavailable after {attempts} attempts: {last_error}")]
    ProviderUnavailable { attempts: u32, last_error: String },

    /// The provider responded but the content failed schema validation.
    /// The raw response is attached for diagnosis; not retried.
    #[error("Invalid provider response: {reason}")]
    InvalidResponse { reason: String, raw: String },

    /// The downstream analysis function failed; cause preserved.
    #[error("Analysis '{intent}' failed: {cause}")]
    AnalysisExecutionError { intent: String, cause: String },

    /// Non-retryable provider failure (auth, quota), escalated immediately.
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    /// An identical request failed within the negative-cache window; this
    /// one was suppressed without a provider call.
    #[error("Identical request failed recently: {message}")]
    NegativeCacheHit { message: String },

    /// The caller's wait was cancelled by the request timeout. A shared
    /// in-flight call, if any, keeps running for its other waiters.
    #[error("Request timed out after {seconds}s")]
    RequestTimeout { seconds: u64 },

    #[error("Configuration error: {reason}")]
    ConfigError { reason: String },

    /// The shared in-flight call was dropped before publishing a result.
    #[error("In-flight request was abandoned")]
    InFlightAbandoned
}

impl EngineError {
    /// Stable label for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UnknownIntent { .. } => "unknown_intent",
            Self::InvalidParameters { .. } => "invalid_parameters",
            Self::ProviderUnavailable { .. } => "provider_unavailable",
            Self::InvalidResponse { .. } => "invalid_response",
            Self::AnalysisExecutionError { .. } => "analysis_execution_error",
            Self::Provider(_) => "provider_fatal",
            Self::NegativeCacheHit { .. } => "negative_cache_hit",
            Self::RequestTimeout { .. } => "request_timeout",
            Self::ConfigError { .. } => "config_error",
            Self::InFlightAbandoned => "inflight_abandoned"
        }
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Provider(e) => e.is_retryable(),
            _ => false
        }
    }

    /// Short message suitable for recording in the conversation history.
    /// Internal diagnostic detail (raw responses, attempt logs) stays in
    /// the error itself.
    pub fn user_message(&self) -> String {
        match self {
            Self::UnknownIntent { intent } => {
                format!("I don't know how to run the analysis '{intent}'.")
            }
            Self::InvalidParameters { intent, reason } => {
                format!("The request for '{intent}' was rejected: {reason}")
            }
            Self::ProviderUnavailable { .. } | Self::RequestTimeout { .. } => {
                "The analysis service is temporarily unavailable. Please try again shortly."
                    .to_string()
            }
            Self::InvalidResponse { .. } => {
                "The analysis produced an unusable answer and was discarded.".to_string()
            }
            Self::AnalysisExecutionError { intent, .. } => {
                format!("The analysis '{intent}' failed while processing the data.")
            }
            Self::Provider(_) | Self::ConfigError { .. } | Self::InFlightAbandoned => {
                "The analysis could not be completed due to an internal error.".to_string()
            }
            Self::NegativeCacheHit { message } => message.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryability_follows_provider_classification() {
        let transient = EngineError::Provider(ProviderError::Transient {
            reason: "connection reset".to_string()
        });
        assert!(transient.is_retryable());

        let fatal = EngineError::Provider(ProviderError::Fatal {
            reason: "quota exhausted".to_string()
        });
        assert!(!fatal.is_retryable());

        let unknown = EngineError::UnknownIntent {
            intent: "x".to_string()
        };
        assert!(!unknown.is_retryable());
    }

    #[test]
    fn user_message_hides_raw_response() {
        let err = EngineError::InvalidResponse {
            reason: "missing field `summary`".to_string(),
            raw: "{\"internal\": true}".to_string()
        };
        assert!(!err.user_message().contains("internal"));
    }
}
