//! Provider transport: retry discipline plus concrete adapters.
//!
//! Adapters ([`gemini::GeminiClient`], [`mock::ScriptedProvider`]) classify
//! failures but never retry; [`RetryingClient`] owns the attempt loop so
//! backoff policy lives in exactly one place.

pub mod gemini;
pub mod mock;
pub mod retry;

use std::sync::Arc;
use std::time::Duration;

use ao_core::traits::ProviderClient;
use ao_core::types::{
    AttemptOutcome, ProviderCallAttempt, ProviderError, ProviderRequest, ProviderResponse
};
use chrono::Utc;
use tracing::{debug, warn};

use crate::error::{EngineError, EngineResult};
use crate::telemetry::EngineTelemetry;
pub use retry::RetryPolicy;

/// Wraps any [`ProviderClient`] with bounded retries, exponential backoff
/// with jitter, and a per-attempt timeout enforced independently of the
/// overall request timeout.
pub struct RetryingClient {
    inner: Arc<dyn ProviderClient>,
    policy: RetryPolicy,
    attempt_timeout: Duration,
    telemetry: Arc<EngineTelemetry>
}

impl RetryingClient {
    pub fn new(
        inner: Arc<dyn ProviderClient>,
        policy: RetryPolicy,
        attempt_timeout: Duration,
        telemetry: Arc<EngineTelemetry>
    ) -> Self {
        Self {
            inner,
            policy,
            attempt_timeout,
            telemetry
        }
    }

    /// Calls the provider, retrying `RateLimited` and `Transient` failures
    /// up to the policy ceiling. `Fatal` failures escalate immediately.
    ///
    /// Returns the response together with the attempt log for
    /// observability; the log is not persisted beyond the call.
    pub async fn call(
        &self,
        request: &ProviderRequest
    ) -> EngineResult<(ProviderResponse, Vec<ProviderCallAttempt>)> {
        let mut attempts: Vec<ProviderCallAttempt> = Vec::new();
        let mut last_error: Option<ProviderError> = None;

        for attempt in 0..=self.policy.max_retries {
            let outcome = match tokio::time::timeout(self.attempt_timeout, self.inner.call(request))
                .await
            {
                Ok(result) => result,
                Err(_) => Err(ProviderError::Transient {
                    reason: format!(
                        "attempt timed out after {}s",
                        self.attempt_timeout.as_secs()
                    )
                })
            };

            match outcome {
                Ok(response) => {
                    self.telemetry.record_provider_attempt(AttemptOutcome::Success);
                    attempts.push(ProviderCallAttempt {
                        attempt: attempt + 1,
                        at: Utc::now(),
                        outcome: AttemptOutcome::Success,
                        backoff_applied_ms: 0
                    });
                    debug!(
                        attempt = attempt + 1,
                        latency_ms = response.metadata.latency_ms,
                        "Provider call succeeded"
                    );
                    return Ok((response, attempts));
                }
                Err(err) => {
                    let kind = match &err {
                        ProviderError::RateLimited { .. } => AttemptOutcome::RateLimited,
                        ProviderError::Transient { .. } => AttemptOutcome::TransientError,
                        ProviderError::Fatal { .. } => AttemptOutcome::FatalError
                    };
                    self.telemetry.record_provider_attempt(kind);

                    if !err.is_retryable() {
                        attempts.push(ProviderCallAttempt {
                            attempt: attempt + 1,
                            at: Utc::now(),
                            outcome: kind,
                            backoff_applied_ms: 0
                        });
                        warn!(attempt = attempt + 1, error = %err, "Fatal provider error");
                        return Err(EngineError::Provider(err));
                    }

                    let exhausted = attempt == self.policy.max_retries;
                    let backoff = if exhausted {
                        Duration::ZERO
                    } else {
                        // Server-provided retry-after wins when it exceeds
                        // the computed backoff.
                        let computed = self.policy.jittered_delay_for(attempt);
                        match err.retry_after() {
                            Some(secs) => computed.max(Duration::from_secs(secs)),
                            None => computed
                        }
                    };

                    attempts.push(ProviderCallAttempt {
                        attempt: attempt + 1,
                        at: Utc::now(),
                        outcome: kind,
                        backoff_applied_ms: backoff.as_millis() as u64
                    });
                    warn!(
                        attempt = attempt + 1,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %err,
                        "Provider call failed"
                    );
                    last_error = Some(err);

                    if !exhausted {
                        tokio::time::sleep(backoff).await;
                    }
                }
            }
        }

        let last = last_error
            .map(|e| e.to_string())
            .unwrap_or_else(|| "unknown".to_string());
        Err(EngineError::ProviderUnavailable {
            attempts: self.policy.max_retries + 1,
            last_error: last
        })
    }
}
