//! Scripted provider for tests: plays back a queue of outcomes, counts
//! calls, and can simulate slow responses.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use ao_core::traits::ProviderClient;
use ao_core::types::{ProviderError, ProviderMetadata, ProviderRequest, ProviderResponse};
use async_trait::async_trait;
use tokio::sync::Mutex;

pub struct ScriptedProvider {
    script: Mutex<VecDeque<Result<String, ProviderError>>>,
    fallback: Option<String>,
    default_error: Option<String>,
    delay: Option<Duration>,
    calls: Arc<AtomicU32>
}

impl ScriptedProvider {
    /// Plays back `script` in order, then fails `Transient` when exhausted.
    pub fn script(script: Vec<Result<String, ProviderError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            fallback: None,
            default_error: None,
            delay: None,
            calls: Arc::new(AtomicU32::new(0))
        }
    }

    /// Always answers `text`.
    pub fn always(text: impl Into<String>) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback: Some(text.into()),
            default_error: None,
            delay: None,
            calls: Arc::new(AtomicU32::new(0))
        }
    }

    /// Always fails with a transient error.
    pub fn always_transient(reason: impl Into<String>) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback: None,
            default_error: Some(reason.into()),
            delay: None,
            calls: Arc::new(AtomicU32::new(0))
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProviderClient for ScriptedProvider {
    async fn call(&self, request: &ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let next = self.script.lock().await.pop_front();
        let text = match next {
            Some(Ok(text)) => text,
            Some(Err(err)) => return Err(err),
            None => match (&self.fallback, &self.default_error) {
                (Some(text), _) => text.clone(),
                (None, Some(reason)) => {
                    return Err(ProviderError::Transient {
                        reason: reason.clone()
                    });
                }
                (None, None) => {
                    return Err(ProviderError::Transient {
                        reason: "script exhausted".to_string()
                    });
                }
            }
        };

        Ok(ProviderResponse {
            metadata: ProviderMetadata {
                model: request.model.clone(),
                prompt_tokens: (request.system_prompt.len() + request.user_prompt.len()) as u64 / 4,
                completion_tokens: text.len() as u64 / 4,
                latency_ms: self.delay.map_or(1, |d| d.as_millis() as u64)
            },
            text
        })
    }
}
