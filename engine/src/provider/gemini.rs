//! Gemini REST adapter.
//!
//! Speaks the `generateContent` wire shape and classifies HTTP failures
//! into the shared provider taxonomy. Retry discipline lives in
//! [`super::RetryingClient`], not here.

use std::time::Instant;

use ao_core::traits::ProviderClient;
use ao_core::types::{ProviderError, ProviderMetadata, ProviderRequest, ProviderResponse};
use async_trait::async_trait;
use config::ProviderConfig;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{EngineError, EngineResult};

pub struct GeminiClient {
    client: Client,
    base_url: String,
    api_key: String
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    system_instruction: Content
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    parts: Vec<Part>
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    text: String
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    usage_metadata: Option<UsageMetadata>
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Content
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: u64,
    #[serde(default)]
    candidates_token_count: u64
}

impl GeminiClient {
    /// Builds a client from configuration, resolving the API key from the
    /// environment variable the configuration names.
    pub fn new(config: &ProviderConfig) -> EngineResult<Self> {
        let api_key =
            std::env::var(&config.api_key_env).map_err(|_| EngineError::ConfigError {
                reason: format!("{} is not set", config.api_key_env)
            })?;
        Self::with_key(config, api_key)
    }

    /// Builds a client with an explicit key and base URL; used by tests
    /// pointing at a local mock server.
    pub fn with_key(config: &ProviderConfig, api_key: String) -> EngineResult<Self> {
        let client = Client::builder()
            .timeout(config.attempt_timeout())
            .build()
            .map_err(|e| EngineError::ConfigError {
                reason: format!("failed to build HTTP client: {e}")
            })?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key
        })
    }

    fn endpoint(&self, model: &str) -> String {
        format!("{}/models/{}:generateContent", self.base_url, model)
    }
}

#[async_trait]
impl ProviderClient for GeminiClient {
    async fn call(&self, request: &ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let url = self.endpoint(&request.model);
        debug!(url = %url, "Calling Gemini generateContent");

        let body = GenerateContentRequest {
            contents: vec![Content {
                parts: vec![Part {
                    text: request.user_prompt.clone()
                }]
            }],
            system_instruction: Content {
                parts: vec![Part {
                    text: request.system_prompt.clone()
                }]
            }
        };

        let started = Instant::now();
        let response = self
            .client
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                // Connect failures and client-side timeouts are worth
                // another attempt; everything else here is malformed use.
                if e.is_timeout() || e.is_connect() || e.is_request() {
                    ProviderError::Transient {
                        reason: e.to_string()
                    }
                } else {
                    ProviderError::Fatal {
                        reason: e.to_string()
                    }
                }
            })?;
        let latency_ms = started.elapsed().as_millis() as u64;

        match response.status() {
            StatusCode::OK => {
                let parsed = response.json::<GenerateContentResponse>().await.map_err(|e| {
                    ProviderError::Transient {
                        reason: format!("unreadable response body: {e}")
                    }
                })?;

                let text = parsed
                    .candidates
                    .first()
                    .and_then(|c| c.content.parts.first())
                    .map(|p| p.text.clone())
                    .ok_or_else(|| ProviderError::Transient {
                        reason: "response contained no candidates".to_string()
                    })?;

                let usage = parsed.usage_metadata.unwrap_or_default();
                Ok(ProviderResponse {
                    text,
                    metadata: ProviderMetadata {
                        model: request.model.clone(),
                        prompt_tokens: usage.prompt_token_count,
                        completion_tokens: usage.candidates_token_count,
                        latency_ms
                    }
                })
            }
            StatusCode::TOO_MANY_REQUESTS => {
                let retry_after = response
                    .headers()
                    .get("retry-after")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|s| s.parse::<u64>().ok())
                    .unwrap_or(60);
                Err(ProviderError::RateLimited {
                    retry_after_seconds: retry_after
                })
            }
            StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                let detail = response.text().await.unwrap_or_default();
                Err(ProviderError::Fatal {
                    reason: format!("provider rejected the request: {detail}")
                })
            }
            status => {
                let detail = response.text().await.unwrap_or_default();
                Err(ProviderError::Transient {
                    reason: format!("unexpected status {}: {detail}", status.as_u16())
                })
            }
        }
    }
}
