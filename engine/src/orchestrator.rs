//! The request state machine.
//!
//! Sequences: intent resolution → context fetch → prompt assembly → cache
//! lookup → provider call (with retry) → response validation → optional
//! analysis dispatch → context update → structured result emission.
//!
//! Safe under concurrent invocation: sessions serialize through the
//! context store, and concurrent requests sharing a fingerprint join the
//! same in-flight provider call instead of issuing a second one.

use std::sync::Arc;
use std::time::{Duration, Instant};

use ao_core::types::{
    AnalysisRequest, AnalysisResult, AnalysisStatus, Fingerprint, Role, SessionId, Turn
};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde_json::{Map, Value, json};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::cache::ResponseCache;
use crate::context::{ContextStore, hash_slice};
use crate::error::{EngineError, EngineResult};
use crate::prompt::{INSIGHT_INTENT, PromptAssembler};
use crate::provider::RetryingClient;
use crate::registry::AnalysisRegistry;
use crate::telemetry::EngineTelemetry;
use crate::validate::{DataOperation, validate};

/// Lifecycle of one request, traced at every transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
    Received,
    ContextLoaded,
    PromptBuilt,
    CacheChecked,
    ProviderPending,
    CacheHit,
    Validated,
    AnalysisDispatched,
    Skipped,
    ContextUpdated,
    Completed,
    Failed
}

type SharedOutcome = Result<AnalysisResult, EngineError>;

pub struct Orchestrator {
    assembler: PromptAssembler,
    registry: Arc<AnalysisRegistry>,
    cache: Arc<ResponseCache>,
    context: Arc<ContextStore>,
    provider: RetryingClient,
    in_flight: DashMap<Fingerprint, broadcast::Sender<SharedOutcome>>,
    telemetry: Arc<EngineTelemetry>,
    request_timeout: Duration,
    context_window: usize
}

impl Orchestrator {
    pub fn new(
        assembler: PromptAssembler,
        registry: Arc<AnalysisRegistry>,
        cache: Arc<ResponseCache>,
        context: Arc<ContextStore>,
        provider: RetryingClient,
        telemetry: Arc<EngineTelemetry>,
        request_timeout: Duration,
        context_window: usize
    ) -> Self {
        Self {
            assembler,
            registry,
            cache,
            context,
            provider,
            in_flight: DashMap::new(),
            telemetry,
            request_timeout,
            context_window
        }
    }

    /// The single inbound operation: run one analysis or conversational
    /// request to completion and return its structured result.
    pub async fn submit_request(
        self: &Arc<Self>,
        session_id: SessionId,
        intent_or_text: &str,
        parameters: Map<String, Value>
    ) -> EngineResult<AnalysisResult> {
        let started = Instant::now();
        let mut state = RequestState::Received;

        let (intent, parameters, user_text) = self.resolve_intent(intent_or_text, parameters);
        let request = AnalysisRequest::new(session_id.clone(), intent, parameters);

        let outcome = self.run(&request, &mut state).await;

        // Context update happens for success and for user-visible failure
        // alike, so the conversation reflects what was attempted.
        self.record_outcome(&session_id, &user_text, &outcome).await;
        transition(&mut state, RequestState::ContextUpdated, None);

        match &outcome {
            Ok(result) => {
                transition(&mut state, RequestState::Completed, None);
                self.telemetry
                    .record_request(result.status, started.elapsed().as_millis() as f64);
                info!(
                    session_id = %session_id,
                    intent = %request.intent,
                    status = %result.status,
                    "Request completed"
                );
            }
            Err(err) => {
                transition(&mut state, RequestState::Failed, None);
                self.telemetry.record_request_failure(err.kind());
                self.telemetry
                    .record_request(AnalysisStatus::Failed, started.elapsed().as_millis() as f64);
                warn!(
                    session_id = %session_id,
                    intent = %request.intent,
                    error = %err,
                    "Request failed"
                );
            }
        }

        outcome
    }

    async fn run(
        self: &Arc<Self>,
        request: &AnalysisRequest,
        state: &mut RequestState
    ) -> SharedOutcome {
        let context = self.context.read(&request.session_id, self.context_window).await;
        let fingerprint = request.fingerprint(&hash_slice(&context));
        transition(state, RequestState::ContextLoaded, Some(&fingerprint));

        // Fail fast: an unassemblable request never spends a provider call.
        let provider_request =
            self.assembler.build(&request.intent, &request.parameters, &context)?;
        transition(state, RequestState::PromptBuilt, Some(&fingerprint));

        let cacheable = self.registry.is_cacheable(&request.intent);
        transition(state, RequestState::CacheChecked, Some(&fingerprint));
        if cacheable {
            if let Some(cached) = self.cache.get(&fingerprint).await {
                if cached.is_failed() {
                    // Negative-cache window: suppress the repeat without a
                    // provider call, but never beyond the window.
                    return Err(EngineError::NegativeCacheHit {
                        message: cached
                            .error
                            .unwrap_or_else(|| "the previous identical request failed".to_string())
                    });
                }
                transition(state, RequestState::CacheHit, Some(&fingerprint));
                return Ok(cached);
            }
        }

        // De-duplication: one in-flight provider call per fingerprint; a
        // second request attaches as a waiter and receives the same result.
        let mut receiver = match self.in_flight.entry(fingerprint.clone()) {
            Entry::Occupied(occupied) => {
                self.telemetry.record_dedup_join();
                debug!(fingerprint = %fingerprint, "Joining in-flight request");
                occupied.get().subscribe()
            }
            Entry::Vacant(vacant) => {
                let (tx, rx) = broadcast::channel(1);
                vacant.insert(tx.clone());
                transition(state, RequestState::ProviderPending, Some(&fingerprint));

                let orchestrator = Arc::clone(self);
                let request = request.clone();
                let fp = fingerprint.clone();
                // The call itself runs detached from this caller: a request
                // timeout cancels the wait below, not the shared attempt
                // other waiters depend on.
                tokio::spawn(async move {
                    orchestrator
                        .execute_and_publish(request, provider_request, fp, cacheable, tx)
                        .await;
                });
                rx
            }
        };

        match tokio::time::timeout(self.request_timeout, receiver.recv()).await {
            Ok(Ok(outcome)) => {
                if let Ok(result) = &outcome {
                    transition(state, RequestState::Validated, Some(&fingerprint));
                    let next = if result.payload.get("analysis_intent").is_some() {
                        RequestState::AnalysisDispatched
                    } else {
                        RequestState::Skipped
                    };
                    transition(state, next, Some(&fingerprint));
                }
                outcome
            }
            Ok(Err(_closed)) => Err(EngineError::InFlightAbandoned),
            Err(_elapsed) => Err(EngineError::RequestTimeout {
                seconds: self.request_timeout.as_secs()
            })
        }
    }

    /// Leader half of the de-duplicated call: provider → validation →
    /// optional dispatch → cache write → fan-out. Runs detached so caller
    /// timeouts never abort it for the other waiters.
    async fn execute_and_publish(
        self: Arc<Self>,
        request: AnalysisRequest,
        provider_request: ao_core::types::ProviderRequest,
        fingerprint: Fingerprint,
        cacheable: bool,
        tx: broadcast::Sender<SharedOutcome>
    ) {
        // A near-simultaneous leader may have just resolved and cached the
        // same fingerprint; prefer its result over a fresh call.
        let outcome = match self.cache_recheck(&fingerprint, cacheable).await {
            Some(result) => Ok(result),
            None => self.execute(&request, &provider_request).await
        };

        if cacheable {
            let to_cache = match &outcome {
                Ok(result) => result.clone(),
                Err(err) => AnalysisResult::failed(err.user_message())
            };
            self.cache.put(fingerprint.clone(), to_cache).await;
        }

        // Remove before fan-out: any caller arriving now goes to the cache
        // instead of a sender that will never fire again.
        self.in_flight.remove(&fingerprint);
        let _ = tx.send(outcome);
    }

    async fn cache_recheck(
        &self,
        fingerprint: &Fingerprint,
        cacheable: bool
    ) -> Option<AnalysisResult> {
        if !cacheable {
            return None;
        }
        self.cache
            .get(fingerprint)
            .await
            .filter(|cached| !cached.is_failed())
    }

    async fn execute(
        &self,
        request: &AnalysisRequest,
        provider_request: &ao_core::types::ProviderRequest
    ) -> SharedOutcome {
        let (response, attempts) = self.provider.call(provider_request).await?;
        debug!(
            intent = %request.intent,
            attempts = attempts.len(),
            "Provider call resolved"
        );

        let schema = self
            .assembler
            .template(&request.intent)
            .map(|t| t.output.clone())
            .ok_or_else(|| EngineError::UnknownIntent {
                intent: request.intent.clone()
            })?;
        let validated = validate(&schema, &response)?;

        // Dispatch when the validated response names a registered data
        // operation, or when the requested intent itself is registered.
        // Anything else is a conversational turn, not an error.
        let operation = validated
            .data_operation
            .filter(|op| self.registry.contains(&op.name))
            .or_else(|| {
                self.registry.contains(&request.intent).then(|| DataOperation {
                    name: request.intent.clone(),
                    parameters: request.parameters.clone()
                })
            });

        let payload = match operation {
            Some(op) => {
                self.telemetry.record_analysis_dispatch(&op.name);
                let analysis = self.registry.invoke(&op.name, &op.parameters).await?;
                json!({
                    "insight": validated.payload,
                    "analysis": analysis,
                    "analysis_intent": op.name
                })
            }
            None => validated.payload
        };

        Ok(AnalysisResult::success(payload, Some(response.metadata)))
    }

    /// Free text becomes a conversational request against the insight
    /// template; a registered or templated name is used as-is.
    fn resolve_intent(
        &self,
        intent_or_text: &str,
        mut parameters: Map<String, Value>
    ) -> (String, Map<String, Value>, String) {
        if self.assembler.is_known(intent_or_text) || self.registry.contains(intent_or_text) {
            let user_text = format!("Run analysis: {intent_or_text}");
            return (intent_or_text.to_string(), parameters, user_text);
        }

        parameters.insert(
            "instruction".to_string(),
            Value::String(intent_or_text.to_string())
        );
        (
            INSIGHT_INTENT.to_string(),
            parameters,
            intent_or_text.to_string()
        )
    }

    async fn record_outcome(
        &self,
        session_id: &SessionId,
        user_text: &str,
        outcome: &SharedOutcome
    ) {
        self.context
            .append(session_id, Turn::new(Role::User, user_text))
            .await;

        let assistant_turn = match outcome {
            Ok(result) => {
                let content = result
                    .payload
                    .get("insight")
                    .and_then(|v| v.get("summary"))
                    .or_else(|| result.payload.get("summary"))
                    .and_then(Value::as_str)
                    .unwrap_or("Analysis complete.")
                    .to_string();
                Turn::new(Role::Assistant, content).with_result(result.clone())
            }
            Err(err) => Turn::new(Role::Assistant, err.user_message())
        };
        self.context.append(session_id, assistant_turn).await;
        self.telemetry.record_session_count(self.context.session_count());
    }
}

fn transition(state: &mut RequestState, next: RequestState, fingerprint: Option<&Fingerprint>) {
    debug!(
        from = ?*state,
        to = ?next,
        fingerprint = fingerprint.map(|f| f.as_str()).unwrap_or(""),
        "State transition"
    );
    *state = next;
}
