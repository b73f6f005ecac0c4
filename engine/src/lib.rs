//! Analysis orchestration engine.
//!
//! Sits between conversational analysis requests and an LLM provider:
//! assembles deterministic prompts from per-session context, de-duplicates
//! and caches provider calls by content fingerprint, validates responses
//! against per-intent output schemas, and dispatches validated requests to
//! registered analysis functions.

pub mod cache;
pub mod context;
pub mod error;
pub mod functions;
pub mod orchestrator;
pub mod prompt;
pub mod provider;
pub mod registry;
pub mod telemetry;
pub mod validate;

use std::sync::Arc;

use ao_core::traits::{AnalysisFunction, ProviderClient};
use ao_core::types::{AnalysisResult, SessionId};
use config::{EngineConfig, ProviderKind, Validate};
use serde_json::{Map, Value};
use tokio::task::JoinHandle;

use crate::cache::ResponseCache;
use crate::context::ContextStore;
use crate::error::{EngineError, EngineResult};
use crate::orchestrator::Orchestrator;
use crate::prompt::{PromptAssembler, PromptTemplate};
use crate::provider::mock::ScriptedProvider;
use crate::provider::{RetryPolicy, RetryingClient, gemini::GeminiClient};
use crate::registry::{AnalysisRegistry, IntentSchema};
use crate::telemetry::EngineTelemetry;

/// Assembles an [`Engine`] from configuration plus registered analyses.
pub struct EngineBuilder {
    config: EngineConfig,
    registry: AnalysisRegistry,
    templates: Vec<(String, PromptTemplate)>,
    provider: Option<Arc<dyn ProviderClient>>
}

impl EngineBuilder {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            registry: AnalysisRegistry::new(),
            templates: Vec::new(),
            provider: None
        }
    }

    /// Registers an analysis function, optionally with a prompt template
    /// of its own. Without a template the intent dispatches only when a
    /// validated response names it as a data operation.
    pub fn register_analysis(
        mut self,
        intent: impl Into<String>,
        schema: IntentSchema,
        function: Arc<dyn AnalysisFunction>,
        template: Option<PromptTemplate>
    ) -> Self {
        let intent = intent.into();
        if let Some(template) = template {
            self.templates.push((intent.clone(), template));
        }
        self.registry.register(intent, schema, function);
        self
    }

    /// Registers the built-in statistical analyses under their
    /// conventional intent names.
    pub fn with_builtin_analyses(mut self) -> Self {
        functions::register_builtins(&mut self.registry);
        self
    }

    /// Overrides provider selection with an explicit client. Used by
    /// tests and by embedders with their own transport.
    pub fn with_provider(mut self, provider: Arc<dyn ProviderClient>) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn build(self) -> EngineResult<Engine> {
        self.config.validate().map_err(|e| EngineError::ConfigError {
            reason: e.to_string()
        })?;

        let telemetry = Arc::new(EngineTelemetry::new());

        let mut assembler =
            PromptAssembler::new(self.config.provider.model.clone(), self.config.prompt.clone());
        for (intent, template) in self.templates {
            assembler.register_template(intent, template);
        }

        let provider: Arc<dyn ProviderClient> = match self.provider {
            Some(provider) => provider,
            None => match self.config.provider.kind {
                ProviderKind::Gemini => Arc::new(GeminiClient::new(&self.config.provider)?),
                ProviderKind::Mock => Arc::new(ScriptedProvider::always(
                    "Analysis overview\nNo provider is configured; this is canned output.\n\n\
                     Key findings\n- Mock provider active\n\n\
                     Recommended actions\n- Configure a real provider"
                ))
            }
        };
        let provider = RetryingClient::new(
            provider,
            RetryPolicy::from_config(&self.config.retry),
            self.config.provider.attempt_timeout(),
            Arc::clone(&telemetry)
        );

        let cache = Arc::new(ResponseCache::new(
            self.config.cache.clone(),
            Arc::clone(&telemetry)
        ));
        let context = Arc::new(ContextStore::new(self.config.context.clone()));
        let context_window = self.config.context.max_turns;

        let orchestrator = Arc::new(Orchestrator::new(
            assembler,
            Arc::new(self.registry),
            Arc::clone(&cache),
            Arc::clone(&context),
            provider,
            telemetry,
            self.config.provider.request_timeout(),
            context_window
        ));

        Ok(Engine {
            orchestrator,
            cache,
            context
        })
    }
}

/// The assembled engine. Cheap to share; all state lives behind [`Arc`]s.
pub struct Engine {
    orchestrator: Arc<Orchestrator>,
    cache: Arc<ResponseCache>,
    context: Arc<ContextStore>
}

impl Engine {
    pub fn builder(config: EngineConfig) -> EngineBuilder {
        EngineBuilder::new(config)
    }

    /// Runs one request to completion. See
    /// [`Orchestrator::submit_request`].
    pub async fn submit_request(
        &self,
        session_id: SessionId,
        intent_or_text: &str,
        parameters: Map<String, Value>
    ) -> EngineResult<AnalysisResult> {
        self.orchestrator
            .submit_request(session_id, intent_or_text, parameters)
            .await
    }

    /// Spawns the periodic cache and session sweeps. The handles abort
    /// when dropped by the caller's runtime shutdown.
    pub fn start_background_tasks(&self) -> Vec<JoinHandle<()>> {
        vec![self.cache.start_sweeper(), self.context.start_sweeper()]
    }

    /// Read access to a session's recent history.
    pub async fn session_history(
        &self,
        session_id: &SessionId,
        window: usize
    ) -> Vec<ao_core::types::Turn> {
        self.context.read(session_id, window).await
    }

    pub fn active_sessions(&self) -> usize {
        self.context.session_count()
    }

    pub async fn cached_results(&self) -> usize {
        self.cache.len().await
    }
}
