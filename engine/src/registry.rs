//! Typed dispatch table for pluggable analysis functions.
//!
//! The registry owns no algorithmic logic. Each entry pairs a declared
//! parameter schema with a callable; parameters are validated before
//! invocation and any failure from the underlying function is wrapped,
//! preserving the original cause.

use std::collections::HashMap;
use std::sync::Arc;

use ao_core::traits::AnalysisFunction;
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::{EngineError, EngineResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    String,
    Number,
    Bool,
    Array,
    Object
}

impl ParamKind {
    fn matches(self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Number => value.is_number(),
            Self::Bool => value.is_boolean(),
            Self::Array => value.is_array(),
            Self::Object => value.is_object()
        }
    }

    fn name(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Bool => "bool",
            Self::Array => "array",
            Self::Object => "object"
        }
    }
}

#[derive(Debug, Clone)]
pub struct ParamSpec {
    pub name: String,
    pub kind: ParamKind,
    pub required: bool
}

impl ParamSpec {
    pub fn required(name: impl Into<String>, kind: ParamKind) -> Self {
        Self {
            name: name.into(),
            kind,
            required: true
        }
    }

    pub fn optional(name: impl Into<String>, kind: ParamKind) -> Self {
        Self {
            name: name.into(),
            kind,
            required: false
        }
    }
}

/// Declared input schema plus cacheability of one intent.
#[derive(Debug, Clone)]
pub struct IntentSchema {
    pub params: Vec<ParamSpec>,
    /// Intents with side effects are marked non-cacheable and always miss
    /// the response cache by design.
    pub cacheable: bool
}

impl IntentSchema {
    pub fn new(params: Vec<ParamSpec>) -> Self {
        Self {
            params,
            cacheable: true
        }
    }

    pub fn non_cacheable(mut self) -> Self {
        self.cacheable = false;
        self
    }

    fn validate(&self, intent: &str, parameters: &Map<String, Value>) -> EngineResult<()> {
        for spec in &self.params {
            match parameters.get(&spec.name) {
                Some(value) => {
                    if !spec.kind.matches(value) {
                        return Err(EngineError::InvalidParameters {
                            intent: intent.to_string(),
                            reason: format!(
                                "parameter '{}' must be a {}",
                                spec.name,
                                spec.kind.name()
                            )
                        });
                    }
                }
                None if spec.required => {
                    return Err(EngineError::InvalidParameters {
                        intent: intent.to_string(),
                        reason: format!("missing required parameter '{}'", spec.name)
                    });
                }
                None => {}
            }
        }
        Ok(())
    }
}

struct Entry {
    schema: IntentSchema,
    function: Arc<dyn AnalysisFunction>
}

#[derive(Default)]
pub struct AnalysisRegistry {
    entries: HashMap<String, Entry>
}

impl AnalysisRegistry {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new()
        }
    }

    pub fn register(
        &mut self,
        intent: impl Into<String>,
        schema: IntentSchema,
        function: Arc<dyn AnalysisFunction>
    ) {
        self.entries.insert(intent.into(), Entry { schema, function });
    }

    pub fn contains(&self, intent: &str) -> bool {
        self.entries.contains_key(intent)
    }

    pub fn schema(&self, intent: &str) -> Option<&IntentSchema> {
        self.entries.get(intent).map(|e| &e.schema)
    }

    pub fn is_cacheable(&self, intent: &str) -> bool {
        self.entries.get(intent).map_or(true, |e| e.schema.cacheable)
    }

    pub fn intents(&self) -> Vec<&str> {
        self.entries.keys().map(String::as_str).collect()
    }

    /// Validates `parameters` against the intent's schema, then invokes the
    /// function. Function failures come back as `AnalysisExecutionError`
    /// with the cause chain preserved in the message.
    pub async fn invoke(
        &self,
        intent: &str,
        parameters: &Map<String, Value>
    ) -> EngineResult<Value> {
        let entry = self
            .entries
            .get(intent)
            .ok_or_else(|| EngineError::UnknownIntent {
                intent: intent.to_string()
            })?;

        entry.schema.validate(intent, parameters)?;
        debug!(intent = intent, "Dispatching analysis function");

        entry
            .function
            .run(parameters)
            .await
            .map_err(|e| EngineError::AnalysisExecutionError {
                intent: intent.to_string(),
                cause: format!("{e:#}")
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;

    struct Echo;

    #[async_trait]
    impl AnalysisFunction for Echo {
        async fn run(&self, params: &Map<String, Value>) -> anyhow::Result<Value> {
            Ok(Value::Object(params.clone()))
        }
    }

    struct Explodes;

    #[async_trait]
    impl AnalysisFunction for Explodes {
        async fn run(&self, _params: &Map<String, Value>) -> anyhow::Result<Value> {
            Err(anyhow::anyhow!("division by zero").context("computing ratio"))
        }
    }

    fn registry() -> AnalysisRegistry {
        let mut registry = AnalysisRegistry::new();
        registry.register(
            "echo",
            IntentSchema::new(vec![
                ParamSpec::required("columns", ParamKind::Array),
                ParamSpec::optional("limit", ParamKind::Number),
            ]),
            Arc::new(Echo)
        );
        registry.register("explodes", IntentSchema::new(vec![]), Arc::new(Explodes));
        registry
    }

    fn params(pairs: &[(&str, Value)]) -> Map<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), v.clone()))
            .collect()
    }

    #[tokio::test]
    async fn invokes_with_valid_parameters() {
        let registry = registry();
        let result = registry
            .invoke("echo", &params(&[("columns", json!(["x", "y"]))]))
            .await
            .unwrap();
        assert_eq!(result["columns"], json!(["x", "y"]));
    }

    #[tokio::test]
    async fn missing_required_parameter_is_rejected_before_invocation() {
        let registry = registry();
        let err = registry.invoke("echo", &Map::new()).await.unwrap_err();
        match err {
            EngineError::InvalidParameters { reason, .. } => {
                assert!(reason.contains("columns"));
            }
            other => panic!("expected InvalidParameters, got {other}")
        }
    }

    #[tokio::test]
    async fn wrong_parameter_kind_is_rejected() {
        let registry = registry();
        let err = registry
            .invoke("echo", &params(&[("columns", json!("not-an-array"))]))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidParameters { .. }));
    }

    #[tokio::test]
    async fn function_failure_preserves_cause() {
        let registry = registry();
        let err = registry.invoke("explodes", &Map::new()).await.unwrap_err();
        match err {
            EngineError::AnalysisExecutionError { intent, cause } => {
                assert_eq!(intent, "explodes");
                assert!(cause.contains("division by zero"));
                assert!(cause.contains("computing ratio"));
            }
            other => panic!("expected AnalysisExecutionError, got {other}")
        }
    }

    #[tokio::test]
    async fn unknown_intent_is_reported() {
        let registry = registry();
        let err = registry.invoke("nope", &Map::new()).await.unwrap_err();
        assert!(matches!(err, EngineError::UnknownIntent { .. }));
    }

    #[test]
    fn cacheability_defaults_to_true_and_can_be_disabled() {
        let mut registry = registry();
        assert!(registry.is_cacheable("echo"));
        registry.register(
            "export",
            IntentSchema::new(vec![]).non_cacheable(),
            Arc::new(Echo)
        );
        assert!(!registry.is_cacheable("export"));
    }
}
