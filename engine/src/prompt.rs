//! Prompt assembly.
//!
//! Builds a provider request from an intent's template, the request
//! parameters, and the visible context window. Assembly is deterministic:
//! the same inputs always render the byte-identical request, which the
//! fingerprint invariant depends on. Unknown intents fail here, before
//! any provider call is spent.

use std::collections::{BTreeMap, HashMap};

use ao_core::types::{ProviderRequest, Turn};
use config::PromptConfig;
use serde_json::{Map, Value};

use crate::error::{EngineError, EngineResult};

/// The conversational fallback intent for free-text requests.
pub const INSIGHT_INTENT: &str = "insight";

/// How a template expects the provider to answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputSchema {
    /// Strict JSON object with these fields present.
    Structured { required_fields: Vec<String> },
    /// Sectioned prose: analysis overview, key findings, recommended
    /// actions.
    Insight
}

#[derive(Debug, Clone)]
pub struct PromptTemplate {
    pub system: String,
    pub instruction: String,
    pub output: OutputSchema
}

pub struct PromptAssembler {
    templates: HashMap<String, PromptTemplate>,
    config: PromptConfig,
    model: String
}

impl PromptAssembler {
    pub fn new(model: impl Into<String>, config: PromptConfig) -> Self {
        let mut assembler = Self {
            templates: HashMap::new(),
            config,
            model: model.into()
        };
        for (name, template) in builtin_templates() {
            assembler.templates.insert(name, template);
        }
        assembler
    }

    /// Registers (or replaces) a template for an intent.
    pub fn register_template(&mut self, intent: impl Into<String>, template: PromptTemplate) {
        self.templates.insert(intent.into(), template);
    }

    pub fn is_known(&self, intent: &str) -> bool {
        self.templates.contains_key(intent)
    }

    pub fn template(&self, intent: &str) -> Option<&PromptTemplate> {
        self.templates.get(intent)
    }

    /// Builds the provider request for an intent. Fails fast with
    /// `UnknownIntent` when no template exists and with
    /// `InvalidParameters` when a free-text instruction fails screening.
    pub fn build(
        &self,
        intent: &str,
        parameters: &Map<String, Value>,
        context: &[Turn]
    ) -> EngineResult<ProviderRequest> {
        let template = self
            .templates
            .get(intent)
            .ok_or_else(|| EngineError::UnknownIntent {
                intent: intent.to_string()
            })?;

        if let Some(Value::String(instruction)) = parameters.get("instruction") {
            self.screen_instruction(intent, instruction)?;
        }

        let mut user_prompt = String::new();
        user_prompt.push_str(&template.instruction);
        user_prompt.push_str("\n\n");

        let data: BTreeMap<&str, &Value> = parameters
            .iter()
            .filter(|(k, _)| k.as_str() != "instruction")
            .map(|(k, v)| (k.as_str(), v))
            .collect();
        if !data.is_empty() {
            user_prompt.push_str("Data:\n");
            // BTreeMap gives stable key order; required for determinism.
            user_prompt.push_str(
                &serde_json::to_string_pretty(&data).unwrap_or_else(|_| String::from("{}"))
            );
            user_prompt.push_str("\n\n");
        }

        if let Some(Value::String(instruction)) = parameters.get("instruction") {
            user_prompt.push_str("Focus of the analysis:\n");
            user_prompt.push_str(instruction);
            user_prompt.push_str("\n\n");
        }

        if !context.is_empty() {
            user_prompt.push_str("Conversation so far:\n");
            for turn in context {
                user_prompt.push_str(&format!("{}: {}\n", turn.role, turn.content));
            }
            user_prompt.push('\n');
        }

        match &template.output {
            OutputSchema::Structured { required_fields } => {
                user_prompt.push_str(&format!(
                    "Respond with a single JSON object containing the fields: {}. \
                     If a data operation should be run, include a \"data_operation\" object \
                     with \"name\" and \"parameters\".",
                    required_fields.join(", ")
                ));
            }
            OutputSchema::Insight => {
                user_prompt.push_str(
                    "Respond in three sections separated by blank lines:\n\
                     1. Analysis overview\n\
                     2. Key findings (bulleted)\n\
                     3. Recommended actions (bulleted)"
                );
            }
        }

        Ok(ProviderRequest {
            model: self.model.clone(),
            system_prompt: template.system.clone(),
            user_prompt
        })
    }

    fn screen_instruction(&self, intent: &str, instruction: &str) -> EngineResult<()> {
        if instruction.len() < self.config.min_instruction_length {
            return Err(EngineError::InvalidParameters {
                intent: intent.to_string(),
                reason: format!(
                    "instruction is too short (minimum {} characters)",
                    self.config.min_instruction_length
                )
            });
        }
        let lowered = instruction.to_lowercase();
        for term in &self.config.forbidden_terms {
            if lowered.contains(&term.to_lowercase()) {
                return Err(EngineError::InvalidParameters {
                    intent: intent.to_string(),
                    reason: format!("instruction contains a forbidden term: {term}")
                });
            }
        }
        Ok(())
    }
}

fn builtin_templates() -> Vec<(String, PromptTemplate)> {
    let analyst_system = "You are a data analysis engine. You evaluate tabular business data \
                          and answer precisely, without speculation."
        .to_string();

    vec![
        (
            "correlation".to_string(),
            PromptTemplate {
                system: analyst_system.clone(),
                instruction: "Assess the relationship between the given columns and what it \
                              implies for the business."
                    .to_string(),
                output: OutputSchema::Structured {
                    required_fields: vec!["summary".to_string(), "strength".to_string()]
                }
            }
        ),
        (
            "trend".to_string(),
            PromptTemplate {
                system: analyst_system.clone(),
                instruction: "Describe the trend over the given period, notable turning points, \
                              and likely drivers."
                    .to_string(),
                output: OutputSchema::Structured {
                    required_fields: vec!["summary".to_string(), "direction".to_string()]
                }
            }
        ),
        (
            "seasonality".to_string(),
            PromptTemplate {
                system: analyst_system.clone(),
                instruction: "Identify seasonal patterns in the given series and countermeasures \
                              for weak periods."
                    .to_string(),
                output: OutputSchema::Structured {
                    required_fields: vec!["summary".to_string(), "peaks".to_string()]
                }
            }
        ),
        (
            "segmentation".to_string(),
            PromptTemplate {
                system: analyst_system.clone(),
                instruction: "Characterize the customer segments present in the data and a \
                              strategy for each."
                    .to_string(),
                output: OutputSchema::Structured {
                    required_fields: vec!["summary".to_string(), "segments".to_string()]
                }
            }
        ),
        (
            INSIGHT_INTENT.to_string(),
            PromptTemplate {
                system: analyst_system,
                instruction: "Analyze the following business data.".to_string(),
                output: OutputSchema::Insight
            }
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use ao_core::types::Role;
    use serde_json::json;

    fn assembler() -> PromptAssembler {
        PromptAssembler::new("gemini-pro", PromptConfig::default())
    }

    fn params(pairs: &[(&str, Value)]) -> Map<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn build_is_byte_deterministic() {
        let assembler = assembler();
        let p = params(&[("columns", json!(["x", "y"]))]);
        let context = vec![Turn::new(Role::User, "earlier question")];

        let a = assembler.build("correlation", &p, &context).unwrap();
        let b = assembler.build("correlation", &p, &context).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn parameter_order_does_not_change_the_request() {
        let assembler = assembler();
        let mut forward = Map::new();
        forward.insert("a".to_string(), json!(1));
        forward.insert("b".to_string(), json!(2));
        let mut reverse = Map::new();
        reverse.insert("b".to_string(), json!(2));
        reverse.insert("a".to_string(), json!(1));

        let x = assembler.build("trend", &forward, &[]).unwrap();
        let y = assembler.build("trend", &reverse, &[]).unwrap();
        assert_eq!(x, y);
    }

    #[test]
    fn unknown_intent_fails_fast() {
        let assembler = assembler();
        let err = assembler.build("divination", &Map::new(), &[]).unwrap_err();
        assert!(matches!(err, EngineError::UnknownIntent { .. }));
    }

    #[test]
    fn short_instruction_is_rejected() {
        let assembler = assembler();
        let p = params(&[("instruction", json!("too short"))]);
        let err = assembler.build(INSIGHT_INTENT, &p, &[]).unwrap_err();
        assert!(matches!(err, EngineError::InvalidParameters { .. }));
    }

    #[test]
    fn forbidden_terms_are_rejected() {
        let assembler = assembler();
        let p = params(&[(
            "instruction",
            json!("please include every customer password in the report")
        )]);
        let err = assembler.build(INSIGHT_INTENT, &p, &[]).unwrap_err();
        assert!(matches!(err, EngineError::InvalidParameters { .. }));
    }

    #[test]
    fn context_turns_are_rendered_in_order() {
        let assembler = assembler();
        let context = vec![
            Turn::new(Role::User, "first"),
            Turn::new(Role::Assistant, "second"),
        ];
        let request = assembler.build(INSIGHT_INTENT, &Map::new(), &context).unwrap();
        let first = request.user_prompt.find("user: first").unwrap();
        let second = request.user_prompt.find("assistant: second").unwrap();
        assert!(first < second);
    }

    #[test]
    fn custom_templates_can_be_registered() {
        let mut assembler = assembler();
        assembler.register_template(
            "forecast",
            PromptTemplate {
                system: "s".to_string(),
                instruction: "i".to_string(),
                output: OutputSchema::Insight
            }
        );
        assert!(assembler.is_known("forecast"));
        assert!(assembler.build("forecast", &Map::new(), &[]).is_ok());
    }
}
