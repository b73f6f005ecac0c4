//! Provider response validation.
//!
//! Raw provider text is parsed against the intent's declared output shape
//! at the boundary; a schema mismatch is `InvalidResponse` with the raw
//! text attached for diagnosis, never a silently coerced partial result.

use ao_core::types::{InsightPayload, ProviderResponse};
use serde_json::{Map, Value};

use crate::error::{EngineError, EngineResult};
use crate::prompt::OutputSchema;

/// A validated response: the schema-conforming payload plus the data
/// operation the model asked for, if any.
#[derive(Debug, Clone)]
pub struct ValidatedResponse {
    pub payload: Value,
    pub data_operation: Option<DataOperation>
}

#[derive(Debug, Clone)]
pub struct DataOperation {
    pub name: String,
    pub parameters: Map<String, Value>
}

pub fn validate(schema: &OutputSchema, response: &ProviderResponse) -> EngineResult<ValidatedResponse> {
    match schema {
        OutputSchema::Structured { required_fields } => {
            validate_structured(required_fields, &response.text)
        }
        OutputSchema::Insight => Ok(validate_insight(&response.text))
    }
}

fn validate_structured(required_fields: &[String], raw: &str) -> EngineResult<ValidatedResponse> {
    // Models wrap JSON in code fences often enough that stripping them is
    // part of the boundary, not a coercion.
    let stripped = strip_code_fence(raw);

    let value: Value =
        serde_json::from_str(stripped).map_err(|e| EngineError::InvalidResponse {
            reason: format!("not valid JSON: {e}"),
            raw: raw.to_string()
        })?;

    let object = value.as_object().ok_or_else(|| EngineError::InvalidResponse {
        reason: "expected a JSON object".to_string(),
        raw: raw.to_string()
    })?;

    for field in required_fields {
        if !object.contains_key(field) {
            return Err(EngineError::InvalidResponse {
                reason: format!("missing required field `{field}`"),
                raw: raw.to_string()
            });
        }
    }

    let data_operation = extract_data_operation(object, raw)?;

    Ok(ValidatedResponse {
        payload: value,
        data_operation
    })
}

fn extract_data_operation(
    object: &Map<String, Value>,
    raw: &str
) -> EngineResult<Option<DataOperation>> {
    let Some(op) = object.get("data_operation") else {
        return Ok(None);
    };
    if op.is_null() {
        return Ok(None);
    }

    let op = op.as_object().ok_or_else(|| EngineError::InvalidResponse {
        reason: "`data_operation` must be an object".to_string(),
        raw: raw.to_string()
    })?;
    let name = op
        .get("name")
        .and_then(Value::as_str)
        .ok_or_else(|| EngineError::InvalidResponse {
            reason: "`data_operation.name` must be a string".to_string(),
            raw: raw.to_string()
        })?;
    let parameters = match op.get("parameters") {
        Some(Value::Object(map)) => map.clone(),
        Some(Value::Null) | None => Map::new(),
        Some(_) => {
            return Err(EngineError::InvalidResponse {
                reason: "`data_operation.parameters` must be an object".to_string(),
                raw: raw.to_string()
            });
        }
    };

    Ok(Some(DataOperation {
        name: name.to_string(),
        parameters
    }))
}

/// Sectioned free text is folded into an [`InsightPayload`]: an overview
/// plus bulleted findings and recommendations. Unrecognized text becomes
/// the summary wholesale; conversational output is never an error.
fn validate_insight(raw: &str) -> ValidatedResponse {
    let mut payload = InsightPayload::default();
    let mut matched_any = false;

    for section in raw.split("\n\n") {
        let section = section.trim();
        if section.is_empty() {
            continue;
        }
        let mut lines = section.lines();
        let heading = lines.next().unwrap_or("").to_lowercase();

        if heading.contains("overview") || heading.contains("summary") {
            payload.summary = lines.collect::<Vec<_>>().join("\n").trim().to_string();
            if payload.summary.is_empty() {
                // Single-line section: the heading line carries the text.
                payload.summary = strip_heading(section);
            }
            matched_any = true;
        } else if heading.contains("finding") {
            payload.findings = collect_bullets(lines);
            matched_any = true;
        } else if heading.contains("recommend") {
            payload.recommendations = collect_bullets(lines);
            matched_any = true;
        }
    }

    if !matched_any {
        payload.summary = raw.trim().to_string();
    }

    ValidatedResponse {
        payload: serde_json::to_value(&payload).unwrap_or(Value::Null),
        data_operation: None
    }
}

fn collect_bullets<'a>(lines: impl Iterator<Item = &'a str>) -> Vec<String> {
    lines
        .map(|line| {
            line.trim()
                .trim_start_matches(['-', '*', '•'])
                .trim_start_matches(|c: char| c.is_ascii_digit() || c == '.' || c == ')')
                .trim()
                .to_string()
        })
        .filter(|line| !line.is_empty())
        .collect()
}

fn strip_heading(section: &str) -> String {
    section
        .split_once(':')
        .map(|(_, rest)| rest.trim().to_string())
        .unwrap_or_else(|| section.to_string())
}

fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.trim_start_matches('\n')
        .strip_suffix("```")
        .map(str::trim)
        .unwrap_or(trimmed)
}
