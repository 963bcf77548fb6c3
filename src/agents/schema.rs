//! Structural validation of language-model responses
//!
//! Model responses are JSON, possibly wrapped in fenced markdown. Validation
//! is a field-presence check against each agent's fixed shape; anything
//! deeper is the agent's own concern.

use serde_json::Value;

use crate::error::{EngineError, EngineResult};

/// Extract the JSON payload from a model response.
///
/// Accepts bare JSON, a fenced ```json block, or JSON embedded in prose (the
/// outermost object is taken).
pub fn extract_json(agent: &str, text: &str) -> EngineResult<Value> {
    let trimmed = text.trim();

    let candidate = if let Some(fenced) = strip_fence(trimmed) {
        fenced
    } else if trimmed.starts_with('{') {
        trimmed.to_string()
    } else {
        match (trimmed.find('{'), trimmed.rfind('}')) {
            (Some(open), Some(close)) if close > open => trimmed[open..=close].to_string(),
            _ => {
                return Err(EngineError::AgentSchema {
                    agent: agent.to_string(),
                    reason: "response contains no JSON object".into(),
                })
            }
        }
    };

    serde_json::from_str(&candidate).map_err(|e| EngineError::AgentSchema {
        agent: agent.to_string(),
        reason: format!("invalid JSON: {}", e),
    })
}

fn strip_fence(text: &str) -> Option<String> {
    let rest = text
        .strip_prefix("```json")
        .or_else(|| text.strip_prefix("```"))?;
    let end = rest.rfind("```")?;
    Some(rest[..end].trim().to_string())
}

/// Check that every named top-level field is present
pub fn require_fields(agent: &str, value: &Value, fields: &[&str]) -> EngineResult<()> {
    let object = value.as_object().ok_or_else(|| EngineError::AgentSchema {
        agent: agent.to_string(),
        reason: "response is not a JSON object".into(),
    })?;
    for field in fields {
        if !object.contains_key(*field) {
            return Err(EngineError::AgentSchema {
                agent: agent.to_string(),
                reason: format!("missing field '{}'", field),
            });
        }
    }
    Ok(())
}

/// Extract, check fields, then deserialize into the agent's output type
pub fn parse_validated<T: serde::de::DeserializeOwned>(
    agent: &str,
    text: &str,
    fields: &[&str],
) -> EngineResult<T> {
    let value = extract_json(agent, text)?;
    require_fields(agent, &value, fields)?;
    serde_json::from_value(value).map_err(|e| EngineError::AgentSchema {
        agent: agent.to_string(),
        reason: format!("shape mismatch: {}", e),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_json_parses() {
        let value = extract_json("test", r#"{"a": 1}"#).unwrap();
        assert_eq!(value["a"], 1);
    }

    #[test]
    fn fenced_json_parses() {
        let text = "```json\n{\"healthScore\": 88}\n```";
        let value = extract_json("test", text).unwrap();
        assert_eq!(value["healthScore"], 88);
    }

    #[test]
    fn json_embedded_in_prose_parses() {
        let text = "Here is the assessment:\n{\"grade\": \"B\"}\nLet me know.";
        let value = extract_json("test", text).unwrap();
        assert_eq!(value["grade"], "B");
    }

    #[test]
    fn missing_field_is_a_schema_error() {
        let value = extract_json("test", r#"{"grade": "A"}"#).unwrap();
        let err = require_fields("test", &value, &["grade", "score"]).unwrap_err();
        assert!(matches!(err, EngineError::AgentSchema { .. }));
        assert!(!err.is_retryable());
    }

    #[test]
    fn non_json_rejected() {
        assert!(extract_json("test", "I could not produce an answer").is_err());
    }
}
