//! Structured (JSON) output on top of a plain completion call.

use tracing::warn;

use crate::error::LlmError;

use super::provider::{ChatMessage, CompletionRequest, LlmProvider, ResponseFormat};

/// Max tokens for extraction replies; they are small JSON objects.
const STRUCTURED_MAX_TOKENS: u32 = 256;

/// Ask the model for a JSON object matching `format`.
///
/// Returns `Ok(None)` when the model answered but the reply is not a JSON
/// object. Transport and provider failures are returned as errors.
pub async fn structured_output(
    llm: &dyn LlmProvider,
    messages: Vec<ChatMessage>,
    format: ResponseFormat,
) -> Result<Option<serde_json::Map<String, serde_json::Value>>, LlmError> {
    let schema_name = format.name.clone();
    let request = CompletionRequest::new(messages)
        .with_temperature(0.0)
        .with_max_tokens(STRUCTURED_MAX_TOKENS)
        .with_response_format(format);

    let response = llm.complete(request).await?;
    let json_text = extract_json_object(&response.content);

    match serde_json::from_str::<serde_json::Value>(&json_text) {
        Ok(serde_json::Value::Object(map)) => Ok(Some(map)),
        Ok(other) => {
            warn!(schema = %schema_name, value = %other, "Structured output was not a JSON object");
            Ok(None)
        }
        Err(e) => {
            warn!(
                schema = %schema_name,
                error = %e,
                raw = %response.content,
                "Failed to parse structured output"
            );
            Ok(None)
        }
    }
}

/// Extract a JSON object from LLM output that might contain markdown or extra text.
pub fn extract_json_object(text: &str) -> String {
    let trimmed = text.trim();

    if trimmed.starts_with('{') {
        return trimmed.to_string();
    }

    if let Some(start) = trimmed.find("```json") {
        let after = &trimmed[start + 7..];
        if let Some(end) = after.find("```") {
            return after[..end].trim().to_string();
        }
    }

    if let Some(start) = trimmed.find("```") {
        let after = &trimmed[start + 3..];
        if let Some(end) = after.find("```") {
            let inner = after[..end].trim();
            if inner.starts_with('{') {
                return inner.to_string();
            }
        }
    }

    if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}'))
        && end > start
    {
        return trimmed[start..=end].to_string();
    }

    trimmed.to_string()
}
