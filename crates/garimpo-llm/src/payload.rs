//! Defensive parsing of LLM response payloads.

use garimpo_domain::{FieldRecord, ProviderError, Schema};
use serde_json::Value;
use tracing::warn;

/// Parse a provider payload into a field record restricted to `schema`.
///
/// Handles the usual provider quirks: markdown code fences around the JSON,
/// non-string scalars where a string was requested, and extra keys the
/// schema never asked for. A payload that is not a JSON object at all is a
/// [`ProviderError::Malformed`].
pub fn parse_record(payload: &str, schema: &Schema) -> Result<FieldRecord, ProviderError> {
    let stripped = strip_fences(payload);
    let value: Value = serde_json::from_str(stripped)
        .map_err(|e| ProviderError::Malformed(format!("payload is not JSON: {e}")))?;

    let object = value
        .as_object()
        .ok_or_else(|| ProviderError::Malformed("payload is not a JSON object".into()))?;

    let mut record = FieldRecord::new();
    for field in schema.fields() {
        let extracted = match object.get(field) {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => {
                let trimmed = s.trim();
                (!trimmed.is_empty()).then(|| trimmed.to_string())
            }
            Some(Value::Number(n)) => Some(n.to_string()),
            Some(Value::Bool(b)) => Some(b.to_string()),
            Some(other) => {
                warn!(field, "discarding non-scalar value: {other}");
                None
            }
        };
        record.set(field, extracted);
    }
    Ok(record)
}

/// Strip a surrounding markdown code fence, if present.
fn strip_fences(payload: &str) -> &str {
    let trimmed = payload.trim();
    if !trimmed.starts_with("```") {
        return trimmed;
    }
    let body = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    body.strip_suffix("```").unwrap_or(body).trim()
}
