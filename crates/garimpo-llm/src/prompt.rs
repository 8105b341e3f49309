//! Prompt construction for the extraction operations.

use garimpo_domain::{FieldRecord, Schema};
use serde_json::{json, Map, Value};

/// System message shared by both operations
pub const SYSTEM_PROMPT: &str =
    "You are a precise document data extractor. Respond with valid JSON only.";

/// Truncate `text` to at most `max_chars` characters on a char boundary.
pub fn truncate(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

fn schema_json(schema: &Schema) -> Value {
    let mut map = Map::new();
    for (field, description) in schema.iter() {
        map.insert(field.to_string(), Value::String(description.to_string()));
    }
    Value::Object(map)
}

fn skeleton_json(fields: impl Iterator<Item = impl Into<String>>) -> Value {
    let mut map = Map::new();
    for field in fields {
        map.insert(field.into(), Value::String("extracted_value_or_null".into()));
    }
    Value::Object(map)
}

/// Prompt for the full-document extraction pass.
pub fn extract_all(schema: &Schema, text: &str) -> String {
    format!(
        "Extract EXACTLY the specified fields from the document text.\n\
         \n\
         CRITICAL RULES:\n\
         1. If a field does not exist in the text, return null\n\
         2. Copy values EXACTLY as they appear (preserve formatting)\n\
         3. Do NOT invent, infer or complete information\n\
         4. Respond with a single JSON object holding the requested fields\n\
         \n\
         SCHEMA (fields to extract):\n{schema}\n\
         \n\
         DOCUMENT TEXT:\n{text}\n\
         \n\
         Respond with JSON in the shape:\n{skeleton}",
        schema = schema_json(schema),
        text = text,
        skeleton = skeleton_json(schema.fields()),
    )
}

/// Prompt for the missing-fields pass: only the partial record's null
/// fields are requested, the rest is given as context.
pub fn extract_missing(schema: &Schema, text: &str, partial: &FieldRecord) -> String {
    let missing: Schema = schema
        .iter()
        .filter(|&(field, _)| partial.is_null(field))
        .collect();

    let mut known = Map::new();
    for (field, value) in partial.iter() {
        if let Some(value) = value {
            known.insert(field.to_string(), Value::String(value.to_string()));
        }
    }

    format!(
        "Find ONLY the fields listed in MISSING_SCHEMA; the fields in \
         KNOWN_DATA were already extracted and must not be repeated.\n\
         \n\
         CRITICAL RULES:\n\
         1. If a field does not exist in the text, return null\n\
         2. Copy values EXACTLY as they appear (preserve formatting)\n\
         3. Do NOT invent, infer or complete information\n\
         4. Respond with a single JSON object holding only the missing fields\n\
         \n\
         MISSING_SCHEMA (what to find):\n{missing}\n\
         \n\
         KNOWN_DATA (context, do not repeat):\n{known}\n\
         \n\
         DOCUMENT TEXT:\n{text}\n\
         \n\
         Respond with JSON in the shape:\n{skeleton}",
        missing = schema_json(&missing),
        known = json!(known),
        text = text,
        skeleton = skeleton_json(missing.fields()),
    )
}
