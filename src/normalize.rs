//! Normalization of retrieved payloads into extraction items.
//!
//! The service may hand back a JSON array, a single JSON value, a JSON
//! document encoded as a string, or free text. Every shape maps onto a
//! non-empty list of [`StructuredItem`]s; anything that does not parse
//! becomes a single [`StructuredItem::Fallback`]. This never fails.

use serde_json::Value;

use crate::models::{StructuredItem, NO_DATA_PLACEHOLDER};

/// Turn a retrieved `value` into items. The result is never empty.
pub fn normalize_payload(value: Option<&Value>) -> Vec<StructuredItem> {
    match value {
        None | Some(Value::Null) => vec![StructuredItem::Fallback(NO_DATA_PLACEHOLDER.to_string())],
        Some(Value::String(text)) => normalize_text(text),
        Some(structured) => from_structured(structured.clone(), || structured.to_string()),
    }
}

/// Parse `text` as JSON, falling back to the raw text.
pub fn normalize_text(text: &str) -> Vec<StructuredItem> {
    if text.trim().is_empty() {
        return vec![StructuredItem::Fallback(NO_DATA_PLACEHOLDER.to_string())];
    }
    match serde_json::from_str::<Value>(text) {
        Ok(Value::Null) => vec![StructuredItem::Fallback(text.to_string())],
        Ok(parsed) => from_structured(parsed, || text.to_string()),
        Err(e) => {
            tracing::warn!(error = %e, "retrieved payload is not JSON; keeping raw text");
            vec![StructuredItem::Fallback(text.to_string())]
        }
    }
}

fn from_structured(value: Value, raw: impl FnOnce() -> String) -> Vec<StructuredItem> {
    match value {
        Value::Array(items) if items.is_empty() => vec![StructuredItem::Fallback(raw())],
        Value::Array(items) => items.into_iter().map(StructuredItem::Parsed).collect(),
        other => vec![StructuredItem::Parsed(other)],
    }
}
