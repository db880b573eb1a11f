//! Core data models used throughout the pipeline.
//!
//! These types represent the source files, remote requests, and extraction
//! records that flow from submission to export.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Placeholder content used when a retrieval yields nothing at all.
pub const NO_DATA_PLACEHOLDER: &str = "No data extracted";

/// A user-supplied document, already read into memory.
///
/// Binary formats are treated as opaque text; no format-specific parsing
/// happens in the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub name: String,
    pub size_bytes: u64,
    pub content: String,
}

impl SourceFile {
    pub fn new(name: impl Into<String>, content: impl Into<String>) -> Self {
        let content = content.into();
        Self {
            name: name.into(),
            size_bytes: content.len() as u64,
            content,
        }
    }

    /// Build a source file from raw bytes, decoding them as lossy UTF-8.
    pub fn from_bytes(name: impl Into<String>, bytes: &[u8]) -> Self {
        Self {
            name: name.into(),
            size_bytes: bytes.len() as u64,
            content: String::from_utf8_lossy(bytes).into_owned(),
        }
    }
}

/// How multiple inputs are folded into one instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InputMode {
    /// Apply the instruction to each input separately.
    #[serde(rename = "use_individually")]
    Individual,
    /// Fold all inputs into a single instruction.
    #[serde(rename = "combine_events")]
    Combined,
}

/// Serialization the service should use for a retrieved object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReturnFormat {
    Json,
    RawText,
    PrettyHtml,
}

/// One named input of an extract request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectInput {
    #[serde(rename = "input_object_name")]
    pub object_name: String,
    pub mode: InputMode,
}

impl ObjectInput {
    pub fn new(object_name: impl Into<String>, mode: InputMode) -> Self {
        Self {
            object_name: object_name.into(),
            mode,
        }
    }

    /// The token a prompt uses to refer to this input, e.g. `{legal_documents}`.
    pub fn placeholder(&self) -> String {
        format!("{{{}}}", self.object_name)
    }
}

/// Body of `POST /input_data`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestRequest {
    #[serde(rename = "created_object_name")]
    pub object_name: String,
    pub data_type: String,
    #[serde(rename = "input_data")]
    pub payload: Vec<String>,
}

/// Body of `POST /apply_prompt`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractRequest {
    #[serde(rename = "created_object_names")]
    pub output_object_names: Vec<String>,
    #[serde(rename = "prompt_string")]
    pub prompt_template: String,
    pub inputs: Vec<ObjectInput>,
}

/// Body of `POST /return_data`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrieveRequest {
    pub object_name: String,
    #[serde(rename = "return_type")]
    pub return_format: ReturnFormat,
}

/// A remote operation, constructed fresh for each call.
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteRequest {
    Ingest(IngestRequest),
    Extract(ExtractRequest),
    Retrieve(RetrieveRequest),
    Delete { object_name: String },
}

impl RemoteRequest {
    pub fn method(&self) -> &'static str {
        match self {
            RemoteRequest::Delete { .. } => "DELETE",
            _ => "POST",
        }
    }

    pub fn endpoint(&self) -> String {
        match self {
            RemoteRequest::Ingest(_) => "/input_data".to_string(),
            RemoteRequest::Extract(_) => "/apply_prompt".to_string(),
            RemoteRequest::Retrieve(_) => "/return_data".to_string(),
            RemoteRequest::Delete { object_name } => format!("/objects/{}", object_name),
        }
    }

    /// JSON body sent on the wire; `Value::Null` for bodiless requests.
    pub fn body(&self) -> Value {
        let body = match self {
            RemoteRequest::Ingest(r) => serde_json::to_value(r),
            RemoteRequest::Extract(r) => serde_json::to_value(r),
            RemoteRequest::Retrieve(r) => serde_json::to_value(r),
            RemoteRequest::Delete { .. } => return Value::Null,
        };
        body.unwrap_or(Value::Null)
    }
}

/// A successful (2xx) response from the service.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteResponse {
    pub status: u16,
    pub body: Value,
}

impl RemoteResponse {
    /// The `value` field of a retrieve response, if present and non-null.
    pub fn value(&self) -> Option<&Value> {
        self.body.get("value").filter(|v| !v.is_null())
    }
}

/// One extracted item.
///
/// `Parsed` holds structured data from the service; `Fallback` holds the raw
/// payload when it could not be parsed.
#[derive(Debug, Clone, PartialEq)]
pub enum StructuredItem {
    Parsed(Value),
    Fallback(String),
}

impl StructuredItem {
    pub fn is_fallback(&self) -> bool {
        matches!(self, StructuredItem::Fallback(_))
    }

    /// Flatten the item into `(column, cell)` pairs for tabular export.
    ///
    /// Objects contribute one pair per key; scalars, arrays, and fallback
    /// text land in the `content` column.
    pub fn fields(&self) -> Vec<(String, String)> {
        match self {
            StructuredItem::Parsed(Value::Object(map)) => map
                .iter()
                .map(|(k, v)| (k.clone(), render_cell(v)))
                .collect(),
            StructuredItem::Parsed(other) => vec![("content".to_string(), render_cell(other))],
            StructuredItem::Fallback(raw) => vec![("content".to_string(), raw.clone())],
        }
    }
}

fn render_cell(v: &Value) -> String {
    match v {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Normalized output for one file. `items` is never empty.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionRecord {
    pub file_name: String,
    pub items: Vec<StructuredItem>,
}

/// Per-file records of one run, in submission order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchResult {
    records: Vec<ExtractionRecord>,
}

impl BatchResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, record: ExtractionRecord) {
        self.records.push(record);
    }

    pub fn records(&self) -> &[ExtractionRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Total number of items across all records.
    pub fn item_count(&self) -> usize {
        self.records.iter().map(|r| r.items.len()).sum()
    }
}
