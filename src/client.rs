//! Remote operation client for the extraction service.
//!
//! Two layers:
//! - **[`ExtractionService`]**: the transport seam. Sends one
//!   [`RemoteRequest`] and returns the decoded 2xx response or a
//!   [`CallFailure`]. [`HttpService`] is the `reqwest` implementation;
//!   tests substitute scripted in-memory services.
//! - **[`RemoteClient`]**: the typed operations (`ingest`, `extract`,
//!   `retrieve`, `delete`). Validates arguments, reports each request to a
//!   [`RequestObserver`] before dispatch, and maps failures onto the
//!   per-operation [`RemoteError`] variants.
//!
//! # Endpoints
//!
//! | Method | Path | Operation |
//! |--------|------|-----------|
//! | `POST` | `/input_data` | ingest |
//! | `POST` | `/apply_prompt` | extract |
//! | `POST` | `/return_data` | retrieve |
//! | `DELETE` | `/objects/{name}` | delete |
//!
//! There are no retries at this layer: a transport error or non-2xx status
//! is returned to the caller immediately.

use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde_json::Value;

use crate::config::ServiceConfig;
use crate::error::{CallFailure, RemoteError};
use crate::models::{
    ExtractRequest, IngestRequest, ObjectInput, RemoteRequest, RemoteResponse, RetrieveRequest,
    ReturnFormat,
};
use crate::request_log::{ApiCall, RequestObserver, TracingObserver};

/// Data type tag sent with text payloads.
pub const DATA_TYPE_STRINGS: &str = "strings";

/// Transport to the extraction service.
#[async_trait]
pub trait ExtractionService: Send + Sync {
    /// Send one request. Only 2xx responses are `Ok`.
    async fn send(&self, request: &RemoteRequest) -> Result<RemoteResponse, CallFailure>;
}

// ============ HTTP Service ============

/// [`ExtractionService`] over HTTP with a fixed base address and header set.
pub struct HttpService {
    client: reqwest::Client,
    base_url: String,
    headers: HeaderMap,
}

impl HttpService {
    /// Build the service from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if a configured header name or value is not valid
    /// HTTP, or if the HTTP client cannot be constructed.
    pub fn new(config: &ServiceConfig) -> anyhow::Result<Self> {
        let mut headers = HeaderMap::new();
        for (name, value) in &config.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .with_context(|| format!("Invalid header name: '{}'", name))?;
            let value = HeaderValue::from_str(value)
                .with_context(|| format!("Invalid value for header '{}'", name))?;
            headers.insert(name, value);
        }

        let client = reqwest::Client::builder().build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            headers,
        })
    }
}

#[async_trait]
impl ExtractionService for HttpService {
    async fn send(&self, request: &RemoteRequest) -> Result<RemoteResponse, CallFailure> {
        let url = format!("{}{}", self.base_url, request.endpoint());

        let builder = match request {
            RemoteRequest::Delete { .. } => self.client.delete(&url),
            _ => self.client.post(&url).json(&request.body()),
        };

        let response = builder
            .headers(self.headers.clone())
            .send()
            .await
            .map_err(|e| CallFailure::Transport(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| CallFailure::Transport(e.to_string()))?;

        if !status.is_success() {
            return Err(CallFailure::Status {
                status: status.as_u16(),
                body: text,
            });
        }

        let body = decode_body(request, &text)?;
        Ok(RemoteResponse {
            status: status.as_u16(),
            body,
        })
    }
}

/// Decode a 2xx body. Retrieve responses must be JSON; other operations
/// tolerate plain-text acknowledgements.
fn decode_body(request: &RemoteRequest, text: &str) -> Result<Value, CallFailure> {
    if text.trim().is_empty() {
        return Ok(Value::Null);
    }
    match serde_json::from_str::<Value>(text) {
        Ok(v) => Ok(v),
        Err(e) if matches!(request, RemoteRequest::Retrieve(_)) => {
            Err(CallFailure::Decode(e.to_string()))
        }
        Err(_) => Ok(Value::String(text.to_string())),
    }
}

// ============ Typed operations ============

/// Typed remote operations with validation and request logging.
#[derive(Clone)]
pub struct RemoteClient {
    service: Arc<dyn ExtractionService>,
    observer: Arc<dyn RequestObserver>,
}

impl RemoteClient {
    pub fn new(service: Arc<dyn ExtractionService>, observer: Arc<dyn RequestObserver>) -> Self {
        Self { service, observer }
    }

    /// Client that only logs requests through `tracing`.
    pub fn with_tracing(service: Arc<dyn ExtractionService>) -> Self {
        Self::new(service, Arc::new(TracingObserver))
    }

    /// Register `items` as text under `object_name`.
    pub async fn ingest(
        &self,
        object_name: &str,
        items: &[String],
    ) -> Result<RemoteResponse, RemoteError> {
        require_name(object_name, "ingest object name")?;
        if items.is_empty() {
            return Err(RemoteError::InvalidRequest(
                "ingest requires at least one item".to_string(),
            ));
        }
        let request = RemoteRequest::Ingest(IngestRequest {
            object_name: object_name.to_string(),
            data_type: DATA_TYPE_STRINGS.to_string(),
            payload: items.to_vec(),
        });
        let response = self.dispatch(&request).await.map_err(RemoteError::Ingest)?;
        self.observer.on_object_created(object_name);
        Ok(response)
    }

    /// Apply `prompt_template` to `inputs`, creating `output_names`.
    ///
    /// The template must mention every input by its placeholder token,
    /// e.g. `{legal_documents}`.
    pub async fn extract(
        &self,
        output_names: &[String],
        prompt_template: &str,
        inputs: &[ObjectInput],
    ) -> Result<RemoteResponse, RemoteError> {
        if output_names.is_empty() {
            return Err(RemoteError::InvalidRequest(
                "extract requires at least one output object name".to_string(),
            ));
        }
        for name in output_names {
            require_name(name, "output object name")?;
        }
        if prompt_template.trim().is_empty() {
            return Err(RemoteError::InvalidRequest(
                "prompt must not be empty".to_string(),
            ));
        }
        if inputs.is_empty() {
            return Err(RemoteError::InvalidRequest(
                "extract requires at least one input object".to_string(),
            ));
        }
        for input in inputs {
            let token = input.placeholder();
            if !prompt_template.contains(&token) {
                return Err(RemoteError::InvalidRequest(format!(
                    "prompt does not reference input '{}' (expected {})",
                    input.object_name, token
                )));
            }
        }

        let request = RemoteRequest::Extract(ExtractRequest {
            output_object_names: output_names.to_vec(),
            prompt_template: prompt_template.to_string(),
            inputs: inputs.to_vec(),
        });
        let response = self
            .dispatch(&request)
            .await
            .map_err(RemoteError::Extract)?;
        for name in output_names {
            self.observer.on_object_created(name);
        }
        Ok(response)
    }

    /// Fetch the materialized value of `object_name` in `format`.
    pub async fn retrieve(
        &self,
        object_name: &str,
        format: ReturnFormat,
    ) -> Result<RemoteResponse, RemoteError> {
        require_name(object_name, "retrieve object name")?;
        let request = RemoteRequest::Retrieve(RetrieveRequest {
            object_name: object_name.to_string(),
            return_format: format,
        });
        self.dispatch(&request)
            .await
            .map_err(RemoteError::Retrieve)
    }

    pub async fn delete(&self, object_name: &str) -> Result<RemoteResponse, RemoteError> {
        require_name(object_name, "delete object name")?;
        let request = RemoteRequest::Delete {
            object_name: object_name.to_string(),
        };
        self.dispatch(&request).await.map_err(RemoteError::Delete)
    }

    async fn dispatch(&self, request: &RemoteRequest) -> Result<RemoteResponse, CallFailure> {
        self.observer.on_request(&ApiCall::from_request(request));
        self.service.send(request).await
    }
}

fn require_name(name: &str, what: &str) -> Result<(), RemoteError> {
    if name.trim().is_empty() {
        return Err(RemoteError::InvalidRequest(format!(
            "{} must not be empty",
            what
        )));
    }
    Ok(())
}
