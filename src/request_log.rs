//! Observability log of remote calls.
//!
//! Every request is handed to a [`RequestObserver`] before it is dispatched.
//! Observers must not block or fail; they only watch.

use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::models::RemoteRequest;

/// A recorded remote call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApiCall {
    pub method: String,
    pub endpoint: String,
    pub body: Value,
    pub timestamp: DateTime<Utc>,
}

impl ApiCall {
    pub fn from_request(request: &RemoteRequest) -> Self {
        Self {
            method: request.method().to_string(),
            endpoint: request.endpoint(),
            body: request.body(),
            timestamp: Utc::now(),
        }
    }
}

/// Receives requests before dispatch and object names after creation.
pub trait RequestObserver: Send + Sync {
    fn on_request(&self, call: &ApiCall);

    /// Called when a call that creates a named object succeeds.
    fn on_object_created(&self, _name: &str) {}
}

/// Observer that only emits `tracing` events.
pub struct TracingObserver;

impl RequestObserver for TracingObserver {
    fn on_request(&self, call: &ApiCall) {
        tracing::debug!(method = %call.method, endpoint = %call.endpoint, body = %call.body, "dispatching request");
    }

    fn on_object_created(&self, name: &str) {
        tracing::debug!(object = name, "object created");
    }
}

#[derive(Default)]
struct LogInner {
    calls: Vec<ApiCall>,
    objects: Vec<String>,
}

/// In-memory log of calls and of the objects they created.
///
/// Object names are kept in first-creation order without duplicates.
#[derive(Default)]
pub struct RequestLog {
    inner: Mutex<LogInner>,
}

impl RequestLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<ApiCall> {
        match self.inner.lock() {
            Ok(inner) => inner.calls.clone(),
            Err(poisoned) => poisoned.into_inner().calls.clone(),
        }
    }

    pub fn created_objects(&self) -> Vec<String> {
        match self.inner.lock() {
            Ok(inner) => inner.objects.clone(),
            Err(poisoned) => poisoned.into_inner().objects.clone(),
        }
    }

    /// Forget the created objects, e.g. after they were deleted remotely.
    pub fn clear_objects(&self) {
        self.with_inner(|inner| inner.objects.clear());
    }

    fn with_inner(&self, f: impl FnOnce(&mut LogInner)) {
        // Observation never fails the caller, even on a poisoned lock.
        match self.inner.lock() {
            Ok(mut inner) => f(&mut *inner),
            Err(poisoned) => f(&mut *poisoned.into_inner()),
        }
    }
}

impl RequestObserver for RequestLog {
    fn on_request(&self, call: &ApiCall) {
        TracingObserver.on_request(call);
        self.with_inner(|inner| inner.calls.push(call.clone()));
    }

    fn on_object_created(&self, name: &str) {
        self.with_inner(|inner| {
            if !inner.objects.iter().any(|o| o == name) {
                inner.objects.push(name.to_string());
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RetrieveRequest;
    use crate::models::ReturnFormat;

    #[test]
    fn records_calls_in_order() {
        let log = RequestLog::new();
        let a = RemoteRequest::Retrieve(RetrieveRequest {
            object_name: "a".into(),
            return_format: ReturnFormat::Json,
        });
        let b = RemoteRequest::Delete {
            object_name: "b".into(),
        };
        log.on_request(&ApiCall::from_request(&a));
        log.on_request(&ApiCall::from_request(&b));

        let calls = log.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].endpoint, "/return_data");
        assert_eq!(calls[1].method, "DELETE");
        assert_eq!(calls[1].endpoint, "/objects/b");
    }

    #[test]
    fn created_objects_are_deduplicated() {
        let log = RequestLog::new();
        log.on_object_created("legal_documents");
        log.on_object_created("extracted_info");
        log.on_object_created("legal_documents");
        assert_eq!(
            log.created_objects(),
            vec!["legal_documents".to_string(), "extracted_info".to_string()]
        );
        log.clear_objects();
        assert!(log.created_objects().is_empty());
    }
}
