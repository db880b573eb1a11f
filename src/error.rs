//! Error types for the remote client, the pipeline, and the workflow.
//!
//! Three failure families exist:
//!
//! | Family | Type | Effect |
//! |--------|------|--------|
//! | Transport | [`RemoteError`] wrapped in [`PipelineError::Step`] | aborts the batch |
//! | Validation | [`PipelineError::Validation`] / [`RemoteError::InvalidRequest`] | rejected before any remote call |
//! | Parse | none, see [`StructuredItem::Fallback`](crate::models::StructuredItem::Fallback) | recovered per item |

use std::fmt;

use thiserror::Error;

use crate::workflow::StateName;

/// How a single remote call failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallFailure {
    /// The service answered with a non-2xx status.
    Status { status: u16, body: String },
    /// The request never produced a response (connect, DNS, TLS, reset).
    Transport(String),
    /// A 2xx response whose body could not be decoded.
    Decode(String),
}

impl fmt::Display for CallFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallFailure::Status { status, body } if body.is_empty() => {
                write!(f, "HTTP {}", status)
            }
            CallFailure::Status { status, body } => write!(f, "HTTP {}: {}", status, body),
            CallFailure::Transport(msg) => write!(f, "transport error: {}", msg),
            CallFailure::Decode(msg) => write!(f, "invalid response body: {}", msg),
        }
    }
}

impl CallFailure {
    /// HTTP status of the failed call, when the service answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            CallFailure::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Failure of one operation against the extraction service.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
    #[error("failed to upload document: {0}")]
    Ingest(CallFailure),

    #[error("failed to extract data: {0}")]
    Extract(CallFailure),

    #[error("failed to retrieve data: {0}")]
    Retrieve(CallFailure),

    #[error("failed to delete object: {0}")]
    Delete(CallFailure),

    /// The request violated a client-side constraint and was never sent.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl RemoteError {
    /// The underlying call failure, if the request was actually dispatched.
    pub fn failure(&self) -> Option<&CallFailure> {
        match self {
            RemoteError::Ingest(f)
            | RemoteError::Extract(f)
            | RemoteError::Retrieve(f)
            | RemoteError::Delete(f) => Some(f),
            RemoteError::InvalidRequest(_) => None,
        }
    }
}

/// Pipeline step that a batch failure is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Ingest,
    Extract,
    Retrieve,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Step::Ingest => "ingest",
            Step::Extract => "extract",
            Step::Retrieve => "retrieve",
        };
        f.write_str(s)
    }
}

/// Coarse classification; `xflow` maps it to its exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Transport,
    Validation,
    Cancelled,
}

/// Terminal failure of a pipeline run.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PipelineError {
    /// Rejected before any remote call was made.
    #[error("{0}")]
    Validation(String),

    /// A remote step failed for the named file.
    #[error("{file}: {step} step failed: {source}")]
    Step {
        file: String,
        step: Step,
        #[source]
        source: RemoteError,
    },

    #[error("processing was cancelled")]
    Cancelled,
}

impl PipelineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::Validation(_) => ErrorKind::Validation,
            PipelineError::Step {
                source: RemoteError::InvalidRequest(_),
                ..
            } => ErrorKind::Validation,
            PipelineError::Step { .. } => ErrorKind::Transport,
            PipelineError::Cancelled => ErrorKind::Cancelled,
        }
    }

    /// The step that failed, for step failures.
    pub fn step(&self) -> Option<Step> {
        match self {
            PipelineError::Step { step, .. } => Some(*step),
            _ => None,
        }
    }
}

/// Errors raised by the [`Workflow`](crate::workflow::Workflow) front-end.
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("cannot {action} while {from}")]
    InvalidTransition {
        from: StateName,
        action: &'static str,
    },

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error("failed to write export: {0}")]
    Export(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_error_names_file_and_step() {
        let err = PipelineError::Step {
            file: "B.txt".to_string(),
            step: Step::Extract,
            source: RemoteError::Extract(CallFailure::Status {
                status: 502,
                body: String::new(),
            }),
        };
        assert_eq!(
            err.to_string(),
            "B.txt: extract step failed: failed to extract data: HTTP 502"
        );
        assert_eq!(err.kind(), ErrorKind::Transport);
        assert_eq!(err.step(), Some(Step::Extract));
    }

    #[test]
    fn invalid_request_classifies_as_validation() {
        let err = PipelineError::Step {
            file: "a".to_string(),
            step: Step::Ingest,
            source: RemoteError::InvalidRequest("empty".to_string()),
        };
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(RemoteError::InvalidRequest("x".into()).failure().is_none());
    }

    #[test]
    fn status_accessor() {
        let f = CallFailure::Status {
            status: 404,
            body: "no such object".into(),
        };
        assert_eq!(f.status(), Some(404));
        assert_eq!(f.to_string(), "HTTP 404: no such object");
        assert_eq!(CallFailure::Transport("reset".into()).status(), None);
    }
}
