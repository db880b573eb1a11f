//! Inspection and cleanup of objects held by the remote service.
//!
//! Both operations are best-effort and visit every name: a failure for one
//! object is recorded and the walk continues.

use serde::Serialize;
use serde_json::Value;

use crate::client::RemoteClient;
use crate::models::ReturnFormat;
use crate::request_log::RequestLog;

/// Raw text of one remote object, or `"Error: ..."` if it could not be read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ObjectDump {
    pub name: String,
    pub content: String,
    pub ok: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeleteSummary {
    pub deleted: Vec<String>,
    /// `(name, error message)` for every delete that failed.
    pub failed: Vec<(String, String)>,
}

impl DeleteSummary {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Retrieve each object as raw text, in the order given.
pub async fn dump_objects(client: &RemoteClient, names: &[String]) -> Vec<ObjectDump> {
    let mut dumps = Vec::with_capacity(names.len());
    for name in names {
        let dump = match client.retrieve(name, ReturnFormat::RawText).await {
            Ok(response) => ObjectDump {
                name: name.clone(),
                content: match response.value() {
                    Some(Value::String(s)) => s.clone(),
                    Some(other) => other.to_string(),
                    None => String::new(),
                },
                ok: true,
            },
            Err(e) => {
                tracing::warn!(object = %name, error = %e, "could not read object");
                ObjectDump {
                    name: name.clone(),
                    content: format!("Error: {}", e),
                    ok: false,
                }
            }
        };
        dumps.push(dump);
    }
    dumps
}

/// Delete each object. Failures are logged and counted, never returned.
pub async fn delete_objects(client: &RemoteClient, names: &[String]) -> DeleteSummary {
    let mut summary = DeleteSummary::default();
    for name in names {
        match client.delete(name).await {
            Ok(_) => {
                tracing::debug!(object = %name, "deleted object");
                summary.deleted.push(name.clone());
            }
            Err(e) => {
                tracing::warn!(object = %name, error = %e, "failed to delete object");
                summary.failed.push((name.clone(), e.to_string()));
            }
        }
    }
    summary
}

/// Delete everything `log` saw created, then forget it.
pub async fn cleanup_created(client: &RemoteClient, log: &RequestLog) -> DeleteSummary {
    let names = log.created_objects();
    let summary = delete_objects(client, &names).await;
    log.clear_objects();
    summary
}
