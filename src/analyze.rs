//! Single-document analysis with a free-form instruction.
//!
//! One document is ingested, the instruction is applied to it as a whole
//! (`combine_events`), and the result is fetched as rendered HTML. Unlike the
//! batch pipeline there is no normalization: the summary is returned as the
//! service rendered it.

use serde::Serialize;

use crate::client::RemoteClient;
use crate::config::AnalysisConfig;
use crate::error::{PipelineError, RemoteError, Step};
use crate::models::{InputMode, ObjectInput, ReturnFormat, SourceFile};
use crate::notify::{Notification, NotificationSink};

/// Shown in place of a summary when the service returns nothing.
pub const NO_ANALYSIS_PLACEHOLDER: &str = "No analysis generated";

/// Canned instructions offered to users who do not want to write their own.
pub const PROMPT_SUGGESTIONS: [&str; 5] = [
    "Summarize the key legal arguments and identify any labor law violations mentioned.",
    "Extract all case citations and legal precedents referenced in this document.",
    "Identify the parties involved, important dates, and legal outcomes.",
    "Analyze the document for compliance with S.D.N.Y. court procedures.",
    "Extract key facts and legal issues for case study purposes.",
];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisReport {
    pub file_name: String,
    pub summary: String,
}

/// Build the prompt sent for `instruction` against the configured input object.
pub fn analysis_prompt(settings: &AnalysisConfig, instruction: &str) -> String {
    format!(
        "{}\n\nDocument content: {{{}}}",
        instruction.trim(),
        settings.input_object
    )
}

/// Analyze one document.
///
/// # Errors
///
/// [`PipelineError::Validation`] when the instruction or the document is
/// blank (nothing is sent), otherwise [`PipelineError::Step`] naming the
/// remote step that failed.
pub async fn analyze_document(
    client: &RemoteClient,
    settings: &AnalysisConfig,
    file: &SourceFile,
    instruction: &str,
    notifier: &dyn NotificationSink,
) -> Result<AnalysisReport, PipelineError> {
    if instruction.trim().is_empty() {
        return Err(PipelineError::Validation(
            "an analysis instruction is required".to_string(),
        ));
    }
    if file.content.trim().is_empty() {
        return Err(PipelineError::Validation(format!(
            "{} has no text content",
            file.name
        )));
    }

    notifier.notify(Notification::info(
        "Analysis Started",
        format!("Analyzing {}...", file.name),
    ));

    match run_analysis(client, settings, file, instruction).await {
        Ok(report) => {
            tracing::info!(file = %file.name, chars = report.summary.len(), "analysis complete");
            notifier.notify(Notification::success(
                "Analysis Complete",
                format!("Analysis of {} is ready.", file.name),
            ));
            Ok(report)
        }
        Err(error) => {
            tracing::error!(file = %file.name, error = %error, "analysis failed");
            notifier.notify(Notification::error("Analysis Failed", error.to_string()));
            Err(error)
        }
    }
}

async fn run_analysis(
    client: &RemoteClient,
    settings: &AnalysisConfig,
    file: &SourceFile,
    instruction: &str,
) -> Result<AnalysisReport, PipelineError> {
    let fail = |step: Step| {
        let file = file.name.clone();
        move |source: RemoteError| PipelineError::Step { file, step, source }
    };

    client
        .ingest(&settings.input_object, std::slice::from_ref(&file.content))
        .await
        .map_err(fail(Step::Ingest))?;

    client
        .extract(
            std::slice::from_ref(&settings.output_object),
            &analysis_prompt(settings, instruction),
            &[ObjectInput::new(
                settings.input_object.clone(),
                InputMode::Combined,
            )],
        )
        .await
        .map_err(fail(Step::Extract))?;

    let response = client
        .retrieve(&settings.output_object, ReturnFormat::PrettyHtml)
        .await
        .map_err(fail(Step::Retrieve))?;

    let summary = match response.value() {
        Some(serde_json::Value::String(s)) if !s.trim().is_empty() => s.clone(),
        Some(serde_json::Value::String(_)) | None => NO_ANALYSIS_PLACEHOLDER.to_string(),
        Some(other) => other.to_string(),
    };

    Ok(AnalysisReport {
        file_name: file.name.clone(),
        summary,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ExtractionService;
    use crate::error::CallFailure;
    use crate::models::{RemoteRequest, RemoteResponse};
    use crate::notify::{NotificationFeed, NotificationKind};
    use crate::request_log::RequestLog;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    struct Echo {
        retrieve: serde_json::Value,
        seen: Mutex<Vec<RemoteRequest>>,
    }

    #[async_trait]
    impl ExtractionService for Echo {
        async fn send(&self, request: &RemoteRequest) -> Result<RemoteResponse, CallFailure> {
            self.seen.lock().unwrap().push(request.clone());
            let body = match request {
                RemoteRequest::Retrieve(_) => self.retrieve.clone(),
                _ => json!({ "status": "ok" }),
            };
            Ok(RemoteResponse { status: 200, body })
        }
    }

    fn echo(retrieve: serde_json::Value) -> Arc<Echo> {
        Arc::new(Echo {
            retrieve,
            seen: Mutex::new(Vec::new()),
        })
    }

    #[tokio::test]
    async fn analysis_sends_combined_prompt_and_returns_html() {
        let service = echo(json!({ "value": "<p>Two parties.</p>" }));
        let log = Arc::new(RequestLog::new());
        let client = RemoteClient::new(service.clone(), log.clone());
        let feed = NotificationFeed::new();

        let report = analyze_document(
            &client,
            &AnalysisConfig::default(),
            &SourceFile::new("brief.txt", "The plaintiff alleges..."),
            PROMPT_SUGGESTIONS[2],
            &feed,
        )
        .await
        .unwrap();
        assert_eq!(report.summary, "<p>Two parties.</p>");

        let calls = log.calls();
        assert_eq!(calls.len(), 3);
        assert_eq!(calls[1].body["inputs"][0]["mode"], "combine_events");
        assert!(calls[1].body["prompt_string"]
            .as_str()
            .unwrap()
            .ends_with("Document content: {uploaded_document}"));
        assert_eq!(calls[2].body["return_type"], "pretty_html");
        assert_eq!(
            log.created_objects(),
            vec!["uploaded_document".to_string(), "analysis_result".to_string()]
        );

        let titles: Vec<_> = feed.items().into_iter().map(|n| n.title).collect();
        assert_eq!(titles, vec!["Analysis Complete", "Analysis Started"]);
    }

    #[tokio::test]
    async fn empty_result_uses_placeholder() {
        let client = RemoteClient::with_tracing(echo(json!({})));
        let report = analyze_document(
            &client,
            &AnalysisConfig::default(),
            &SourceFile::new("a.txt", "text"),
            "Summarize",
            &NotificationFeed::new(),
        )
        .await
        .unwrap();
        assert_eq!(report.summary, NO_ANALYSIS_PLACEHOLDER);
    }

    #[tokio::test]
    async fn blank_instruction_sends_nothing() {
        let service = echo(json!({}));
        let client = RemoteClient::with_tracing(service.clone());
        let feed = NotificationFeed::new();
        let err = analyze_document(
            &client,
            &AnalysisConfig::default(),
            &SourceFile::new("a.txt", "text"),
            "   ",
            &feed,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, PipelineError::Validation(_)));
        assert!(service.seen.lock().unwrap().is_empty());
        assert!(feed.items().is_empty());
    }

    #[tokio::test]
    async fn failure_is_reported_with_step() {
        struct Down;
        #[async_trait]
        impl ExtractionService for Down {
            async fn send(&self, _: &RemoteRequest) -> Result<RemoteResponse, CallFailure> {
                Err(CallFailure::Transport("connection refused".into()))
            }
        }

        let feed = NotificationFeed::new();
        let err = analyze_document(
            &RemoteClient::with_tracing(Arc::new(Down)),
            &AnalysisConfig::default(),
            &SourceFile::new("a.txt", "text"),
            "Summarize",
            &feed,
        )
        .await
        .unwrap_err();
        assert_eq!(err.step(), Some(Step::Ingest));
        assert_eq!(feed.items()[0].kind, NotificationKind::Error);
    }
}
