//! Batch extraction pipeline.
//!
//! Drives each submitted file, one at a time and in submission order,
//! through ingest → extract → retrieve → normalize, appending one
//! [`ExtractionRecord`] per file to the [`BatchResult`].
//!
//! Failure policy:
//! - A failed remote step is terminal for the whole batch. Records already
//!   appended are handed back in [`BatchFailure::partial`]; no record exists
//!   for the failing file or any later one.
//! - A payload that does not parse is recovered per item (see
//!   [`normalize`](crate::normalize)) and never stops the batch.
//!
//! Cancellation is cooperative: it is checked before each step and after each
//! remote call returns, so a call in flight is allowed to finish but its
//! response is discarded.

use tokio_util::sync::CancellationToken;

use crate::client::RemoteClient;
use crate::config::ExtractionConfig;
use crate::error::{PipelineError, RemoteError, Step};
use crate::models::{
    BatchResult, ExtractionRecord, InputMode, ObjectInput, ReturnFormat, SourceFile,
};
use crate::normalize::normalize_payload;
use crate::notify::{documents, Notification, NotificationSink};
use crate::progress::{PipelineProgress, ProgressEvent, ProgressReporter, Stage};

/// Read-only collaborators for one run.
pub struct RunContext<'a> {
    pub progress: &'a dyn ProgressReporter,
    pub notifier: &'a dyn NotificationSink,
    pub cancel: &'a CancellationToken,
}

/// A batch that stopped before completing.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchFailure {
    pub error: PipelineError,
    /// Records of the files that finished before the failure.
    pub partial: BatchResult,
    /// Last reported percentage.
    pub progress: f64,
}

/// Sequential multi-file extraction driver.
#[derive(Clone)]
pub struct Orchestrator {
    client: RemoteClient,
    settings: ExtractionConfig,
}

impl Orchestrator {
    pub fn new(client: RemoteClient, settings: ExtractionConfig) -> Self {
        Self { client, settings }
    }

    /// Process `files` in order and return one record per file.
    ///
    /// An empty file list is rejected with [`PipelineError::Validation`]
    /// before any remote call is made.
    pub async fn run(
        &self,
        files: &[SourceFile],
        ctx: &RunContext<'_>,
    ) -> Result<BatchResult, BatchFailure> {
        let mut batch = BatchResult::new();
        let mut progress = PipelineProgress::new(files.len());

        if files.is_empty() {
            return Err(BatchFailure {
                error: PipelineError::Validation("no files were supplied".to_string()),
                partial: batch,
                progress: 0.0,
            });
        }

        tracing::info!(files = files.len(), "starting extraction batch");
        ctx.notifier.notify(Notification::info(
            "Processing Started",
            format!("Processing {}...", documents(files.len())),
        ));
        ctx.progress.report(ProgressEvent::Started { total: files.len() });

        for (index, file) in files.iter().enumerate() {
            match self
                .process_file(index, file, &mut progress, ctx)
                .await
            {
                Ok(record) => {
                    batch.push(record);
                    let percent = progress.advance(index, Stage::Parsed);
                    report_step(ctx, file, index, files.len(), Stage::Parsed, percent);
                    ctx.notifier.notify(Notification::info(
                        "File Processed",
                        format!("{} ({}/{})", file.name, index + 1, files.len()),
                    ));
                }
                Err(error) => {
                    self.announce_failure(&error, ctx);
                    return Err(BatchFailure {
                        error,
                        partial: batch,
                        progress: progress.percent(),
                    });
                }
            }
        }

        let items = batch.item_count();
        tracing::info!(files = batch.len(), items, "extraction batch complete");
        ctx.notifier.notify(Notification::success(
            "Processing Complete",
            format!(
                "Successfully processed {} and extracted {} item{}.",
                documents(batch.len()),
                items,
                if items == 1 { "" } else { "s" }
            ),
        ));
        Ok(batch)
    }

    async fn process_file(
        &self,
        index: usize,
        file: &SourceFile,
        progress: &mut PipelineProgress,
        ctx: &RunContext<'_>,
    ) -> Result<ExtractionRecord, PipelineError> {
        let total = progress.total_files();
        let input = &self.settings.input_object;
        let output = &self.settings.output_object;

        tracing::debug!(file = %file.name, bytes = file.size_bytes, "processing file");

        checkpoint(ctx)?;
        let ingested = self
            .client
            .ingest(input, std::slice::from_ref(&file.content))
            .await;
        checkpoint(ctx)?;
        ingested.map_err(|e| step_error(file, Step::Ingest, e))?;
        let percent = progress.advance(index, Stage::Ingested);
        report_step(ctx, file, index, total, Stage::Ingested, percent);

        let extracted = self
            .client
            .extract(
                std::slice::from_ref(output),
                &self.settings.prompt,
                &[ObjectInput::new(input.clone(), InputMode::Individual)],
            )
            .await;
        checkpoint(ctx)?;
        extracted.map_err(|e| step_error(file, Step::Extract, e))?;
        let percent = progress.advance(index, Stage::Extracted);
        report_step(ctx, file, index, total, Stage::Extracted, percent);

        let retrieved = self.client.retrieve(output, ReturnFormat::Json).await;
        checkpoint(ctx)?;
        let response = retrieved.map_err(|e| step_error(file, Step::Retrieve, e))?;
        let percent = progress.advance(index, Stage::Retrieved);
        report_step(ctx, file, index, total, Stage::Retrieved, percent);

        let items = normalize_payload(response.value());
        if items.iter().any(|i| i.is_fallback()) {
            tracing::warn!(file = %file.name, "using fallback content for unparsed payload");
        }

        Ok(ExtractionRecord {
            file_name: file.name.clone(),
            items,
        })
    }

    fn announce_failure(&self, error: &PipelineError, ctx: &RunContext<'_>) {
        match error {
            PipelineError::Cancelled => {
                tracing::info!("extraction batch cancelled");
                ctx.notifier.notify(Notification::info(
                    "Processing Cancelled",
                    "No further documents will be processed.",
                ));
            }
            other => {
                tracing::error!(error = %other, "extraction batch failed");
                ctx.notifier
                    .notify(Notification::error("Processing Failed", other.to_string()));
            }
        }
    }
}

fn checkpoint(ctx: &RunContext<'_>) -> Result<(), PipelineError> {
    if ctx.cancel.is_cancelled() {
        return Err(PipelineError::Cancelled);
    }
    Ok(())
}

fn step_error(file: &SourceFile, step: Step, source: RemoteError) -> PipelineError {
    PipelineError::Step {
        file: file.name.clone(),
        step,
        source,
    }
}

fn report_step(
    ctx: &RunContext<'_>,
    file: &SourceFile,
    index: usize,
    total: usize,
    stage: Stage,
    percent: f64,
) {
    ctx.progress.report(ProgressEvent::Step {
        file: file.name.clone(),
        index,
        total,
        stage,
        percent,
    });
}
