//! UI-facing workflow state machine around the [`Orchestrator`].
//!
//! ```text
//!            supply files              start
//!   Idle ───────────────▶ Collecting ─────────▶ Processing ──finish──▶ Completed
//!    ▲                                           │    │                  │
//!    │◀──────────────── cancel ──────────────────┘    └──fail──▶ Failed  │
//!    │◀──────────────── reset ─────────────────────────────────────┴─────┘
//!                     (Completed / Failed also accept "supply files")
//! ```
//!
//! Only one run may be in flight: files are accepted in `Idle`,
//! `Completed` (process more), and `Failed` (retry), never while
//! `Collecting` or `Processing`. Export reads the last [`BatchResult`] and is
//! only permitted in `Idle` and `Completed`.

use std::fmt;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio_util::sync::CancellationToken;

use crate::error::{PipelineError, WorkflowError};
use crate::export;
use crate::models::{BatchResult, SourceFile};
use crate::notify::{NoNotifications, Notification, NotificationSink};
use crate::pipeline::{Orchestrator, RunContext};
use crate::progress::{NoProgress, ProgressEvent, ProgressReporter};

/// Discriminant of [`WorkflowState`], used in errors and display.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateName {
    Idle,
    Collecting,
    Processing,
    Completed,
    Failed,
}

impl fmt::Display for StateName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StateName::Idle => "idle",
            StateName::Collecting => "collecting",
            StateName::Processing => "processing",
            StateName::Completed => "completed",
            StateName::Failed => "failed",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum WorkflowState {
    Idle,
    Collecting { files: usize },
    Processing { files: usize, percent: f64 },
    Completed { files: usize, items: usize },
    Failed { message: String },
}

/// Inputs to the state machine.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Supply { files: usize },
    Start,
    Progress { percent: f64 },
    Finish { files: usize, items: usize },
    Fail { message: String },
    Cancel,
    Reset,
}

impl Action {
    fn label(&self) -> &'static str {
        match self {
            Action::Supply { .. } => "supply files",
            Action::Start => "start processing",
            Action::Progress { .. } => "report progress",
            Action::Finish { .. } => "finish",
            Action::Fail { .. } => "fail",
            Action::Cancel => "cancel",
            Action::Reset => "reset",
        }
    }
}

impl WorkflowState {
    pub fn name(&self) -> StateName {
        match self {
            WorkflowState::Idle => StateName::Idle,
            WorkflowState::Collecting { .. } => StateName::Collecting,
            WorkflowState::Processing { .. } => StateName::Processing,
            WorkflowState::Completed { .. } => StateName::Completed,
            WorkflowState::Failed { .. } => StateName::Failed,
        }
    }

    /// Export is a read of the last finished batch, allowed only at rest.
    pub fn can_export(&self) -> bool {
        matches!(self, WorkflowState::Idle | WorkflowState::Completed { .. })
    }

    /// Compute the state that follows `action`, or reject it.
    pub fn apply(&self, action: Action) -> Result<WorkflowState, WorkflowError> {
        use WorkflowState::*;

        let next = match (self, &action) {
            (Idle | Completed { .. } | Failed { .. }, Action::Supply { files }) if *files > 0 => {
                Collecting { files: *files }
            }
            (Collecting { files }, Action::Start) => Processing {
                files: *files,
                percent: 0.0,
            },
            (Processing { files, percent }, Action::Progress { percent: p }) => Processing {
                files: *files,
                percent: (*percent).max(*p),
            },
            (Processing { .. }, Action::Finish { files, items }) => Completed {
                files: *files,
                items: *items,
            },
            (Processing { .. }, Action::Fail { message }) => Failed {
                message: message.clone(),
            },
            (Collecting { .. } | Processing { .. }, Action::Cancel) => Idle,
            (Completed { .. } | Failed { .. }, Action::Reset) => Idle,
            _ => {
                return Err(WorkflowError::InvalidTransition {
                    from: self.name(),
                    action: action.label(),
                })
            }
        };
        Ok(next)
    }
}

struct Inner {
    state: WorkflowState,
    batch: BatchResult,
    cancel: Option<CancellationToken>,
    run_id: u64,
}

/// Owns the state machine, the last batch, and the current run's cancel token.
pub struct Workflow {
    orchestrator: Orchestrator,
    progress: Arc<dyn ProgressReporter>,
    notifier: Arc<dyn NotificationSink>,
    inner: Mutex<Inner>,
}

impl Workflow {
    pub fn new(orchestrator: Orchestrator) -> Self {
        Self {
            orchestrator,
            progress: Arc::new(NoProgress),
            notifier: Arc::new(NoNotifications),
            inner: Mutex::new(Inner {
                state: WorkflowState::Idle,
                batch: BatchResult::new(),
                cancel: None,
                run_id: 0,
            }),
        }
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressReporter>) -> Self {
        self.progress = progress;
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn NotificationSink>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn state(&self) -> WorkflowState {
        self.lock().state.clone()
    }

    /// Records of the last run: all of them after success, those finished
    /// before the failing file after a failure, none after cancel or reset.
    pub fn batch(&self) -> BatchResult {
        self.lock().batch.clone()
    }

    /// Supply files and run the pipeline to a terminal state.
    ///
    /// Collection and the start of processing are coincident. On success the
    /// workflow is `Completed` and the batch is returned. On a step failure it
    /// is `Failed`. If [`cancel`](Self::cancel) was called meanwhile the
    /// workflow is already `Idle` and the run's results are discarded.
    pub async fn submit(&self, files: Vec<SourceFile>) -> Result<BatchResult, WorkflowError> {
        if files.is_empty() {
            return Err(PipelineError::Validation("no files were supplied".to_string()).into());
        }

        let (run_id, cancel) = {
            let mut inner = self.lock();
            let collecting = inner.state.apply(Action::Supply { files: files.len() })?;
            let processing = collecting.apply(Action::Start)?;
            let token = CancellationToken::new();
            inner.state = processing;
            inner.batch = BatchResult::new();
            inner.cancel = Some(token.clone());
            inner.run_id += 1;
            (inner.run_id, token)
        };

        let tracker = StateTracker {
            workflow: self,
            run_id,
        };
        let ctx = RunContext {
            progress: &tracker,
            notifier: self.notifier.as_ref(),
            cancel: &cancel,
        };
        let outcome = self.orchestrator.run(&files, &ctx).await;

        let mut inner = self.lock();
        let current = inner.run_id == run_id && inner.state.name() == StateName::Processing;
        if current {
            inner.cancel = None;
        }

        match outcome {
            Ok(batch) if current => {
                inner.state = inner.state.apply(Action::Finish {
                    files: batch.len(),
                    items: batch.item_count(),
                })?;
                inner.batch = batch.clone();
                Ok(batch)
            }
            Ok(_) => Err(PipelineError::Cancelled.into()),
            Err(failure) => {
                if current && failure.error != PipelineError::Cancelled {
                    inner.state = inner.state.apply(Action::Fail {
                        message: failure.error.to_string(),
                    })?;
                    inner.batch = failure.partial;
                }
                Err(failure.error.into())
            }
        }
    }

    /// Request cooperative cancellation of the running batch.
    ///
    /// The visible state reverts to `Idle` immediately; a call already in
    /// flight completes but its response is discarded. A new batch may be
    /// submitted before that call returns, and the stale call still writes
    /// the same remote objects the new batch uses.
    pub fn cancel(&self) -> Result<(), WorkflowError> {
        let mut inner = self.lock();
        inner.state = inner.state.apply(Action::Cancel)?;
        if let Some(token) = inner.cancel.take() {
            token.cancel();
        }
        inner.batch = BatchResult::new();
        tracing::info!("cancellation requested");
        Ok(())
    }

    /// Return to `Idle` from `Completed` or `Failed`, discarding the batch.
    pub fn reset(&self) -> Result<(), WorkflowError> {
        let mut inner = self.lock();
        inner.state = inner.state.apply(Action::Reset)?;
        inner.batch = BatchResult::new();
        Ok(())
    }

    /// Render the last batch as CSV. `None` when there is nothing to export.
    pub fn export_csv(&self) -> Result<Option<String>, WorkflowError> {
        let inner = self.lock();
        if !inner.state.can_export() {
            return Err(WorkflowError::InvalidTransition {
                from: inner.state.name(),
                action: "export",
            });
        }
        if inner.batch.is_empty() {
            return Ok(None);
        }
        Ok(Some(export::to_csv(&export::flatten(&inner.batch))))
    }

    /// Write the CSV export to `path`. Returns `false` (and writes nothing)
    /// when the batch is empty.
    pub fn export_to(&self, path: &Path) -> Result<bool, WorkflowError> {
        let Some(csv) = self.export_csv()? else {
            return Ok(false);
        };
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, csv)?;
        tracing::info!(path = %path.display(), "exported batch");
        self.notifier.notify(Notification::success(
            "Download Complete",
            format!("CSV file written to {}.", path.display()),
        ));
        Ok(true)
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// Mirrors progress into the `Processing` state, then forwards it.
struct StateTracker<'a> {
    workflow: &'a Workflow,
    run_id: u64,
}

impl ProgressReporter for StateTracker<'_> {
    fn report(&self, event: ProgressEvent) {
        if let ProgressEvent::Step { percent, .. } = &event {
            let mut inner = self.workflow.lock();
            if inner.run_id == self.run_id {
                if let Ok(next) = inner.state.apply(Action::Progress { percent: *percent }) {
                    inner.state = next;
                }
            }
        }
        self.workflow.progress.report(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn processing() -> WorkflowState {
        WorkflowState::Processing {
            files: 2,
            percent: 0.0,
        }
    }

    #[test]
    fn happy_path_transitions() {
        let s = WorkflowState::Idle;
        let s = s.apply(Action::Supply { files: 2 }).unwrap();
        assert_eq!(s, WorkflowState::Collecting { files: 2 });
        let s = s.apply(Action::Start).unwrap();
        assert_eq!(s, processing());
        let s = s.apply(Action::Progress { percent: 50.0 }).unwrap();
        let s = s.apply(Action::Progress { percent: 25.0 }).unwrap();
        assert_eq!(
            s,
            WorkflowState::Processing {
                files: 2,
                percent: 50.0
            }
        );
        let s = s.apply(Action::Finish { files: 2, items: 3 }).unwrap();
        assert_eq!(s, WorkflowState::Completed { files: 2, items: 3 });
        assert!(s.can_export());
    }

    #[test]
    fn supply_is_rejected_while_busy() {
        for busy in [WorkflowState::Collecting { files: 1 }, processing()] {
            let err = busy.apply(Action::Supply { files: 1 }).unwrap_err();
            assert!(matches!(
                err,
                WorkflowError::InvalidTransition {
                    action: "supply files",
                    ..
                }
            ));
        }
    }

    #[test]
    fn empty_supply_is_rejected() {
        assert!(WorkflowState::Idle
            .apply(Action::Supply { files: 0 })
            .is_err());
    }

    #[test]
    fn failure_retry_and_cancel_paths() {
        let failed = processing()
            .apply(Action::Fail {
                message: "boom".into(),
            })
            .unwrap();
        assert_eq!(failed.name(), StateName::Failed);
        assert!(!failed.can_export());
        assert_eq!(
            failed.apply(Action::Supply { files: 1 }).unwrap().name(),
            StateName::Collecting
        );
        assert_eq!(failed.apply(Action::Reset).unwrap(), WorkflowState::Idle);

        assert_eq!(processing().apply(Action::Cancel).unwrap(), WorkflowState::Idle);
        assert!(WorkflowState::Idle.apply(Action::Cancel).is_err());
    }

    #[test]
    fn process_more_from_completed() {
        let done = WorkflowState::Completed { files: 1, items: 1 };
        assert_eq!(done.apply(Action::Reset).unwrap(), WorkflowState::Idle);
        assert_eq!(
            done.apply(Action::Supply { files: 4 }).unwrap(),
            WorkflowState::Collecting { files: 4 }
        );
    }

    #[test]
    fn invalid_transition_message() {
        let err = WorkflowState::Idle.apply(Action::Start).unwrap_err();
        assert_eq!(err.to_string(), "cannot start processing while idle");
    }
}
