//! Batch progress accounting and reporting.
//!
//! Progress is a percentage in `[0, 100]` recomputed after each sub-step of
//! each file. Within file `i` of `n` the value after a stage is
//! `((i + 1) / n) * weight`, with weights 50 (ingested), 75 (extracted),
//! 90 (retrieved), and 100 (parsed). Reports never move backwards: a value
//! below the previous report is held at the previous report.
//!
//! Progress is emitted on **stderr** so stdout remains parseable for scripts.

use std::io::Write;

use serde::Serialize;

/// Sub-step of a single file that has just completed.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Ingested,
    Extracted,
    Retrieved,
    Parsed,
}

impl Stage {
    /// Percentage of a file's share credited once this stage completes.
    pub fn weight(self) -> f64 {
        match self {
            Stage::Ingested => 50.0,
            Stage::Extracted => 75.0,
            Stage::Retrieved => 90.0,
            Stage::Parsed => 100.0,
        }
    }

    fn label(self) -> &'static str {
        match self {
            Stage::Ingested => "ingested",
            Stage::Extracted => "extracted",
            Stage::Retrieved => "retrieved",
            Stage::Parsed => "parsed",
        }
    }
}

/// Running percentage for one batch. Monotonically non-decreasing.
#[derive(Clone, Debug, PartialEq)]
pub struct PipelineProgress {
    total_files: usize,
    percent: f64,
}

impl PipelineProgress {
    pub fn new(total_files: usize) -> Self {
        Self {
            total_files,
            percent: 0.0,
        }
    }

    pub fn percent(&self) -> f64 {
        self.percent
    }

    pub fn total_files(&self) -> usize {
        self.total_files
    }

    /// Record that file `index` finished `stage`; returns the new percentage.
    pub fn advance(&mut self, index: usize, stage: Stage) -> f64 {
        if self.total_files == 0 {
            return self.percent;
        }
        let raw = ((index + 1) as f64 / self.total_files as f64) * stage.weight();
        let raw = raw.clamp(0.0, 100.0);
        if raw > self.percent {
            self.percent = raw;
        }
        self.percent
    }
}

/// A single progress event for a batch.
#[derive(Clone, Debug, PartialEq)]
pub enum ProgressEvent {
    /// A batch of `total` files is starting.
    Started { total: usize },
    /// File `index` (0-based) of `total` completed `stage`.
    Step {
        file: String,
        index: usize,
        total: usize,
        stage: Stage,
        percent: f64,
    },
}

/// Reports batch progress. Implementations write to stderr (human or JSON).
pub trait ProgressReporter: Send + Sync {
    /// Emit a progress event. Called from the pipeline between remote calls.
    fn report(&self, event: ProgressEvent);
}

/// Human-friendly progress on stderr: "extract [2/3] B.txt  extracted  75%".
pub struct StderrProgress;

impl ProgressReporter for StderrProgress {
    fn report(&self, event: ProgressEvent) {
        let line = match &event {
            ProgressEvent::Started { total } => {
                format!("extract  starting  {} file(s)\n", total)
            }
            ProgressEvent::Step {
                file,
                index,
                total,
                stage,
                percent,
            } => format!(
                "extract [{}/{}] {}  {}  {:.0}%\n",
                index + 1,
                total,
                file,
                stage.label(),
                percent
            ),
        };
        let _ = std::io::stderr().lock().write_all(line.as_bytes());
        let _ = std::io::stderr().lock().flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl ProgressReporter for JsonProgress {
    fn report(&self, event: ProgressEvent) {
        let obj = match &event {
            ProgressEvent::Started { total } => serde_json::json!({
                "event": "started",
                "total": total
            }),
            ProgressEvent::Step {
                file,
                index,
                total,
                stage,
                percent,
            } => serde_json::json!({
                "event": "progress",
                "file": file,
                "index": index,
                "total": total,
                "stage": stage,
                "percent": percent
            }),
        };
        if let Ok(line) = serde_json::to_string(&obj) {
            let _ = writeln!(std::io::stderr().lock(), "{}", line);
            let _ = std::io::stderr().lock().flush();
        }
    }
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn report(&self, _event: ProgressEvent) {}
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Default: human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    /// Parse a `--progress` value.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "off" => Some(ProgressMode::Off),
            "human" => Some(ProgressMode::Human),
            "json" => Some(ProgressMode::Json),
            _ => None,
        }
    }

    /// Build a reporter for this mode.
    pub fn reporter(&self) -> Box<dyn ProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}
