//! # Extract Flow CLI (`xflow`)
//!
//! Runs extraction batches and single-document analyses against the
//! configured extraction service, and inspects or removes the objects those
//! runs leave behind.
//!
//! ## Usage
//!
//! ```bash
//! xflow --config ./config/xflow.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `xflow extract <files...>` | Extract structured data from each file and export CSV |
//! | `xflow analyze <file> --prompt <text>` | Analyze one document with a free-form instruction |
//! | `xflow suggestions` | Print the canned analysis instructions |
//! | `xflow objects dump <names...>` | Print the raw text of remote objects |
//! | `xflow objects delete <names...>` | Delete remote objects |
//!
//! Logs and progress go to stderr; results go to stdout.
//!
//! ## Exit codes
//!
//! | Code | Meaning |
//! |------|---------|
//! | 0 | success |
//! | 1 | configuration, I/O, or other error |
//! | 2 | input rejected before any remote call |
//! | 3 | a remote step failed |
//! | 130 | cancelled |

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use extract_flow::analyze::{analyze_document, PROMPT_SUGGESTIONS};
use extract_flow::client::{HttpService, RemoteClient};
use extract_flow::config::{self, Config};
use extract_flow::error::{ErrorKind, PipelineError, WorkflowError};
use extract_flow::models::{BatchResult, SourceFile};
use extract_flow::notify::TracingSink;
use extract_flow::objects::{cleanup_created, delete_objects, dump_objects};
use extract_flow::pipeline::Orchestrator;
use extract_flow::progress::ProgressMode;
use extract_flow::request_log::RequestLog;
use extract_flow::workflow::Workflow;

/// Extract Flow: run documents through a remote extraction service and
/// export the results as CSV.
#[derive(Parser)]
#[command(
    name = "xflow",
    about = "Extract Flow: multi-document extraction and CSV export",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/xflow.toml")]
    config: PathBuf,

    /// Service base URL. Overrides `[service].base_url`; when the config
    /// file does not exist, all other settings take their defaults.
    #[arg(long, global = true)]
    base_url: Option<String>,

    /// Log at debug level (`RUST_LOG` takes precedence).
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract structured data from files, in order, and export CSV.
    ///
    /// Processing stops at the first file whose remote step fails. Press
    /// Ctrl-C to cancel; the request in flight finishes but its result is
    /// discarded.
    Extract {
        /// Files to process.
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Where to write the CSV export (`-` for stdout). Defaults to
        /// `[export].file_name`.
        #[arg(long, short)]
        output: Option<PathBuf>,

        /// Progress output on stderr: `off`, `human`, or `json`.
        /// Defaults to `human` when stderr is a terminal.
        #[arg(long)]
        progress: Option<String>,

        /// Delete the remote objects this run created once it ends,
        /// whether it succeeded or not.
        #[arg(long)]
        cleanup: bool,
    },

    /// Analyze one document with a free-form instruction.
    Analyze {
        file: PathBuf,

        /// Instruction to apply. See `xflow suggestions`.
        #[arg(long, short)]
        prompt: String,
    },

    /// Print the canned analysis instructions.
    Suggestions,

    /// Inspect or delete objects held by the service.
    Objects {
        #[command(subcommand)]
        action: ObjectsAction,
    },
}

#[derive(Subcommand)]
enum ObjectsAction {
    /// Print the raw text of each object.
    Dump {
        #[arg(required = true)]
        names: Vec<String>,
    },
    /// Delete each object. Every name is attempted.
    Delete {
        #[arg(required = true)]
        names: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::from(exit_code(&e))
        }
    }
}

fn exit_code(err: &anyhow::Error) -> u8 {
    let kind = match err.downcast_ref::<WorkflowError>() {
        Some(WorkflowError::Pipeline(e)) => Some(e.kind()),
        _ => err.downcast_ref::<PipelineError>().map(PipelineError::kind),
    };
    match kind {
        Some(ErrorKind::Validation) => 2,
        Some(ErrorKind::Transport) => 3,
        Some(ErrorKind::Cancelled) => 130,
        None => 1,
    }
}

async fn run(cli: Cli) -> Result<()> {
    // Commands that don't require config
    if let Commands::Suggestions = cli.command {
        for (i, prompt) in PROMPT_SUGGESTIONS.iter().enumerate() {
            println!("{}. {}", i + 1, prompt);
        }
        return Ok(());
    }

    let cfg = resolve_config(&cli.config, cli.base_url.as_deref())?;
    let service = HttpService::new(&cfg.service)?;
    let log = Arc::new(RequestLog::new());
    let client = RemoteClient::new(Arc::new(service), log.clone());

    match cli.command {
        Commands::Extract {
            files,
            output,
            progress,
            cleanup,
        } => {
            let mode = match progress.as_deref() {
                Some(s) => ProgressMode::parse(s).ok_or_else(|| {
                    anyhow::anyhow!("Unknown progress mode '{}'. Use off, human, or json.", s)
                })?,
                None => ProgressMode::default_for_tty(),
            };
            let cleanup = cleanup.then_some(log.as_ref());
            run_extract(&cfg, client, &files, output, mode, cleanup).await?;
        }
        Commands::Analyze { file, prompt } => {
            let source = read_source(&file)?;
            let report =
                analyze_document(&client, &cfg.analysis, &source, &prompt, &TracingSink).await?;
            println!("{}", report.summary);
        }
        Commands::Objects { action } => match action {
            ObjectsAction::Dump { names } => {
                for dump in dump_objects(&client, &names).await {
                    println!("== {} ==", dump.name);
                    println!("{}", dump.content);
                }
            }
            ObjectsAction::Delete { names } => {
                let summary = delete_objects(&client, &names).await;
                for name in &summary.deleted {
                    println!("deleted {}", name);
                }
                for (name, error) in &summary.failed {
                    eprintln!("failed to delete {}: {}", name, error);
                }
                if !summary.is_clean() {
                    anyhow::bail!(
                        "{} of {} deletes failed",
                        summary.failed.len(),
                        names.len()
                    );
                }
            }
        },
        Commands::Suggestions => {
            // Handled above (before config loading)
        }
    }

    Ok(())
}

async fn run_extract(
    cfg: &Config,
    client: RemoteClient,
    paths: &[PathBuf],
    output: Option<PathBuf>,
    mode: ProgressMode,
    cleanup: Option<&RequestLog>,
) -> Result<()> {
    let files = paths
        .iter()
        .map(|p| read_source(p))
        .collect::<Result<Vec<_>>>()?;

    let workflow = Workflow::new(Orchestrator::new(client.clone(), cfg.extraction.clone()))
        .with_progress(Arc::from(mode.reporter()))
        .with_notifier(Arc::new(TracingSink));

    let submit = workflow.submit(files);
    tokio::pin!(submit);
    let outcome = tokio::select! {
        r = &mut submit => r,
        _ = tokio::signal::ctrl_c() => {
            eprintln!("Cancelling; waiting for the request in flight...");
            workflow.cancel()?;
            submit.await
        }
    };

    if let Some(log) = cleanup {
        let summary = cleanup_created(&client, log).await;
        eprintln!("Cleaned up {} object(s)", summary.deleted.len());
        for (name, error) in &summary.failed {
            eprintln!("failed to delete {}: {}", name, error);
        }
    }
    let batch = outcome?;

    match output.as_deref() {
        Some(p) if p == Path::new("-") => {
            if let Some(csv) = workflow.export_csv()? {
                println!("{}", csv);
            }
        }
        other => {
            print_summary(&batch);
            let path = other
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from(&cfg.export.file_name));
            if workflow.export_to(&path)? {
                println!("Wrote {} row(s) to {}", batch.item_count(), path.display());
            }
        }
    }
    Ok(())
}

fn print_summary(batch: &BatchResult) {
    println!("Processed {} file(s):", batch.len());
    for record in batch.records() {
        let fallbacks = record.items.iter().filter(|i| i.is_fallback()).count();
        if fallbacks > 0 {
            println!(
                "  {}  {} item(s), {} unstructured",
                record.file_name,
                record.items.len(),
                fallbacks
            );
        } else {
            println!("  {}  {} item(s)", record.file_name, record.items.len());
        }
    }
}

/// Load the config file, or fall back to defaults when only a base URL is given.
fn resolve_config(path: &Path, base_url: Option<&str>) -> Result<Config> {
    match base_url {
        Some(url) if !path.exists() => config::validate(Config::minimal(url)),
        Some(url) => {
            let mut cfg = config::load_config(path)?;
            cfg.service.base_url = url.to_string();
            config::validate(cfg)
        }
        None => config::load_config(path),
    }
}

fn read_source(path: &Path) -> Result<SourceFile> {
    let bytes =
        std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    Ok(SourceFile::from_bytes(name, &bytes))
}

/// Logs go to stderr so stdout stays clean for results.
fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(format!("extract_flow={level},xflow={level}"))
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
