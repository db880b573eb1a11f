//! # Extract Flow
//!
//! A sequential multi-document extraction pipeline for a remote
//! instruction-driven extraction service.
//!
//! Each submitted document is pushed through three remote calls (ingest the
//! text, apply an extraction prompt, retrieve the result) and the returned
//! payload is normalized into structured items. A batch of items can then be
//! flattened into a table and exported as CSV.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐   ┌──────────────┐   ┌──────────────┐   ┌──────────┐
//! │  Workflow  │──▶│ Orchestrator │──▶│ RemoteClient │──▶│ Service  │
//! │ (states)   │   │ per file     │   │ ingest/...   │   │ (HTTP)   │
//! └─────┬──────┘   └──────┬───────┘   └──────────────┘   └──────────┘
//!       │                 ▼
//!       │          ┌──────────────┐
//!       └─────────▶│ Export (CSV) │
//!                  └──────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! xflow extract briefs/*.txt --output results.csv
//! xflow analyze brief.txt --prompt "Summarize the key legal arguments"
//! xflow objects dump legal_documents extracted_info
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types and wire bodies |
//! | [`client`] | Remote operations over HTTP |
//! | [`pipeline`] | Per-file batch driver |
//! | [`normalize`] | Payload → structured items |
//! | [`progress`] | Monotone progress accounting and reporters |
//! | [`workflow`] | State machine around a run |
//! | [`export`] | Table flattening and CSV |
//! | [`analyze`] | Single-document analysis |
//! | [`objects`] | Remote object dump and cleanup |
//! | [`notify`] | Lifecycle notifications |
//! | [`request_log`] | Log of dispatched calls and created objects |

pub mod analyze;
pub mod client;
pub mod config;
pub mod error;
pub mod export;
pub mod models;
pub mod normalize;
pub mod notify;
pub mod objects;
pub mod pipeline;
pub mod progress;
pub mod request_log;
pub mod workflow;
