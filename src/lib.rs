//! # notebook-takeout
//!
//! Exports NotebookLM notebooks through the Chrome DevTools Protocol (CDP):
//! notes with their citations, mindmaps, reports, data tables and sources are
//! read from the page and rewritten as Markdown, CSV, SVG and ZIP files;
//! audio, slides and infographics are captured from the app's own downloads.
//!
//! ## MCP Server
//!
//! The recommended way to drive exports is the Model Context Protocol (MCP)
//! server, which exposes every export operation as a tool:
//!
//! ```bash
//! # Launch Chrome with a signed-in profile and open a notebook
//! cargo run --features mcp-server --bin takeout-mcp -- --headed \
//!     --user-data-dir ~/.config/takeout-profile --url https://notebooklm.google.com/notebook/<id>
//!
//! # Attach to a Chrome started with --remote-debugging-port
//! cargo run --features mcp-server --bin takeout-mcp -- --ws-endpoint ws://127.0.0.1:9222/devtools/browser/<id>
//! ```
//!
//! ## Library Usage
//!
//! ```rust,no_run
//! use notebook_takeout::{LaunchOptions, TakeoutConfig, TakeoutSession};
//! use serde_json::json;
//!
//! # fn main() -> notebook_takeout::Result<()> {
//! let session = TakeoutSession::launch(
//!     LaunchOptions::new().headless(false).start_url("https://notebooklm.google.com/"),
//!     TakeoutConfig::default().with_download_dir("exports"),
//! )?;
//!
//! // List the artifact library, then bundle everything into one archive
//! let scan = session.execute_tool("scan_artifacts", json!({}))?;
//! println!("{:?}", scan.data);
//! session.execute_tool("download_all", json!({"zip": true}))?;
//!
//! // Single items go straight through the orchestrator
//! let note = notebook_takeout::extract::extract_note(
//!     &session.context(),
//!     &notebook_takeout::ItemTarget::by_title("Study guide"),
//! )?;
//! # let _ = note;
//! # Ok(())
//! # }
//! ```
//!
//! ## Module Overview
//!
//! - [`browser`]: Chrome launch/attach and tab selection
//! - [`dom`]: the [`Page`] abstraction, its CDP and in-memory implementations, waits
//! - [`extract`]: scanning, viewers, citations, mindmaps, notes, reports, tables, sources
//! - [`convert`]: HTML to Markdown/CSV, standalone SVG, file names
//! - [`download`]: download capability, interception state machine, retry, orchestrator
//! - [`export`]: ZIP archives, "download all", notes and sources export, progress
//! - [`store`]: persisted settings and capture tally
//! - [`session`]: [`TakeoutSession`], which wires all of the above to one tab
//! - [`tools`]: typed commands over a session
//! - [`mcp`]: **Model Context Protocol server** (requires `mcp-handler` feature)

pub mod artifact;
pub mod browser;
pub mod config;
pub mod convert;
pub mod dom;
pub mod download;
pub mod error;
pub mod export;
pub mod extract;
pub mod session;
pub mod store;
pub mod tools;

#[cfg(feature = "mcp-handler")]
pub mod mcp;

pub use artifact::{Artifact, ArtifactKind, Citation, ExtractionResult, SourceGuide};
pub use browser::{BrowserSession, ConnectionOptions, LaunchOptions};
pub use config::TakeoutConfig;
pub use dom::{ChromePage, MemoryPage, Page};
pub use download::{DownloadOptions, DownloadOrchestrator, DownloadReport, Interceptor};
pub use error::{Result, TakeoutError};
pub use export::{ExportSummary, Exporter};
pub use extract::ItemTarget;
pub use session::TakeoutSession;
pub use store::{LocalStore, Settings};
pub use tools::{Tool, ToolContext, ToolRegistry, ToolResult};

#[cfg(feature = "mcp-handler")]
pub use mcp::TakeoutServer;
#[cfg(feature = "mcp-handler")]
pub use rmcp::ServiceExt;
