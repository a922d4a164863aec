//! Multi-item exports: zipped or sequential artifact batches, notes and
//! sources. Items run strictly one after another; a failing item is
//! recorded and the loop moves on.

pub mod archive;
pub mod batch;
pub mod notes;
pub mod progress;

pub use archive::{Archive, crc32};
pub use progress::{BatchClaim, BatchLatch, BatchStatus, CancelFlag, Progress, StatusBoard};

use crate::artifact::Artifact;
use crate::convert::timestamp_slug;
use crate::download::fetch::data_url;
use crate::download::{DownloadManager, DownloadOrchestrator, DownloadRequest, Fetcher, Interceptor};
use crate::error::{Result, TakeoutError};
use crate::extract::PageContext;
use chrono::Utc;
use serde::{Deserialize, Serialize};

/// An item that could not be exported, with a short reason
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemFailure {
    pub title: String,
    pub reason: String,
}

impl ItemFailure {
    fn new(artifact: &Artifact, error: &TakeoutError) -> Self {
        if error.is_recoverable() {
            log::warn!("Skipping '{}': {}", artifact.title, error);
        } else {
            log::error!("Export of '{}' failed: {}", artifact.title, error);
        }
        Self {
            title: artifact.title.clone(),
            reason: error.to_string(),
        }
    }
}

/// What an export produced
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExportSummary {
    /// Items that made it into a file
    pub exported: usize,
    pub total: usize,

    /// Names of the files handed to the download capability
    pub files: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<ItemFailure>,

    pub cancelled: bool,

    /// Short user-facing status line
    pub status: String,
}

impl ExportSummary {
    /// Answer for a batch started while another one runs
    pub fn already_running(total: usize) -> Self {
        Self::skipped(total, "A batch export is already running")
    }

    fn skipped(total: usize, status: &str) -> Self {
        Self {
            total,
            status: status.to_string(),
            ..Default::default()
        }
    }
}

/// Runs multi-item exports against one page
pub struct Exporter<'a> {
    orchestrator: DownloadOrchestrator<'a>,
    downloads: &'a dyn DownloadManager,
    interceptor: &'a Interceptor,
    fetcher: &'a dyn Fetcher,
    cancel: &'a CancelFlag,
    status: &'a StatusBoard,
    overlay: bool,
}

impl<'a> Exporter<'a> {
    pub fn new(
        ctx: PageContext<'a>,
        downloads: &'a dyn DownloadManager,
        interceptor: &'a Interceptor,
        fetcher: &'a dyn Fetcher,
        cancel: &'a CancelFlag,
        status: &'a StatusBoard,
    ) -> Self {
        Self {
            orchestrator: DownloadOrchestrator::new(ctx, downloads, interceptor),
            downloads,
            interceptor,
            fetcher,
            cancel,
            status,
            overlay: true,
        }
    }

    /// Builder method: show the in-page progress overlay (default on)
    pub fn with_overlay(mut self, overlay: bool) -> Self {
        self.overlay = overlay;
        self
    }

    fn ctx(&self) -> &PageContext<'a> {
        self.orchestrator.context()
    }

    fn progress(&self, operation: &str, total: usize) -> Progress<'_> {
        Progress::start(self.ctx().page, self.status, self.cancel, self.overlay, operation, total)
    }

    /// Pause before every item but the first
    fn between_items(&self, position: usize, delay: std::time::Duration) {
        if position > 0 {
            self.ctx().clock.sleep(delay);
        }
    }

    /// Hand a finished file to the download capability
    fn save(&self, filename: &str, mime: &str, bytes: &[u8]) -> Result<String> {
        let request = DownloadRequest::new(data_url(mime, bytes))
            .filename(filename)
            .save_as(self.ctx().config.save_as);
        let id = self.downloads.create(request)?;
        let saved = self.downloads.saved_name(&id).unwrap_or_else(|| filename.to_string());
        log::info!("Saved {} ({} bytes)", saved, bytes.len());
        Ok(saved)
    }

    /// Serialize `archive` and save it as `<prefix>-<timestamp>.zip`.
    ///
    /// Archive errors abort the export.
    fn save_archive(&self, prefix: &str, archive: &Archive) -> Result<String> {
        let bytes = archive.to_bytes()?;
        let name = format!("{}-{}.zip", prefix, timestamp_slug(Utc::now()));
        self.save(&name, "application/zip", &bytes)
    }
}

/// Status line shared by the export flavours
fn finish_status(exported: usize, total: usize, cancelled: bool, file: Option<&str>) -> String {
    let head = if cancelled { "Cancelled: exported" } else { "Exported" };
    match file {
        Some(file) => format!("{} {} of {} items to {}", head, exported, total, file),
        None => format!("{} {} of {} items", head, exported, total),
    }
}
