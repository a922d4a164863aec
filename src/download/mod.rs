//! Download capability and the orchestration built on it
//!
//! - [`DownloadManager`] / [`DownloadObserver`]: the download capability and its events
//! - [`fs::FsDownloads`]: writes finished files into the download directory
//! - [`chrome::ChromeDownloadBridge`]: turns Chrome's native downloads into events
//! - [`fetch`]: direct HTTP fetch and `data:` URL decoding
//! - [`intercept::Interceptor`]: single-slot interception state machine
//! - [`retry`]: exponential backoff
//! - [`orchestrator::DownloadOrchestrator`]: strategy selection per artifact kind

pub mod chrome;
pub mod fetch;
pub mod fs;
pub mod intercept;
pub mod orchestrator;
pub mod retry;

pub use chrome::{ChromeCookies, ChromeDownloadBridge};
pub use fetch::{CookieSource, Fetcher, HttpFetcher, StaticFetcher, data_url, decode_data_url};
pub use fs::FsDownloads;
pub use intercept::{BatchCapture, Capture, Interceptor, Retrieval};
pub use orchestrator::{DownloadOptions, DownloadOrchestrator, DownloadReport};
pub use retry::{Outcome, RetryPolicy};

use crate::error::Result;
use serde::{Deserialize, Serialize};

/// Identifier assigned by the download capability
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DownloadId(pub String);

impl DownloadId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DownloadId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A download as reported by the capability's events
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadItem {
    pub id: DownloadId,
    pub url: String,
    pub referrer: Option<String>,

    /// File name suggested by the browser or the request
    pub filename: Option<String>,
    pub mime: Option<String>,
}

impl DownloadItem {
    pub fn new(id: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: DownloadId::new(id),
            url: url.into(),
            referrer: None,
            filename: None,
            mime: None,
        }
    }

    /// Builder method: set the suggested file name
    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }

    /// Builder method: set the MIME type
    pub fn with_mime(mut self, mime: impl Into<String>) -> Self {
        self.mime = Some(mime.into());
        self
    }

    /// Builder method: set the referrer
    pub fn with_referrer(mut self, referrer: impl Into<String>) -> Self {
        self.referrer = Some(referrer.into());
        self
    }
}

/// Answer to a filename-determination event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilenameDecision {
    /// Rename the download
    Suggest(String),
    /// Let the default name stand
    Default,
}

/// Receives the capability's events.
///
/// Events may arrive on any thread; implementations must not call back into
/// the capability while holding their own locks.
pub trait DownloadObserver: Send + Sync {
    fn on_created(&self, item: &DownloadItem);

    fn on_determining_filename(&self, item: &DownloadItem) -> FilenameDecision;
}

/// Parameters of [`DownloadManager::create`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadRequest {
    pub url: String,
    pub filename: Option<String>,
    pub save_as: bool,
}

impl DownloadRequest {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            filename: None,
            save_as: false,
        }
    }

    /// Builder method: request a specific file name
    pub fn filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }

    /// Builder method: ask for a save dialog
    pub fn save_as(mut self, save_as: bool) -> Self {
        self.save_as = save_as;
        self
    }
}

/// The download capability
pub trait DownloadManager: Send + Sync {
    fn create(&self, request: DownloadRequest) -> Result<DownloadId>;

    fn cancel(&self, id: &DownloadId) -> Result<()>;

    /// Remove the entry from the download history
    fn erase(&self, id: &DownloadId) -> Result<()>;

    /// File name a finished download was saved under, when known
    fn saved_name(&self, _id: &DownloadId) -> Option<String> {
        None
    }
}
