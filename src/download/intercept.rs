//! Single-slot download interception.
//!
//! ```text
//! Idle --arm--> Armed --matching on_created--> Capturing --reissued--> Captured --retrieve--> Idle
//!                 |                                 \--error--> Failed --retrieve--> Idle
//!                 \--timeout--> Idle                (any non-idle phase times out to Idle)
//! ```
//!
//! While capturing, the native download is cancelled and the same URL is
//! requested again. The original's filename event must not rename anything,
//! so the rename target travels in a one-shot `PendingReissue`.
//!
//! Batch capture is a separate mode: downloads are recorded (not reissued)
//! and handed to the batch pipeline, which fetches the bytes itself.
//!
//! Timeouts are checked lazily on every call against the injected clock.

use crate::artifact::ArtifactKind;
use crate::config::TakeoutConfig;
use crate::convert::filename::{choose_extension, sanitize_filename};
use crate::dom::Clock;
use crate::download::{DownloadId, DownloadItem, DownloadManager, DownloadObserver, DownloadRequest, FilenameDecision};
use crate::error::{Result, TakeoutError};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// A native download that was cancelled and reissued under our name
#[derive(Debug, Clone, PartialEq)]
pub struct Capture {
    pub original_id: DownloadId,
    pub download_id: DownloadId,
    pub filename: String,
    pub url: String,
    pub mime: Option<String>,
}

/// Result of [`Interceptor::retrieve`]
#[derive(Debug, Clone, PartialEq)]
pub enum Retrieval {
    Captured(Capture),
    Failed(String),
    NotCaptured,
}

/// A download recorded during batch capture
#[derive(Debug, Clone, PartialEq)]
pub struct BatchCapture {
    pub download_id: DownloadId,
    pub url: String,
    pub mime: Option<String>,

    /// Browser-suggested name, once known
    pub filename: Option<String>,

    /// Pending name the batch set for this item
    pub name: String,
    pub kind: Option<ArtifactKind>,
}

#[derive(Debug, Clone)]
enum Phase {
    Idle,
    Armed {
        name: String,
        kind: Option<ArtifactKind>,
    },
    Capturing {
        original: DownloadId,
        filename: String,
    },
    Captured(Capture),
    Failed(String),
}

impl Phase {
    fn label(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Armed { .. } => "armed",
            Self::Capturing { .. } => "capturing",
            Self::Captured(_) => "captured",
            Self::Failed(_) => "failed",
        }
    }
}

#[derive(Debug)]
struct PendingReissue {
    original_id: DownloadId,
    filename: String,
    deadline: Instant,
}

#[derive(Debug)]
struct PendingName {
    name: String,
    kind: Option<ArtifactKind>,
    deadline: Instant,
}

#[derive(Debug, Default)]
struct BatchSlot {
    pending: Option<PendingName>,
    capture: Option<BatchCapture>,
}

#[derive(Debug)]
struct State {
    phase: Phase,
    deadline: Option<Instant>,
    reissue: Option<PendingReissue>,
    batch: Option<BatchSlot>,
}

impl State {
    fn reset(&mut self) {
        self.phase = Phase::Idle;
        self.deadline = None;
    }

    fn expire(&mut self, now: Instant) {
        if self.deadline.is_some_and(|deadline| now >= deadline) {
            log::debug!("Interception {} timed out, back to idle", self.phase.label());
            self.reset();
        }
        if self.reissue.as_ref().is_some_and(|r| now >= r.deadline) {
            log::debug!("Dropping stale reissue tag");
            self.reissue = None;
        }
        if let Some(batch) = &mut self.batch {
            if batch.pending.as_ref().is_some_and(|p| now >= p.deadline) {
                log::debug!("Dropping stale batch pending name");
                batch.pending = None;
            }
        }
    }
}

/// Download interception state machine; one per session
pub struct Interceptor {
    state: Mutex<State>,
    downloads: Arc<dyn DownloadManager>,
    clock: Arc<dyn Clock>,
    source_hosts: Vec<String>,
    arm_timeout: Duration,
    pending_timeout: Duration,
    save_as: bool,
}

impl Interceptor {
    pub fn new(downloads: Arc<dyn DownloadManager>, clock: Arc<dyn Clock>, config: &TakeoutConfig) -> Self {
        Self {
            state: Mutex::new(State {
                phase: Phase::Idle,
                deadline: None,
                reissue: None,
                batch: None,
            }),
            downloads,
            clock,
            source_hosts: config.source_hosts.clone(),
            arm_timeout: config.intercept_timeout,
            pending_timeout: config.pending_name_timeout,
            save_as: config.save_as,
        }
    }

    /// Expect a native download for `name`.
    ///
    /// Replaces any previous single-intercept state. Fails while a batch
    /// capture is running.
    pub fn arm(&self, name: &str, kind: Option<ArtifactKind>) -> Result<()> {
        let now = self.clock.now();
        let mut state = self.state.lock();
        state.expire(now);
        if state.batch.is_some() {
            return Err(TakeoutError::DownloadInterception(
                "a batch capture is in progress".to_string(),
            ));
        }
        log::debug!("Interception armed for '{}'", name);
        state.phase = Phase::Armed {
            name: name.to_string(),
            kind,
        };
        state.deadline = Some(now + self.arm_timeout);
        state.reissue = None;
        Ok(())
    }

    /// Drop an armed interception that is no longer wanted
    pub fn disarm(&self) {
        let mut state = self.state.lock();
        if !matches!(state.phase, Phase::Idle) {
            log::debug!("Interception disarmed from {}", state.phase.label());
        }
        state.reset();
        state.reissue = None;
    }

    /// Take the result of the last interception; clears it
    pub fn retrieve(&self) -> Retrieval {
        let now = self.clock.now();
        let mut state = self.state.lock();
        state.expire(now);
        match std::mem::replace(&mut state.phase, Phase::Idle) {
            Phase::Captured(capture) => {
                state.deadline = None;
                Retrieval::Captured(capture)
            }
            Phase::Failed(reason) => {
                state.deadline = None;
                Retrieval::Failed(reason)
            }
            other => {
                state.phase = other;
                Retrieval::NotCaptured
            }
        }
    }

    /// Current phase name, `"batch"` while a batch capture runs
    pub fn state_label(&self) -> &'static str {
        let now = self.clock.now();
        let mut state = self.state.lock();
        state.expire(now);
        if state.batch.is_some() {
            "batch"
        } else {
            state.phase.label()
        }
    }

    /// Enter batch capture mode; `false` when a batch is already active
    pub fn begin_batch(&self) -> bool {
        let mut state = self.state.lock();
        if state.batch.is_some() {
            log::debug!("Batch capture already active");
            return false;
        }
        state.reset();
        state.reissue = None;
        state.batch = Some(BatchSlot::default());
        log::debug!("Batch capture started");
        true
    }

    pub fn end_batch(&self) {
        let mut state = self.state.lock();
        if state.batch.take().is_some() {
            log::debug!("Batch capture ended");
        }
    }

    pub fn batch_active(&self) -> bool {
        self.state.lock().batch.is_some()
    }

    /// Name the next batch download; clears the previous item's capture
    pub fn set_batch_pending(&self, name: &str, kind: Option<ArtifactKind>) -> Result<()> {
        let now = self.clock.now();
        let mut state = self.state.lock();
        let batch = state
            .batch
            .as_mut()
            .ok_or_else(|| TakeoutError::DownloadInterception("no batch capture is active".to_string()))?;
        batch.pending = Some(PendingName {
            name: name.to_string(),
            kind,
            deadline: now + self.pending_timeout,
        });
        batch.capture = None;
        Ok(())
    }

    /// Take the download recorded for the pending batch item
    pub fn take_batch_capture(&self) -> Option<BatchCapture> {
        let now = self.clock.now();
        let mut state = self.state.lock();
        state.expire(now);
        state.batch.as_mut().and_then(|batch| batch.capture.take())
    }

    fn is_source_download(&self, item: &DownloadItem) -> bool {
        let matches = |value: &str| self.source_hosts.iter().any(|host| value.contains(host.as_str()));
        matches(&item.url) || item.referrer.as_deref().is_some_and(matches)
    }

    /// Cancel the native download and request the URL again.
    ///
    /// Runs without the state lock: the capability raises events for the
    /// reissued download synchronously.
    fn reissue(&self, item: &DownloadItem) {
        let result = self
            .downloads
            .cancel(&item.id)
            .and_then(|_| self.downloads.create(DownloadRequest::new(&item.url).save_as(self.save_as)));

        let mut state = self.state.lock();
        let capturing = match &state.phase {
            Phase::Capturing { original, filename } if *original == item.id => Some(filename.clone()),
            _ => None,
        };
        let still_capturing = capturing.is_some();
        match result {
            Ok(download_id) if still_capturing => {
                let filename = capturing.unwrap_or_default();
                log::info!("Captured download {} as {}", item.id, download_id);
                state.phase = Phase::Captured(Capture {
                    original_id: item.id.clone(),
                    download_id,
                    filename,
                    url: item.url.clone(),
                    mime: item.mime.clone(),
                });
            }
            Ok(download_id) => {
                log::debug!("Reissued download {} after interception was reset", download_id);
            }
            Err(e) => {
                log::warn!("Could not reissue download {}: {}", item.id, e);
                state.reissue = None;
                if still_capturing {
                    state.phase = Phase::Failed(e.to_string());
                }
            }
        }
        let erase = matches!(state.phase, Phase::Captured(_));
        drop(state);

        if erase {
            if let Err(e) = self.downloads.erase(&item.id) {
                log::debug!("Could not erase cancelled download {}: {}", item.id, e);
            }
        }
    }
}

impl DownloadObserver for Interceptor {
    fn on_created(&self, item: &DownloadItem) {
        let now = self.clock.now();
        let capture = {
            let mut state = self.state.lock();
            state.expire(now);

            if let Some(batch) = &mut state.batch {
                let pending = batch.pending.as_ref();
                if batch.capture.is_none() && self.is_source_download(item) {
                    if let Some(pending) = pending {
                        log::debug!("Batch recorded download {} for '{}'", item.id, pending.name);
                        batch.capture = Some(BatchCapture {
                            download_id: item.id.clone(),
                            url: item.url.clone(),
                            mime: item.mime.clone(),
                            filename: item.filename.clone(),
                            name: pending.name.clone(),
                            kind: pending.kind,
                        });
                    }
                }
                false
            } else {
                let armed = match &state.phase {
                    Phase::Armed { name, kind } => Some((name.clone(), *kind)),
                    _ => None,
                };
                match armed {
                    Some((name, kind)) if self.is_source_download(item) => {
                        let filename = format!(
                            "{}{}",
                            sanitize_filename(&name),
                            choose_extension(item.filename.as_deref(), item.mime.as_deref(), kind)
                        );
                        log::debug!("Capturing download {} as '{}'", item.id, filename);
                        state.reissue = Some(PendingReissue {
                            original_id: item.id.clone(),
                            filename: filename.clone(),
                            deadline: now + self.pending_timeout,
                        });
                        state.phase = Phase::Capturing {
                            original: item.id.clone(),
                            filename,
                        };
                        true
                    }
                    Some(_) => {
                        log::debug!("Ignoring unrelated download {}", item.url);
                        false
                    }
                    None => false,
                }
            }
        };

        if capture {
            self.reissue(item);
        }
    }

    fn on_determining_filename(&self, item: &DownloadItem) -> FilenameDecision {
        let now = self.clock.now();
        let mut state = self.state.lock();
        state.expire(now);

        match state.reissue.as_ref().map(|r| r.original_id == item.id) {
            Some(true) => {
                log::debug!("Leaving name of cancelled original {} alone", item.id);
                return FilenameDecision::Default;
            }
            Some(false) => {
                if let Some(reissue) = state.reissue.take() {
                    log::debug!("Renaming download {} to '{}'", item.id, reissue.filename);
                    return FilenameDecision::Suggest(reissue.filename);
                }
            }
            None => {}
        }

        if let Some(capture) = state.batch.as_mut().and_then(|b| b.capture.as_mut()) {
            if capture.download_id == item.id && capture.filename.is_none() {
                capture.filename = item.filename.clone();
            }
        }
        FilenameDecision::Default
    }
}
