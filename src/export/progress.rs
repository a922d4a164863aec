//! Cancellation flag, batch status and the in-page progress overlay.

use crate::dom::Page;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Shared cooperative cancellation flag.
///
/// Checked between items only; an item already in progress runs to the end.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Single slot held by the running multi-item export.
///
/// Claimed before the page lock is taken, so a second batch returns at once
/// instead of queueing behind the first.
#[derive(Debug, Clone, Default)]
pub struct BatchLatch(Arc<AtomicBool>);

impl BatchLatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// `None` while another batch holds the slot
    pub fn try_claim(&self) -> Option<BatchClaim<'_>> {
        self.0
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| BatchClaim(&self.0))
    }

    pub fn is_held(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Releases the [`BatchLatch`] when dropped
#[derive(Debug)]
pub struct BatchClaim<'a>(&'a AtomicBool);

impl Drop for BatchClaim<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// What the running (or last) export is doing
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchStatus {
    pub running: bool,
    pub operation: String,
    pub completed: usize,
    pub total: usize,
    pub current: Option<String>,
    /// Short user-facing status line
    pub message: String,
}

/// Shared handle to the status of the current export
#[derive(Debug, Clone, Default)]
pub struct StatusBoard(Arc<Mutex<BatchStatus>>);

impl StatusBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> BatchStatus {
        self.0.lock().clone()
    }

    pub fn update(&self, f: impl FnOnce(&mut BatchStatus)) {
        f(&mut self.0.lock());
    }
}

/// Reports export progress to the status board and, when enabled, the
/// page overlay. Overlay failures never interrupt an export.
pub struct Progress<'a> {
    page: &'a dyn Page,
    board: &'a StatusBoard,
    cancel: &'a CancelFlag,
    overlay: bool,
}

impl<'a> Progress<'a> {
    pub fn start(
        page: &'a dyn Page,
        board: &'a StatusBoard,
        cancel: &'a CancelFlag,
        overlay: bool,
        operation: &str,
        total: usize,
    ) -> Self {
        cancel.reset();
        let message = format!("{}: 0 of {}", operation, total);
        board.update(|status| {
            *status = BatchStatus {
                running: true,
                operation: operation.to_string(),
                completed: 0,
                total,
                current: None,
                message: message.clone(),
            }
        });
        let progress = Self {
            page,
            board,
            cancel,
            overlay,
        };
        if overlay {
            if let Err(e) = page.show_overlay(&message) {
                log::debug!("Overlay unavailable: {}", e);
            }
        }
        progress
    }

    /// True once either the flag or the overlay's cancel button was used
    pub fn cancelled(&self) -> bool {
        if self.cancel.is_cancelled() {
            return true;
        }
        if self.overlay && self.page.overlay_cancelled().unwrap_or(false) {
            self.cancel.cancel();
            return true;
        }
        false
    }

    /// Item `index` (zero-based) is about to start
    pub fn item(&self, index: usize, title: &str) {
        let mut message = String::new();
        let mut fraction = 0.0;
        self.board.update(|status| {
            status.current = Some(title.to_string());
            status.message = format!("{} {} of {}: {}", status.operation, index + 1, status.total, title);
            message = status.message.clone();
            fraction = index as f64 / status.total.max(1) as f64;
        });
        self.show(&message, fraction);
    }

    /// One item finished
    pub fn done(&self) {
        self.board.update(|status| status.completed += 1);
    }

    /// Final status line; hides the overlay
    pub fn finish(self, message: &str) {
        self.board.update(|status| {
            status.running = false;
            status.current = None;
            status.message = message.to_string();
        });
        if self.overlay {
            if let Err(e) = self.page.hide_overlay() {
                log::debug!("Could not hide overlay: {}", e);
            }
        }
    }

    fn show(&self, message: &str, fraction: f64) {
        if !self.overlay {
            return;
        }
        if let Err(e) = self.page.update_overlay(message, Some(fraction)) {
            log::debug!("Overlay update failed: {}", e);
        }
    }
}
