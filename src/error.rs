use thiserror::Error;

/// Errors produced while driving the notebook page, extracting content,
/// converting it, or delivering files.
#[derive(Debug, Error)]
pub enum TakeoutError {
    /// Browser process could not be started
    #[error("Failed to launch browser: {0}")]
    LaunchFailed(String),

    /// Could not attach to a running browser
    #[error("Failed to connect to browser: {0}")]
    ConnectionFailed(String),

    /// Tab lookup or tab-level command failed
    #[error("Tab operation failed: {0}")]
    TabOperationFailed(String),

    #[error("Navigation failed: {0}")]
    NavigationFailed(String),

    /// Script evaluation inside the page failed or returned garbage
    #[error("JavaScript evaluation failed: {0}")]
    EvaluationFailed(String),

    #[error("Invalid selector '{0}'")]
    InvalidSelector(String),

    /// An awaited DOM state never appeared
    #[error("Timed out after {waited_ms}ms waiting for {what}")]
    Timeout { what: String, waited_ms: u64 },

    /// An expected element or index is missing
    #[error("Not found: {0}")]
    NotFound(String),

    /// Content was located but is empty or too small to be usable
    #[error("Extraction produced no usable content: {0}")]
    ExtractionEmpty(String),

    /// A native download could not be cancelled, re-issued or captured
    #[error("Download interception failed: {0}")]
    DownloadInterception(String),

    /// The viewer could not be confirmed closed after every fallback
    #[error("Viewer did not close: {0}")]
    PanelCloseFailure(String),

    #[error("Fetch failed: {0}")]
    Fetch(String),

    /// Archive serialization failed; aborts a whole batch
    #[error("Archive error: {0}")]
    Archive(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Tool '{tool}' failed: {reason}")]
    ToolExecutionFailed { tool: String, reason: String },
}

impl TakeoutError {
    /// Build a timeout error for a wait that ran for `waited`.
    pub fn timeout(what: impl Into<String>, waited: std::time::Duration) -> Self {
        Self::Timeout {
            what: what.into(),
            waited_ms: waited.as_millis() as u64,
        }
    }

    /// Whether the failure only affects the current item.
    ///
    /// Recoverable errors are recorded at the batch/export loop boundary and
    /// the loop moves on; everything else aborts the operation in progress.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Timeout { .. }
                | Self::NotFound(_)
                | Self::ExtractionEmpty(_)
                | Self::PanelCloseFailure(_)
                | Self::DownloadInterception(_)
                | Self::Fetch(_)
        )
    }
}

/// Result type alias for takeout operations
pub type Result<T> = std::result::Result<T, TakeoutError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_timeout_message() {
        let err = TakeoutError::timeout("report-viewer", Duration::from_millis(5000));
        assert_eq!(err.to_string(), "Timed out after 5000ms waiting for report-viewer");
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_archive_is_fatal() {
        let err = TakeoutError::Archive("too many entries".to_string());
        assert!(!err.is_recoverable());
    }
}
