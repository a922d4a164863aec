//! Extraction and download tuning.
//!
//! Every delay and timeout the pipeline uses lives here so tests can shrink
//! them and deployments can override them from a JSON file.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Configuration for extraction, interception and export
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TakeoutConfig {
    /// Host fragments identifying downloads that belong to the notebook app
    pub source_hosts: Vec<String>,

    /// Directory receiving finished files
    pub download_dir: PathBuf,

    /// Ask the download manager to prompt for a location
    pub save_as: bool,

    /// How long an armed interception waits for a native download
    #[serde(with = "millis")]
    pub intercept_timeout: Duration,

    /// How long a pending batch name stays valid
    #[serde(with = "millis")]
    pub pending_name_timeout: Duration,

    /// How long a single download waits for the captured result
    #[serde(with = "millis")]
    pub capture_wait: Duration,

    #[serde(with = "millis")]
    pub batch_capture_timeout: Duration,

    #[serde(with = "millis")]
    pub batch_capture_initial_delay: Duration,

    #[serde(with = "millis")]
    pub batch_capture_poll: Duration,

    /// Pause between items of a zipped batch
    #[serde(with = "millis")]
    pub batch_item_delay: Duration,

    /// Pause between items downloaded one by one
    #[serde(with = "millis")]
    pub sequential_item_delay: Duration,

    #[serde(with = "millis")]
    pub note_export_delay: Duration,

    #[serde(with = "millis")]
    pub source_export_delay: Duration,

    /// Maximum wait for a viewer root to render
    #[serde(with = "millis")]
    pub viewer_timeout: Duration,

    /// Pause after each close attempt before re-checking the viewer
    #[serde(with = "millis")]
    pub close_step_delay: Duration,

    /// Pause after a viewer or menu opens, before reading it
    #[serde(with = "millis")]
    pub settle_delay: Duration,

    /// Attempts for a single artifact download
    pub single_attempts: u32,

    /// Attempts for each item of a batch
    pub batch_attempts: u32,
}

impl Default for TakeoutConfig {
    fn default() -> Self {
        Self {
            source_hosts: vec!["notebooklm".to_string(), "googleusercontent".to_string()],
            download_dir: PathBuf::from("downloads"),
            save_as: false,
            intercept_timeout: Duration::from_secs(15),
            pending_name_timeout: Duration::from_secs(30),
            capture_wait: Duration::from_millis(2500),
            batch_capture_timeout: Duration::from_secs(8),
            batch_capture_initial_delay: Duration::from_millis(500),
            batch_capture_poll: Duration::from_millis(100),
            batch_item_delay: Duration::from_millis(1500),
            sequential_item_delay: Duration::from_millis(800),
            note_export_delay: Duration::from_secs(3),
            source_export_delay: Duration::from_millis(1500),
            viewer_timeout: Duration::from_secs(5),
            close_step_delay: Duration::from_millis(800),
            settle_delay: Duration::from_millis(500),
            single_attempts: 2,
            batch_attempts: 3,
        }
    }
}

impl TakeoutConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a config file; missing keys keep their defaults
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Builder method: set the download directory
    pub fn with_download_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.download_dir = dir.into();
        self
    }

    /// Builder method: set the accepted source host fragments
    pub fn with_source_hosts(mut self, hosts: Vec<String>) -> Self {
        self.source_hosts = hosts;
        self
    }

    /// Builder method: set save-as prompting
    pub fn with_save_as(mut self, save_as: bool) -> Self {
        self.save_as = save_as;
        self
    }

    /// Builder method: set the interception timeout
    pub fn with_intercept_timeout(mut self, timeout: Duration) -> Self {
        self.intercept_timeout = timeout;
        self
    }
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = TakeoutConfig::default();
        assert_eq!(config.intercept_timeout, Duration::from_secs(15));
        assert_eq!(config.pending_name_timeout, Duration::from_secs(30));
        assert!(config.sequential_item_delay >= Duration::from_millis(800));
        assert_eq!(config.single_attempts, 2);
        assert_eq!(config.batch_attempts, 3);
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config: TakeoutConfig =
            serde_json::from_str(r#"{"batch_item_delay": 900, "download_dir": "/tmp/out"}"#).unwrap();
        assert_eq!(config.batch_item_delay, Duration::from_millis(900));
        assert_eq!(config.download_dir, PathBuf::from("/tmp/out"));
        assert_eq!(config.viewer_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_builder() {
        let config = TakeoutConfig::new()
            .with_download_dir("/tmp/x")
            .with_save_as(true)
            .with_source_hosts(vec!["example".to_string()]);
        assert!(config.save_as);
        assert_eq!(config.source_hosts, vec!["example".to_string()]);
    }
}
