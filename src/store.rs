//! Persisted user settings and the tally of captured artifacts.
//!
//! Everything lives in one JSON document, loaded when a session starts and
//! written back on every change.

use crate::artifact::Artifact;
use crate::error::Result;
use parking_lot::Mutex;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

const UNKNOWN_CATEGORY: &str = "other";

/// User preferences
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    /// Bundle "download all" into one archive
    pub auto_zip: bool,
    pub show_notifications: bool,
    pub refresh_interval_seconds: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            auto_zip: false,
            show_notifications: true,
            refresh_interval_seconds: 10,
        }
    }
}

/// Partial settings change; absent fields stay as they are
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SettingsUpdate {
    #[serde(default)]
    pub auto_zip: Option<bool>,
    #[serde(default)]
    pub show_notifications: Option<bool>,
    #[serde(default)]
    pub refresh_interval_seconds: Option<u32>,
}

impl SettingsUpdate {
    pub fn is_empty(&self) -> bool {
        self.auto_zip.is_none() && self.show_notifications.is_none() && self.refresh_interval_seconds.is_none()
    }

    fn apply(&self, settings: &mut Settings) {
        if let Some(auto_zip) = self.auto_zip {
            settings.auto_zip = auto_zip;
        }
        if let Some(show) = self.show_notifications {
            settings.show_notifications = show;
        }
        if let Some(seconds) = self.refresh_interval_seconds {
            settings.refresh_interval_seconds = seconds;
        }
    }
}

/// Artifact ids seen per category, de-duplicated by id
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CaptureTally(BTreeMap<String, BTreeSet<String>>);

impl CaptureTally {
    /// Record an artifact; `false` when its id was already counted
    pub fn record(&mut self, artifact: &Artifact) -> bool {
        let category = artifact.kind.map(|k| k.category()).unwrap_or(UNKNOWN_CATEGORY);
        self.0.entry(category.to_string()).or_default().insert(artifact.id.clone())
    }

    pub fn counts(&self) -> BTreeMap<String, usize> {
        self.0.iter().map(|(category, ids)| (category.clone(), ids.len())).collect()
    }

    pub fn total(&self) -> usize {
        self.0.values().map(BTreeSet::len).sum()
    }

    /// Badge text: the total, or empty when nothing was captured
    pub fn badge_text(&self) -> String {
        match self.total() {
            0 => String::new(),
            n => n.to_string(),
        }
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct StoredState {
    settings: Settings,
    captured_artifacts: CaptureTally,
}

/// JSON-file store; an in-memory store never touches disk
#[derive(Debug)]
pub struct LocalStore {
    path: Option<PathBuf>,
    state: Mutex<StoredState>,
}

impl LocalStore {
    /// `<local data dir>/notebook-takeout/state.json`
    pub fn default_path() -> Option<PathBuf> {
        dirs::data_local_dir().map(|dir| dir.join("notebook-takeout").join("state.json"))
    }

    /// Load `path`, starting empty when the file does not exist yet
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let state = if path.exists() {
            let raw = std::fs::read_to_string(&path)?;
            serde_json::from_str(&raw)?
        } else {
            log::debug!("No stored state at {}, using defaults", path.display());
            StoredState::default()
        };
        Ok(Self {
            path: Some(path),
            state: Mutex::new(state),
        })
    }

    pub fn in_memory() -> Self {
        Self {
            path: None,
            state: Mutex::new(StoredState::default()),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn settings(&self) -> Settings {
        self.state.lock().settings.clone()
    }

    pub fn update_settings(&self, update: &SettingsUpdate) -> Result<Settings> {
        let mut state = self.state.lock();
        update.apply(&mut state.settings);
        self.persist(&state)?;
        Ok(state.settings.clone())
    }

    pub fn tally(&self) -> CaptureTally {
        self.state.lock().captured_artifacts.clone()
    }

    /// Count scanned artifacts; returns how many were new
    pub fn record_artifacts(&self, artifacts: &[Artifact]) -> Result<usize> {
        let mut state = self.state.lock();
        let added = artifacts
            .iter()
            .filter(|artifact| state.captured_artifacts.record(artifact))
            .count();
        if added > 0 {
            self.persist(&state)?;
        }
        Ok(added)
    }

    pub fn clear_tally(&self) -> Result<()> {
        let mut state = self.state.lock();
        state.captured_artifacts.clear();
        self.persist(&state)
    }

    fn persist(&self, state: &StoredState) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(state)?)?;
        log::debug!("Stored state written to {}", path.display());
        Ok(())
    }
}
