use crate::artifact::{Artifact, ArtifactKind};
use crate::download::DownloadOptions;
use crate::error::{Result, TakeoutError};
use crate::extract;
use crate::tools::{NoParams, Tool, ToolContext, ToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::json;

/// Parameters for the download_artifact tool
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct DownloadArtifactParams {
    /// Position in the scanned artifact list
    #[serde(default)]
    pub index: Option<usize>,

    /// Exact artifact title; takes precedence over the index
    #[serde(default)]
    pub title: Option<String>,

    /// Treat the artifact as this kind instead of the scanned one
    #[serde(default)]
    pub kind: Option<ArtifactKind>,

    #[serde(flatten)]
    pub options: DownloadOptions,
}

/// Pick the requested artifact out of a fresh scan
fn select_artifact(artifacts: Vec<Artifact>, params: &DownloadArtifactParams) -> Result<Artifact> {
    if params.title.is_none() && params.index.is_none() {
        return Err(TakeoutError::InvalidArgument(
            "download_artifact needs a title or an index".to_string(),
        ));
    }
    let total = artifacts.len();

    let by_title = params
        .title
        .as_deref()
        .and_then(|title| artifacts.iter().position(|a| a.title == title.trim()));
    let position = by_title.or(params.index.filter(|i| *i < total)).ok_or_else(|| {
        TakeoutError::NotFound(match (&params.title, params.index) {
            (Some(title), _) => format!("artifact titled '{}'", title),
            (None, Some(index)) => format!("artifact at position {} ({} present)", index, total),
            (None, None) => "artifact".to_string(),
        })
    })?;

    let mut artifact = artifacts.into_iter().nth(position).ok_or_else(|| {
        TakeoutError::NotFound(format!("artifact at position {}", position))
    })?;
    if let Some(kind) = params.kind {
        artifact.kind = Some(kind);
    }
    Ok(artifact)
}

/// Delivers one artifact: extraction, direct data, or its download menu
#[derive(Default)]
pub struct DownloadArtifactTool;

impl Tool for DownloadArtifactTool {
    type Params = DownloadArtifactParams;

    fn name(&self) -> &str {
        "download_artifact"
    }

    fn execute_typed(&self, params: DownloadArtifactParams, context: &mut ToolContext) -> Result<ToolResult> {
        let session = context.session;
        let artifacts = extract::scan_artifacts(session.page())?;
        let artifact = match select_artifact(artifacts, &params) {
            Ok(artifact) => artifact,
            Err(e) => return ToolResult::from_item_error(e),
        };

        let attempts = params.options.attempts.unwrap_or(session.config().single_attempts);
        match session.orchestrator().download_with_retry(&artifact, &params.options, attempts) {
            Ok(report) if report.success => Ok(ToolResult::success_with(json!({
                "artifact": artifact,
                "report": report,
            }))),
            Ok(report) => Ok(ToolResult::failure(
                report.error.unwrap_or_else(|| format!("Download of '{}' failed", artifact.title)),
            )),
            Err(e) => ToolResult::from_item_error(e),
        }
    }
}

/// Parameters for the download_all tool
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct DownloadAllParams {
    /// Bundle everything into one archive (default: the autoZip setting)
    #[serde(default)]
    pub zip: Option<bool>,
}

/// Downloads every scanned artifact, zipped or one by one
#[derive(Default)]
pub struct DownloadAllTool;

impl Tool for DownloadAllTool {
    type Params = DownloadAllParams;

    fn name(&self) -> &str {
        "download_all"
    }

    fn batch(&self) -> bool {
        true
    }

    fn execute_typed(&self, params: DownloadAllParams, context: &mut ToolContext) -> Result<ToolResult> {
        let session = context.session;
        let artifacts = extract::scan_artifacts(session.page())?;
        if artifacts.is_empty() {
            return Ok(ToolResult::failure("No artifacts found"));
        }
        session.store().record_artifacts(&artifacts)?;

        let zip = params.zip.unwrap_or_else(|| session.store().settings().auto_zip);
        let summary = session.exporter().download_all(&artifacts, zip)?;
        ToolResult::from_serializable(&summary)
    }
}

/// Extracts every note into one archive
#[derive(Default)]
pub struct ExportNotesTool;

impl Tool for ExportNotesTool {
    type Params = NoParams;

    fn name(&self) -> &str {
        "export_notes"
    }

    fn batch(&self) -> bool {
        true
    }

    fn execute_typed(&self, _params: NoParams, context: &mut ToolContext) -> Result<ToolResult> {
        let session = context.session;
        let notes = extract::scan_notes(session.page())?;
        if notes.is_empty() {
            return Ok(ToolResult::failure("No notes found"));
        }
        let summary = session.exporter().export_notes(&notes)?;
        ToolResult::from_serializable(&summary)
    }
}

/// Extracts every visible source as markdown
#[derive(Default)]
pub struct ExportSourcesTool;

impl Tool for ExportSourcesTool {
    type Params = NoParams;

    fn name(&self) -> &str {
        "export_sources"
    }

    fn batch(&self) -> bool {
        true
    }

    fn execute_typed(&self, _params: NoParams, context: &mut ToolContext) -> Result<ToolResult> {
        let session = context.session;
        let sources = extract::scan_sources(session.page())?;
        if sources.is_empty() {
            return Ok(ToolResult::failure("No sources found"));
        }
        let summary = session.exporter().export_sources(&sources)?;
        ToolResult::from_serializable(&summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::DomReference;
    use crate::dom::{MemoryPage, PageEvent, Reaction};
    use crate::tools::testing;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Barrier};

    const LIBRARY: &str = r#"<div class="library">
        <artifact-library-item><button aria-description="Data Table"></button><button class="artifact-button-content"><span class="artifact-title">Numbers</span></button><button aria-label="More"></button></artifact-library-item>
        </div>"#;

    const TABLE: &str = r#"<table-viewer><table><tr><th>City</th></tr><tr><td>Paris</td></tr></table></table-viewer>"#;

    fn artifact(title: &str, position: usize) -> Artifact {
        Artifact {
            id: format!("artifact-{}", position),
            kind: Some(ArtifactKind::Audio),
            type_label: "Audio Overview".to_string(),
            title: title.to_string(),
            details: None,
            index: Some(position),
            dom_reference: DomReference::ArtifactItem(position),
        }
    }

    #[test]
    fn test_download_params_flatten_options() {
        let params: DownloadArtifactParams = serde_json::from_value(json!({
            "index": 1,
            "kind": "Slide Deck",
            "filename": "deck",
            "attempts": 1
        }))
        .unwrap();
        assert_eq!(params.index, Some(1));
        assert_eq!(params.kind, Some(ArtifactKind::Slides));
        assert_eq!(params.options.filename.as_deref(), Some("deck"));
        assert_eq!(params.options.attempts, Some(1));
    }

    #[test]
    fn test_select_prefers_title_then_index() {
        let artifacts = vec![artifact("One", 0), artifact("Two", 1)];

        let params = DownloadArtifactParams {
            title: Some("Two".to_string()),
            index: Some(0),
            kind: Some(ArtifactKind::Report),
            ..Default::default()
        };
        let picked = select_artifact(artifacts.clone(), &params).unwrap();
        assert_eq!(picked.title, "Two");
        assert_eq!(picked.kind, Some(ArtifactKind::Report));

        let params = DownloadArtifactParams {
            title: Some("Three".to_string()),
            index: Some(0),
            ..Default::default()
        };
        assert_eq!(select_artifact(artifacts.clone(), &params).unwrap().title, "One");

        let params = DownloadArtifactParams {
            index: Some(5),
            ..Default::default()
        };
        assert!(matches!(select_artifact(artifacts, &params), Err(TakeoutError::NotFound(_))));
    }

    #[test]
    fn test_download_table_saves_csv() {
        let page = MemoryPage::new(LIBRARY)
            .on(PageEvent::Click, "button.artifact-button-content", |_| {
                Reaction::scene(format!("{}{}", LIBRARY, TABLE))
            })
            .on_key("Escape", || Reaction::scene(LIBRARY));
        let (session, _page, dir) = testing::session(page);

        let result = session.execute_tool("download_artifact", json!({"index": 0})).unwrap();
        assert!(result.success, "{:?}", result.error);
        let data = result.data.unwrap();
        assert_eq!(data["report"]["strategy"], "extraction");
        assert_eq!(data["report"]["filename"], "Numbers.csv");

        let csv = std::fs::read_to_string(dir.path().join("Numbers.csv")).unwrap();
        assert_eq!(csv, "City\nParis");
    }

    #[test]
    fn test_empty_library_reports_failure() {
        let (session, _page, _dir) = testing::session(MemoryPage::new("<body></body>"));

        for tool in ["download_all", "export_notes", "export_sources"] {
            let result = session.execute_tool(tool, json!({})).unwrap();
            assert!(!result.success, "{}", tool);
        }
        let missing = session.execute_tool("download_artifact", json!({"index": 0})).unwrap();
        assert!(missing.error.unwrap().starts_with("Not found"));
    }

    #[test]
    fn test_second_batch_returns_while_first_runs() {
        let entered = Arc::new(Barrier::new(2));
        let release = Arc::new(Barrier::new(2));
        let page = {
            let (entered, release) = (entered.clone(), release.clone());
            let hold = AtomicBool::new(true);
            MemoryPage::new(LIBRARY)
                .on(PageEvent::Click, "button.artifact-button-content", move |_| {
                    // The first batch parks inside its first item
                    if hold.swap(false, Ordering::SeqCst) {
                        entered.wait();
                        release.wait();
                    }
                    Reaction::scene(format!("{}{}", LIBRARY, TABLE))
                })
                .on_key("Escape", || Reaction::scene(LIBRARY))
        };
        let (session, _page, dir) = testing::session(page);

        std::thread::scope(|scope| {
            let running = scope.spawn(|| session.execute_tool("download_all", json!({"zip": true})).unwrap());
            entered.wait();

            for tool in ["download_all", "export_notes", "export_sources"] {
                let skipped = session.execute_tool(tool, json!({"zip": true})).unwrap();
                assert!(skipped.success, "{}", tool);
                let data = skipped.data.unwrap();
                assert_eq!(data["status"], "A batch export is already running");
                assert_eq!(data["exported"], 0);
            }
            release.wait();

            let first = running.join().unwrap();
            assert!(first.success, "{:?}", first.error);
            assert_eq!(first.data.unwrap()["exported"], 1);
        });

        let archives = std::fs::read_dir(dir.path())
            .unwrap()
            .filter(|entry| entry.as_ref().unwrap().path().extension().is_some_and(|ext| ext == "zip"))
            .count();
        assert_eq!(archives, 1);
        assert!(!session.batch_latch().is_held());
    }
}
