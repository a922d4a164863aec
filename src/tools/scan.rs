use crate::error::Result;
use crate::extract;
use crate::tools::{NoParams, Tool, ToolContext, ToolResult};
use serde_json::json;

/// Lists the artifact library and counts what it finds in the capture tally
#[derive(Default)]
pub struct ScanArtifactsTool;

impl Tool for ScanArtifactsTool {
    type Params = NoParams;

    fn name(&self) -> &str {
        "scan_artifacts"
    }

    fn execute_typed(&self, _params: NoParams, context: &mut ToolContext) -> Result<ToolResult> {
        let artifacts = extract::scan_artifacts(context.session.page())?;
        let new = context.session.store().record_artifacts(&artifacts)?;
        log::info!("Scanned {} artifacts ({} new)", artifacts.len(), new);

        Ok(ToolResult::success_with(json!({
            "count": artifacts.len(),
            "new": new,
            "artifacts": artifacts,
        })))
    }
}

#[derive(Default)]
pub struct ScanNotesTool;

impl Tool for ScanNotesTool {
    type Params = NoParams;

    fn name(&self) -> &str {
        "scan_notes"
    }

    fn execute_typed(&self, _params: NoParams, context: &mut ToolContext) -> Result<ToolResult> {
        let notes = extract::scan_notes(context.session.page())?;
        Ok(ToolResult::success_with(json!({
            "count": notes.len(),
            "notes": notes,
        })))
    }
}

#[derive(Default)]
pub struct ScanSourcesTool;

impl Tool for ScanSourcesTool {
    type Params = NoParams;

    fn name(&self) -> &str {
        "scan_sources"
    }

    fn execute_typed(&self, _params: NoParams, context: &mut ToolContext) -> Result<ToolResult> {
        let sources = extract::scan_sources(context.session.page())?;
        Ok(ToolResult::success_with(json!({
            "count": sources.len(),
            "sources": sources,
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::MemoryPage;
    use crate::tools::testing;

    const LIBRARY: &str = r#"<body>
        <artifact-library-item>
            <button aria-description="Audio Overview"></button>
            <span class="artifact-title">Deep Dive</span>
            <button aria-label="More"></button>
        </artifact-library-item>
        <artifact-library-item>
            <button aria-description="Briefing Report"></button>
            <span class="artifact-title">Briefing</span>
            <button aria-label="More"></button>
        </artifact-library-item>
        <artifact-library-note><span class="note-title">Ideas</span></artifact-library-note>
    </body>"#;

    #[test]
    fn test_scan_artifacts_records_tally() {
        let (session, _page, _dir) = testing::session(MemoryPage::new(LIBRARY));

        let result = session.execute_tool("scan_artifacts", serde_json::Value::Null).unwrap();
        assert!(result.success);
        let data = result.data.unwrap();
        assert_eq!(data["count"], 2);
        assert_eq!(data["new"], 2);
        assert_eq!(data["artifacts"][1]["title"], "Briefing");
        assert_eq!(data["artifacts"][1]["index"], 1);

        // A rescan counts nothing new
        let again = session.execute_tool("scan_artifacts", json!({})).unwrap();
        assert_eq!(again.data.unwrap()["new"], 0);
        assert_eq!(session.store().tally().total(), 2);
    }

    #[test]
    fn test_scan_notes_and_sources() {
        let (session, _page, _dir) = testing::session(MemoryPage::new(LIBRARY));

        let notes = session.execute_tool("scan_notes", json!({})).unwrap().data.unwrap();
        assert_eq!(notes["count"], 1);
        assert_eq!(notes["notes"][0]["title"], "Ideas");

        let sources = session.execute_tool("scan_sources", json!({})).unwrap().data.unwrap();
        assert_eq!(sources["count"], 0);
    }
}
