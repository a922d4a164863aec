use crate::error::Result;
use crate::store::SettingsUpdate;
use crate::tools::{Tool, ToolContext, ToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::json;

/// Parameters for the captured_artifacts tool
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct CapturedArtifactsParams {
    /// Reset the tally after reading it
    #[serde(default)]
    pub clear: bool,
}

/// Artifacts counted by scans, per category, with the badge text
#[derive(Default)]
pub struct CapturedArtifactsTool;

impl Tool for CapturedArtifactsTool {
    type Params = CapturedArtifactsParams;

    fn name(&self) -> &str {
        "captured_artifacts"
    }

    fn exclusive(&self) -> bool {
        false
    }

    fn execute_typed(&self, params: CapturedArtifactsParams, context: &mut ToolContext) -> Result<ToolResult> {
        let store = context.session.store();
        let tally = store.tally();
        if params.clear {
            store.clear_tally()?;
        }
        Ok(ToolResult::success_with(json!({
            "counts": tally.counts(),
            "total": tally.total(),
            "badge": tally.badge_text(),
            "cleared": params.clear,
        })))
    }
}

/// Reads the settings; any field given is changed and persisted first
#[derive(Default)]
pub struct SettingsTool;

impl Tool for SettingsTool {
    type Params = SettingsUpdate;

    fn name(&self) -> &str {
        "settings"
    }

    fn exclusive(&self) -> bool {
        false
    }

    fn execute_typed(&self, params: SettingsUpdate, context: &mut ToolContext) -> Result<ToolResult> {
        let store = context.session.store();
        let settings = if params.is_empty() {
            store.settings()
        } else {
            log::info!("Updating settings: {:?}", params);
            store.update_settings(&params)?
        };
        ToolResult::from_serializable(&settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::MemoryPage;
    use crate::tools::testing;

    const LIBRARY: &str = r#"<body>
        <artifact-library-item><button aria-description="Audio Overview"></button><span class="artifact-title">Deep Dive</span></artifact-library-item>
        <artifact-library-item><button aria-description="Slide Deck"></button><span class="artifact-title">Deck</span></artifact-library-item>
        </body>"#;

    #[test]
    fn test_settings_read_and_update() {
        let (session, _page, _dir) = testing::session(MemoryPage::new("<body></body>"));

        let current = session.execute_tool("settings", json!({})).unwrap().data.unwrap();
        assert_eq!(current["autoZip"], false);
        assert_eq!(current["refreshIntervalSeconds"], 10);

        let updated = session
            .execute_tool("settings", json!({"autoZip": true, "refreshIntervalSeconds": 30}))
            .unwrap()
            .data
            .unwrap();
        assert_eq!(updated["autoZip"], true);
        assert_eq!(updated["showNotifications"], true);
        assert!(session.store().settings().auto_zip);
    }

    #[test]
    fn test_captured_artifacts_tally_and_clear() {
        let (session, _page, _dir) = testing::session(MemoryPage::new(LIBRARY));
        session.execute_tool("scan_artifacts", json!({})).unwrap();

        let tally = session
            .execute_tool("captured_artifacts", json!({"clear": true}))
            .unwrap()
            .data
            .unwrap();
        assert_eq!(tally["total"], 2);
        assert_eq!(tally["badge"], "2");
        assert_eq!(tally["counts"]["audio"], 1);
        assert_eq!(tally["counts"]["slides"], 1);

        let after = session.execute_tool("captured_artifacts", json!({})).unwrap().data.unwrap();
        assert_eq!(after["badge"], "");
    }
}
