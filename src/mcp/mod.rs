//! MCP (Model Context Protocol) server for notebook exports
//!
//! Every tool of the [`ToolRegistry`](crate::tools::ToolRegistry) is exposed
//! as an rmcp tool with the same name and parameter schema.

pub mod handler;
pub use handler::TakeoutServer;

use crate::error::TakeoutError;
use crate::extract::ItemTarget;
use crate::store::SettingsUpdate;
use crate::tools::ToolResult as InternalToolResult;
use crate::tools::download::{DownloadAllParams, DownloadArtifactParams};
use crate::tools::overlay::{ShowOverlayParams, UpdateOverlayParams};
use crate::tools::settings::CapturedArtifactsParams;
use rmcp::{
    ErrorData as McpError,
    handler::server::wrapper::Parameters,
    model::{CallToolResult, Content},
    tool, tool_router,
};
use serde::Serialize;

/// Convert internal ToolResult to MCP CallToolResult
fn convert_result(result: InternalToolResult) -> Result<CallToolResult, McpError> {
    if result.success {
        let text = if let Some(data) = result.data {
            serde_json::to_string_pretty(&data).unwrap_or_else(|_| data.to_string())
        } else {
            "Success".to_string()
        };
        Ok(CallToolResult::success(vec![Content::text(text)]))
    } else {
        let error_msg = result.error.unwrap_or_else(|| "Unknown error".to_string());
        Ok(CallToolResult::error(vec![Content::text(error_msg)]))
    }
}

fn convert_error(error: TakeoutError) -> McpError {
    match error {
        TakeoutError::InvalidArgument(msg) => McpError::invalid_params(msg, None),
        other => McpError::internal_error(other.to_string(), None),
    }
}

impl TakeoutServer {
    /// Run a registry tool with `params` serialized as its arguments
    fn call(&self, name: &str, params: impl Serialize) -> Result<CallToolResult, McpError> {
        let params = serde_json::to_value(params).map_err(|e| McpError::invalid_params(e.to_string(), None))?;
        let result = self.session().execute_tool(name, params).map_err(convert_error)?;
        convert_result(result)
    }
}

#[tool_router]
impl TakeoutServer {
    #[tool(description = "List the notebook's generated artifacts (audio, slides, infographics, reports, data tables)")]
    fn scan_artifacts(&self) -> Result<CallToolResult, McpError> {
        self.call("scan_artifacts", serde_json::json!({}))
    }

    #[tool(description = "List the notebook's notes; mindmap notes are marked as Mindmap")]
    fn scan_notes(&self) -> Result<CallToolResult, McpError> {
        self.call("scan_notes", serde_json::json!({}))
    }

    #[tool(description = "List the notebook's visible sources")]
    fn scan_sources(&self) -> Result<CallToolResult, McpError> {
        self.call("scan_sources", serde_json::json!({}))
    }

    #[tool(description = "Open a note by title or position and return its markdown with resolved citations (mindmaps return SVG and tree)")]
    fn extract_note(&self, params: Parameters<ItemTarget>) -> Result<CallToolResult, McpError> {
        self.call("extract_note", params.0)
    }

    #[tool(description = "Open a source by title or position and return its markdown with summary and key topics")]
    fn extract_source(&self, params: Parameters<ItemTarget>) -> Result<CallToolResult, McpError> {
        self.call("extract_source", params.0)
    }

    #[tool(description = "Open a report by title or position and return it as markdown")]
    fn extract_report(&self, params: Parameters<ItemTarget>) -> Result<CallToolResult, McpError> {
        self.call("extract_report", params.0)
    }

    #[tool(description = "Open a data table by title or position and return it as CSV")]
    fn extract_table(&self, params: Parameters<ItemTarget>) -> Result<CallToolResult, McpError> {
        self.call("extract_table", params.0)
    }

    #[tool(description = "Download one artifact into the download directory, with retries")]
    fn download_artifact(&self, params: Parameters<DownloadArtifactParams>) -> Result<CallToolResult, McpError> {
        self.call("download_artifact", params.0)
    }

    #[tool(description = "Download every artifact, as one ZIP archive or one file each")]
    fn download_all(&self, params: Parameters<DownloadAllParams>) -> Result<CallToolResult, McpError> {
        self.call("download_all", params.0)
    }

    #[tool(description = "Export every note as markdown (mindmaps as SVG and JSON) into one ZIP archive")]
    fn export_notes(&self) -> Result<CallToolResult, McpError> {
        self.call("export_notes", serde_json::json!({}))
    }

    #[tool(description = "Export every source as markdown; several sources are zipped")]
    fn export_sources(&self) -> Result<CallToolResult, McpError> {
        self.call("export_sources", serde_json::json!({}))
    }

    #[tool(description = "Show the in-page export overlay")]
    fn show_overlay(&self, params: Parameters<ShowOverlayParams>) -> Result<CallToolResult, McpError> {
        self.call("show_overlay", params.0)
    }

    #[tool(description = "Update the export overlay's message and progress (0.0 to 1.0)")]
    fn update_overlay(&self, params: Parameters<UpdateOverlayParams>) -> Result<CallToolResult, McpError> {
        self.call("update_overlay", params.0)
    }

    #[tool(description = "Hide the export overlay")]
    fn hide_overlay(&self) -> Result<CallToolResult, McpError> {
        self.call("hide_overlay", serde_json::json!({}))
    }

    #[tool(description = "Whether the running export was cancelled")]
    fn check_cancelled(&self) -> Result<CallToolResult, McpError> {
        self.call("check_cancelled", serde_json::json!({}))
    }

    #[tool(description = "Stop the running export after its current item")]
    fn cancel_export(&self) -> Result<CallToolResult, McpError> {
        self.call("cancel_export", serde_json::json!({}))
    }

    #[tool(description = "Progress of the running or last export")]
    fn batch_status(&self) -> Result<CallToolResult, McpError> {
        self.call("batch_status", serde_json::json!({}))
    }

    #[tool(description = "Go back in the notebook tab's history")]
    fn navigate_back(&self) -> Result<CallToolResult, McpError> {
        self.call("navigate_back", serde_json::json!({}))
    }

    #[tool(description = "Counts of artifacts seen by scans, per category")]
    fn captured_artifacts(&self, params: Parameters<CapturedArtifactsParams>) -> Result<CallToolResult, McpError> {
        self.call("captured_artifacts", params.0)
    }

    #[tool(description = "Read the settings (autoZip, showNotifications, refreshIntervalSeconds); given fields are updated")]
    fn settings(&self, params: Parameters<SettingsUpdate>) -> Result<CallToolResult, McpError> {
        self.call("settings", params.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failed_result_is_tool_error() {
        let converted = convert_result(InternalToolResult::failure("Not found: note 3")).unwrap();
        assert_eq!(converted.is_error, Some(true));
    }

    #[test]
    fn test_success_result_is_pretty_json() {
        let converted = convert_result(InternalToolResult::success_with(serde_json::json!({"count": 2}))).unwrap();
        assert_eq!(converted.is_error, Some(false));
    }

    #[test]
    fn test_invalid_argument_maps_to_invalid_params() {
        let error = convert_error(TakeoutError::InvalidArgument("index".to_string()));
        assert_eq!(error.code, rmcp::model::ErrorCode::INVALID_PARAMS);
    }
}
