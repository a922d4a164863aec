//! Export overlay and cancellation controls.
//!
//! `check_cancelled`, `cancel_export` and `batch_status` do not take the
//! page lock, so they answer while an export is running.

use crate::error::{Result, TakeoutError};
use crate::tools::{NoParams, Tool, ToolContext, ToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::json;

fn default_message() -> String {
    "Exporting...".to_string()
}

/// Parameters for the show_overlay tool
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ShowOverlayParams {
    #[serde(default = "default_message")]
    pub message: String,
}

/// Shows the in-page progress overlay and clears any previous cancellation
#[derive(Default)]
pub struct ShowOverlayTool;

impl Tool for ShowOverlayTool {
    type Params = ShowOverlayParams;

    fn name(&self) -> &str {
        "show_overlay"
    }

    fn execute_typed(&self, params: ShowOverlayParams, context: &mut ToolContext) -> Result<ToolResult> {
        context.session.cancel_flag().reset();
        context.session.page().show_overlay(&params.message)?;
        Ok(ToolResult::success())
    }
}

/// Parameters for the update_overlay tool
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct UpdateOverlayParams {
    pub message: String,

    /// Completed fraction between 0.0 and 1.0
    #[serde(default)]
    pub progress: Option<f64>,
}

#[derive(Default)]
pub struct UpdateOverlayTool;

impl Tool for UpdateOverlayTool {
    type Params = UpdateOverlayParams;

    fn name(&self) -> &str {
        "update_overlay"
    }

    fn execute_typed(&self, params: UpdateOverlayParams, context: &mut ToolContext) -> Result<ToolResult> {
        if let Some(progress) = params.progress {
            if !(0.0..=1.0).contains(&progress) {
                return Err(TakeoutError::InvalidArgument(format!(
                    "progress must be between 0 and 1, got {}",
                    progress
                )));
            }
        }
        context.session.page().update_overlay(&params.message, params.progress)?;
        Ok(ToolResult::success())
    }
}

#[derive(Default)]
pub struct HideOverlayTool;

impl Tool for HideOverlayTool {
    type Params = NoParams;

    fn name(&self) -> &str {
        "hide_overlay"
    }

    fn execute_typed(&self, _params: NoParams, context: &mut ToolContext) -> Result<ToolResult> {
        context.session.page().hide_overlay()?;
        Ok(ToolResult::success())
    }
}

/// Whether the running export was cancelled, by tool or by the overlay button
#[derive(Default)]
pub struct CheckCancelledTool;

impl Tool for CheckCancelledTool {
    type Params = NoParams;

    fn name(&self) -> &str {
        "check_cancelled"
    }

    fn exclusive(&self) -> bool {
        false
    }

    fn execute_typed(&self, _params: NoParams, context: &mut ToolContext) -> Result<ToolResult> {
        let session = context.session;
        let mut cancelled = session.cancel_flag().is_cancelled();
        if !cancelled && session.page().overlay_cancelled().unwrap_or(false) {
            session.cancel_flag().cancel();
            cancelled = true;
        }
        Ok(ToolResult::success_with(json!({ "cancelled": cancelled })))
    }
}

/// Asks the running export to stop after its current item
#[derive(Default)]
pub struct CancelExportTool;

impl Tool for CancelExportTool {
    type Params = NoParams;

    fn name(&self) -> &str {
        "cancel_export"
    }

    fn exclusive(&self) -> bool {
        false
    }

    fn execute_typed(&self, _params: NoParams, context: &mut ToolContext) -> Result<ToolResult> {
        let session = context.session;
        let running = session.status().snapshot().running;
        session.cancel_flag().cancel();
        log::info!("Export cancellation requested (running: {})", running);
        Ok(ToolResult::success_with(json!({ "running": running })))
    }
}

/// Progress of the running (or last) export and the interception state
#[derive(Default)]
pub struct BatchStatusTool;

impl Tool for BatchStatusTool {
    type Params = NoParams;

    fn name(&self) -> &str {
        "batch_status"
    }

    fn exclusive(&self) -> bool {
        false
    }

    fn execute_typed(&self, _params: NoParams, context: &mut ToolContext) -> Result<ToolResult> {
        let session = context.session;
        Ok(ToolResult::success_with(json!({
            "status": session.status().snapshot(),
            "cancelled": session.cancel_flag().is_cancelled(),
            "interception": session.interceptor().state_label(),
        })))
    }
}
