//! Typed commands over a [`TakeoutSession`].
//!
//! Every tool takes serde/schemars parameters and answers with a
//! [`ToolResult`]. Item-level problems (missing item, empty content) come
//! back as a failed result; anything else is an error.

pub mod download;
pub mod extract;
pub mod navigate;
pub mod overlay;
pub mod scan;
pub mod settings;

pub use download::{DownloadAllTool, DownloadArtifactTool, ExportNotesTool, ExportSourcesTool};
pub use extract::{ExtractNoteTool, ExtractReportTool, ExtractSourceTool, ExtractTableTool};
pub use navigate::NavigateBackTool;
pub use overlay::{
    BatchStatusTool, CancelExportTool, CheckCancelledTool, HideOverlayTool, ShowOverlayTool, UpdateOverlayTool,
};
pub use scan::{ScanArtifactsTool, ScanNotesTool, ScanSourcesTool};
pub use settings::{CapturedArtifactsTool, SettingsTool};

use crate::error::{Result, TakeoutError};
use crate::export::ExportSummary;
use crate::session::TakeoutSession;
use indexmap::IndexMap;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// What a tool execution produced
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub success: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolResult {
    pub fn success() -> Self {
        Self {
            success: true,
            data: None,
            error: None,
        }
    }

    pub fn success_with(data: Value) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
        }
    }

    /// Serialize `value` as the result data
    pub fn from_serializable<T: Serialize>(value: &T) -> Result<Self> {
        Ok(Self::success_with(serde_json::to_value(value)?))
    }

    /// Item-level errors become a failed result; the rest stay errors
    pub fn from_item_error(error: TakeoutError) -> Result<Self> {
        if error.is_recoverable() {
            Ok(Self::failure(error.to_string()))
        } else {
            Err(error)
        }
    }
}

/// What a tool sees while it runs
pub struct ToolContext<'a> {
    pub session: &'a TakeoutSession,
}

impl<'a> ToolContext<'a> {
    pub fn new(session: &'a TakeoutSession) -> Self {
        Self { session }
    }
}

/// A named command with typed parameters
pub trait Tool: Send + Sync {
    type Params: DeserializeOwned + JsonSchema;

    fn name(&self) -> &str;

    /// Whether the tool drives the page and must not overlap other page work
    fn exclusive(&self) -> bool {
        true
    }

    /// Whether the tool runs a multi-item export; only one runs at a time
    fn batch(&self) -> bool {
        false
    }

    fn execute_typed(&self, params: Self::Params, context: &mut ToolContext) -> Result<ToolResult>;
}

/// Object-safe face of [`Tool`] used by the registry
trait DynTool: Send + Sync {
    fn name(&self) -> &str;

    fn exclusive(&self) -> bool;

    fn batch(&self) -> bool;

    fn schema(&self) -> Value;

    fn execute(&self, params: Value, context: &mut ToolContext) -> Result<ToolResult>;
}

impl<T: Tool> DynTool for T {
    fn name(&self) -> &str {
        Tool::name(self)
    }

    fn exclusive(&self) -> bool {
        Tool::exclusive(self)
    }

    fn batch(&self) -> bool {
        Tool::batch(self)
    }

    fn schema(&self) -> Value {
        serde_json::to_value(schemars::schema_for!(T::Params)).unwrap_or(Value::Null)
    }

    fn execute(&self, params: Value, context: &mut ToolContext) -> Result<ToolResult> {
        // Parameterless tools accept a missing or null argument object
        let params = if params.is_null() { Value::Object(Default::default()) } else { params };
        let typed: T::Params = serde_json::from_value(params)
            .map_err(|e| TakeoutError::InvalidArgument(format!("{}: {}", Tool::name(self), e)))?;
        self.execute_typed(typed, context)
    }
}

/// Tools by name, in registration order
#[derive(Default)]
pub struct ToolRegistry {
    tools: IndexMap<String, Box<dyn DynTool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every built-in tool
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(ScanArtifactsTool);
        registry.register(ScanNotesTool);
        registry.register(ScanSourcesTool);
        registry.register(ExtractNoteTool);
        registry.register(ExtractSourceTool);
        registry.register(ExtractReportTool);
        registry.register(ExtractTableTool);
        registry.register(DownloadArtifactTool);
        registry.register(DownloadAllTool);
        registry.register(ExportNotesTool);
        registry.register(ExportSourcesTool);
        registry.register(ShowOverlayTool);
        registry.register(UpdateOverlayTool);
        registry.register(HideOverlayTool);
        registry.register(CheckCancelledTool);
        registry.register(CancelExportTool);
        registry.register(BatchStatusTool);
        registry.register(NavigateBackTool);
        registry.register(CapturedArtifactsTool);
        registry.register(SettingsTool);
        registry
    }

    /// Add a tool; a tool with the same name is replaced
    pub fn register<T: Tool + 'static>(&mut self, tool: T) {
        self.tools.insert(Tool::name(&tool).to_string(), Box::new(tool));
    }

    pub fn has(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tools.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// JSON schema of a tool's parameters
    pub fn schema(&self, name: &str) -> Option<Value> {
        self.tools.get(name).map(|tool| tool.schema())
    }

    /// Run `name`; page-driving tools hold the session's page lock.
    ///
    /// A batch tool started while another batch holds the latch returns the
    /// "already running" summary without waiting for the page.
    pub fn execute(&self, name: &str, params: Value, context: &mut ToolContext) -> Result<ToolResult> {
        let tool = self.tools.get(name).ok_or_else(|| TakeoutError::ToolExecutionFailed {
            tool: name.to_string(),
            reason: "unknown tool".to_string(),
        })?;

        log::debug!("Running tool {}", name);
        let session = context.session;
        let _claim = if tool.batch() {
            match session.batch_latch().try_claim() {
                Some(claim) => Some(claim),
                None => {
                    log::info!("Skipping {}: a batch export is already running", name);
                    return ToolResult::from_serializable(&ExportSummary::already_running(0));
                }
            }
        } else {
            None
        };
        let _guard = tool.exclusive().then(|| session.exclusive());
        tool.execute(params, context)
    }
}

/// Parameters of tools that take none
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct NoParams {}
