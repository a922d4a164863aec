use crate::error::Result;
use crate::tools::{NoParams, Tool, ToolContext, ToolResult};

/// Steps the notebook tab back in its history, e.g. out of a viewer that
/// pushed a history entry
#[derive(Default)]
pub struct NavigateBackTool;

impl Tool for NavigateBackTool {
    type Params = NoParams;

    fn name(&self) -> &str {
        "navigate_back"
    }

    fn execute_typed(&self, _params: NoParams, context: &mut ToolContext) -> Result<ToolResult> {
        context.session.go_back()?;
        Ok(ToolResult::success())
    }
}
