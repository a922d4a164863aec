use crate::artifact::ExtractionResult;
use crate::download::orchestrator::render_extraction;
use crate::error::Result;
use crate::extract::{self, ItemTarget, PageContext};
use crate::tools::{Tool, ToolContext, ToolResult};
use serde_json::json;

/// Run one extraction and attach the file it renders to.
///
/// Text renderings (markdown, CSV) are returned inline; binary ones only
/// report their file name.
fn run_extraction(
    context: &ToolContext,
    extraction: impl FnOnce(&PageContext<'_>) -> Result<ExtractionResult>,
) -> Result<ToolResult> {
    let result = match extraction(&context.session.context()) {
        Ok(result) => result,
        Err(e) => return ToolResult::from_item_error(e),
    };

    let rendered = render_extraction(result.clone())?;
    let text = rendered.mime.starts_with("text/").then(|| String::from_utf8_lossy(&rendered.bytes).into_owned());

    Ok(ToolResult::success_with(json!({
        "extraction": result,
        "filename": rendered.filename,
        "mime": rendered.mime,
        "text": text,
    })))
}

/// Opens a note (or mindmap note) and reads its content and citations
#[derive(Default)]
pub struct ExtractNoteTool;

impl Tool for ExtractNoteTool {
    type Params = ItemTarget;

    fn name(&self) -> &str {
        "extract_note"
    }

    fn execute_typed(&self, params: ItemTarget, context: &mut ToolContext) -> Result<ToolResult> {
        run_extraction(context, |ctx| extract::extract_note(ctx, &params))
    }
}

#[derive(Default)]
pub struct ExtractSourceTool;

impl Tool for ExtractSourceTool {
    type Params = ItemTarget;

    fn name(&self) -> &str {
        "extract_source"
    }

    fn execute_typed(&self, params: ItemTarget, context: &mut ToolContext) -> Result<ToolResult> {
        run_extraction(context, |ctx| extract::extract_source(ctx, &params))
    }
}

#[derive(Default)]
pub struct ExtractReportTool;

impl Tool for ExtractReportTool {
    type Params = ItemTarget;

    fn name(&self) -> &str {
        "extract_report"
    }

    fn execute_typed(&self, params: ItemTarget, context: &mut ToolContext) -> Result<ToolResult> {
        run_extraction(context, |ctx| extract::extract_report(ctx, &params))
    }
}

#[derive(Default)]
pub struct ExtractTableTool;

impl Tool for ExtractTableTool {
    type Params = ItemTarget;

    fn name(&self) -> &str {
        "extract_table"
    }

    fn execute_typed(&self, params: ItemTarget, context: &mut ToolContext) -> Result<ToolResult> {
        run_extraction(context, |ctx| extract::extract_data_table(ctx, &params))
    }
}
