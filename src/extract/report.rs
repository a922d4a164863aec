//! Reports and data tables open from the artifact library.

use crate::artifact::ExtractionResult;
use crate::dom::{ContentLocator, NodeRef};
use crate::error::Result;
use crate::extract::{ItemTarget, LocatedItem, PageContext, locate_item, viewer};

pub(crate) const ARTIFACT_ITEM: &str = "artifact-library-item";
pub(crate) const ARTIFACT_TITLE: &str = ".artifact-title";
const ARTIFACT_BUTTON: &str = "button.artifact-button-content";

const REPORT_VIEWER: &str = "report-viewer";
const REPORT_CONTENT: &[&str] = &[
    "labs-tailwind-doc-viewer",
    ".ql-editor",
    ".scroll-container",
    ".content",
    r#"[class*="content"]"#,
];
const REPORT_MIN_CHARS: usize = 50;

const TABLE_VIEWER: &str = "table-viewer";
const TABLE_CONTENT: &[&str] = &[
    "table",
    ".table-container table",
    r#"[role="table"]"#,
    ".data-table",
    ".table-container",
    r#"[class*="table"]"#,
];

/// Click the artifact's title (or its content button) and wait for `viewer_tag`
fn open_artifact(
    ctx: &PageContext<'_>,
    target: &ItemTarget,
    viewer_tag: &str,
    fallback: &str,
) -> Result<(NodeRef, String)> {
    let items = ctx.page.query_all(None, ARTIFACT_ITEM)?;
    let LocatedItem { node, title, position } = locate_item(ctx.page, &items, ARTIFACT_TITLE, target, fallback)?;

    let title_button = match ctx.page.query(Some(&node), ARTIFACT_TITLE)? {
        Some(title_node) => ctx.page.closest(&title_node, "button")?,
        None => None,
    };
    let button = match title_button {
        Some(button) => button,
        None => ctx.page.query(Some(&node), ARTIFACT_BUTTON)?.unwrap_or(node),
    };
    ctx.page.click(&button)?;

    let root = ctx.wait_for(None, viewer_tag, ctx.config.viewer_timeout)?;
    ctx.pause(1000);

    let title = title
        .or_else(|| target.title.clone())
        .unwrap_or_else(|| format!("{} {}", fallback, position + 1));
    Ok((root, title))
}

/// Open a report and return its markup
pub fn extract_report(ctx: &PageContext<'_>, target: &ItemTarget) -> Result<ExtractionResult> {
    viewer::run_in_viewer(
        ctx,
        "report",
        || open_artifact(ctx, target, REPORT_VIEWER, "Report"),
        |(root, title)| {
            let located = ContentLocator::longer_than(REPORT_CONTENT, REPORT_MIN_CHARS).locate(ctx.page, &root)?;
            Ok(ExtractionResult::Html {
                title,
                content: located.html,
                citations: Vec::new(),
                warnings: Vec::new(),
            })
        },
    )
}

/// Open a data table and return the table element's markup
pub fn extract_data_table(ctx: &PageContext<'_>, target: &ItemTarget) -> Result<ExtractionResult> {
    viewer::run_in_viewer(
        ctx,
        "data table",
        || open_artifact(ctx, target, TABLE_VIEWER, "Data Table"),
        |(root, title)| {
            let located = ContentLocator::first_present(TABLE_CONTENT).locate(ctx.page, &root)?;
            let html = match located.strategy {
                Some(_) => ctx.page.outer_html(&located.node)?,
                None => located.html,
            };
            Ok(ExtractionResult::Table { title, html })
        },
    )
}
