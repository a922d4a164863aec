use crate::artifact::{ExtractionResult, SourceGuide};
use crate::dom::{ContentLocator, NodeRef};
use crate::error::Result;
use crate::extract::{ItemTarget, PageContext, locate_item, viewer};

pub(crate) const SOURCE_ITEM: &str = ".single-source-container";
pub(crate) const SOURCE_TITLE: &str = ".source-title";
const SOURCE_VIEWER: &str = "source-viewer";
const SOURCE_CONTENT: &[&str] = &[
    ".scroll-container",
    "labs-tailwind-doc-viewer",
    ".panel-content",
    ".ql-editor",
    ".content",
    r#"[class*="content"]"#,
];
const SOURCE_MIN_CHARS: usize = 50;
const GUIDE_SUMMARY: &str = ".source-guide-container .summary";
const KEY_TOPIC: &str = ".key-topics-text";

/// Open a source and read its content plus the guide shown beside it
pub fn extract_source(ctx: &PageContext<'_>, target: &ItemTarget) -> Result<ExtractionResult> {
    viewer::run_in_viewer(
        ctx,
        "source",
        || open_source(ctx, target),
        |(root, title)| {
            let located = ContentLocator::longer_than(SOURCE_CONTENT, SOURCE_MIN_CHARS).locate(ctx.page, &root)?;
            let guide = read_guide(ctx)?;
            Ok(ExtractionResult::Source {
                title,
                content: located.html,
                guide,
            })
        },
    )
}

fn open_source(ctx: &PageContext<'_>, target: &ItemTarget) -> Result<(NodeRef, String)> {
    let items = ctx.page.query_all(None, SOURCE_ITEM)?;
    let item = locate_item(ctx.page, &items, SOURCE_TITLE, target, "source")?;
    let title = item
        .title
        .clone()
        .or_else(|| target.title.clone())
        .unwrap_or_else(|| format!("Source {}", item.position + 1));

    // The second child is the clickable title row; the first is the checkbox
    let clickable = ctx.page.children(&item.node)?.into_iter().nth(1).unwrap_or(item.node);
    ctx.page.scroll_into_view(&clickable)?;
    ctx.pause(200);
    ctx.page.click(&clickable)?;
    ctx.pause(1000);

    let root = ctx.wait_for(None, SOURCE_VIEWER, ctx.config.viewer_timeout)?;
    ctx.clock.sleep(ctx.config.settle_delay);
    Ok((root, title))
}

fn read_guide(ctx: &PageContext<'_>) -> Result<Option<SourceGuide>> {
    let summary_html = match ctx.page.query(None, GUIDE_SUMMARY)? {
        Some(summary) => ctx.page.inner_html(&summary)?.trim().to_string(),
        None => String::new(),
    };
    let mut key_topics = Vec::new();
    for topic in ctx.page.query_all(None, KEY_TOPIC)? {
        let text = ctx.page.text(&topic)?.trim().to_string();
        if !text.is_empty() {
            key_topics.push(text);
        }
    }

    if summary_html.is_empty() && key_topics.is_empty() {
        return Ok(None);
    }
    Ok(Some(SourceGuide {
        summary_html,
        key_topics,
    }))
}
