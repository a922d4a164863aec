use crate::artifact::ExtractionResult;
use crate::dom::NodeRef;
use crate::error::{Result, TakeoutError};
use crate::extract::{ItemTarget, PageContext, citations, locate_item, mindmap, viewer};
use std::time::Duration;

pub(crate) const NOTE_ITEM: &str = "artifact-library-note";
pub(crate) const NOTE_TITLE: &str = ".artifact-title, .note-title";
const NOTE_BUTTON: &str = "button.artifact-button-content, button";
const LIST_TIMEOUT: Duration = Duration::from_secs(3);

/// Whichever of these renders first is the opened note
const CONTENT_RACE: &str = "rich-text-editor .ql-editor, markdown-editor-legacy .ql-editor, \
    labs-tailwind-doc-viewer, mindmap-viewer";

/// Open a note and read it.
///
/// Plain notes yield their editor markup; generated notes also carry their
/// citations; mindmap notes yield the SVG and the reconstructed tree.
pub fn extract_note(ctx: &PageContext<'_>, target: &ItemTarget) -> Result<ExtractionResult> {
    viewer::run_in_viewer(
        ctx,
        "note",
        || open_note(ctx, target),
        |(root, title)| read_note(ctx, &root, &title),
    )
}

fn open_note(ctx: &PageContext<'_>, target: &ItemTarget) -> Result<(NodeRef, String)> {
    ctx.wait_for(None, NOTE_ITEM, LIST_TIMEOUT)?;
    ctx.clock.sleep(ctx.config.settle_delay);

    let items = ctx.page.query_all(None, NOTE_ITEM)?;
    let item = locate_item(ctx.page, &items, NOTE_TITLE, target, "note")?;
    let title = item
        .title
        .clone()
        .or_else(|| target.title.clone())
        .unwrap_or_else(|| format!("Note {}", item.position + 1));

    let button = ctx.page.query(Some(&item.node), NOTE_BUTTON)?.unwrap_or(item.node);
    ctx.page.click(&button)?;

    let root = ctx.wait_for(None, CONTENT_RACE, ctx.config.viewer_timeout)?;
    ctx.pause(1000);
    log::debug!("Opened note '{}'", title);
    Ok((root, title))
}

fn read_note(ctx: &PageContext<'_>, root: &NodeRef, title: &str) -> Result<ExtractionResult> {
    match ctx.page.tag_name(root)?.as_str() {
        "mindmap-viewer" => mindmap::extract_mindmap(ctx, root, title),
        tag => {
            let harvest = if tag == "labs-tailwind-doc-viewer" {
                citations::harvest_citations(ctx, root)?
            } else {
                citations::CitationHarvest::default()
            };

            let content = ctx.page.inner_html(root)?;
            if content.trim().is_empty() {
                return Err(TakeoutError::ExtractionEmpty(format!("note '{}' is empty", title)));
            }
            Ok(ExtractionResult::Html {
                title: title.to_string(),
                content,
                citations: harvest.citations,
                warnings: harvest.warnings,
            })
        }
    }
}
