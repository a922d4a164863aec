//! Citation harvesting from hover tooltips.
//!
//! Each unique citation button goes through
//! `Idle → Hovering → WaitingForTooltip → ReadingContent → Closing → Idle`.
//! Tooltips are shared page state, so the previous one must be fully gone
//! before the next button is hovered.

use crate::artifact::Citation;
use crate::convert::html_to_markdown;
use crate::convert::markdown::citation_label_text;
use crate::dom::NodeRef;
use crate::error::{Result, TakeoutError};
use crate::extract::PageContext;
use std::collections::HashSet;
use std::time::Duration;

const OVERLAY_CONTAINER: &str = ".cdk-overlay-container";
const EXPANDER: &str = "button.citation-marker";
const EXPANDER_LABEL: &str = "Show additional citations";
const CITATION_BUTTON: &str = "button.ng-star-inserted, button.citation-marker";
const STRUCTURAL_ELEMENT: &str = "labs-tailwind-structural-element-view-v2";

const TOOLTIP_SELECTORS: [(&str, u64); 3] = [
    (r#"xap-inline-dialog-container[role="dialog"][aria-label="Citation Details"]"#, 2000),
    (r#"xap-inline-dialog-container[role="dialog"]"#, 1000),
    ("xap-inline-dialog-container", 1000),
];
const TOOLTIP_ANY: &str = "xap-inline-dialog-container";
const FOOTER: &str = ".citation-tooltip-footer";
const BODY: &str = ".citation-tooltip-text";

const READ_ATTEMPTS: usize = 12;
const READ_POLL: u64 = 50;
const CLOSE_ATTEMPTS: usize = 15;
const CLOSE_POLL: u64 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CitationPhase {
    Idle,
    Hovering,
    WaitingForTooltip,
    ReadingContent,
    Closing,
}

/// Citations read from one note, plus the ones that could not be read
#[derive(Debug, Clone, Default)]
pub struct CitationHarvest {
    pub citations: Vec<Citation>,

    /// One entry per citation that failed; never fatal
    pub warnings: Vec<String>,
}

struct Tracker<'l> {
    label: &'l str,
    phase: CitationPhase,
}

impl Tracker<'_> {
    fn enter(&mut self, next: CitationPhase) {
        log::debug!("Citation {}: {:?} -> {:?}", self.label, self.phase, next);
        self.phase = next;
    }
}

/// Expand collapsed groups, then read every unique citation under `scope`
pub fn harvest_citations(ctx: &PageContext<'_>, scope: &NodeRef) -> Result<CitationHarvest> {
    let overlay = ctx.page.query(None, OVERLAY_CONTAINER)?;
    if let Some(container) = &overlay {
        ctx.page.set_style(container, "visibility", "hidden")?;
    }

    let result = expand_groups(ctx, scope).and_then(|_| harvest_buttons(ctx, scope));

    if let Some(container) = &overlay {
        if let Err(e) = ctx.page.set_style(container, "visibility", "") {
            log::debug!("Could not restore overlay container: {}", e);
        }
    }
    result
}

fn is_expander(ctx: &PageContext<'_>, button: &NodeRef) -> Result<bool> {
    if ctx.page.attribute(button, "aria-label")?.as_deref() == Some(EXPANDER_LABEL) {
        return Ok(true);
    }
    Ok(label_of(ctx, button)?.as_deref() == Some("..."))
}

fn label_of(ctx: &PageContext<'_>, button: &NodeRef) -> Result<Option<String>> {
    let span = ctx.page.query_text(Some(button), "span")?;
    let text = match span {
        Some(text) => text,
        None => ctx.page.text(button)?,
    };
    Ok(citation_label_text(&text))
}

fn expand_groups(ctx: &PageContext<'_>, scope: &NodeRef) -> Result<()> {
    let mut expanded = 0;
    for button in ctx.page.query_all(Some(scope), EXPANDER)? {
        if !is_expander(ctx, &button)? {
            continue;
        }
        ctx.page.scroll_into_view(&button)?;
        ctx.pause(100);
        ctx.page.click(&button)?;
        ctx.pause(300);
        expanded += 1;
    }
    if expanded > 0 {
        log::debug!("Expanded {} citation groups", expanded);
        ctx.pause(200);
    }
    Ok(())
}

fn harvest_buttons(ctx: &PageContext<'_>, scope: &NodeRef) -> Result<CitationHarvest> {
    let mut seen = HashSet::new();
    let mut harvest = CitationHarvest::default();

    for button in ctx.page.query_all(Some(scope), CITATION_BUTTON)? {
        if is_expander(ctx, &button)? {
            continue;
        }
        let Some(label) = label_of(ctx, &button)? else {
            continue;
        };
        if !seen.insert(label.clone()) {
            continue;
        }

        match read_citation(ctx, &button, &label) {
            Ok((source_title, quote_text)) => {
                harvest.citations.push(Citation {
                    display_index: harvest.citations.len() + 1,
                    source_title,
                    quote_text,
                    original_source_id: label,
                });
            }
            Err(e) => {
                log::warn!("Skipping citation {}: {}", label, e);
                harvest.warnings.push(format!("citation {}: {}", label, e));
            }
        }
    }

    log::debug!(
        "Harvested {} citations ({} failed)",
        harvest.citations.len(),
        harvest.warnings.len()
    );
    Ok(harvest)
}

/// Hover one button and read its tooltip; the tooltip is closed either way
fn read_citation(ctx: &PageContext<'_>, button: &NodeRef, label: &str) -> Result<(String, String)> {
    let mut tracker = Tracker {
        label,
        phase: CitationPhase::Idle,
    };

    tracker.enter(CitationPhase::Hovering);
    let read = hover_and_read(ctx, button, &mut tracker);

    tracker.enter(CitationPhase::Closing);
    close_tooltip(ctx, button);
    tracker.enter(CitationPhase::Idle);
    read
}

fn hover_and_read(ctx: &PageContext<'_>, button: &NodeRef, tracker: &mut Tracker<'_>) -> Result<(String, String)> {
    ctx.page.scroll_into_view(button)?;
    ctx.pause(100);
    ctx.page.hover(button)?;

    tracker.enter(CitationPhase::WaitingForTooltip);
    let tooltip = find_tooltip(ctx, tracker.label)?;
    ctx.pause(150);

    tracker.enter(CitationPhase::ReadingContent);
    read_tooltip(ctx, &tooltip, tracker.label)
}

fn find_tooltip(ctx: &PageContext<'_>, label: &str) -> Result<NodeRef> {
    for (selector, timeout) in TOOLTIP_SELECTORS {
        if let Some(tooltip) = ctx.find(None, selector, Duration::from_millis(timeout))? {
            return Ok(tooltip);
        }
    }
    Err(TakeoutError::NotFound(format!("tooltip for citation {}", label)))
}

fn read_tooltip(ctx: &PageContext<'_>, tooltip: &NodeRef, label: &str) -> Result<(String, String)> {
    let page = ctx.page;
    for attempt in 0..READ_ATTEMPTS {
        if attempt > 0 {
            ctx.pause(READ_POLL);
        }

        let opacity = page.inline_opacity(tooltip)?.unwrap_or(0.0);
        if opacity <= 0.5 {
            continue;
        }

        let footer = page.query_text(Some(tooltip), FOOTER)?.unwrap_or_default();
        let body = page.query(Some(tooltip), BODY)?;
        let body_text = match &body {
            Some(node) => page.text(node)?.trim().to_string(),
            None => String::new(),
        };
        if footer.is_empty() && body_text.is_empty() {
            continue;
        }

        let quote = match &body {
            Some(node) => quote_markdown(ctx, node)?.unwrap_or(body_text),
            None => body_text,
        };
        return Ok((footer, quote));
    }

    Err(TakeoutError::ExtractionEmpty(format!(
        "tooltip for citation {} stayed empty",
        label
    )))
}

/// Markdown of the body's structural elements, `None` when there are none
fn quote_markdown(ctx: &PageContext<'_>, body: &NodeRef) -> Result<Option<String>> {
    let mut html = String::new();
    for child in ctx.page.children(body)? {
        if ctx.page.tag_name(&child)? == STRUCTURAL_ELEMENT {
            html.push_str(&ctx.page.outer_html(&child)?);
        }
    }
    if html.is_empty() {
        return Ok(None);
    }
    let markdown = html_to_markdown(&html);
    Ok((!markdown.is_empty()).then_some(markdown))
}

fn close_tooltip(ctx: &PageContext<'_>, button: &NodeRef) {
    if let Err(e) = ctx.page.unhover(button) {
        log::debug!("Unhover failed: {}", e);
    }

    for _ in 0..CLOSE_ATTEMPTS {
        match tooltip_gone(ctx) {
            Ok(true) => break,
            Ok(false) => ctx.pause(CLOSE_POLL),
            Err(e) => {
                log::debug!("Tooltip check failed: {}", e);
                break;
            }
        }
    }
    ctx.pause(100);
}

fn tooltip_gone(ctx: &PageContext<'_>) -> Result<bool> {
    let Some(tooltip) = ctx.page.query(None, TOOLTIP_ANY)? else {
        return Ok(true);
    };
    let opacity = ctx.page.inline_opacity(&tooltip)?.unwrap_or(1.0);
    if opacity < 0.1 && ctx.page.query_text(Some(&tooltip), FOOTER)?.is_none() {
        ctx.pause(300);
        return Ok(true);
    }
    Ok(false)
}
