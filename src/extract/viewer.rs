//! Viewer lifecycle: `Closed → Opening → Open → Extracting → Closing → Closed`.
//!
//! Closing is always attempted, whatever the extraction did. A viewer left
//! open by an earlier run is detected and closed before a new one opens.

use crate::error::{Result, TakeoutError};
use crate::extract::PageContext;
use std::time::Duration;

/// Any element that only exists while a viewer is showing
pub const OPEN_VIEWER_SELECTOR: &str = "report-viewer, table-viewer, source-viewer, mindmap-viewer, \
    rich-text-editor .ql-editor, markdown-editor-legacy .ql-editor, labs-tailwind-doc-viewer";

const CLOSE_PASSES: usize = 3;
const GENERIC_CLOSE: &str = r#"button[aria-label*="Back"], button[aria-label*="Close"]"#;
const GENERIC_CLOSE_DELAY: Duration = Duration::from_millis(1000);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewerPhase {
    Closed,
    Opening,
    Open,
    Extracting,
    Closing,
}

struct Lifecycle<'w> {
    what: &'w str,
    phase: ViewerPhase,
}

impl<'w> Lifecycle<'w> {
    fn new(what: &'w str) -> Self {
        Self {
            what,
            phase: ViewerPhase::Closed,
        }
    }

    fn enter(&mut self, next: ViewerPhase) {
        log::debug!("{} viewer: {:?} -> {:?}", self.what, self.phase, next);
        self.phase = next;
    }
}

/// Whether any viewer is currently showing
pub fn viewer_open(ctx: &PageContext<'_>) -> Result<bool> {
    Ok(ctx.page.query(None, OPEN_VIEWER_SELECTOR)?.is_some())
}

/// One rung of the close fallback chain; `false` when its control is absent
#[derive(Debug, Clone, Copy)]
enum CloseStep {
    Escape,
    BackIcon,
    PanelHeader,
}

impl CloseStep {
    const ALL: [CloseStep; 3] = [Self::Escape, Self::BackIcon, Self::PanelHeader];

    fn attempt(self, ctx: &PageContext<'_>) -> Result<bool> {
        let page = ctx.page;
        match self {
            Self::Escape => {
                page.press_escape()?;
                Ok(true)
            }
            Self::BackIcon => {
                for icon in page.query_all(None, "mat-icon")? {
                    if page.text(&icon)?.trim() != "arrow_back" {
                        continue;
                    }
                    if let Some(button) = page.closest(&icon, "button")? {
                        page.click(&button)?;
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            Self::PanelHeader => {
                let Some(header) = page.query(None, ".panel-header")? else {
                    return Ok(false);
                };
                match page.children(&header)?.get(1) {
                    Some(control) => {
                        page.click(control)?;
                        Ok(true)
                    }
                    None => Ok(false),
                }
            }
        }
    }
}

/// Close whatever viewer is open.
///
/// Runs up to three passes of Escape, the back-arrow icon and the panel
/// header's second child, re-checking after each, then tries a generic
/// Back/Close button. Returns [`TakeoutError::PanelCloseFailure`] when the
/// viewer is still showing after all of that.
pub fn close_viewer(ctx: &PageContext<'_>) -> Result<()> {
    if !viewer_open(ctx)? {
        return Ok(());
    }

    for pass in 1..=CLOSE_PASSES {
        for step in CloseStep::ALL {
            if !step.attempt(ctx)? {
                continue;
            }
            ctx.clock.sleep(ctx.config.close_step_delay);
            if !viewer_open(ctx)? {
                log::debug!("Viewer closed by {:?} on pass {}", step, pass);
                return Ok(());
            }
        }
    }

    if let Some(button) = ctx.page.query(None, GENERIC_CLOSE)? {
        ctx.page.click(&button)?;
        ctx.clock.sleep(GENERIC_CLOSE_DELAY);
        if !viewer_open(ctx)? {
            log::debug!("Viewer closed by generic close button");
            return Ok(());
        }
    }

    Err(TakeoutError::PanelCloseFailure(format!(
        "still open after {} passes",
        CLOSE_PASSES
    )))
}

fn close_logged(ctx: &PageContext<'_>, what: &str) {
    if let Err(e) = close_viewer(ctx) {
        log::warn!("Closing {} viewer: {}", what, e);
    }
}

/// Open a viewer, extract from it and always close it again.
///
/// `open` clicks whatever opens the viewer and returns what `extract`
/// needs; `extract` reads the viewer. A close failure is logged and does
/// not replace the extraction's own result.
pub fn run_in_viewer<O, T>(
    ctx: &PageContext<'_>,
    what: &str,
    open: impl FnOnce() -> Result<O>,
    extract: impl FnOnce(O) -> Result<T>,
) -> Result<T> {
    let mut lifecycle = Lifecycle::new(what);

    if viewer_open(ctx)? {
        log::debug!("Stale viewer found before opening {}", what);
        lifecycle.enter(ViewerPhase::Closing);
        close_logged(ctx, what);
        lifecycle.enter(ViewerPhase::Closed);
    }

    lifecycle.enter(ViewerPhase::Opening);
    let result = match open() {
        Ok(opened) => {
            lifecycle.enter(ViewerPhase::Open);
            lifecycle.enter(ViewerPhase::Extracting);
            extract(opened)
        }
        Err(e) => Err(e),
    };

    lifecycle.enter(ViewerPhase::Closing);
    close_logged(ctx, what);
    lifecycle.enter(ViewerPhase::Closed);
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TakeoutConfig;
    use crate::dom::{ManualClock, MemoryPage, Page, PageEvent, Reaction};

    const LIST: &str = "<div id='list'><button class='open'>Open</button></div>";
    const VIEWER: &str = r#"<div id='list'><button class='open'>Open</button></div>
        <report-viewer><div class="panel-header"><span>Title</span><button class="x">x</button></div>
        <p>Body</p></report-viewer>"#;

    #[test]
    fn test_escape_closes_on_first_step() {
        let page = MemoryPage::new(VIEWER).on_key("Escape", || Reaction::scene(LIST));
        let clock = ManualClock::new();
        let config = TakeoutConfig::default();
        let ctx = PageContext::new(&page, &clock, &config);

        close_viewer(&ctx).unwrap();
        assert_eq!(page.actions(), vec!["Key Escape".to_string()]);
        assert_eq!(clock.sleeps(), vec![config.close_step_delay]);
    }

    #[test]
    fn test_panel_header_fallback() {
        let page = MemoryPage::new(VIEWER).on(PageEvent::Click, ".panel-header .x", |_| Reaction::scene(LIST));
        let clock = ManualClock::new();
        let config = TakeoutConfig::default();
        let ctx = PageContext::new(&page, &clock, &config);

        close_viewer(&ctx).unwrap();
        let actions = page.actions();
        assert_eq!(actions[0], "Key Escape");
        assert!(actions[1].starts_with("Click "));
    }

    #[test]
    fn test_close_failure_after_all_passes() {
        let page = MemoryPage::new(VIEWER);
        let clock = ManualClock::new();
        let config = TakeoutConfig::default();
        let ctx = PageContext::new(&page, &clock, &config);

        let err = close_viewer(&ctx).unwrap_err();
        assert!(matches!(err, TakeoutError::PanelCloseFailure(_)));
        let escapes = page.actions().iter().filter(|a| *a == "Key Escape").count();
        assert_eq!(escapes, CLOSE_PASSES);
    }

    #[test]
    fn test_run_in_viewer_closes_even_when_extraction_fails() {
        let page = MemoryPage::new(LIST)
            .on(PageEvent::Click, "button.open", |_| Reaction::scene(VIEWER))
            .on_key("Escape", || Reaction::scene(LIST));
        let clock = ManualClock::new();
        let config = TakeoutConfig::default();
        let ctx = PageContext::new(&page, &clock, &config);

        let result: Result<()> = run_in_viewer(
            &ctx,
            "report",
            || {
                let button = page.query(None, "button.open")?.ok_or_else(|| TakeoutError::NotFound("open".into()))?;
                page.click(&button)?;
                ctx.wait_for(None, "report-viewer", config.viewer_timeout)
            },
            |_root| Err(TakeoutError::ExtractionEmpty("nothing".into())),
        );

        assert!(matches!(result, Err(TakeoutError::ExtractionEmpty(_))));
        assert!(!viewer_open(&ctx).unwrap());
    }

    #[test]
    fn test_stale_viewer_closed_before_opening() {
        let page = MemoryPage::new(VIEWER).on_key("Escape", || Reaction::scene(LIST));
        let clock = ManualClock::new();
        let config = TakeoutConfig::default();
        let ctx = PageContext::new(&page, &clock, &config);

        let seen_open = run_in_viewer(&ctx, "note", || viewer_open(&ctx), Ok).unwrap();
        assert!(!seen_open);
        assert_eq!(page.actions()[0], "Key Escape");
    }
}
