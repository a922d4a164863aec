use crate::convert::SvgExport;
use crate::dom::NodeRef;
use crate::download::fetch::decode_data_url;
use crate::error::Result;
use crate::extract::PageContext;

/// File bytes produced straight from page content
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectData {
    pub mime: String,
    pub extension: &'static str,
    pub bytes: Vec<u8>,
}

/// Export an infographic rendered inside `item`.
///
/// Inline SVG becomes a standalone SVG with every element's style inlined;
/// a canvas becomes its PNG. `None` when the item renders neither, in which
/// case the download menu is the only way out.
pub fn export_infographic(ctx: &PageContext<'_>, item: &NodeRef) -> Result<Option<DirectData>> {
    let page = ctx.page;

    if let Some(svg) = page.query(Some(item), "svg")? {
        let export = SvgExport::infographic();
        let styles = page.computed_styles(&svg, export.target.selector(), export.target.properties())?;
        let bbox = page.bounding_box(&svg)?;
        let markup = export.render(&page.outer_html(&svg)?, &styles, bbox)?;
        log::debug!("Infographic exported as SVG ({} bytes)", markup.len());
        return Ok(Some(DirectData {
            mime: "image/svg+xml".to_string(),
            extension: ".svg",
            bytes: markup.into_bytes(),
        }));
    }

    if let Some(canvas) = page.query(Some(item), "canvas")? {
        let file = decode_data_url(&page.canvas_data_url(&canvas)?)?;
        log::debug!("Infographic exported from canvas ({} bytes)", file.bytes.len());
        return Ok(Some(DirectData {
            mime: file.mime.unwrap_or_else(|| "image/png".to_string()),
            extension: ".png",
            bytes: file.bytes,
        }));
    }

    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TakeoutConfig;
    use crate::dom::{ManualClock, MemoryPage, Page};

    fn export(html: &str) -> Option<DirectData> {
        let page = MemoryPage::new(html);
        let clock = ManualClock::new();
        let config = TakeoutConfig::default();
        let ctx = PageContext::new(&page, &clock, &config);
        let item = page.query(None, ".item").unwrap().unwrap();
        export_infographic(&ctx, &item).unwrap()
    }

    #[test]
    fn test_svg_preferred() {
        let data = export(r#"<div class="item"><svg viewBox="0 0 10 10"><rect fill="red" width="10" height="10"/></svg><canvas></canvas></div>"#)
            .unwrap();
        assert_eq!(data.extension, ".svg");
        let text = String::from_utf8(data.bytes).unwrap();
        assert!(text.starts_with("<svg"));
        assert!(text.contains("fill: red"));
    }

    #[test]
    fn test_canvas_png() {
        let data = export(r#"<div class="item"><canvas data-png="iVBORw0KGgo="></canvas></div>"#).unwrap();
        assert_eq!(data.extension, ".png");
        assert_eq!(data.mime, "image/png");
        assert_eq!(&data.bytes[1..4], b"PNG");
    }

    #[test]
    fn test_nothing_to_export() {
        assert!(export(r#"<div class="item"><img src="x.png"></div>"#).is_none());
    }
}
