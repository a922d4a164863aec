//! Standalone SVG documents from live page markup.
//!
//! The page serializes the `<svg>` element and reports computed styles for
//! the targeted elements in document order. Styles are written back inline,
//! the root is resized to the content box plus padding, and a white
//! background is added so the file renders the same outside the page.

use crate::dom::{BoundingBox, StyleMap};
use crate::error::{Result, TakeoutError};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};

static START_TAG: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"<([A-Za-z][\w:.-]*)((?:\s+[^\s=/>]+(?:\s*=\s*(?:"[^"]*"|'[^']*'|[^\s>]+))?)*)\s*(/?)>"#)
        .expect("valid regex")
});
static STYLE_ATTR: Lazy<Regex> = Lazy::new(|| Regex::new(r#"\sstyle\s*=\s*"([^"]*)""#).expect("valid regex"));
static SIZE_ATTRS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"\s(?:width|height|viewBox)\s*=\s*(?:"[^"]*"|'[^']*')"#).expect("valid regex"));
static OPACITY_ATTR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"\s(?:fill-)?opacity\s*=\s*(?:"[^"]*"|'[^']*')"#).expect("valid regex"));
static OPACITY_DECL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(^|[;\s])(?:fill-)?opacity\s*:[^;]*;?").expect("valid regex"));

/// Page text is drawn with `fill-opacity: 1e-06` until hovered
const OPAQUE_TEXT: &str = "fill-opacity: 1; opacity: 1";

const TEXT_PROPERTIES: &[&str] = &[
    "font-family",
    "font-size",
    "font-weight",
    "fill",
    "text-anchor",
    "dominant-baseline",
];

const ALL_PROPERTIES: &[&str] = &[
    "fill",
    "fill-opacity",
    "stroke",
    "stroke-width",
    "stroke-opacity",
    "font-family",
    "font-size",
    "font-weight",
    "text-anchor",
    "dominant-baseline",
    "opacity",
    "visibility",
];

/// Which elements get their computed style inlined
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StyleTarget {
    /// Only `<text>` elements (mindmaps)
    Text,
    /// Every descendant of the root (infographics)
    All,
}

impl StyleTarget {
    pub fn selector(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::All => "*",
        }
    }

    pub fn properties(&self) -> &'static [&'static str] {
        match self {
            Self::Text => TEXT_PROPERTIES,
            Self::All => ALL_PROPERTIES,
        }
    }

    fn matches(&self, tag: &str) -> bool {
        match self {
            Self::Text => tag.eq_ignore_ascii_case("text"),
            Self::All => true,
        }
    }
}

/// Settings for turning page SVG into a standalone file
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SvgExport {
    pub padding: f64,
    pub target: StyleTarget,

    /// Drop opacity and fill-opacity left by animations; text is forced opaque
    pub force_opaque: bool,
}

impl SvgExport {
    pub fn mindmap() -> Self {
        Self {
            padding: 50.0,
            target: StyleTarget::Text,
            force_opaque: true,
        }
    }

    pub fn infographic() -> Self {
        Self {
            padding: 20.0,
            target: StyleTarget::All,
            force_opaque: false,
        }
    }

    /// Rewrite `markup` (the serialized root `<svg>`).
    ///
    /// `styles` are the computed styles of the elements matching
    /// [`StyleTarget::selector`] in document order; `bbox` is the content box.
    pub fn render(&self, markup: &str, styles: &[StyleMap], bbox: BoundingBox) -> Result<String> {
        let markup = markup.trim();
        if !markup.get(..4).is_some_and(|head| head.eq_ignore_ascii_case("<svg")) {
            return Err(TakeoutError::ExtractionEmpty("markup is not an svg element".to_string()));
        }

        let mut seen_root = false;
        let mut styled = 0usize;
        let rewritten = START_TAG.replace_all(markup, |caps: &Captures<'_>| {
            let tag = &caps[1];
            let attrs = caps.get(2).map_or("", |m| m.as_str());
            let close = &caps[3];

            if !seen_root {
                seen_root = true;
                return self.root_tag(attrs, close, bbox);
            }

            let mut attrs = if self.force_opaque {
                strip_opacity(attrs)
            } else {
                attrs.to_string()
            };
            if self.target.matches(tag) {
                if let Some(style) = styles.get(styled) {
                    attrs = merge_style(&attrs, style);
                }
                styled += 1;
            }
            if self.force_opaque && tag.eq_ignore_ascii_case("text") {
                attrs = opaque_text(&attrs);
            }
            format!("<{}{}{}>", tag, attrs, close)
        });

        if styled != styles.len() {
            log::debug!("Styled {} elements but {} style sets were captured", styled, styles.len());
        }
        Ok(rewritten.into_owned())
    }

    fn root_tag(&self, attrs: &str, close: &str, bbox: BoundingBox) -> String {
        let mut attrs = SIZE_ATTRS.replace_all(attrs, "").into_owned();
        if self.force_opaque {
            attrs = strip_opacity(&attrs);
        }
        if !attrs.contains("xmlns=") {
            attrs.push_str(" xmlns=\"http://www.w3.org/2000/svg\"");
        }

        let pad = self.padding;
        let (x, y) = (bbox.x - pad, bbox.y - pad);
        let (width, height) = (bbox.width + pad * 2.0, bbox.height + pad * 2.0);
        attrs.push_str(&format!(
            " width=\"{}\" height=\"{}\" viewBox=\"{} {} {} {}\"",
            width, height, x, y, width, height
        ));

        let mut css = String::from("text{font-family:'Google Sans',Roboto,Arial,sans-serif;}");
        if self.force_opaque {
            css.push_str("g,path,text,rect,circle{opacity:1;}text{fill-opacity:1;}");
        }
        let prelude = format!(
            "<style>{}</style><rect x=\"{}\" y=\"{}\" width=\"{}\" height=\"{}\" fill=\"white\"/>",
            css, x, y, width, height
        );

        if close == "/" {
            format!("<svg{}>{}</svg>", attrs, prelude)
        } else {
            format!("<svg{}>{}", attrs, prelude)
        }
    }
}

fn strip_opacity(attrs: &str) -> String {
    let attrs = OPACITY_ATTR.replace_all(attrs, "");
    STYLE_ATTR
        .replace_all(&attrs, |caps: &Captures<'_>| {
            let css = OPACITY_DECL.replace_all(&caps[1], "$1");
            format!(" style=\"{}\"", css.trim())
        })
        .into_owned()
}

fn opaque_text(attrs: &str) -> String {
    if !STYLE_ATTR.is_match(attrs) {
        return format!("{} style=\"{}\"", attrs, OPAQUE_TEXT);
    }
    STYLE_ATTR
        .replace(attrs, |caps: &Captures<'_>| {
            let css = caps[1].trim().trim_end_matches(';').trim_end();
            if css.is_empty() {
                format!(" style=\"{}\"", OPAQUE_TEXT)
            } else {
                format!(" style=\"{}; {}\"", css, OPAQUE_TEXT)
            }
        })
        .into_owned()
}

fn merge_style(attrs: &str, style: &StyleMap) -> String {
    let css: Vec<String> = style
        .iter()
        .filter(|(_, value)| !value.is_empty())
        .map(|(name, value)| format!("{}: {}", name, value.replace('"', "'")))
        .collect();
    if css.is_empty() {
        return attrs.to_string();
    }
    let css = css.join("; ");

    if STYLE_ATTR.is_match(attrs) {
        STYLE_ATTR
            .replace(attrs, |caps: &Captures<'_>| format!(" style=\"{}; {}\"", css, &caps[1]))
            .into_owned()
    } else {
        format!("{} style=\"{}\"", attrs, css)
    }
}
