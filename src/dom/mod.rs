//! Page-coupled context
//!
//! Everything that touches the notebook page goes through the [`Page`] trait:
//! - [`ChromePage`]: a live Chrome tab driven over CDP
//! - [`MemoryPage`]: scripted in-memory page used for saved snapshots and tests
//! - [`wait`]: clocks and bounded waits for DOM state
//! - [`locator`]: ordered content-container strategies

pub mod chrome;
pub mod locator;
pub mod memory;
pub mod wait;

pub use chrome::ChromePage;
pub use locator::{ContentLocator, ContentStrategy, LocatedContent};
pub use memory::{MemoryPage, PageEvent, Reaction};
pub use wait::{Clock, ManualClock, SystemClock};

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Opaque handle to an element of the current page
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeRef(String);

impl NodeRef {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for NodeRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Bounding box coordinates for an element
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// Computed style properties of one element, in request order
pub type StyleMap = Vec<(String, String)>;

/// Bytes fetched with the page's credentials
#[derive(Debug, Clone)]
pub struct FetchedFile {
    pub mime: Option<String>,
    pub bytes: Vec<u8>,
}

/// Operations the extractors need from the page.
///
/// A `scope` of `None` means the whole document. Selectors are CSS.
pub trait Page: Send + Sync {
    /// All elements under `scope` matching `selector`, in document order
    fn query_all(&self, scope: Option<&NodeRef>, selector: &str) -> Result<Vec<NodeRef>>;

    /// First element under `scope` matching `selector`
    fn query(&self, scope: Option<&NodeRef>, selector: &str) -> Result<Option<NodeRef>> {
        Ok(self.query_all(scope, selector)?.into_iter().next())
    }

    /// Element children of `node`
    fn children(&self, node: &NodeRef) -> Result<Vec<NodeRef>>;

    /// Nearest inclusive ancestor of `node` matching `selector`
    fn closest(&self, node: &NodeRef, selector: &str) -> Result<Option<NodeRef>>;

    /// Lower-case tag name
    fn tag_name(&self, node: &NodeRef) -> Result<String>;

    /// Text content, untrimmed
    fn text(&self, node: &NodeRef) -> Result<String>;

    fn attribute(&self, node: &NodeRef, name: &str) -> Result<Option<String>>;

    fn inner_html(&self, node: &NodeRef) -> Result<String>;

    fn outer_html(&self, node: &NodeRef) -> Result<String>;

    fn is_visible(&self, node: &NodeRef) -> Result<bool>;

    /// Opacity set in the element's inline style, if any
    fn inline_opacity(&self, node: &NodeRef) -> Result<Option<f64>>;

    /// Geometry of the element (`getBBox` for SVG content)
    fn bounding_box(&self, node: &NodeRef) -> Result<BoundingBox>;

    /// Computed `properties` of every element under `root` matching `selector`
    fn computed_styles(&self, root: &NodeRef, selector: &str, properties: &[&str]) -> Result<Vec<StyleMap>>;

    fn click(&self, node: &NodeRef) -> Result<()>;

    /// Synthetic pointer enter
    fn hover(&self, node: &NodeRef) -> Result<()>;

    /// Synthetic pointer leave
    fn unhover(&self, node: &NodeRef) -> Result<()>;

    fn scroll_into_view(&self, node: &NodeRef) -> Result<()>;

    /// Escape keydown followed by keyup on the document
    fn press_escape(&self) -> Result<()>;

    fn set_style(&self, node: &NodeRef, property: &str, value: &str) -> Result<()>;

    /// PNG data URL of a canvas element
    fn canvas_data_url(&self, node: &NodeRef) -> Result<String>;

    /// Fetch a URL from inside the page so its cookies apply
    fn fetch_with_credentials(&self, url: &str) -> Result<FetchedFile>;

    fn show_overlay(&self, message: &str) -> Result<()>;

    fn update_overlay(&self, message: &str, progress: Option<f64>) -> Result<()>;

    fn hide_overlay(&self) -> Result<()>;

    /// Whether the overlay's cancel button was pressed
    fn overlay_cancelled(&self) -> Result<bool>;

    /// True when [`Page::wait_for_selector`] blocks on DOM mutations itself
    fn observes_mutations(&self) -> bool {
        false
    }

    /// Wait for `selector` to appear under `scope`.
    ///
    /// Pages that cannot observe mutations only check once; callers use
    /// [`wait::wait_for_element`] which polls in that case.
    fn wait_for_selector(
        &self,
        scope: Option<&NodeRef>,
        selector: &str,
        _timeout: Duration,
    ) -> Result<Option<NodeRef>> {
        self.query(scope, selector)
    }

    /// Trimmed text of the first match, `None` when absent or blank
    fn query_text(&self, scope: Option<&NodeRef>, selector: &str) -> Result<Option<String>> {
        match self.query(scope, selector)? {
            Some(node) => {
                let text = self.text(&node)?.trim().to_string();
                Ok(if text.is_empty() { None } else { Some(text) })
            }
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_ref_display() {
        let node = NodeRef::new("t12");
        assert_eq!(node.to_string(), "t12");
        assert_eq!(node.as_str(), "t12");
    }

    #[test]
    fn test_query_text_trims() {
        let page = MemoryPage::new("<div class='t'>  Hello  </div><div class='e'>  </div>");
        assert_eq!(page.query_text(None, ".t").unwrap().as_deref(), Some("Hello"));
        assert_eq!(page.query_text(None, ".e").unwrap(), None);
        assert_eq!(page.query_text(None, ".missing").unwrap(), None);
    }
}
