//! Reading artifacts out of the notebook page
//!
//! Every extractor runs strictly sequentially against the shared page:
//! - [`scan`]: list artifacts, notes and sources
//! - [`viewer`]: viewer lifecycle and the close fallback chain
//! - [`citations`]: tooltip harvesting for cited notes
//! - [`mindmap`]: expansion, tree reconstruction and SVG export
//! - [`note`], [`report`], [`source`]: viewer-based content extractors
//! - [`infographic`]: direct SVG/PNG export

pub mod citations;
pub mod infographic;
pub mod mindmap;
pub mod note;
pub mod report;
pub mod scan;
pub mod source;
pub mod viewer;

pub use citations::{CitationHarvest, CitationPhase, harvest_citations};
pub use infographic::{DirectData, export_infographic};
pub use mindmap::{MindmapTree, TreeNode, extract_mindmap};
pub use note::extract_note;
pub use report::{extract_data_table, extract_report};
pub use scan::{scan_artifacts, scan_notes, scan_sources};
pub use source::extract_source;
pub use viewer::{ViewerPhase, close_viewer, run_in_viewer};

use crate::artifact::{Artifact, DomReference};
use crate::config::TakeoutConfig;
use crate::dom::wait::{find_within, wait_for_element};
use crate::dom::{Clock, NodeRef, Page};
use crate::error::{Result, TakeoutError};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Borrowed collaborators every extractor works with
#[derive(Clone, Copy)]
pub struct PageContext<'a> {
    pub page: &'a dyn Page,
    pub clock: &'a dyn Clock,
    pub config: &'a TakeoutConfig,
}

impl<'a> PageContext<'a> {
    pub fn new(page: &'a dyn Page, clock: &'a dyn Clock, config: &'a TakeoutConfig) -> Self {
        Self { page, clock, config }
    }

    pub fn pause(&self, millis: u64) {
        self.clock.sleep(Duration::from_millis(millis));
    }

    /// Wait for `selector`, failing with a timeout
    pub fn wait_for(&self, scope: Option<&NodeRef>, selector: &str, timeout: Duration) -> Result<NodeRef> {
        wait_for_element(self.page, self.clock, scope, selector, timeout)
    }

    /// Wait for `selector`, `None` on timeout
    pub fn find(&self, scope: Option<&NodeRef>, selector: &str, timeout: Duration) -> Result<Option<NodeRef>> {
        find_within(self.page, self.clock, scope, selector, timeout)
    }
}

/// Which list item to open: exact title first, then position
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ItemTarget {
    /// Exact title of the item
    #[serde(default)]
    pub title: Option<String>,

    /// Zero-based position in its list, used when the title does not match
    #[serde(default)]
    pub index: Option<usize>,
}

impl ItemTarget {
    pub fn new(title: Option<String>, index: Option<usize>) -> Self {
        Self { title, index }
    }

    pub fn by_title(title: impl Into<String>) -> Self {
        Self::new(Some(title.into()), None)
    }

    pub fn by_index(index: usize) -> Self {
        Self::new(None, Some(index))
    }

    /// Target a scanned artifact by title and list position
    pub fn for_artifact(artifact: &Artifact) -> Self {
        let position = match artifact.dom_reference {
            DomReference::ArtifactItem(p) | DomReference::Note(p) | DomReference::Source(p) => p,
        };
        Self::new(Some(artifact.title.clone()), Some(position))
    }
}

/// An item picked out of a list, with the title it shows
#[derive(Debug, Clone)]
pub(crate) struct LocatedItem {
    pub node: NodeRef,
    pub title: Option<String>,
    pub position: usize,
}

/// Pick `target` out of `items` by exact title match, falling back to position
pub(crate) fn locate_item(
    page: &dyn Page,
    items: &[NodeRef],
    title_selector: &str,
    target: &ItemTarget,
    what: &str,
) -> Result<LocatedItem> {
    if target.title.is_none() && target.index.is_none() {
        return Err(TakeoutError::InvalidArgument(format!("{} needs a title or an index", what)));
    }

    let mut titles = Vec::with_capacity(items.len());
    for item in items {
        titles.push(page.query_text(Some(item), title_selector)?);
    }

    if let Some(wanted) = target.title.as_deref() {
        let wanted = wanted.trim();
        if let Some(position) = titles.iter().position(|t| t.as_deref() == Some(wanted)) {
            return Ok(LocatedItem {
                node: items[position].clone(),
                title: titles[position].clone(),
                position,
            });
        }
        log::debug!("No {} titled '{}', trying position", what, wanted);
    }

    match target.index {
        Some(position) if position < items.len() => Ok(LocatedItem {
            node: items[position].clone(),
            title: titles[position].clone(),
            position,
        }),
        Some(position) => Err(TakeoutError::NotFound(format!(
            "{} at position {} ({} present)",
            what,
            position,
            items.len()
        ))),
        None => Err(TakeoutError::NotFound(format!(
            "{} titled '{}'",
            what,
            target.title.as_deref().unwrap_or_default()
        ))),
    }
}
