//! Mindmap extraction: expand every node, rebuild the tree, export the SVG.

use crate::artifact::ExtractionResult;
use crate::convert::SvgExport;
use crate::dom::{NodeRef, Page};
use crate::error::{Result, TakeoutError};
use crate::extract::PageContext;
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

const EXPAND_ALL: &str = r#"button[aria-label*="Expand all"], button[aria-label*="expand all"]"#;
const NODE: &str = r#"g.node[role="treeitem"], g[role="treeitem"]"#;
const COLLAPSED: &str = r#"g[role="treeitem"][aria-expanded="false"]"#;

const STABLE_CHECKS: usize = 3;
const MAX_COUNT_CHECKS: usize = 20;
const COUNT_POLL: u64 = 300;
const EXPAND_PASSES: usize = 2;
const SETTLE: u64 = 1500;

static CHILD_COUNT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d+)\s+children?").expect("valid regex"));

/// One node of the reconstructed mindmap
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TreeNode {
    pub name: String,
    pub level: u32,
    pub expanded: bool,
    pub child_count: usize,
    pub children: Vec<TreeNode>,
}

impl TreeNode {
    /// This node plus all descendants
    pub fn count(&self) -> usize {
        1 + self.children.iter().map(TreeNode::count).sum::<usize>()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MindmapMetadata {
    pub total_nodes: usize,
    pub exported_at: DateTime<Utc>,
}

/// The JSON document exported beside the SVG
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MindmapTree {
    pub title: String,
    pub root: TreeNode,
    pub metadata: MindmapMetadata,
}

impl MindmapTree {
    pub fn new(title: impl Into<String>, root: TreeNode) -> Self {
        let total_nodes = root.count();
        Self {
            title: title.into(),
            root,
            metadata: MindmapMetadata {
                total_nodes,
                exported_at: Utc::now(),
            },
        }
    }
}

/// A node as read from the page, before parents are known
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlatNode {
    pub name: String,
    pub level: u32,
    pub expanded: bool,
    /// From the "N children" part of the label
    pub declared_children: Option<usize>,
}

impl FlatNode {
    /// Parse a node's attributes; the name is the label up to its first comma
    pub fn from_attributes(label: Option<&str>, level: Option<&str>, expanded: Option<&str>) -> Self {
        let label = label.unwrap_or_default();
        let name = label.split(',').next().unwrap_or_default().trim();
        Self {
            name: if name.is_empty() { "Unnamed".to_string() } else { name.to_string() },
            level: level.and_then(|l| l.trim().parse().ok()).unwrap_or(1),
            expanded: expanded == Some("true"),
            declared_children: CHILD_COUNT
                .captures(label)
                .and_then(|c| c[1].parse().ok()),
        }
    }
}

/// Rebuild parent/child links from depth-first order.
///
/// The root is the first level-1 node, or the first node when none is at
/// level 1. Nodes rendered before the root are visited right after it. The
/// stack is popped while its top is at the current node's level or deeper;
/// the node then becomes a child of the new top. The root is never popped,
/// so stray top-level nodes attach to it.
pub fn build_tree(nodes: &[FlatNode]) -> Option<TreeNode> {
    let root = nodes.iter().position(|node| node.level == 1).unwrap_or(0);
    let first = nodes.get(root)?;

    let order = (0..root).chain(root + 1..nodes.len());
    let mut children: Vec<Vec<usize>> = vec![Vec::new(); nodes.len()];
    let mut stack = vec![root];
    for index in order {
        let level = nodes[index].level;
        while stack.len() > 1 && nodes[stack[stack.len() - 1]].level >= level {
            stack.pop();
        }
        let parent = stack[stack.len() - 1];
        children[parent].push(index);
        stack.push(index);
    }

    fn assemble(index: usize, nodes: &[FlatNode], children: &[Vec<usize>]) -> TreeNode {
        let node = &nodes[index];
        let kids: Vec<TreeNode> = children[index]
            .iter()
            .map(|&child| assemble(child, nodes, children))
            .collect();
        TreeNode {
            name: node.name.clone(),
            level: node.level,
            expanded: node.expanded,
            child_count: node.declared_children.unwrap_or(kids.len()),
            children: kids,
        }
    }

    log::debug!("Rebuilding mindmap rooted at '{}' from {} nodes", first.name, nodes.len());
    Some(assemble(root, nodes, &children))
}

fn node_count(page: &dyn Page, scope: &NodeRef) -> Result<usize> {
    Ok(page.query_all(Some(scope), NODE)?.len())
}

/// Expand every node, waiting for the node count to settle
pub fn expand_all(ctx: &PageContext<'_>, viewer: &NodeRef) -> Result<()> {
    if let Some(button) = ctx.page.query(None, EXPAND_ALL)? {
        ctx.page.click(&button)?;

        let mut last = node_count(ctx.page, viewer)?;
        let mut stable = 0;
        for _ in 0..MAX_COUNT_CHECKS {
            ctx.pause(COUNT_POLL);
            let count = node_count(ctx.page, viewer)?;
            if count == last {
                stable += 1;
                if stable >= STABLE_CHECKS {
                    log::debug!("Mindmap settled at {} nodes", count);
                    break;
                }
            } else {
                stable = 0;
                last = count;
            }
        }
    }

    // Nodes revealed by the first pass may themselves be collapsed
    for pass in 0..EXPAND_PASSES {
        let collapsed = ctx.page.query_all(Some(viewer), COLLAPSED)?;
        if collapsed.is_empty() {
            break;
        }
        log::debug!("Expanding {} collapsed nodes (pass {})", collapsed.len(), pass + 1);
        for node in collapsed {
            let target = ctx.page.query(Some(&node), "circle")?.unwrap_or(node);
            ctx.page.click(&target)?;
            ctx.pause(COUNT_POLL);
        }
    }

    ctx.pause(SETTLE);
    Ok(())
}

/// Read the rendered nodes in document order
pub fn read_nodes(page: &dyn Page, viewer: &NodeRef) -> Result<Vec<FlatNode>> {
    let mut nodes = Vec::new();
    for node in page.query_all(Some(viewer), NODE)? {
        let label = match page.attribute(&node, "aria-label")? {
            Some(label) => Some(label),
            None => page.query_text(Some(&node), "text")?,
        };
        nodes.push(FlatNode::from_attributes(
            label.as_deref(),
            page.attribute(&node, "aria-level")?.as_deref(),
            page.attribute(&node, "aria-expanded")?.as_deref(),
        ));
    }
    Ok(nodes)
}

/// Standalone SVG of the rendered mindmap
pub fn export_svg(page: &dyn Page, viewer: &NodeRef) -> Result<String> {
    let svg = page
        .query(Some(viewer), "svg")?
        .ok_or_else(|| TakeoutError::NotFound("mindmap svg".to_string()))?;
    let export = SvgExport::mindmap();
    let styles = page.computed_styles(&svg, export.target.selector(), export.target.properties())?;
    let bbox = page.bounding_box(&svg)?;
    export.render(&page.outer_html(&svg)?, &styles, bbox)
}

/// Expand, export and rebuild the mindmap shown in `viewer`
pub fn extract_mindmap(ctx: &PageContext<'_>, viewer: &NodeRef, title: &str) -> Result<ExtractionResult> {
    expand_all(ctx, viewer)?;

    let svg = export_svg(ctx.page, viewer)?;
    let nodes = read_nodes(ctx.page, viewer)?;
    let root = build_tree(&nodes)
        .ok_or_else(|| TakeoutError::ExtractionEmpty(format!("mindmap '{}' has no nodes", title)))?;

    Ok(ExtractionResult::Mindmap {
        title: title.to_string(),
        svg,
        tree: MindmapTree::new(title, root),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TakeoutConfig;
    use crate::dom::{ManualClock, MemoryPage, PageEvent, Reaction};
    use std::sync::Arc;
    use std::time::Duration;

    fn flat(name: &str, level: u32) -> FlatNode {
        FlatNode {
            name: name.to_string(),
            level,
            expanded: true,
            declared_children: None,
        }
    }

    fn node(name: &str, level: u32, expanded: bool) -> String {
        format!(
            r#"<g class="node" role="treeitem" aria-level="{}" aria-expanded="{}" aria-label="{}"><circle r="4"></circle><text>{}</text></g>"#,
            level, expanded, name, name
        )
    }

    fn scene(button: bool, nodes: &[String]) -> String {
        let button = if button { r#"<button aria-label="Expand all"></button>"# } else { "" };
        format!(r#"{}<mindmap-viewer><svg>{}</svg></mindmap-viewer>"#, button, nodes.concat())
    }

    fn topic_with_leaves(total: usize) -> Vec<String> {
        std::iter::once(node("Topic", 1, true))
            .chain((1..total).map(|i| node(&format!("Leaf {}", i), 2, true)))
            .collect()
    }

    fn clicks(page: &MemoryPage) -> usize {
        page.actions().iter().filter(|a| a.starts_with("Click")).count()
    }

    #[test]
    fn test_expand_all_waits_for_count_to_settle() {
        let page = Arc::new(
            MemoryPage::new(&scene(true, &topic_with_leaves(1)))
                .on(PageEvent::Click, EXPAND_ALL, |_| Reaction::scene(scene(true, &topic_with_leaves(2)))),
        );
        // Two more nodes render during the first two polls
        let growing = page.clone();
        let clock = ManualClock::new().on_sleep(move |count| {
            if count <= 2 {
                growing.set_scene(scene(true, &topic_with_leaves(count + 2)));
            }
        });
        let config = TakeoutConfig::default();
        let ctx = PageContext::new(page.as_ref(), &clock, &config);
        let viewer = page.query(None, "mindmap-viewer").unwrap().unwrap();

        expand_all(&ctx, &viewer).unwrap();

        assert_eq!(node_count(page.as_ref(), &viewer).unwrap(), 4);
        assert_eq!(clicks(&page), 1);
        let mut expected = vec![Duration::from_millis(COUNT_POLL); 2 + STABLE_CHECKS];
        expected.push(Duration::from_millis(SETTLE));
        assert_eq!(clock.sleeps(), expected);
    }

    #[test]
    fn test_expand_all_stops_polling_a_growing_map() {
        let page = Arc::new(MemoryPage::new(&scene(true, &topic_with_leaves(1))));
        let growing = page.clone();
        let clock = ManualClock::new().on_sleep(move |count| {
            growing.set_scene(scene(true, &topic_with_leaves(count + 1)));
        });
        let config = TakeoutConfig::default();
        let ctx = PageContext::new(page.as_ref(), &clock, &config);
        let viewer = page.query(None, "mindmap-viewer").unwrap().unwrap();

        expand_all(&ctx, &viewer).unwrap();

        let sleeps = clock.sleeps();
        assert_eq!(sleeps.len(), MAX_COUNT_CHECKS + 1);
        assert!(sleeps[..MAX_COUNT_CHECKS].iter().all(|s| *s == Duration::from_millis(COUNT_POLL)));
        assert_eq!(sleeps[MAX_COUNT_CHECKS], Duration::from_millis(SETTLE));
        assert_eq!(clicks(&page), 1);
    }

    #[test]
    fn test_collapsed_nodes_expanded_in_two_passes() {
        let topic = node("Topic", 1, true);
        let first = vec![topic.clone(), node("B", 2, false)];
        let second = vec![topic.clone(), node("B", 2, true), node("C", 3, false)];
        let third = vec![topic, node("B", 2, true), node("C", 3, true), node("D", 4, false)];
        let (second, third) = (scene(false, &second), scene(false, &third));
        let page = MemoryPage::new(&scene(false, &first))
            .on(PageEvent::Click, r#"g[aria-label="B"]"#, move |_| Reaction::scene(second.clone()))
            .on(PageEvent::Click, r#"g[aria-label="C"]"#, move |_| Reaction::scene(third.clone()));
        let clock = ManualClock::new();
        let config = TakeoutConfig::default();
        let ctx = PageContext::new(&page, &clock, &config);
        let viewer = page.query(None, "mindmap-viewer").unwrap().unwrap();

        expand_all(&ctx, &viewer).unwrap();

        assert_eq!(clicks(&page), EXPAND_PASSES);
        let poll = Duration::from_millis(COUNT_POLL);
        assert_eq!(clock.sleeps(), vec![poll, poll, Duration::from_millis(SETTLE)]);
        // A third level of collapsed nodes is left alone
        let left = page.query(Some(&viewer), COLLAPSED).unwrap().unwrap();
        assert_eq!(page.attribute(&left, "aria-label").unwrap().as_deref(), Some("D"));
    }

    #[test]
    fn test_stack_discipline() {
        let root = build_tree(&[flat("A", 1), flat("B", 2), flat("C", 2), flat("D", 3)]).unwrap();
        assert_eq!(root.child_count, 2);
        assert_eq!(root.children[0].name, "B");
        assert!(root.children[0].children.is_empty());
        assert_eq!(root.children[1].children[0].name, "D");
        assert_eq!(root.count(), 4);
    }

    #[test]
    fn test_stray_top_level_attaches_to_root() {
        let root = build_tree(&[flat("A", 1), flat("B", 2), flat("Z", 1)]).unwrap();
        assert_eq!(root.children.len(), 2);
        assert_eq!(root.children[1].name, "Z");
        assert!(build_tree(&[]).is_none());
    }

    #[test]
    fn test_first_top_level_node_is_root() {
        let root = build_tree(&[flat("Detail", 2), flat("Topic", 1), flat("Sub", 2), flat("Leaf", 3)]).unwrap();
        assert_eq!(root.name, "Topic");
        let names: Vec<&str> = root.children.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["Detail", "Sub"]);
        assert_eq!(root.children[1].children[0].name, "Leaf");
        assert_eq!(root.count(), 4);

        let root = build_tree(&[flat("A", 2), flat("B", 3)]).unwrap();
        assert_eq!(root.name, "A");
        assert_eq!(root.children[0].name, "B");
    }

    #[test]
    fn test_label_parsing() {
        let node = FlatNode::from_attributes(Some("Climate, 3 children, collapsed"), Some("2"), Some("false"));
        assert_eq!(node.name, "Climate");
        assert_eq!(node.level, 2);
        assert!(!node.expanded);
        assert_eq!(node.declared_children, Some(3));

        let node = FlatNode::from_attributes(Some("Leaf, 1 child"), None, Some("true"));
        assert_eq!(node.declared_children, Some(1));
        assert_eq!(node.level, 1);
        assert_eq!(FlatNode::from_attributes(None, None, None).name, "Unnamed");
    }

    #[test]
    fn test_tree_json_is_camel_case() {
        let root = build_tree(&[flat("A", 1)]).unwrap();
        let json = serde_json::to_value(MindmapTree::new("Map", root)).unwrap();
        assert_eq!(json["root"]["childCount"], 0);
        assert_eq!(json["metadata"]["totalNodes"], 1);
        assert!(json["metadata"]["exportedAt"].is_string());
    }

    #[test]
    fn test_extract_from_viewer() {
        let html = r#"<mindmap-viewer>
            <svg viewBox="0 0 200 100" width="200" height="100">
              <g class="node" role="treeitem" aria-level="1" aria-expanded="true" aria-label="Topic, 1 child"><text style="fill: #333; opacity: 0">Topic</text></g>
              <g class="node" role="treeitem" aria-level="2" aria-expanded="true" aria-label="Sub"><text>Sub</text></g>
            </svg></mindmap-viewer>"#;
        let page = MemoryPage::new(html);
        let clock = ManualClock::new();
        let config = TakeoutConfig::default();
        let ctx = PageContext::new(&page, &clock, &config);
        let viewer = page.query(None, "mindmap-viewer").unwrap().unwrap();

        let ExtractionResult::Mindmap { svg, tree, .. } = extract_mindmap(&ctx, &viewer, "Map").unwrap() else {
            panic!("expected a mindmap");
        };
        assert!(svg.contains("xmlns=\"http://www.w3.org/2000/svg\""));
        assert!(!svg.contains("opacity: 0"));
        assert_eq!(tree.root.name, "Topic");
        assert_eq!(tree.root.children[0].name, "Sub");
        assert_eq!(tree.metadata.total_nodes, 2);
    }
}
