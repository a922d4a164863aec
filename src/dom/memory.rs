//! In-memory page backed by `scraper`.
//!
//! The page holds the current document as HTML text. Interactions are
//! scripted: a binding maps an event on elements matching a selector to a
//! [`Reaction`] that swaps in a new scene and/or raises a native download.
//! Element refs are child-index paths from the `<html>` element, so a ref
//! stays valid across scenes as long as the elements before it are unchanged.

use crate::dom::{BoundingBox, FetchedFile, NodeRef, Page, StyleMap};
use crate::download::{DownloadItem, DownloadObserver};
use crate::error::{Result, TakeoutError};
use parking_lot::Mutex;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashMap;
use std::sync::Weak;

const REF_PREFIX: &str = "mem:";

/// Interaction kinds a binding can react to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageEvent {
    /// Bubbles: ancestors of the clicked element are matched too
    Click,
    Hover,
    Unhover,
}

/// Effect of an interaction
#[derive(Debug, Clone, Default)]
pub struct Reaction {
    /// Replacement document
    pub scene: Option<String>,

    /// Native download raised by the browser
    pub download: Option<DownloadItem>,
}

impl Reaction {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn scene(html: impl Into<String>) -> Self {
        Self {
            scene: Some(html.into()),
            download: None,
        }
    }

    pub fn download(item: DownloadItem) -> Self {
        Self {
            scene: None,
            download: Some(item),
        }
    }

    /// Builder method: also raise a native download
    pub fn with_download(mut self, item: DownloadItem) -> Self {
        self.download = Some(item);
        self
    }
}

type Handler = Box<dyn Fn(&ElementRef<'_>) -> Reaction + Send + Sync>;
type KeyHandler = Box<dyn Fn() -> Reaction + Send + Sync>;

struct Binding {
    event: PageEvent,
    selector: String,
    handler: Handler,
}

/// State of the export overlay
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OverlayState {
    pub visible: bool,
    pub message: String,
    pub progress: Option<f64>,
    pub cancelled: bool,
}

/// Scripted page over static HTML scenes
pub struct MemoryPage {
    html: Mutex<String>,
    bindings: Vec<Binding>,
    keys: Vec<(String, KeyHandler)>,
    resources: HashMap<String, FetchedFile>,
    overlay: Mutex<OverlayState>,
    observer: Mutex<Option<Weak<dyn DownloadObserver>>>,
    actions: Mutex<Vec<String>>,
}

impl MemoryPage {
    pub fn new(html: &str) -> Self {
        Self {
            html: Mutex::new(html.to_string()),
            bindings: Vec::new(),
            keys: Vec::new(),
            resources: HashMap::new(),
            overlay: Mutex::new(OverlayState::default()),
            observer: Mutex::new(None),
            actions: Mutex::new(Vec::new()),
        }
    }

    /// Builder method: react to `event` on elements matching `selector`
    pub fn on<F>(mut self, event: PageEvent, selector: &str, handler: F) -> Self
    where
        F: Fn(&ElementRef<'_>) -> Reaction + Send + Sync + 'static,
    {
        self.bindings.push(Binding {
            event,
            selector: selector.to_string(),
            handler: Box::new(handler),
        });
        self
    }

    /// Builder method: react to a key press such as `"Escape"`
    pub fn on_key<F>(mut self, key: &str, handler: F) -> Self
    where
        F: Fn() -> Reaction + Send + Sync + 'static,
    {
        self.keys.push((key.to_string(), Box::new(handler)));
        self
    }

    /// Builder method: answer page-credentialed fetches of `url`
    pub fn serve(mut self, url: &str, mime: &str, bytes: impl Into<Vec<u8>>) -> Self {
        self.resources.insert(
            url.to_string(),
            FetchedFile {
                mime: Some(mime.to_string()),
                bytes: bytes.into(),
            },
        );
        self
    }

    /// Route native downloads raised by reactions to `observer`
    pub fn set_download_observer(&self, observer: Weak<dyn DownloadObserver>) {
        *self.observer.lock() = Some(observer);
    }

    /// Replace the current document
    pub fn set_scene(&self, html: impl Into<String>) {
        *self.html.lock() = html.into();
    }

    pub fn current_html(&self) -> String {
        self.html.lock().clone()
    }

    /// Log of interactions performed on the page
    pub fn actions(&self) -> Vec<String> {
        self.actions.lock().clone()
    }

    pub fn overlay_state(&self) -> OverlayState {
        self.overlay.lock().clone()
    }

    /// Simulate the user pressing the overlay's cancel button
    pub fn press_overlay_cancel(&self) {
        self.overlay.lock().cancelled = true;
    }

    fn with_element<T>(&self, node: &NodeRef, f: impl FnOnce(ElementRef<'_>) -> Result<T>) -> Result<T> {
        let html = self.html.lock();
        let doc = Html::parse_document(&html);
        let element = resolve(&doc, node)?;
        f(element)
    }

    fn record(&self, action: String) {
        self.actions.lock().push(action);
    }

    fn dispatch(&self, event: PageEvent, node: &NodeRef) -> Result<()> {
        let reaction = {
            let html = self.html.lock();
            let doc = Html::parse_document(&html);
            let element = resolve(&doc, node)?;
            let mut targets = vec![element];
            if event == PageEvent::Click {
                targets.extend(element.ancestors().filter_map(ElementRef::wrap));
            }

            let mut found = None;
            'targets: for target in &targets {
                for binding in self.bindings.iter().filter(|b| b.event == event) {
                    if parse_selector(&binding.selector)?.matches(target) {
                        found = Some((binding.handler)(target));
                        break 'targets;
                    }
                }
            }
            found
        };

        self.record(format!("{:?} {}", event, node));
        if let Some(reaction) = reaction {
            self.apply(reaction);
        }
        Ok(())
    }

    fn apply(&self, reaction: Reaction) {
        if let Some(scene) = reaction.scene {
            *self.html.lock() = scene;
        }
        if let Some(item) = reaction.download {
            let observer = self.observer.lock().as_ref().and_then(Weak::upgrade);
            match observer {
                Some(observer) => observer.on_created(&item),
                None => log::debug!("No download observer for {}", item.url),
            }
        }
    }
}

fn parse_selector(selector: &str) -> Result<Selector> {
    Selector::parse(selector).map_err(|e| TakeoutError::InvalidSelector(format!("{}: {:?}", selector, e)))
}

fn encode(path: &[usize]) -> NodeRef {
    let parts: Vec<String> = path.iter().map(|i| i.to_string()).collect();
    NodeRef::new(format!("{}{}", REF_PREFIX, parts.join("/")))
}

fn path_of(element: ElementRef<'_>) -> Vec<usize> {
    let mut path = Vec::new();
    let mut current = element;
    while let Some(parent) = current.parent().and_then(ElementRef::wrap) {
        let index = parent
            .children()
            .filter_map(ElementRef::wrap)
            .position(|child| child.id() == current.id())
            .unwrap_or(0);
        path.push(index);
        current = parent;
    }
    path.reverse();
    path
}

fn resolve<'a>(doc: &'a Html, node: &NodeRef) -> Result<ElementRef<'a>> {
    let raw = node
        .as_str()
        .strip_prefix(REF_PREFIX)
        .ok_or_else(|| TakeoutError::InvalidArgument(format!("foreign node ref {}", node)))?;

    let mut current = doc.root_element();
    for part in raw.split('/').filter(|p| !p.is_empty()) {
        let index: usize = part
            .parse()
            .map_err(|_| TakeoutError::InvalidArgument(format!("malformed node ref {}", node)))?;
        current = current
            .children()
            .filter_map(ElementRef::wrap)
            .nth(index)
            .ok_or_else(|| TakeoutError::NotFound(format!("stale node ref {}", node)))?;
    }
    Ok(current)
}

fn style_value(element: &ElementRef<'_>, property: &str) -> Option<String> {
    let style = element.value().attr("style")?;
    style.split(';').find_map(|declaration| {
        let (name, value) = declaration.split_once(':')?;
        if name.trim().eq_ignore_ascii_case(property) {
            Some(value.trim().trim_end_matches("!important").trim().to_string())
        } else {
            None
        }
    })
}

fn is_hidden(element: &ElementRef<'_>) -> bool {
    element.value().attr("hidden").is_some()
        || style_value(element, "display").is_some_and(|v| v == "none")
        || style_value(element, "visibility").is_some_and(|v| v == "hidden")
}

fn parse_length(value: &str) -> Option<f64> {
    value.trim().trim_end_matches("px").parse().ok()
}

impl Page for MemoryPage {
    fn query_all(&self, scope: Option<&NodeRef>, selector: &str) -> Result<Vec<NodeRef>> {
        let selector = parse_selector(selector)?;
        let html = self.html.lock();
        let doc = Html::parse_document(&html);
        let found = match scope {
            Some(scope) => resolve(&doc, scope)?.select(&selector).map(|e| encode(&path_of(e))).collect(),
            None => doc.select(&selector).map(|e| encode(&path_of(e))).collect(),
        };
        Ok(found)
    }

    fn children(&self, node: &NodeRef) -> Result<Vec<NodeRef>> {
        self.with_element(node, |element| {
            Ok(element
                .children()
                .filter_map(ElementRef::wrap)
                .map(|child| encode(&path_of(child)))
                .collect())
        })
    }

    fn closest(&self, node: &NodeRef, selector: &str) -> Result<Option<NodeRef>> {
        let selector = parse_selector(selector)?;
        self.with_element(node, |element| {
            let found = std::iter::once(element)
                .chain(element.ancestors().filter_map(ElementRef::wrap))
                .find(|candidate| selector.matches(candidate));
            Ok(found.map(|e| encode(&path_of(e))))
        })
    }

    fn tag_name(&self, node: &NodeRef) -> Result<String> {
        self.with_element(node, |element| Ok(element.value().name().to_ascii_lowercase()))
    }

    fn text(&self, node: &NodeRef) -> Result<String> {
        self.with_element(node, |element| Ok(element.text().collect()))
    }

    fn attribute(&self, node: &NodeRef, name: &str) -> Result<Option<String>> {
        self.with_element(node, |element| Ok(element.value().attr(name).map(str::to_string)))
    }

    fn inner_html(&self, node: &NodeRef) -> Result<String> {
        self.with_element(node, |element| Ok(element.inner_html()))
    }

    fn outer_html(&self, node: &NodeRef) -> Result<String> {
        self.with_element(node, |element| Ok(element.html()))
    }

    fn is_visible(&self, node: &NodeRef) -> Result<bool> {
        self.with_element(node, |element| {
            let hidden = std::iter::once(element)
                .chain(element.ancestors().filter_map(ElementRef::wrap))
                .any(|e| is_hidden(&e));
            Ok(!hidden)
        })
    }

    fn inline_opacity(&self, node: &NodeRef) -> Result<Option<f64>> {
        self.with_element(node, |element| {
            Ok(style_value(&element, "opacity").and_then(|v| v.parse().ok()))
        })
    }

    fn bounding_box(&self, node: &NodeRef) -> Result<BoundingBox> {
        self.with_element(node, |element| {
            let attrs = element.value();
            let mut bbox = BoundingBox::default();
            if let Some(view_box) = attrs.attr("viewBox").or_else(|| attrs.attr("viewbox")) {
                let parts: Vec<f64> = view_box
                    .split(|c: char| c == ',' || c.is_whitespace())
                    .filter_map(|p| p.parse().ok())
                    .collect();
                if let [x, y, width, height] = parts[..] {
                    bbox = BoundingBox { x, y, width, height };
                }
            }
            if let Some(width) = attrs.attr("width").and_then(parse_length) {
                bbox.width = width;
            }
            if let Some(height) = attrs.attr("height").and_then(parse_length) {
                bbox.height = height;
            }
            Ok(bbox)
        })
    }

    fn computed_styles(&self, root: &NodeRef, selector: &str, properties: &[&str]) -> Result<Vec<StyleMap>> {
        let selector = parse_selector(selector)?;
        self.with_element(root, |element| {
            Ok(element
                .select(&selector)
                .map(|e| {
                    properties
                        .iter()
                        .filter_map(|p| {
                            style_value(&e, p)
                                .or_else(|| e.value().attr(p).map(str::to_string))
                                .map(|v| (p.to_string(), v))
                        })
                        .collect()
                })
                .collect())
        })
    }

    fn click(&self, node: &NodeRef) -> Result<()> {
        self.dispatch(PageEvent::Click, node)
    }

    fn hover(&self, node: &NodeRef) -> Result<()> {
        self.dispatch(PageEvent::Hover, node)
    }

    fn unhover(&self, node: &NodeRef) -> Result<()> {
        self.dispatch(PageEvent::Unhover, node)
    }

    fn scroll_into_view(&self, node: &NodeRef) -> Result<()> {
        self.with_element(node, |_| Ok(()))?;
        self.record(format!("Scroll {}", node));
        Ok(())
    }

    fn press_escape(&self) -> Result<()> {
        self.record("Key Escape".to_string());
        let reaction = self
            .keys
            .iter()
            .find(|(key, _)| key == "Escape")
            .map(|(_, handler)| handler());
        if let Some(reaction) = reaction {
            self.apply(reaction);
        }
        Ok(())
    }

    fn set_style(&self, node: &NodeRef, property: &str, value: &str) -> Result<()> {
        self.record(format!("Style {} {}={}", node, property, value));
        Ok(())
    }

    fn canvas_data_url(&self, node: &NodeRef) -> Result<String> {
        self.with_element(node, |element| {
            element
                .value()
                .attr("data-png")
                .map(|data| format!("data:image/png;base64,{}", data))
                .ok_or_else(|| TakeoutError::ExtractionEmpty("canvas has no exported image".to_string()))
        })
    }

    fn fetch_with_credentials(&self, url: &str) -> Result<FetchedFile> {
        self.record(format!("Fetch {}", url));
        self.resources
            .get(url)
            .cloned()
            .ok_or_else(|| TakeoutError::Fetch(format!("{} is not served by this page", url)))
    }

    fn show_overlay(&self, message: &str) -> Result<()> {
        let mut overlay = self.overlay.lock();
        *overlay = OverlayState {
            visible: true,
            message: message.to_string(),
            progress: None,
            cancelled: false,
        };
        Ok(())
    }

    fn update_overlay(&self, message: &str, progress: Option<f64>) -> Result<()> {
        let mut overlay = self.overlay.lock();
        overlay.message = message.to_string();
        overlay.progress = progress;
        Ok(())
    }

    fn hide_overlay(&self) -> Result<()> {
        self.overlay.lock().visible = false;
        Ok(())
    }

    fn overlay_cancelled(&self) -> Result<bool> {
        Ok(self.overlay.lock().cancelled)
    }
}
