use crate::dom::{BoundingBox, FetchedFile, NodeRef, Page, StyleMap};
use crate::error::{Result, TakeoutError};
use base64::Engine;
use headless_chrome::Tab;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;

/// Page operations implemented by script evaluation in a Chrome tab.
///
/// Elements are stamped with a ref attribute the first time a query returns
/// them; serialized markup has the attribute stripped.
pub struct ChromePage {
    tab: Arc<Tab>,
}

#[derive(Debug, Deserialize)]
struct FetchPayload {
    mime: Option<String>,
    data: String,
}

impl ChromePage {
    pub fn new(tab: Arc<Tab>) -> Self {
        Self { tab }
    }

    pub fn tab(&self) -> &Arc<Tab> {
        &self.tab
    }

    /// Call a helper function with JSON arguments and decode its result
    fn call<T: DeserializeOwned>(&self, function: &str, args: Value) -> Result<T> {
        let helpers = include_str!("page_helpers.js");
        let script = format!(
            "{}\n(async () => JSON.stringify((await window.__takeout.{}(...{})) ?? null))()",
            helpers, function, args
        );

        let result = self
            .tab
            .evaluate(&script, true)
            .map_err(|e| TakeoutError::EvaluationFailed(format!("{}: {}", function, e)))?;

        let value = result
            .value
            .ok_or_else(|| TakeoutError::EvaluationFailed(format!("{} returned no value", function)))?;

        let json_str = value
            .as_str()
            .ok_or_else(|| TakeoutError::EvaluationFailed(format!("{} returned a non-string value", function)))?;

        Ok(serde_json::from_str(json_str)?)
    }

    fn refs(values: Vec<String>) -> Vec<NodeRef> {
        values.into_iter().map(NodeRef::new).collect()
    }
}

fn scope_arg(scope: Option<&NodeRef>) -> Value {
    scope.map(|s| Value::String(s.as_str().to_string())).unwrap_or(Value::Null)
}

impl Page for ChromePage {
    fn query_all(&self, scope: Option<&NodeRef>, selector: &str) -> Result<Vec<NodeRef>> {
        let refs: Vec<String> = self.call("queryAll", json!([scope_arg(scope), selector]))?;
        Ok(Self::refs(refs))
    }

    fn children(&self, node: &NodeRef) -> Result<Vec<NodeRef>> {
        let refs: Vec<String> = self.call("children", json!([node.as_str()]))?;
        Ok(Self::refs(refs))
    }

    fn closest(&self, node: &NodeRef, selector: &str) -> Result<Option<NodeRef>> {
        let found: Option<String> = self.call("closest", json!([node.as_str(), selector]))?;
        Ok(found.map(NodeRef::new))
    }

    fn tag_name(&self, node: &NodeRef) -> Result<String> {
        self.call("tagName", json!([node.as_str()]))
    }

    fn text(&self, node: &NodeRef) -> Result<String> {
        self.call("text", json!([node.as_str()]))
    }

    fn attribute(&self, node: &NodeRef, name: &str) -> Result<Option<String>> {
        self.call("attribute", json!([node.as_str(), name]))
    }

    fn inner_html(&self, node: &NodeRef) -> Result<String> {
        self.call("innerHtml", json!([node.as_str()]))
    }

    fn outer_html(&self, node: &NodeRef) -> Result<String> {
        self.call("outerHtml", json!([node.as_str()]))
    }

    fn is_visible(&self, node: &NodeRef) -> Result<bool> {
        self.call("isVisible", json!([node.as_str()]))
    }

    fn inline_opacity(&self, node: &NodeRef) -> Result<Option<f64>> {
        self.call("inlineOpacity", json!([node.as_str()]))
    }

    fn bounding_box(&self, node: &NodeRef) -> Result<BoundingBox> {
        self.call("boundingBox", json!([node.as_str()]))
    }

    fn computed_styles(&self, root: &NodeRef, selector: &str, properties: &[&str]) -> Result<Vec<StyleMap>> {
        self.call("computedStyles", json!([root.as_str(), selector, properties]))
    }

    fn click(&self, node: &NodeRef) -> Result<()> {
        let _: bool = self.call("click", json!([node.as_str()]))?;
        Ok(())
    }

    fn hover(&self, node: &NodeRef) -> Result<()> {
        let _: bool = self.call("hover", json!([node.as_str()]))?;
        Ok(())
    }

    fn unhover(&self, node: &NodeRef) -> Result<()> {
        let _: bool = self.call("unhover", json!([node.as_str()]))?;
        Ok(())
    }

    fn scroll_into_view(&self, node: &NodeRef) -> Result<()> {
        let _: bool = self.call("scrollIntoView", json!([node.as_str()]))?;
        Ok(())
    }

    fn press_escape(&self) -> Result<()> {
        let _: bool = self.call("pressEscape", json!([]))?;
        Ok(())
    }

    fn set_style(&self, node: &NodeRef, property: &str, value: &str) -> Result<()> {
        let _: bool = self.call("setStyle", json!([node.as_str(), property, value]))?;
        Ok(())
    }

    fn canvas_data_url(&self, node: &NodeRef) -> Result<String> {
        self.call("canvasDataUrl", json!([node.as_str()]))
    }

    fn fetch_with_credentials(&self, url: &str) -> Result<FetchedFile> {
        let payload: FetchPayload = self
            .call("fetchWithCredentials", json!([url]))
            .map_err(|e| TakeoutError::Fetch(format!("in-page fetch of {} failed: {}", url, e)))?;
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(payload.data)
            .map_err(|e| TakeoutError::Fetch(format!("in-page fetch returned bad data: {}", e)))?;
        Ok(FetchedFile {
            mime: payload.mime,
            bytes,
        })
    }

    fn show_overlay(&self, message: &str) -> Result<()> {
        let _: bool = self.call("showOverlay", json!([message]))?;
        Ok(())
    }

    fn update_overlay(&self, message: &str, progress: Option<f64>) -> Result<()> {
        let _: bool = self.call("updateOverlay", json!([message, progress]))?;
        Ok(())
    }

    fn hide_overlay(&self) -> Result<()> {
        let _: bool = self.call("hideOverlay", json!([]))?;
        Ok(())
    }

    fn overlay_cancelled(&self) -> Result<bool> {
        self.call("overlayCancelled", json!([]))
    }

    fn observes_mutations(&self) -> bool {
        true
    }

    fn wait_for_selector(&self, scope: Option<&NodeRef>, selector: &str, timeout: Duration) -> Result<Option<NodeRef>> {
        let found: Option<String> =
            self.call("waitFor", json!([scope_arg(scope), selector, timeout.as_millis() as u64]))?;
        Ok(found.map(NodeRef::new))
    }
}
