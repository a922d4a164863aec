use crate::dom::{NodeRef, Page};
use crate::error::{Result, TakeoutError};

/// One candidate in an ordered content-container search
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentStrategy {
    /// CSS selector, first match only
    pub selector: &'static str,

    /// Markup must be longer than this many characters; `None` accepts any match
    pub min_chars: Option<usize>,
}

impl ContentStrategy {
    pub const fn longer_than(selector: &'static str, min_chars: usize) -> Self {
        Self {
            selector,
            min_chars: Some(min_chars),
        }
    }

    pub const fn present(selector: &'static str) -> Self {
        Self {
            selector,
            min_chars: None,
        }
    }

    fn accepts(&self, html: &str) -> bool {
        match self.min_chars {
            Some(min) => html.chars().count() > min,
            None => true,
        }
    }
}

/// Content chosen by a [`ContentLocator`]
#[derive(Debug, Clone)]
pub struct LocatedContent {
    pub node: NodeRef,

    pub html: String,

    /// Index of the winning strategy; `None` when the root itself was used
    pub strategy: Option<usize>,
}

/// Ordered list of content strategies tried inside a viewer root.
///
/// The first strategy whose match passes its threshold wins. When none does,
/// the root's own markup is used.
#[derive(Debug, Clone)]
pub struct ContentLocator {
    strategies: Vec<ContentStrategy>,
}

impl ContentLocator {
    pub fn new(strategies: &[ContentStrategy]) -> Self {
        Self {
            strategies: strategies.to_vec(),
        }
    }

    /// Selectors with a shared minimum length
    pub fn longer_than(selectors: &[&'static str], min_chars: usize) -> Self {
        Self {
            strategies: selectors
                .iter()
                .map(|s| ContentStrategy::longer_than(s, min_chars))
                .collect(),
        }
    }

    /// Selectors where any match is accepted
    pub fn first_present(selectors: &[&'static str]) -> Self {
        Self {
            strategies: selectors.iter().map(|s| ContentStrategy::present(s)).collect(),
        }
    }

    pub fn strategies(&self) -> &[ContentStrategy] {
        &self.strategies
    }

    /// Run the strategies inside `root`
    pub fn locate(&self, page: &dyn Page, root: &NodeRef) -> Result<LocatedContent> {
        for (index, strategy) in self.strategies.iter().enumerate() {
            let Some(node) = page.query(Some(root), strategy.selector)? else {
                continue;
            };
            let html = page.inner_html(&node)?;
            if strategy.accepts(&html) {
                log::debug!("Content located via '{}'", strategy.selector);
                return Ok(LocatedContent {
                    node,
                    html,
                    strategy: Some(index),
                });
            }
            log::debug!("Skipping '{}': {} chars is below threshold", strategy.selector, html.len());
        }

        let html = page.inner_html(root)?;
        if html.trim().is_empty() {
            return Err(TakeoutError::ExtractionEmpty("viewer has no content".to_string()));
        }
        log::debug!("No content strategy matched, using viewer root");
        Ok(LocatedContent {
            node: root.clone(),
            html,
            strategy: None,
        })
    }
}
