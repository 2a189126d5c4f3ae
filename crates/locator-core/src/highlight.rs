//! Visual highlighting of elements matched by a selector.
//!
//! Selectors are resolved against the document as it is now, not as it was
//! when the selector was generated. The [`Highlighter`] owns the record of
//! what it changed, so a clear restores every inline style it touched.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::dom::{Document, NodeId, ShadowProbe};
use crate::selector::SelectorList;
use crate::traverse::traverse;
use crate::{xpath, Result};

/// Inline declarations appended to a highlighted element's `style`.
pub const HIGHLIGHT_STYLE: &str = "outline: 3px solid #ff4081 !important; \
     outline-offset: 2px !important; \
     background-color: rgba(255, 64, 129, 0.15) !important;";

/// Reply to a highlight request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HighlightOutcome {
    pub success: bool,
    pub found: bool,
    pub count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Reply to a clear request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClearOutcome {
    pub success: bool,
}

#[derive(Debug, Clone)]
struct Applied {
    node: NodeId,
    /// `style` attribute before highlighting; `None` when it was absent.
    previous_style: Option<String>,
}

/// Tracks the elements currently highlighted in one document.
#[derive(Debug, Default)]
pub struct Highlighter {
    applied: Vec<Applied>,
}

impl Highlighter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Currently highlighted nodes, in highlight order.
    pub fn highlighted(&self) -> Vec<NodeId> {
        self.applied.iter().map(|a| a.node).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.applied.is_empty()
    }

    /// Clear any previous highlight, then highlight `nodes` and scroll the
    /// first one into view. Returns how many elements were highlighted.
    pub fn highlight(&mut self, doc: &mut Document, nodes: &[NodeId]) -> usize {
        self.clear(doc);

        let mut seen = HashSet::new();
        for &node in nodes {
            if !doc.is_element(node) || !seen.insert(node) {
                continue;
            }
            let previous_style = doc.attribute(node, "style").map(str::to_string);
            let style = match previous_style.as_deref().map(str::trim) {
                Some(prev) if !prev.is_empty() => {
                    let sep = if prev.ends_with(';') { " " } else { "; " };
                    format!("{}{}{}", prev, sep, HIGHLIGHT_STYLE)
                }
                _ => HIGHLIGHT_STYLE.to_string(),
            };
            doc.set_attribute(node, "style", &style);
            self.applied.push(Applied {
                node,
                previous_style,
            });
        }

        if let Some(first) = self.applied.first() {
            doc.scroll_into_view(first.node);
        }
        self.applied.len()
    }

    /// Restore every touched element. Safe to call repeatedly.
    pub fn clear(&mut self, doc: &mut Document) -> ClearOutcome {
        let count = self.applied.len();
        for applied in self.applied.drain(..).rev() {
            match applied.previous_style {
                Some(style) => doc.set_attribute(applied.node, "style", &style),
                None => doc.remove_attribute(applied.node, "style"),
            }
        }
        if count > 0 {
            debug!(count, "cleared highlights");
        }
        ClearOutcome { success: true }
    }
}

/// Whether `node` currently carries highlight styling.
pub fn is_highlighted(doc: &Document, node: NodeId) -> bool {
    doc.attribute(node, "style")
        .is_some_and(|s| s.contains(HIGHLIGHT_STYLE))
}

/// Every element matching `selector`: the light DOM first, then each
/// reachable shadow tree. Selectors starting with `/` or `(` are XPath,
/// anything else is CSS.
pub fn resolve(doc: &Document, selector: &str) -> Result<Vec<NodeId>> {
    let selector = selector.trim();
    let is_xpath = selector.starts_with('/') || selector.starts_with('(');
    let css = if is_xpath {
        None
    } else {
        Some(SelectorList::parse(selector)?)
    };
    let query = |scope: NodeId| -> Result<Vec<NodeId>> {
        match &css {
            Some(list) => Ok(list.query_all(doc, scope)),
            None => xpath::evaluate(doc, scope, selector),
        }
    };

    let mut found = query(doc.root())?;
    let mut seen: HashSet<NodeId> = found.iter().copied().collect();
    for visit in traverse(doc, doc.root(), true) {
        for root in ShadowProbe::reachable_roots(doc, visit.node) {
            for node in query(root)? {
                if seen.insert(node) {
                    found.push(node);
                }
            }
        }
    }
    Ok(found)
}

/// Resolve `selector` and highlight the matches. A selector that matches
/// nothing is a successful, empty outcome; one that cannot be parsed is not.
pub fn highlight_selector(
    highlighter: &mut Highlighter,
    doc: &mut Document,
    selector: &str,
) -> HighlightOutcome {
    match resolve(doc, selector) {
        Ok(nodes) => {
            let count = if nodes.is_empty() {
                highlighter.clear(doc);
                0
            } else {
                highlighter.highlight(doc, &nodes)
            };
            info!(selector, count, "highlight");
            HighlightOutcome {
                success: true,
                found: count > 0,
                count,
                error: None,
            }
        }
        Err(e) => {
            debug!(selector, error = %e, "highlight failed");
            HighlightOutcome {
                success: false,
                found: false,
                count: 0,
                error: Some(e.to_string()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::{Rect, ShadowRootMode};

    fn page() -> (Document, Vec<NodeId>) {
        let mut doc = Document::new();
        let body = doc.body().unwrap();
        let a = doc.append_element(body, "button", &[("class", "btn"), ("style", "color: red")]);
        let b = doc.append_element(body, "button", &[("class", "btn")]);
        doc.set_rect(a, Some(Rect::new(0.0, 1500.0, 100.0, 40.0)));
        let host = doc.append_element(body, "x-panel", &[]);
        let root = doc.attach_shadow(host, ShadowRootMode::Open);
        let c = doc.append_element(root, "button", &[("class", "btn")]);
        (doc, vec![a, b, c])
    }

    #[test]
    fn highlights_light_and_shadow_matches() {
        let (mut doc, n) = page();
        let mut hl = Highlighter::new();
        let outcome = highlight_selector(&mut hl, &mut doc, ".btn");
        assert_eq!(
            outcome,
            HighlightOutcome {
                success: true,
                found: true,
                count: 3,
                error: None
            }
        );
        assert_eq!(hl.highlighted(), n);
        assert!(n.iter().all(|&node| is_highlighted(&doc, node)));
        assert_eq!(
            doc.attribute(n[0], "style").unwrap(),
            format!("color: red; {}", HIGHLIGHT_STYLE)
        );
        // first match scrolled into view
        assert_eq!(doc.viewport().scroll_y, 1500.0 - 340.0);
    }

    #[test]
    fn clear_restores_styles_and_is_idempotent() {
        let (mut doc, n) = page();
        let mut hl = Highlighter::new();
        highlight_selector(&mut hl, &mut doc, "button");

        assert_eq!(hl.clear(&mut doc), ClearOutcome { success: true });
        assert_eq!(hl.clear(&mut doc), ClearOutcome { success: true });
        assert!(hl.is_empty());
        assert_eq!(doc.attribute(n[0], "style"), Some("color: red"));
        assert_eq!(doc.attribute(n[1], "style"), None);
        assert!(n.iter().all(|&node| !is_highlighted(&doc, node)));
    }

    #[test]
    fn new_highlight_replaces_the_old_one() {
        let (mut doc, n) = page();
        let mut hl = Highlighter::new();
        highlight_selector(&mut hl, &mut doc, ".btn");
        let outcome = highlight_selector(&mut hl, &mut doc, "/html/body/button[2]");
        assert_eq!(outcome.count, 1);
        assert_eq!(hl.highlighted(), vec![n[1]]);
        assert!(!is_highlighted(&doc, n[0]));
        assert!(!is_highlighted(&doc, n[2]));
    }

    #[test]
    fn misses_and_bad_selectors() {
        let (mut doc, _) = page();
        let mut hl = Highlighter::new();
        highlight_selector(&mut hl, &mut doc, ".btn");

        let miss = highlight_selector(&mut hl, &mut doc, ".nonexistent-class");
        assert!(miss.success && !miss.found && miss.count == 0);
        assert!(hl.is_empty());

        let bad = highlight_selector(&mut hl, &mut doc, "div[");
        assert!(!bad.success);
        assert!(bad.error.unwrap().contains("invalid selector"));
    }

    #[test]
    fn xpath_reaches_into_shadow_roots() {
        let (doc, n) = page();
        assert_eq!(resolve(&doc, "/button").unwrap(), vec![n[2]]);
        assert_eq!(resolve(&doc, "(//button)[2]").unwrap(), vec![n[1]]);
    }
}
