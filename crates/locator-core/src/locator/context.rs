//! Contextual disambiguation.
//!
//! When a naive selector matches several elements, each strategy below
//! rewrites it with some surrounding structure. Strategies run in a fixed
//! order and the caller stops at the first variant that turns out unique.

use crate::dom::{Document, NodeId};
use crate::selector::css_escape;

/// One way of narrowing a selector with context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextStrategy {
    /// `#parentId naive`
    ParentId,
    /// `.parentFirstClass naive`
    ParentClass,
    /// `parentTag naive`
    ParentTag,
    /// `naive:nth-child(N)`
    NthChild,
    /// `#grandparentId parentTag naive`
    Grandparent,
    /// `table tr:nth-child(R) naive`, then with `td:nth-child(C)`
    TableCell,
    /// `form#id naive`, `form.class naive` or `form naive`
    Form,
    /// `ul > li:nth-child(K) naive`
    ListItem,
}

impl ContextStrategy {
    /// Every strategy in preference order.
    pub const CHAIN: [ContextStrategy; 8] = [
        ContextStrategy::ParentId,
        ContextStrategy::ParentClass,
        ContextStrategy::ParentTag,
        ContextStrategy::NthChild,
        ContextStrategy::Grandparent,
        ContextStrategy::TableCell,
        ContextStrategy::Form,
        ContextStrategy::ListItem,
    ];

    /// Variants of `naive` for `node`. Empty when the context is missing.
    pub fn build(self, doc: &Document, node: NodeId, naive: &str) -> Vec<String> {
        match self {
            ContextStrategy::ParentId => doc
                .parent_element(node)
                .and_then(|p| doc.element(p)?.id())
                .map(|id| vec![format!("#{} {}", css_escape(id), naive)])
                .unwrap_or_default(),
            ContextStrategy::ParentClass => doc
                .parent_element(node)
                .and_then(|p| doc.element(p)?.classes().next())
                .map(|class| vec![format!(".{} {}", css_escape(class), naive)])
                .unwrap_or_default(),
            ContextStrategy::ParentTag => doc
                .parent_element(node)
                .and_then(|p| doc.tag_name(p))
                .map(|tag| vec![format!("{} {}", tag, naive)])
                .unwrap_or_default(),
            ContextStrategy::NthChild => match doc.element_index(node) {
                Some(i) if doc.parent_element(node).is_some() => {
                    vec![format!("{}:nth-child({})", naive, i + 1)]
                }
                _ => Vec::new(),
            },
            ContextStrategy::Grandparent => {
                let Some(parent) = doc.parent_element(node) else {
                    return Vec::new();
                };
                let Some(grandparent) = doc.parent_element(parent) else {
                    return Vec::new();
                };
                match (doc.element(grandparent).and_then(|g| g.id()), doc.tag_name(parent)) {
                    (Some(id), Some(tag)) => {
                        vec![format!("#{} {} {}", css_escape(id), tag, naive)]
                    }
                    _ => Vec::new(),
                }
            }
            ContextStrategy::TableCell => table_cell(doc, node, naive),
            ContextStrategy::Form => {
                let Some(form) = closest(doc, node, &["form"]) else {
                    return Vec::new();
                };
                let Some(el) = doc.element(form) else {
                    return Vec::new();
                };
                let scope = if let Some(id) = el.id() {
                    format!("form#{}", css_escape(id))
                } else if let Some(class) = el.classes().next() {
                    format!("form.{}", css_escape(class))
                } else {
                    "form".to_string()
                };
                vec![format!("{} {}", scope, naive)]
            }
            ContextStrategy::ListItem => {
                let Some(item) = closest(doc, node, &["li"]) else {
                    return Vec::new();
                };
                let Some(list) = doc.parent_element(item) else {
                    return Vec::new();
                };
                let Some(el) = doc.element(list) else {
                    return Vec::new();
                };
                if el.tag() != "ul" && el.tag() != "ol" {
                    return Vec::new();
                }
                let Some(k) = doc.element_index(item) else {
                    return Vec::new();
                };
                let list_sel = match el.id() {
                    Some(id) => format!("{}#{}", el.tag(), css_escape(id)),
                    None => el.tag().to_string(),
                };
                vec![format!("{} > li:nth-child({}) {}", list_sel, k + 1, naive)]
            }
        }
    }
}

/// Nearest ancestor (not the node itself) with one of `tags`.
fn closest(doc: &Document, node: NodeId, tags: &[&str]) -> Option<NodeId> {
    doc.ancestors(node)
        .find(|&a| doc.tag_name(a).is_some_and(|t| tags.contains(&t)))
}

fn table_cell(doc: &Document, node: NodeId, naive: &str) -> Vec<String> {
    let cell = doc
        .ancestors(node)
        .take_while(|&a| doc.tag_name(a) != Some("tr"))
        .find(|&a| matches!(doc.tag_name(a), Some("td" | "th")));
    let Some(row) = closest(doc, node, &["tr"]) else {
        return Vec::new();
    };
    if closest(doc, row, &["table"]).is_none() {
        return Vec::new();
    }
    let Some(r) = doc.element_index(row) else {
        return Vec::new();
    };
    let row_sel = format!("table tr:nth-child({})", r + 1);

    let mut out = vec![format!("{} {}", row_sel, naive)];
    if let Some(cell) = cell {
        if let (Some(c), Some(tag)) = (doc.element_index(cell), doc.tag_name(cell)) {
            out.push(format!("{} {}:nth-child({}) {}", row_sel, tag, c + 1, naive));
        }
    }
    out
}

/// Every strategy's variants in chain order, duplicates dropped.
pub(crate) fn contextual_selectors(
    doc: &Document,
    node: NodeId,
    naive: &str,
) -> Vec<(ContextStrategy, String)> {
    let mut out: Vec<(ContextStrategy, String)> = Vec::new();
    for strategy in ContextStrategy::CHAIN {
        for selector in strategy.build(doc, node, naive) {
            if !out.iter().any(|(_, s)| *s == selector) {
                out.push((strategy, selector));
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parent_context() {
        let mut doc = Document::new();
        let body = doc.body().unwrap();
        let outer = doc.append_element(body, "section", &[("id", "main")]);
        let panel = doc.append_element(outer, "div", &[("id", "panel"), ("class", "card big")]);
        doc.append_element(panel, "span", &[]);
        let button = doc.append_element(panel, "button", &[("class", "btn")]);

        let build = |s: ContextStrategy| s.build(&doc, button, ".btn");
        assert_eq!(build(ContextStrategy::ParentId), ["#panel .btn"]);
        assert_eq!(build(ContextStrategy::ParentClass), [".card .btn"]);
        assert_eq!(build(ContextStrategy::ParentTag), ["div .btn"]);
        assert_eq!(build(ContextStrategy::NthChild), [".btn:nth-child(2)"]);
        assert_eq!(build(ContextStrategy::Grandparent), ["#main div .btn"]);
        assert!(build(ContextStrategy::TableCell).is_empty());
        assert!(build(ContextStrategy::Form).is_empty());
        assert!(build(ContextStrategy::ListItem).is_empty());
    }

    #[test]
    fn table_context_refines_to_cell() {
        let mut doc = Document::new();
        let body = doc.body().unwrap();
        let table = doc.append_element(body, "table", &[]);
        let tbody = doc.append_element(table, "tbody", &[]);
        doc.append_element(tbody, "tr", &[]);
        let row = doc.append_element(tbody, "tr", &[]);
        doc.append_element(row, "td", &[]);
        let cell = doc.append_element(row, "td", &[]);
        let link = doc.append_element(cell, "a", &[("class", "edit")]);

        assert_eq!(
            ContextStrategy::TableCell.build(&doc, link, ".edit"),
            ["table tr:nth-child(2) .edit", "table tr:nth-child(2) td:nth-child(2) .edit"]
        );
        let matches = doc
            .query_selector_all("table tr:nth-child(2) td:nth-child(2) .edit")
            .unwrap();
        assert_eq!(matches, vec![link]);
    }

    #[test]
    fn form_and_list_context() {
        let mut doc = Document::new();
        let body = doc.body().unwrap();
        let form = doc.append_element(body, "form", &[("class", "login")]);
        let list = doc.append_element(form, "ol", &[("id", "steps")]);
        doc.append_element(list, "li", &[]);
        let item = doc.append_element(list, "li", &[]);
        let input = doc.append_element(item, "input", &[]);

        assert_eq!(
            ContextStrategy::Form.build(&doc, input, "input"),
            ["form.login input"]
        );
        assert_eq!(
            ContextStrategy::ListItem.build(&doc, input, "input"),
            ["ol#steps > li:nth-child(2) input"]
        );
    }

    #[test]
    fn chain_drops_duplicates_and_keeps_order() {
        let mut doc = Document::new();
        let body = doc.body().unwrap();
        let form = doc.append_element(body, "form", &[]);
        let input = doc.append_element(form, "input", &[]);

        let chain = contextual_selectors(&doc, input, "input");
        let selectors: Vec<&str> = chain.iter().map(|(_, s)| s.as_str()).collect();
        // ParentTag and Form both produce `form input`
        assert_eq!(selectors, ["form input", "input:nth-child(1)"]);
        assert_eq!(chain[0].0, ContextStrategy::ParentTag);
    }
}
