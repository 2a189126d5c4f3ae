//! Page-wide uniqueness checks.
//!
//! A uniqueness check is `querySelectorAll(selector).length == 1` over the
//! light DOM. Running that naively for every candidate of every element is
//! quadratic, so the oracle indexes the document once per scan and only
//! matches selectors against the smallest bucket their rightmost compound
//! can come from.

use std::collections::HashMap;

use tracing::debug;

use crate::dom::{Document, NodeId};
use crate::selector::{IndexKey, SelectorList};
use crate::xpath::normalize_space;

#[derive(Debug, Default)]
struct QueryIndex {
    all: Vec<NodeId>,
    by_id: HashMap<String, Vec<NodeId>>,
    by_class: HashMap<String, Vec<NodeId>>,
    by_tag: HashMap<String, Vec<NodeId>>,
    by_attr: HashMap<(String, String), Vec<NodeId>>,
    by_position: HashMap<usize, Vec<NodeId>>,
}

impl QueryIndex {
    fn build(doc: &Document) -> Self {
        let mut index = QueryIndex::default();
        for node in doc.descendants(doc.root()) {
            let Some(el) = doc.element(node) else {
                continue;
            };
            index.all.push(node);
            index.by_tag.entry(el.tag().to_string()).or_default().push(node);
            index
                .by_position
                .entry(doc.sibling_info(node).index + 1)
                .or_default()
                .push(node);
            if let Some(id) = el.attr("id") {
                index.by_id.entry(id.to_string()).or_default().push(node);
            }
            for class in el.classes() {
                let bucket = index.by_class.entry(class.to_string()).or_default();
                // `class="a a"` lists the node once
                if bucket.last() != Some(&node) {
                    bucket.push(node);
                }
            }
            for attr in el.attributes() {
                index
                    .by_attr
                    .entry((attr.name.clone(), attr.value.clone()))
                    .or_default()
                    .push(node);
            }
        }
        index
    }

    fn bucket(&self, key: IndexKey<'_>) -> &[NodeId] {
        let found = match key {
            IndexKey::Id(id) => self.by_id.get(id),
            IndexKey::Class(class) => self.by_class.get(class),
            IndexKey::Tag(tag) => self.by_tag.get(tag),
            IndexKey::Attr(name, value) => self.by_attr.get(&(name.to_string(), value.to_string())),
            IndexKey::ChildPosition(position) => self.by_position.get(&position),
        };
        found.map(Vec::as_slice).unwrap_or(&[])
    }

    /// The narrowest set every match of `list` must come from.
    fn candidates(&self, list: &SelectorList) -> &[NodeId] {
        list.index_keys()
            .into_iter()
            .map(|key| self.bucket(key))
            .min_by_key(|bucket| bucket.len())
            .unwrap_or(self.all.as_slice())
    }
}

/// Answers "does this selector match exactly one light-DOM element?" for one
/// document, memoizing per selector string.
#[derive(Debug)]
pub struct UniquenessOracle<'d> {
    doc: &'d Document,
    index: QueryIndex,
    memo: HashMap<String, bool>,
    /// (tag, normalized text) -> count, built on first text lookup.
    texts: Option<HashMap<(String, String), usize>>,
}

impl<'d> UniquenessOracle<'d> {
    pub fn new(doc: &'d Document) -> Self {
        Self {
            doc,
            index: QueryIndex::build(doc),
            memo: HashMap::new(),
            texts: None,
        }
    }

    /// Invalid selectors are never unique.
    pub fn is_unique(&mut self, selector: &str) -> bool {
        if let Some(&known) = self.memo.get(selector) {
            return known;
        }
        let unique = match SelectorList::parse(selector) {
            Ok(list) => {
                let pool = self.index.candidates(&list);
                list.count_up_to(self.doc, pool.iter().copied(), 2) == 1
            }
            Err(e) => {
                debug!(selector, error = %e, "uniqueness check failed");
                false
            }
        };
        self.memo.insert(selector.to_string(), unique);
        unique
    }

    /// Light-DOM elements carrying `id`.
    pub fn id_count(&self, id: &str) -> usize {
        self.index.bucket(IndexKey::Id(id)).len()
    }

    /// Light-DOM `tag` elements whose normalized text content equals `text`,
    /// i.e. the match count of `//tag[normalize-space(.)="text"]`.
    pub fn text_count(&mut self, tag: &str, text: &str) -> usize {
        let doc = self.doc;
        let all = &self.index.all;
        let texts = self.texts.get_or_insert_with(|| {
            let mut counts = HashMap::new();
            for &node in all {
                let Some(tag) = doc.tag_name(node) else {
                    continue;
                };
                let text = normalize_space(&doc.text_content(node));
                *counts.entry((tag.to_string(), text)).or_insert(0) += 1;
            }
            counts
        });
        texts
            .get(&(tag.to_string(), text.to_string()))
            .copied()
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::ShadowRootMode;

    fn page() -> Document {
        let mut doc = Document::new();
        let body = doc.body().unwrap();
        let nav = doc.append_element(body, "nav", &[("class", "menu menu")]);
        for label in ["Home", "Docs", "Docs"] {
            let a = doc.append_element(nav, "a", &[("class", "link"), ("href", "#")]);
            doc.append_text(a, label);
        }
        doc.append_element(body, "div", &[("id", "dup")]);
        doc.append_element(body, "div", &[("id", "dup")]);
        doc.append_element(body, "input", &[("name", "q"), ("type", "search")]);
        let host = doc.append_element(body, "x-shadow", &[]);
        let root = doc.attach_shadow(host, ShadowRootMode::Open);
        doc.append_element(root, "input", &[("name", "hidden-q")]);
        doc
    }

    #[test]
    fn agrees_with_query_selector_all() {
        let doc = page();
        let mut oracle = UniquenessOracle::new(&doc);
        for selector in [
            "nav",
            ".menu",
            ".link",
            "a.link:nth-child(2)",
            "#dup",
            "#dup:nth-child(2)",
            r#"input[name="q"]"#,
            r#"[type="search"]"#,
            "body > div + div",
            "x-shadow",
            "input",
            ".link, nav",
            "span",
        ] {
            let expected = doc.query_selector_all(selector).unwrap().len() == 1;
            assert_eq!(oracle.is_unique(selector), expected, "{}", selector);
        }
    }

    #[test]
    fn nth_child_checks_stay_in_position_bucket() {
        let mut doc = Document::new();
        let body = doc.body().unwrap();
        let list = doc.append_element(body, "ul", &[]);
        for _ in 0..500 {
            doc.append_element(list, "li", &[("class", "item")]);
        }
        let index = QueryIndex::build(&doc);
        let selector = SelectorList::parse("li.item:nth-child(250)").unwrap();
        assert_eq!(index.candidates(&selector).len(), 1);

        let mut oracle = UniquenessOracle::new(&doc);
        assert!(oracle.is_unique("li.item:nth-child(250)"));
        assert!(oracle.is_unique("ul > li:nth-child(1)"));
        assert!(!oracle.is_unique("li.item:nth-child(501)"));
        assert!(!oracle.is_unique("li.item"));
    }

    #[test]
    fn shadow_content_is_invisible() {
        let doc = page();
        let mut oracle = UniquenessOracle::new(&doc);
        assert!(!oracle.is_unique(r#"[name="hidden-q"]"#));
        assert!(oracle.is_unique("input"));
    }

    #[test]
    fn invalid_selectors_are_not_unique() {
        let doc = page();
        let mut oracle = UniquenessOracle::new(&doc);
        assert!(!oracle.is_unique("div["));
        assert!(!oracle.is_unique("div["));
    }

    #[test]
    fn id_and_text_counts() {
        let doc = page();
        let mut oracle = UniquenessOracle::new(&doc);
        assert_eq!(oracle.id_count("dup"), 2);
        assert_eq!(oracle.id_count("missing"), 0);
        assert_eq!(oracle.text_count("a", "Home"), 1);
        assert_eq!(oracle.text_count("a", "Docs"), 2);
        assert_eq!(oracle.text_count("button", "Home"), 0);
    }
}
