//! Tiered candidate generation for one element.

use std::sync::LazyLock;

use regex::RegexSet;
use tracing::trace;

use super::context::contextual_selectors;
use super::index::UniquenessOracle;
use super::*;
use crate::classify;
use crate::dom::{Document, ElementData, NodeId};
use crate::selector::{css_escape, css_string};
use crate::xpath;

/// Attributes test suites add on purpose.
pub const TEST_HOOK_ATTRIBUTES: &[&str] =
    &["data-testid", "data-test-id", "data-test", "data-cy", "data-qa"];

/// Other `data-*` attributes considered per element.
const MAX_DATA_ATTRIBUTES: usize = 3;
const MAX_DATA_VALUE_LEN: usize = 100;
const MAX_CLASSES: usize = 3;
const TEXT_MIN_LEN: usize = 2;
const TEXT_MAX_LEN: usize = 50;

static GENERATED_CLASS: LazyLock<RegexSet> = LazyLock::new(|| {
    RegexSet::new([
        // styled-components, emotion, jss, svelte, css modules
        r"^(?:sc|css|jss|emotion|svelte|jsx)-[A-Za-z0-9_-]+$",
        r"^[A-Za-z][A-Za-z0-9]*_[A-Za-z0-9]+__[A-Za-z0-9_-]{5,}$",
        // bare hashes such as `a1b2c3d`
        r"^_?[a-z]{0,2}[0-9][a-z0-9]{4,}$",
        r"^_?[a-zA-Z0-9]{5,}[0-9]{2,}[a-zA-Z0-9]*$",
    ])
    .expect("class patterns are valid")
});

/// Class names worth putting in a selector.
pub fn is_stable_class(class: &str) -> bool {
    !class.is_empty() && !class.contains(':') && !GENERATED_CLASS.is_match(class)
}

/// How a naive selector and its contextual variants are labelled.
struct Naive {
    kind: String,
    selector: String,
    value: String,
    confidence: f64,
    /// Level when the naive selector is not unique.
    miss: UniquenessLevel,
    /// Level carried by contextual variants.
    context: UniquenessLevel,
    /// Contextual variants kept at most.
    cap: usize,
}

/// Generates [`LocatorSet`]s for elements of one document.
///
/// Holds the document's uniqueness index, so reuse one synthesizer for every
/// element of a scan.
pub struct Synthesizer<'d> {
    doc: &'d Document,
    oracle: UniquenessOracle<'d>,
}

impl<'d> Synthesizer<'d> {
    pub fn new(doc: &'d Document) -> Self {
        Self {
            doc,
            oracle: UniquenessOracle::new(doc),
        }
    }

    /// Candidates for `node`. `shadow` marks elements living in a shadow tree,
    /// whose selectors cannot be checked against the page. `text` is the
    /// element's cleaned text.
    pub fn synthesize(&mut self, node: NodeId, shadow: bool, text: &str) -> LocatorSet {
        let doc = self.doc;
        let Some(el) = doc.element(node) else {
            return LocatorSet::default();
        };
        let set = LocatorSet {
            primary: self.primary(node, el, shadow),
            secondary: self.secondary(node, el, shadow, text),
            fallback: self.fallback(node, el, shadow),
        };
        trace!(node = %node, total = set.total(), "synthesized");
        set
    }

    // =========================================================================
    // Tiers
    // =========================================================================

    fn primary(&mut self, node: NodeId, el: &ElementData, shadow: bool) -> Vec<LocatorCandidate> {
        let mut out = Vec::new();

        for &attr in TEST_HOOK_ATTRIBUTES {
            let Some(value) = el.attr(attr).filter(|v| !v.is_empty()) else {
                continue;
            };
            out.extend(self.with_context(
                node,
                shadow,
                Naive {
                    kind: attr.to_string(),
                    selector: format!("[{}={}]", attr, css_string(value)),
                    value: value.to_string(),
                    confidence: TEST_HOOK_CONFIDENCE,
                    miss: UniquenessLevel::NonUnique,
                    context: UniquenessLevel::Contextual,
                    cap: 3,
                },
            ));
        }

        if let Some(id) = el.id() {
            let miss = if !shadow && self.oracle.id_count(id) > 1 {
                UniquenessLevel::DuplicateId
            } else {
                UniquenessLevel::NonUnique
            };
            out.extend(self.with_context(
                node,
                shadow,
                Naive {
                    kind: "id".into(),
                    selector: format!("#{}", css_escape(id)),
                    value: id.to_string(),
                    confidence: ID_CONFIDENCE,
                    miss,
                    context: UniquenessLevel::ContextualId,
                    cap: 4,
                },
            ));
        }

        if let Some(name) = el.attr("name").filter(|v| !v.is_empty()) {
            out.extend(self.with_context(
                node,
                shadow,
                Naive {
                    kind: "name".into(),
                    selector: format!("{}[name={}]", el.tag(), css_string(name)),
                    value: name.to_string(),
                    confidence: NAME_CONFIDENCE,
                    miss: UniquenessLevel::NonUnique,
                    context: UniquenessLevel::Contextual,
                    cap: 3,
                },
            ));
        }

        if let Some(label) = el.attr("aria-label").filter(|v| !v.trim().is_empty()) {
            out.push(self.checked(
                "aria-label",
                format!("[aria-label={}]", css_string(label)),
                label,
                SelectorSyntax::Css,
                ARIA_LABEL_CONFIDENCE,
                shadow,
            ));
        }

        let data_attrs = el
            .attributes()
            .iter()
            .filter(|a| a.name.starts_with("data-"))
            .filter(|a| !TEST_HOOK_ATTRIBUTES.contains(&a.name.as_str()))
            .filter(|a| !a.value.is_empty() && a.value.chars().count() <= MAX_DATA_VALUE_LEN)
            .take(MAX_DATA_ATTRIBUTES);
        for attr in data_attrs {
            out.extend(self.with_context(
                node,
                shadow,
                Naive {
                    kind: attr.name.clone(),
                    selector: format!("[{}={}]", css_escape(&attr.name), css_string(&attr.value)),
                    value: attr.value.clone(),
                    confidence: DATA_ATTR_CONFIDENCE,
                    miss: UniquenessLevel::NonUnique,
                    context: UniquenessLevel::Contextual,
                    cap: 2,
                },
            ));
        }

        out
    }

    fn secondary(
        &mut self,
        node: NodeId,
        el: &ElementData,
        shadow: bool,
        text: &str,
    ) -> Vec<LocatorCandidate> {
        let mut out = Vec::new();
        let tag = el.tag();

        let classes: Vec<&str> = el
            .classes()
            .filter(|c| is_stable_class(c))
            .fold(Vec::new(), |mut acc, c| {
                if !acc.contains(&c) {
                    acc.push(c);
                }
                acc
            });
        if !classes.is_empty() {
            let combined: Vec<&str> = classes.iter().take(MAX_CLASSES).copied().collect();
            let selector: String = combined.iter().map(|c| format!(".{}", css_escape(c))).collect();
            out.extend(self.with_context(
                node,
                shadow,
                Naive {
                    kind: "class".into(),
                    selector,
                    value: combined.join(" "),
                    confidence: CLASS_CONFIDENCE,
                    miss: UniquenessLevel::NonUnique,
                    context: UniquenessLevel::ContextualClass,
                    cap: 2,
                },
            ));
        }
        if classes.len() > 1 {
            out.extend(self.with_context(
                node,
                shadow,
                Naive {
                    kind: "class-single".into(),
                    selector: format!("{}.{}", tag, css_escape(classes[0])),
                    value: classes[0].to_string(),
                    confidence: SINGLE_CLASS_CONFIDENCE,
                    miss: UniquenessLevel::NonUnique,
                    context: UniquenessLevel::ContextualSingleClass,
                    cap: 1,
                },
            ));
        }

        if let Some(placeholder) = el.attr("placeholder").filter(|v| !v.trim().is_empty()) {
            out.push(self.checked(
                "placeholder",
                format!("{}[placeholder={}]", tag, css_string(placeholder)),
                placeholder,
                SelectorSyntax::Css,
                PLACEHOLDER_CONFIDENCE,
                shadow,
            ));
        }

        if let Some(label) = self.text_label(node, text) {
            if let Some(literal) = xpath::literal(&label) {
                out.push(self.text_candidate(tag, &label, literal, shadow));
            }
        }

        if tag == "input" || tag == "button" {
            if let Some(kind) = el.attr("type").filter(|v| !v.is_empty()) {
                out.push(self.checked(
                    "type",
                    format!("{}[type={}]", tag, css_string(kind)),
                    kind,
                    SelectorSyntax::Css,
                    TYPE_CONFIDENCE,
                    shadow,
                ));
            }
        }

        out
    }

    fn fallback(&mut self, node: NodeId, el: &ElementData, shadow: bool) -> Vec<LocatorCandidate> {
        let doc = self.doc;
        let mut out = Vec::new();
        let tag = el.tag();

        // Absolute paths always resolve to one element within their tree;
        // the id shortcut only when the id itself is unique.
        let unique_id = !shadow && el.id().is_some_and(|id| self.oracle.id_count(id) == 1);
        let path = if unique_id {
            xpath::id_path(doc, node).unwrap_or_else(|| xpath::absolute_path(doc, node))
        } else {
            xpath::absolute_path(doc, node)
        };
        out.push(LocatorCandidate {
            kind: "xpath".into(),
            value: path.clone(),
            selector: path,
            syntax: SelectorSyntax::XPath,
            shadow_dom: shadow,
            is_unique: (!shadow).then_some(true),
            uniqueness_level: if shadow {
                UniquenessLevel::NonUnique
            } else {
                UniquenessLevel::Unique
            },
            confidence: XPATH_CONFIDENCE,
        });

        if let (Some(parent), Some(i)) = (doc.parent_element(node), doc.element_index(node)) {
            let parent_sel = match doc.element(parent).and_then(|p| p.id()) {
                Some(id) => format!("#{}", css_escape(id)),
                None => doc.tag_name(parent).unwrap_or("*").to_string(),
            };
            let value = (i + 1).to_string();
            out.push(self.checked(
                "nth-child",
                format!("{} > {}:nth-child({})", parent_sel, tag, value),
                &value,
                SelectorSyntax::Css,
                NTH_CHILD_CONFIDENCE,
                shadow,
            ));
        }

        out.push(self.checked("tagName", tag.to_string(), tag, SelectorSyntax::Css, TAG_CONFIDENCE, shadow));

        if shadow {
            if let Ok(rect) = doc.bounding_rect(node) {
                let value = format!("{},{}", rect.x.round(), rect.y.round());
                out.push(LocatorCandidate {
                    kind: "position".into(),
                    selector: format!(
                        "/* position: {} {}x{} */",
                        value,
                        rect.width.round(),
                        rect.height.round()
                    ),
                    value,
                    syntax: SelectorSyntax::Comment,
                    shadow_dom: true,
                    is_unique: None,
                    uniqueness_level: UniquenessLevel::NonUnique,
                    confidence: POSITION_CONFIDENCE,
                });
            }
        }

        out
    }

    // =========================================================================
    // Candidate builders
    // =========================================================================

    /// The naive candidate, then contextual variants when it is not known
    /// to be unique.
    fn with_context(&mut self, node: NodeId, shadow: bool, naive: Naive) -> Vec<LocatorCandidate> {
        let unique = (!shadow).then(|| self.oracle.is_unique(&naive.selector));
        let mut out = vec![LocatorCandidate {
            kind: naive.kind.clone(),
            selector: naive.selector.clone(),
            value: naive.value.clone(),
            syntax: SelectorSyntax::Css,
            shadow_dom: shadow,
            is_unique: unique,
            uniqueness_level: if unique == Some(true) {
                UniquenessLevel::Unique
            } else {
                naive.miss
            },
            confidence: naive.confidence,
        }];
        if unique == Some(true) {
            return out;
        }

        let mut k = 0;
        for (strategy, selector) in contextual_selectors(self.doc, node, &naive.selector) {
            if k == naive.cap {
                break;
            }
            k += 1;
            let unique = (!shadow).then(|| self.oracle.is_unique(&selector));
            trace!(?strategy, selector = %selector, ?unique, "contextual variant");
            out.push(LocatorCandidate {
                kind: format!("{}-contextual-{}", naive.kind, k),
                selector,
                value: naive.value.clone(),
                syntax: SelectorSyntax::Css,
                shadow_dom: shadow,
                is_unique: unique,
                uniqueness_level: naive.context,
                confidence: adjusted(naive.confidence, CONTEXTUAL_PENALTY),
            });
            if unique == Some(true) {
                break;
            }
        }
        out
    }

    /// A candidate that only gets a uniqueness check.
    fn checked(
        &mut self,
        kind: &str,
        selector: String,
        value: &str,
        syntax: SelectorSyntax,
        confidence: f64,
        shadow: bool,
    ) -> LocatorCandidate {
        let unique = (!shadow).then(|| self.oracle.is_unique(&selector));
        LocatorCandidate {
            kind: kind.to_string(),
            selector,
            value: value.to_string(),
            syntax,
            shadow_dom: shadow,
            is_unique: unique,
            uniqueness_level: level(unique),
            confidence,
        }
    }

    /// The string `normalize-space(.)` compares against: the element's whole
    /// text content. The rendered label is reused only when it agrees, since
    /// hidden descendants would otherwise point the XPath at another element.
    fn text_label(&self, node: NodeId, rendered: &str) -> Option<String> {
        let content = xpath::normalize_space(&self.doc.text_content(node));
        if content != rendered && classify::clean(&content) != content {
            return None;
        }
        let len = content.chars().count();
        (TEXT_MIN_LEN..=TEXT_MAX_LEN).contains(&len).then_some(content)
    }

    fn text_candidate(&mut self, tag: &str, text: &str, literal: String, shadow: bool) -> LocatorCandidate {
        let unique = (!shadow).then(|| self.oracle.text_count(tag, text) == 1);
        LocatorCandidate {
            kind: "text".into(),
            selector: format!("//{}[normalize-space(.)={}]", tag, literal),
            value: text.to_string(),
            syntax: SelectorSyntax::XPath,
            shadow_dom: shadow,
            is_unique: unique,
            uniqueness_level: level(unique),
            confidence: TEXT_CONFIDENCE,
        }
    }
}

fn level(unique: Option<bool>) -> UniquenessLevel {
    if unique == Some(true) {
        UniquenessLevel::Unique
    } else {
        UniquenessLevel::NonUnique
    }
}

/// One-off synthesis for a single element. Builds a fresh uniqueness index,
/// so prefer [`Synthesizer`] when handling many elements.
pub fn synthesize(doc: &Document, node: NodeId) -> LocatorSet {
    let shadow = in_shadow_tree(doc, node);
    let text = classify::clean_text(doc, node);
    Synthesizer::new(doc).synthesize(node, shadow, &text)
}

fn in_shadow_tree(doc: &Document, node: NodeId) -> bool {
    let mut current = node;
    while let Some(parent) = doc.parent(current) {
        if doc.is_shadow_root(parent) {
            return true;
        }
        current = parent;
    }
    false
}
