//! CSS selector parsing and matching against a [`Document`].
//!
//! Covers what generated locators use plus the usual hand-written forms:
//! type/universal, `#id`, `.class`, attribute operators, the structural
//! pseudo-classes, `:not()`, the four combinators and selector lists.

mod parser;

use std::fmt::Write as _;

use crate::dom::{Document, NodeId, NodeKind};
use crate::Result;

/// A parsed, comma-separated selector list.
#[derive(Debug, Clone)]
pub struct SelectorList {
    source: String,
    selectors: Vec<ComplexSelector>,
}

#[derive(Debug, Clone)]
pub(crate) struct ComplexSelector {
    /// Left to right; the first part's combinator is unused.
    parts: Vec<Part>,
}

#[derive(Debug, Clone)]
struct Part {
    combinator: Combinator,
    compound: Compound,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Combinator {
    Descendant,
    Child,
    NextSibling,
    SubsequentSibling,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct Compound {
    /// `None` is the universal selector.
    tag: Option<String>,
    filters: Vec<Filter>,
}

#[derive(Debug, Clone)]
enum Filter {
    Id(String),
    Class(String),
    Attr(AttrFilter),
    Pseudo(Pseudo),
}

#[derive(Debug, Clone)]
struct AttrFilter {
    name: String,
    op: Option<(AttrOp, String)>,
    case_insensitive: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AttrOp {
    Equals,
    Includes,
    DashMatch,
    Prefix,
    Suffix,
    Substring,
}

#[derive(Debug, Clone)]
enum Pseudo {
    NthChild(Nth),
    NthLastChild(Nth),
    NthOfType(Nth),
    NthLastOfType(Nth),
    OnlyChild,
    OnlyOfType,
    Empty,
    Root,
    Not(Vec<Compound>),
}

/// `An+B`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Nth {
    a: i64,
    b: i64,
}

impl Nth {
    /// `position` is 1-based.
    fn matches(self, position: i64) -> bool {
        if self.a == 0 {
            return position == self.b;
        }
        let diff = position - self.b;
        diff % self.a == 0 && diff / self.a >= 0
    }
}

/// Cheapest lookup key for the rightmost compound of a single selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum IndexKey<'a> {
    Id(&'a str),
    Class(&'a str),
    Tag(&'a str),
    Attr(&'a str, &'a str),
    /// 1-based element position under the parent, from `:nth-child(B)`.
    ChildPosition(usize),
}

impl SelectorList {
    pub fn parse(source: &str) -> Result<Self> {
        let selectors = parser::Parser::new(source).parse_list()?;
        Ok(Self {
            source: source.to_string(),
            selectors,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Whether `node` matches any selector in the list.
    pub fn matches(&self, doc: &Document, node: NodeId) -> bool {
        doc.is_element(node)
            && self
                .selectors
                .iter()
                .any(|s| matches_from(doc, node, &s.parts, s.parts.len() - 1))
    }

    /// Matching elements under `scope` in tree order, shadow trees excluded.
    pub fn query_all(&self, doc: &Document, scope: NodeId) -> Vec<NodeId> {
        doc.descendants(scope)
            .into_iter()
            .filter(|&n| self.matches(doc, n))
            .collect()
    }

    /// Count matches among `candidates`, stopping once `limit` is reached.
    pub fn count_up_to(
        &self,
        doc: &Document,
        candidates: impl IntoIterator<Item = NodeId>,
        limit: usize,
    ) -> usize {
        let mut count = 0;
        for node in candidates {
            if self.matches(doc, node) {
                count += 1;
                if count >= limit {
                    break;
                }
            }
        }
        count
    }

    /// Keys that every match must carry, for index pre-filtering. Empty when
    /// the list has several selectors or the rightmost compound has nothing
    /// indexable.
    pub(crate) fn index_keys(&self) -> Vec<IndexKey<'_>> {
        let [only] = self.selectors.as_slice() else {
            return Vec::new();
        };
        let Some(last) = only.parts.last() else {
            return Vec::new();
        };
        let compound = &last.compound;
        let mut keys = Vec::new();
        for filter in &compound.filters {
            match filter {
                Filter::Id(id) => keys.push(IndexKey::Id(id)),
                Filter::Class(class) => keys.push(IndexKey::Class(class)),
                Filter::Attr(AttrFilter {
                    name,
                    op: Some((AttrOp::Equals, value)),
                    case_insensitive: false,
                }) => keys.push(IndexKey::Attr(name, value)),
                Filter::Pseudo(Pseudo::NthChild(Nth { a: 0, b })) if *b >= 1 => {
                    keys.push(IndexKey::ChildPosition(*b as usize))
                }
                _ => {}
            }
        }
        if let Some(tag) = &compound.tag {
            keys.push(IndexKey::Tag(tag));
        }
        keys
    }
}

fn matches_from(doc: &Document, node: NodeId, parts: &[Part], idx: usize) -> bool {
    if !compound_matches(doc, node, &parts[idx].compound) {
        return false;
    }
    if idx == 0 {
        return true;
    }
    match parts[idx].combinator {
        Combinator::Child => doc
            .parent_element(node)
            .is_some_and(|p| matches_from(doc, p, parts, idx - 1)),
        Combinator::Descendant => doc
            .ancestors(node)
            .any(|a| matches_from(doc, a, parts, idx - 1)),
        Combinator::NextSibling => previous_element_siblings(doc, node)
            .next()
            .is_some_and(|s| matches_from(doc, s, parts, idx - 1)),
        Combinator::SubsequentSibling => {
            previous_element_siblings(doc, node).any(|s| matches_from(doc, s, parts, idx - 1))
        }
    }
}

/// Nearest first.
fn previous_element_siblings(doc: &Document, node: NodeId) -> impl Iterator<Item = NodeId> + '_ {
    let siblings: Vec<NodeId> = match doc.parent(node) {
        Some(parent) => doc
            .element_children(parent)
            .take_while(|&s| s != node)
            .collect(),
        None => Vec::new(),
    };
    siblings.into_iter().rev()
}

fn compound_matches(doc: &Document, node: NodeId, compound: &Compound) -> bool {
    let Some(el) = doc.element(node) else {
        return false;
    };
    if let Some(tag) = &compound.tag {
        if el.tag() != tag {
            return false;
        }
    }
    compound.filters.iter().all(|filter| match filter {
        Filter::Id(id) => el.attr("id") == Some(id.as_str()),
        Filter::Class(class) => el.classes().any(|c| c == class),
        Filter::Attr(attr) => attr_matches(el.attr(&attr.name), attr),
        Filter::Pseudo(pseudo) => pseudo_matches(doc, node, pseudo),
    })
}

fn attr_matches(actual: Option<&str>, filter: &AttrFilter) -> bool {
    let Some(actual) = actual else {
        return false;
    };
    let Some((op, expected)) = &filter.op else {
        return true;
    };
    let (actual, expected) = if filter.case_insensitive {
        (actual.to_lowercase(), expected.to_lowercase())
    } else {
        (actual.to_string(), expected.clone())
    };
    match op {
        AttrOp::Equals => actual == expected,
        AttrOp::Includes => {
            !expected.is_empty()
                && !expected.contains(char::is_whitespace)
                && actual.split_ascii_whitespace().any(|t| t == expected)
        }
        AttrOp::DashMatch => {
            actual == expected || actual.starts_with(&format!("{}-", expected))
        }
        AttrOp::Prefix => !expected.is_empty() && actual.starts_with(&expected),
        AttrOp::Suffix => !expected.is_empty() && actual.ends_with(&expected),
        AttrOp::Substring => !expected.is_empty() && actual.contains(&expected),
    }
}

/// 1-based position among element siblings and the sibling count, optionally
/// restricted to the same tag. A parentless element is alone.
fn sibling_position(doc: &Document, node: NodeId, same_type: bool) -> (i64, i64) {
    let info = doc.sibling_info(node);
    if same_type {
        (info.type_index as i64 + 1, info.type_count as i64)
    } else {
        (info.index as i64 + 1, info.count as i64)
    }
}

fn pseudo_matches(doc: &Document, node: NodeId, pseudo: &Pseudo) -> bool {
    match pseudo {
        Pseudo::NthChild(nth) => nth.matches(sibling_position(doc, node, false).0),
        Pseudo::NthLastChild(nth) => {
            let (pos, total) = sibling_position(doc, node, false);
            nth.matches(total - pos + 1)
        }
        Pseudo::NthOfType(nth) => nth.matches(sibling_position(doc, node, true).0),
        Pseudo::NthLastOfType(nth) => {
            let (pos, total) = sibling_position(doc, node, true);
            nth.matches(total - pos + 1)
        }
        Pseudo::OnlyChild => sibling_position(doc, node, false).1 == 1,
        Pseudo::OnlyOfType => sibling_position(doc, node, true).1 == 1,
        Pseudo::Empty => doc
            .children(node)
            .iter()
            .all(|&c| matches!(doc.kind(c), NodeKind::Comment(_))),
        Pseudo::Root => doc
            .parent(node)
            .is_some_and(|p| matches!(doc.kind(p), NodeKind::Document)),
        Pseudo::Not(compounds) => !compounds.iter().any(|c| compound_matches(doc, node, c)),
    }
}

// =========================================================================
// Serialization helpers
// =========================================================================

/// `CSS.escape()`: make `value` safe to use as an identifier.
pub fn css_escape(value: &str) -> String {
    let chars: Vec<char> = value.chars().collect();
    let mut out = String::with_capacity(value.len());
    for (i, &c) in chars.iter().enumerate() {
        match c {
            '\0' => out.push('\u{FFFD}'),
            '\u{1}'..='\u{1f}' | '\u{7f}' => {
                let _ = write!(out, "\\{:x} ", c as u32);
            }
            '0'..='9' if i == 0 || (i == 1 && chars[0] == '-') => {
                let _ = write!(out, "\\{:x} ", c as u32);
            }
            '-' if i == 0 && chars.len() == 1 => out.push_str("\\-"),
            c if c.is_ascii_alphanumeric() || c == '-' || c == '_' || !c.is_ascii() => out.push(c),
            c => {
                out.push('\\');
                out.push(c);
            }
        }
    }
    out
}

/// Double-quoted CSS string literal.
pub fn css_string(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        match c {
            '"' | '\\' => {
                out.push('\\');
                out.push(c);
            }
            '\0' => out.push('\u{FFFD}'),
            '\u{1}'..='\u{1f}' | '\u{7f}' => {
                let _ = write!(out, "\\{:x} ", c as u32);
            }
            c => out.push(c),
        }
    }
    out.push('"');
    out
}
