//! XPath generation, plus an evaluator for the expression forms the
//! generator and locator synthesis emit.
//!
//! Supported on the evaluation side: absolute paths of `/` and `//` steps,
//! `*` and tag name tests, and the predicates `[n]`, `[@attr]`,
//! `[@attr="v"]`, `[normalize-space(.)="v"]`, `[normalize-space()="v"]`
//! and `[text()="v"]`. A whole path may be grouped and indexed, as in
//! `(//li)[2]`.

use std::collections::{HashMap, HashSet};

use crate::dom::{Document, NodeId};
use crate::{Error, Result};

/// `//*[@id="..."]` when the element has an id, otherwise [`absolute_path`].
///
/// The id form is only as unique as the id itself; callers that know the id
/// is duplicated should use [`absolute_path`] directly.
pub fn generate(doc: &Document, node: NodeId) -> String {
    if let Some(path) = id_path(doc, node) {
        return path;
    }
    absolute_path(doc, node)
}

/// `//*[@id="..."]`, or `None` when the element has no id or the id cannot
/// be written as an XPath 1.0 literal.
pub fn id_path(doc: &Document, node: NodeId) -> Option<String> {
    let id = doc.element(node)?.id()?;
    Some(format!("//*[@id={}]", literal(id)?))
}

/// Root-to-leaf path of tag names with same-tag ordinals, e.g.
/// `/html/body/div[2]/ul/li[1]`.
///
/// A level carries an ordinal whenever its parent has more than one child of
/// that tag, so the path always resolves to exactly one element. Paths for
/// shadow-tree elements are rooted at their shadow root.
pub fn absolute_path(doc: &Document, node: NodeId) -> String {
    let mut levels = Vec::new();
    let mut current = node;
    while let Some(el) = doc.element(current) {
        let tag = el.tag();
        let Some(parent) = doc.parent(current) else {
            levels.push(tag.to_string());
            break;
        };
        let info = doc.sibling_info(current);
        if info.type_count > 1 {
            levels.push(format!("{}[{}]", tag, info.type_index + 1));
        } else {
            levels.push(tag.to_string());
        }
        current = parent;
    }
    levels.reverse();
    format!("/{}", levels.join("/"))
}

/// XPath 1.0 string literal. There is no escape syntax, so a value holding
/// both quote characters has no literal form.
pub fn literal(value: &str) -> Option<String> {
    if !value.contains('"') {
        Some(format!("\"{}\"", value))
    } else if !value.contains('\'') {
        Some(format!("'{}'", value))
    } else {
        None
    }
}

/// `normalize-space()`: trim and collapse whitespace runs.
pub fn normalize_space(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Evaluate `expr` against the tree rooted at `scope` (the document node or
/// a shadow root). Results are elements in document order.
pub fn evaluate(doc: &Document, scope: NodeId, expr: &str) -> Result<Vec<NodeId>> {
    let parsed = Parser::new(expr).parse()?;

    let mut nodes = eval_steps(doc, scope, &parsed.steps);
    if nodes.len() > 1 {
        sort_document_order(doc, scope, &mut nodes);
    }
    for &position in &parsed.positions {
        nodes = nodes
            .get(position.wrapping_sub(1))
            .map(|&n| vec![n])
            .unwrap_or_default();
    }
    Ok(nodes)
}

// =========================================================================
// Evaluation
// =========================================================================

fn eval_steps(doc: &Document, scope: NodeId, steps: &[Step]) -> Vec<NodeId> {
    let mut context = vec![scope];
    for step in steps {
        let mut next = Vec::new();
        let mut seen = HashSet::new();
        for &ctx in &context {
            let parents = match step.axis {
                Axis::Child => vec![ctx],
                Axis::Descendant => std::iter::once(ctx).chain(doc.descendants(ctx)).collect(),
            };
            for parent in parents {
                let mut matched: Vec<NodeId> = doc
                    .element_children(parent)
                    .filter(|&c| step.test.matches(doc, c))
                    .collect();
                for predicate in &step.predicates {
                    matched = predicate.apply(doc, matched);
                }
                next.extend(matched.into_iter().filter(|&m| seen.insert(m)));
            }
        }
        context = next;
    }
    context
}

fn sort_document_order(doc: &Document, scope: NodeId, nodes: &mut [NodeId]) {
    let order: HashMap<NodeId, usize> = doc
        .descendants(scope)
        .into_iter()
        .enumerate()
        .map(|(i, n)| (n, i))
        .collect();
    nodes.sort_by_key(|n| order.get(n).copied().unwrap_or(usize::MAX));
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Axis {
    Child,
    Descendant,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum NameTest {
    Any,
    Tag(String),
}

impl NameTest {
    fn matches(&self, doc: &Document, node: NodeId) -> bool {
        match self {
            NameTest::Any => doc.is_element(node),
            NameTest::Tag(tag) => doc.tag_name(node) == Some(tag.as_str()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Predicate {
    /// 1-based.
    Position(usize),
    Attr { name: String, value: Option<String> },
    Text(String),
}

impl Predicate {
    fn apply(&self, doc: &Document, nodes: Vec<NodeId>) -> Vec<NodeId> {
        match self {
            Predicate::Position(n) => nodes
                .get(n.wrapping_sub(1))
                .map(|&node| vec![node])
                .unwrap_or_default(),
            Predicate::Attr { name, value } => nodes
                .into_iter()
                .filter(|&node| match (doc.attribute(node, name), value) {
                    (Some(actual), Some(expected)) => actual == expected,
                    (Some(_), None) => true,
                    (None, _) => false,
                })
                .collect(),
            Predicate::Text(expected) => nodes
                .into_iter()
                .filter(|&node| normalize_space(&doc.text_content(node)) == *expected)
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Step {
    axis: Axis,
    test: NameTest,
    predicates: Vec<Predicate>,
}

#[derive(Debug)]
struct Expr {
    steps: Vec<Step>,
    /// Positions applied to a parenthesized path as a whole.
    positions: Vec<usize>,
}

// =========================================================================
// Parsing
// =========================================================================

struct Parser<'a> {
    source: &'a str,
    chars: Vec<char>,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            source,
            chars: source.trim().chars().collect(),
            pos: 0,
        }
    }

    fn error(&self, reason: impl Into<String>) -> Error {
        Error::InvalidXPath {
            expr: self.source.to_string(),
            reason: reason.into(),
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn eat(&mut self, c: char) -> bool {
        if self.peek() == Some(c) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn eat_str(&mut self, s: &str) -> bool {
        let end = self.pos + s.chars().count();
        if end <= self.chars.len() && self.chars[self.pos..end].iter().copied().eq(s.chars()) {
            self.pos = end;
            true
        } else {
            false
        }
    }

    fn skip_ws(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.pos += 1;
        }
    }

    fn parse(mut self) -> Result<Expr> {
        let grouped = self.eat('(');
        let steps = self.parse_path()?;
        let mut positions = Vec::new();
        if grouped {
            if !self.eat(')') {
                return Err(self.error("expected ')'"));
            }
            while self.eat('[') {
                self.skip_ws();
                positions.push(self.parse_number()?);
                self.skip_ws();
                if !self.eat(']') {
                    return Err(self.error("expected ']'"));
                }
            }
        }
        if self.pos != self.chars.len() {
            return Err(self.error(format!("unexpected trailing input at {}", self.pos)));
        }
        Ok(Expr { steps, positions })
    }

    fn parse_path(&mut self) -> Result<Vec<Step>> {
        let mut steps = Vec::new();
        while self.eat('/') {
            let axis = if self.eat('/') {
                Axis::Descendant
            } else {
                Axis::Child
            };
            steps.push(self.parse_step(axis)?);
        }
        if steps.is_empty() {
            return Err(self.error("expected an absolute path"));
        }
        Ok(steps)
    }

    fn parse_step(&mut self, axis: Axis) -> Result<Step> {
        let test = if self.eat('*') {
            NameTest::Any
        } else {
            let name = self.parse_name();
            if name.is_empty() {
                return Err(self.error("expected a name test"));
            }
            NameTest::Tag(name.to_ascii_lowercase())
        };
        let mut predicates = Vec::new();
        while self.eat('[') {
            self.skip_ws();
            predicates.push(self.parse_predicate()?);
            self.skip_ws();
            if !self.eat(']') {
                return Err(self.error("expected ']'"));
            }
        }
        Ok(Step {
            axis,
            test,
            predicates,
        })
    }

    fn parse_predicate(&mut self) -> Result<Predicate> {
        if self.peek().is_some_and(|c| c.is_ascii_digit()) {
            return Ok(Predicate::Position(self.parse_number()?));
        }
        if self.eat('@') {
            let name = self.parse_name();
            if name.is_empty() {
                return Err(self.error("expected attribute name"));
            }
            self.skip_ws();
            let value = if self.eat('=') {
                self.skip_ws();
                Some(self.parse_literal()?)
            } else {
                None
            };
            return Ok(Predicate::Attr {
                name: name.to_ascii_lowercase(),
                value,
            });
        }
        if self.eat_str("normalize-space(") {
            self.skip_ws();
            self.eat('.');
            self.skip_ws();
            if !self.eat(')') {
                return Err(self.error("normalize-space takes '.' or nothing"));
            }
        } else if !self.eat_str("text()") {
            return Err(self.error("unsupported predicate"));
        }
        self.skip_ws();
        if !self.eat('=') {
            return Err(self.error("expected '='"));
        }
        self.skip_ws();
        Ok(Predicate::Text(normalize_space(&self.parse_literal()?)))
    }

    fn parse_name(&mut self) -> String {
        let start = self.pos;
        while self
            .peek()
            .is_some_and(|c| c.is_alphanumeric() || c == '-' || c == '_')
        {
            self.pos += 1;
        }
        self.chars[start..self.pos].iter().collect()
    }

    fn parse_number(&mut self) -> Result<usize> {
        let start = self.pos;
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.pos += 1;
        }
        let digits: String = self.chars[start..self.pos].iter().collect();
        digits
            .parse()
            .map_err(|_| self.error("expected a position"))
    }

    fn parse_literal(&mut self) -> Result<String> {
        let quote = match self.peek() {
            Some(q @ ('"' | '\'')) => q,
            _ => return Err(self.error("expected a string literal")),
        };
        self.pos += 1;
        let start = self.pos;
        while self.peek().is_some_and(|c| c != quote) {
            self.pos += 1;
        }
        if !self.eat(quote) {
            return Err(self.error("unterminated string literal"));
        }
        Ok(self.chars[start..self.pos - 1].iter().collect())
    }
}
