//! Arena-backed DOM model the scanner runs against.
//!
//! A [`Document`] stands in for the browser's live DOM: element attributes,
//! computed style, layout boxes, captured rendered text and shadow trees. It
//! is built either programmatically or from a [`DocumentSnapshot`] captured
//! from a real page.

mod shadow;
mod snapshot;

pub use shadow::{ShadowProbe, ShadowRootMode, KNOWN_PROBES, VENDOR_SHADOW_SLOTS};
pub use snapshot::{DocumentSnapshot, SnapshotElement, SnapshotNode, SnapshotShadowRoot};

use std::collections::HashMap;
use std::fmt;
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};

use crate::{selector, Error, Result};

/// Handle to a node inside one [`Document`].
///
/// Handles are only meaningful for the document that issued them; passing a
/// handle from another document panics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    /// Position in the arena (allocation order, not document order).
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Bounding box in CSS pixels.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Zero width and zero height at the same time.
    pub fn is_collapsed(&self) -> bool {
        self.width == 0.0 && self.height == 0.0
    }

    fn offset(self, dx: f64, dy: f64) -> Self {
        Self {
            x: self.x + dx,
            y: self.y + dy,
            ..self
        }
    }
}

/// The subset of computed style the classifier looks at.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComputedStyle {
    pub display: String,
    pub visibility: String,
    pub opacity: f64,
}

impl Default for ComputedStyle {
    fn default() -> Self {
        Self {
            display: "block".into(),
            visibility: "visible".into(),
            opacity: 1.0,
        }
    }
}

impl ComputedStyle {
    /// `display: none`.
    pub fn hidden() -> Self {
        Self {
            display: "none".into(),
            ..Self::default()
        }
    }

    pub fn with_opacity(opacity: f64) -> Self {
        Self {
            opacity,
            ..Self::default()
        }
    }
}

/// Viewport size and scroll offsets.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Viewport {
    pub width: f64,
    pub height: f64,
    pub scroll_x: f64,
    pub scroll_y: f64,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1280.0,
            height: 720.0,
            scroll_x: 0.0,
            scroll_y: 0.0,
        }
    }
}

/// One `name="value"` pair. Names are stored lowercase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub name: String,
    pub value: String,
}

/// Element payload.
#[derive(Debug, Clone)]
pub struct ElementData {
    tag: String,
    attributes: Vec<Attribute>,
    style: Option<ComputedStyle>,
    /// Page-absolute box.
    rect: Option<Rect>,
    inner_text: Option<String>,
    shadow_root: Option<NodeId>,
    stashed_roots: Vec<(String, NodeId)>,
}

impl ElementData {
    fn new(tag: &str) -> Self {
        Self {
            tag: tag.to_ascii_lowercase(),
            attributes: Vec::new(),
            style: Some(ComputedStyle::default()),
            rect: None,
            inner_text: None,
            shadow_root: None,
            stashed_roots: Vec::new(),
        }
    }

    /// Lowercase tag name.
    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn attributes(&self) -> &[Attribute] {
        &self.attributes
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.name.eq_ignore_ascii_case(name))
            .map(|a| a.value.as_str())
    }

    pub fn has_attr(&self, name: &str) -> bool {
        self.attr(name).is_some()
    }

    /// Non-empty `id` attribute.
    pub fn id(&self) -> Option<&str> {
        self.attr("id").filter(|v| !v.is_empty())
    }

    /// Whitespace-separated `class` tokens.
    pub fn classes(&self) -> impl Iterator<Item = &str> {
        self.attr("class").unwrap_or("").split_ascii_whitespace()
    }
}

/// What a node is.
#[derive(Debug, Clone)]
pub enum NodeKind {
    Document,
    Element(ElementData),
    Text(String),
    Comment(String),
    ShadowRoot { host: NodeId, mode: ShadowRootMode },
}

#[derive(Debug, Clone)]
struct Node {
    kind: NodeKind,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

impl Node {
    fn new(kind: NodeKind) -> Self {
        Self {
            kind,
            parent: None,
            children: Vec::new(),
        }
    }
}

/// Where an element sits among its parent's element children. Indices are
/// zero-based; a parentless element is alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SiblingInfo {
    pub index: usize,
    pub count: usize,
    /// Among siblings with the same tag.
    pub type_index: usize,
    pub type_count: usize,
}

impl Default for SiblingInfo {
    fn default() -> Self {
        Self {
            index: 0,
            count: 1,
            type_index: 0,
            type_count: 1,
        }
    }
}

/// A document plus everything created against it (attached or not).
#[derive(Debug, Clone)]
pub struct Document {
    nodes: Vec<Node>,
    viewport: Viewport,
    url: Option<String>,
    title: Option<String>,
    /// Built on first use, dropped on every structural change.
    siblings: OnceLock<Vec<SiblingInfo>>,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    /// A bare document node with no `<html>` element.
    pub fn empty() -> Self {
        Self {
            nodes: vec![Node::new(NodeKind::Document)],
            viewport: Viewport::default(),
            url: None,
            title: None,
            siblings: OnceLock::new(),
        }
    }

    /// `<html><head></head><body></body></html>`.
    pub fn new() -> Self {
        let mut doc = Self::empty();
        let root = doc.root();
        let html = doc.append_element(root, "html", &[]);
        doc.append_element(html, "head", &[]);
        doc.append_element(html, "body", &[]);
        doc
    }

    /// The document node.
    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    /// Number of nodes ever allocated, detached ones included.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.len() <= 1
    }

    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    pub fn set_url(&mut self, url: impl Into<String>) {
        self.url = Some(url.into());
    }

    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    pub fn set_title(&mut self, title: impl Into<String>) {
        self.title = Some(title.into());
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    pub fn set_viewport(&mut self, viewport: Viewport) {
        self.viewport = viewport;
    }

    // =========================================================================
    // Construction & mutation
    // =========================================================================

    fn push(&mut self, kind: NodeKind) -> NodeId {
        self.siblings.take();
        self.nodes.push(Node::new(kind));
        NodeId(self.nodes.len() - 1)
    }

    /// Create a detached element.
    pub fn create_element(&mut self, tag: &str) -> NodeId {
        self.push(NodeKind::Element(ElementData::new(tag)))
    }

    pub fn create_text(&mut self, data: &str) -> NodeId {
        self.push(NodeKind::Text(data.to_string()))
    }

    pub fn create_comment(&mut self, data: &str) -> NodeId {
        self.push(NodeKind::Comment(data.to_string()))
    }

    /// Move `child` to the end of `parent`'s child list.
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) {
        self.remove(child);
        self.siblings.take();
        self.nodes[child.0].parent = Some(parent);
        self.nodes[parent.0].children.push(child);
    }

    /// Create an element with attributes and append it to `parent`.
    pub fn append_element(&mut self, parent: NodeId, tag: &str, attrs: &[(&str, &str)]) -> NodeId {
        let el = self.create_element(tag);
        for (name, value) in attrs {
            self.set_attribute(el, name, value);
        }
        self.append_child(parent, el);
        el
    }

    pub fn append_text(&mut self, parent: NodeId, data: &str) -> NodeId {
        let text = self.create_text(data);
        self.append_child(parent, text);
        text
    }

    pub fn append_comment(&mut self, parent: NodeId, data: &str) -> NodeId {
        let comment = self.create_comment(data);
        self.append_child(parent, comment);
        comment
    }

    /// Detach a node from its parent. The subtree stays intact but
    /// disconnected.
    pub fn remove(&mut self, node: NodeId) {
        self.siblings.take();
        if let Some(parent) = self.nodes[node.0].parent.take() {
            self.nodes[parent.0].children.retain(|&c| c != node);
        }
    }

    pub fn set_attribute(&mut self, node: NodeId, name: &str, value: &str) {
        let Some(el) = self.element_mut(node) else {
            return;
        };
        let name = name.to_ascii_lowercase();
        match el.attributes.iter_mut().find(|a| a.name == name) {
            Some(attr) => attr.value = value.to_string(),
            None => el.attributes.push(Attribute {
                name,
                value: value.to_string(),
            }),
        }
    }

    pub fn remove_attribute(&mut self, node: NodeId, name: &str) {
        if let Some(el) = self.element_mut(node) {
            el.attributes.retain(|a| !a.name.eq_ignore_ascii_case(name));
        }
    }

    /// `None` marks style as unavailable (e.g. the capture could not compute it).
    pub fn set_style(&mut self, node: NodeId, style: Option<ComputedStyle>) {
        if let Some(el) = self.element_mut(node) {
            el.style = style;
        }
    }

    /// Page-absolute box; `None` marks the element as unmeasured.
    pub fn set_rect(&mut self, node: NodeId, rect: Option<Rect>) {
        if let Some(el) = self.element_mut(node) {
            el.rect = rect;
        }
    }

    /// Rendered text as the browser reported it (`innerText`).
    pub fn set_inner_text(&mut self, node: NodeId, text: Option<String>) {
        if let Some(el) = self.element_mut(node) {
            el.inner_text = text;
        }
    }

    /// Attach a shadow root to `host` and return it. A host has at most one
    /// attached root; attaching again returns the existing one.
    pub fn attach_shadow(&mut self, host: NodeId, mode: ShadowRootMode) -> NodeId {
        if let Some(existing) = self.element(host).and_then(|el| el.shadow_root) {
            return existing;
        }
        let root = self.push(NodeKind::ShadowRoot { host, mode });
        if let Some(el) = self.element_mut(host) {
            el.shadow_root = Some(root);
        }
        root
    }

    /// Record that a framework keeps `root` on `host` under a property named
    /// `slot` (how closed roots usually leak).
    pub fn stash_shadow_root(&mut self, host: NodeId, slot: &str, root: NodeId) {
        if let Some(el) = self.element_mut(host) {
            el.stashed_roots.retain(|(s, _)| s != slot);
            el.stashed_roots.push((slot.to_string(), root));
        }
    }

    /// Scroll so the element's box is vertically centered in the viewport.
    /// Unmeasured elements leave the viewport untouched.
    pub fn scroll_into_view(&mut self, node: NodeId) {
        let Ok(rect) = self.bounding_rect(node) else {
            return;
        };
        let vp = &mut self.viewport;
        vp.scroll_y = (rect.y - (vp.height - rect.height) / 2.0).max(0.0);
        if rect.x < vp.scroll_x || rect.x + rect.width > vp.scroll_x + vp.width {
            vp.scroll_x = rect.x.max(0.0);
        }
    }

    // =========================================================================
    // Inspection
    // =========================================================================

    pub fn kind(&self, node: NodeId) -> &NodeKind {
        &self.nodes[node.0].kind
    }

    pub fn element(&self, node: NodeId) -> Option<&ElementData> {
        match &self.nodes.get(node.0)?.kind {
            NodeKind::Element(el) => Some(el),
            _ => None,
        }
    }

    fn element_mut(&mut self, node: NodeId) -> Option<&mut ElementData> {
        match &mut self.nodes.get_mut(node.0)?.kind {
            NodeKind::Element(el) => Some(el),
            _ => None,
        }
    }

    pub fn is_element(&self, node: NodeId) -> bool {
        self.element(node).is_some()
    }

    pub fn is_shadow_root(&self, node: NodeId) -> bool {
        matches!(
            self.nodes.get(node.0).map(|n| &n.kind),
            Some(NodeKind::ShadowRoot { .. })
        )
    }

    pub fn tag_name(&self, node: NodeId) -> Option<&str> {
        self.element(node).map(|el| el.tag())
    }

    pub fn attribute(&self, node: NodeId, name: &str) -> Option<&str> {
        self.element(node)?.attr(name)
    }

    /// Host of a shadow root node.
    pub fn shadow_host(&self, root: NodeId) -> Option<NodeId> {
        match self.kind(root) {
            NodeKind::ShadowRoot { host, .. } => Some(*host),
            _ => None,
        }
    }

    /// The attached root regardless of mode. Traversal goes through
    /// [`ShadowProbe`] instead.
    pub(crate) fn attached_shadow_root(&self, host: NodeId) -> Option<(NodeId, ShadowRootMode)> {
        let root = self.element(host)?.shadow_root?;
        match self.kind(root) {
            NodeKind::ShadowRoot { mode, .. } => Some((root, *mode)),
            _ => None,
        }
    }

    pub(crate) fn stashed_root(&self, host: NodeId, slot: &str) -> Option<NodeId> {
        self.element(host)?
            .stashed_roots
            .iter()
            .find(|(s, _)| s == slot)
            .map(|(_, root)| *root)
    }

    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.nodes[node.0].parent
    }

    /// Parent if it is an element (`parentElement`); `None` for shadow-tree
    /// top-level nodes and for `<html>`.
    pub fn parent_element(&self, node: NodeId) -> Option<NodeId> {
        self.parent(node).filter(|&p| self.is_element(p))
    }

    pub fn children(&self, node: NodeId) -> &[NodeId] {
        &self.nodes[node.0].children
    }

    pub fn element_children(&self, node: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.children(node)
            .iter()
            .copied()
            .filter(move |&c| self.is_element(c))
    }

    /// Zero-based position among the parent's element children.
    pub fn element_index(&self, node: NodeId) -> Option<usize> {
        self.parent(node)?;
        self.is_element(node).then(|| self.sibling_info(node).index)
    }

    /// Sibling position and counts for an element, in constant time once the
    /// table is built.
    pub fn sibling_info(&self, node: NodeId) -> SiblingInfo {
        self.siblings
            .get_or_init(|| self.build_sibling_table())
            .get(node.0)
            .copied()
            .unwrap_or_default()
    }

    fn build_sibling_table(&self) -> Vec<SiblingInfo> {
        let mut table = vec![SiblingInfo::default(); self.nodes.len()];
        for node in &self.nodes {
            let elements: Vec<NodeId> = node
                .children
                .iter()
                .copied()
                .filter(|&c| self.is_element(c))
                .collect();
            let mut per_tag: HashMap<&str, usize> = HashMap::new();
            for (index, &child) in elements.iter().enumerate() {
                let tag = self.tag_name(child).unwrap_or_default();
                let type_index = per_tag.entry(tag).or_insert(0);
                table[child.0] = SiblingInfo {
                    index,
                    count: elements.len(),
                    type_index: *type_index,
                    type_count: 0,
                };
                *type_index += 1;
            }
            for &child in &elements {
                let tag = self.tag_name(child).unwrap_or_default();
                table[child.0].type_count = per_tag[tag];
            }
        }
        table
    }

    /// Element ancestors, nearest first, within one tree (stops at the
    /// document or at a shadow root).
    pub fn ancestors(&self, node: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        std::iter::successors(self.parent_element(node), move |&n| self.parent_element(n))
    }

    /// Element descendants of `scope` in tree order, not entering shadow trees.
    pub fn descendants(&self, scope: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.children(scope).iter().rev().copied().collect();
        while let Some(node) = stack.pop() {
            if self.is_element(node) {
                out.push(node);
            }
            stack.extend(self.children(node).iter().rev().copied());
        }
        out
    }

    /// `<html>`.
    pub fn document_element(&self) -> Option<NodeId> {
        self.element_children(self.root()).next()
    }

    /// `<body>`, if the document got that far.
    pub fn body(&self) -> Option<NodeId> {
        let html = self.document_element()?;
        self.element_children(html)
            .find(|&c| self.tag_name(c) == Some("body"))
    }

    /// Concatenated text of all light-tree descendant text nodes.
    pub fn text_content(&self, node: NodeId) -> String {
        let mut out = String::new();
        let mut stack = vec![node];
        while let Some(n) = stack.pop() {
            match self.kind(n) {
                NodeKind::Text(data) => out.push_str(data),
                NodeKind::Comment(_) => {}
                _ => stack.extend(self.children(n).iter().rev().copied()),
            }
        }
        out
    }

    /// Captured `innerText` when available, otherwise `textContent`.
    pub fn rendered_text(&self, node: NodeId) -> String {
        match self.element(node).and_then(|el| el.inner_text.as_ref()) {
            Some(text) => text.clone(),
            None => self.text_content(node),
        }
    }

    /// Whether the node reaches the document, crossing shadow boundaries
    /// through their hosts.
    pub fn is_connected(&self, node: NodeId) -> bool {
        let mut current = node;
        loop {
            match self.kind(current) {
                NodeKind::Document => return true,
                NodeKind::ShadowRoot { host, .. } => current = *host,
                _ => match self.parent(current) {
                    Some(p) => current = p,
                    None => return false,
                },
            }
        }
    }

    pub fn computed_style(&self, node: NodeId) -> Result<&ComputedStyle> {
        self.element(node)
            .ok_or(Error::UnknownNode(node))?
            .style
            .as_ref()
            .ok_or(Error::StyleUnavailable(node))
    }

    /// Page-absolute bounding box.
    pub fn bounding_rect(&self, node: NodeId) -> Result<Rect> {
        self.element(node)
            .ok_or(Error::UnknownNode(node))?
            .rect
            .ok_or(Error::LayoutUnavailable(node))
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// `document.querySelectorAll` over the light DOM.
    pub fn query_selector_all(&self, selector: &str) -> Result<Vec<NodeId>> {
        self.query_selector_all_in(self.root(), selector)
    }

    /// Query scoped to one tree: the document or a shadow root.
    pub fn query_selector_all_in(&self, scope: NodeId, selector: &str) -> Result<Vec<NodeId>> {
        let list = selector::SelectorList::parse(selector)?;
        Ok(list.query_all(self, scope))
    }
}
