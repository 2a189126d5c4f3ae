//! Serializable page snapshots.
//!
//! The capture script emits this shape; rects are viewport-relative in the
//! snapshot and page-absolute inside a [`Document`].

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{ComputedStyle, Document, NodeId, NodeKind, Rect, ShadowRootMode, Viewport};
use crate::Result;

/// A captured document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentSnapshot {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub captured_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub viewport: Viewport,
    /// Children of the document node.
    #[serde(default)]
    pub children: Vec<SnapshotNode>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SnapshotNode {
    Element(SnapshotElement),
    Text { data: String },
    Comment { data: String },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotElement {
    pub tag: String,
    #[serde(default)]
    pub attributes: Vec<(String, String)>,
    /// Absent when the capture could not compute style.
    #[serde(default)]
    pub style: Option<ComputedStyle>,
    /// Viewport-relative; absent when unmeasured.
    #[serde(default)]
    pub rect: Option<Rect>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inner_text: Option<String>,
    #[serde(default)]
    pub children: Vec<SnapshotNode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shadow_root: Option<SnapshotShadowRoot>,
    /// Vendor slots on the host that reference `shadow_root`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stashed_slots: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotShadowRoot {
    pub mode: ShadowRootMode,
    #[serde(default)]
    pub children: Vec<SnapshotNode>,
}

impl DocumentSnapshot {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self, pretty: bool) -> Result<String> {
        Ok(if pretty {
            serde_json::to_string_pretty(self)?
        } else {
            serde_json::to_string(self)?
        })
    }

    /// Read a snapshot file. IO failures are reported through
    /// `serde_json::Error::io` so callers deal with a single error kind.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(serde_json::Error::io)?;
        Self::from_json(&content)
    }
}

impl Document {
    /// Build a document from a snapshot.
    pub fn from_snapshot(snapshot: &DocumentSnapshot) -> Self {
        let mut doc = Document::empty();
        doc.viewport = snapshot.viewport;
        doc.url = snapshot.url.clone();
        doc.title = snapshot.title.clone();
        let root = doc.root();
        for child in &snapshot.children {
            doc.load_node(root, child);
        }
        doc
    }

    fn load_node(&mut self, parent: NodeId, node: &SnapshotNode) {
        match node {
            SnapshotNode::Text { data } => {
                self.append_text(parent, data);
            }
            SnapshotNode::Comment { data } => {
                self.append_comment(parent, data);
            }
            SnapshotNode::Element(el) => {
                let id = self.create_element(&el.tag);
                for (name, value) in &el.attributes {
                    self.set_attribute(id, name, value);
                }
                let (dx, dy) = (self.viewport.scroll_x, self.viewport.scroll_y);
                self.set_style(id, el.style.clone());
                self.set_rect(id, el.rect.map(|r| r.offset(dx, dy)));
                self.set_inner_text(id, el.inner_text.clone());
                self.append_child(parent, id);

                if let Some(shadow) = &el.shadow_root {
                    let root = self.attach_shadow(id, shadow.mode);
                    for slot in &el.stashed_slots {
                        self.stash_shadow_root(id, slot, root);
                    }
                    for child in &shadow.children {
                        self.load_node(root, child);
                    }
                }
                for child in &el.children {
                    self.load_node(id, child);
                }
            }
        }
    }

    /// Serialize the connected tree back into snapshot form.
    pub fn to_snapshot(&self) -> DocumentSnapshot {
        DocumentSnapshot {
            url: self.url.clone(),
            title: self.title.clone(),
            captured_at: Some(Utc::now()),
            viewport: self.viewport,
            children: self.snapshot_children(self.root()),
        }
    }

    fn snapshot_children(&self, parent: NodeId) -> Vec<SnapshotNode> {
        self.children(parent)
            .iter()
            .filter_map(|&c| self.snapshot_node(c))
            .collect()
    }

    fn snapshot_node(&self, node: NodeId) -> Option<SnapshotNode> {
        match self.kind(node) {
            NodeKind::Text(data) => Some(SnapshotNode::Text { data: data.clone() }),
            NodeKind::Comment(data) => Some(SnapshotNode::Comment { data: data.clone() }),
            NodeKind::Element(el) => {
                let (dx, dy) = (self.viewport.scroll_x, self.viewport.scroll_y);
                let shadow_root = el.shadow_root.and_then(|root| match self.kind(root) {
                    NodeKind::ShadowRoot { mode, .. } => Some(SnapshotShadowRoot {
                        mode: *mode,
                        children: self.snapshot_children(root),
                    }),
                    _ => None,
                });
                let stashed_slots = el
                    .stashed_roots
                    .iter()
                    .filter(|(_, root)| Some(*root) == el.shadow_root)
                    .map(|(slot, _)| slot.clone())
                    .collect();
                Some(SnapshotNode::Element(SnapshotElement {
                    tag: el.tag.clone(),
                    attributes: el
                        .attributes
                        .iter()
                        .map(|a| (a.name.clone(), a.value.clone()))
                        .collect(),
                    style: el.style.clone(),
                    rect: el.rect.map(|r| r.offset(-dx, -dy)),
                    inner_text: el.inner_text.clone(),
                    children: self.snapshot_children(node),
                    shadow_root,
                    stashed_slots,
                }))
            }
            NodeKind::Document | NodeKind::ShadowRoot { .. } => None,
        }
    }
}
