//! The scan operation: traverse, filter, synthesize, aggregate.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::classify::{self, ElementState};
use crate::dom::{Document, NodeId, Rect};
use crate::locator::{LocatorSet, Synthesizer};
use crate::traverse::traverse;
use crate::{Error, Result};

/// Scan switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ScanOptions {
    /// Keep elements the visibility check rejects.
    pub include_hidden: bool,
    /// Walk into shadow trees.
    #[serde(rename = "includeShadowDOM", alias = "includeShadowDom")]
    pub include_shadow_dom: bool,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            include_hidden: false,
            include_shadow_dom: true,
        }
    }
}

/// Identifies the shadow host an element sits under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShadowHostInfo {
    pub tag_name: String,
    pub id: Option<String>,
    pub class_name: Option<String>,
}

/// Where an element sits in its tree.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementContext {
    /// Empty when the element has no parent element.
    pub parent_tag_name: String,
    pub parent_id: Option<String>,
    /// Element children.
    pub children_count: usize,
    /// Zero-based among element siblings.
    pub sibling_index: usize,
    /// Element ancestors, counted through shadow hosts.
    pub nesting_level: usize,
}

/// One scanned element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementRecord {
    pub index: usize,
    pub tag_name: String,
    pub text: String,
    /// Page coordinates (viewport box shifted by scroll). Zero when unmeasured.
    pub position: Rect,
    #[serde(rename = "isShadowDOM")]
    pub is_shadow_dom: bool,
    pub shadow_host: Option<ShadowHostInfo>,
    pub attributes: BTreeMap<String, String>,
    pub context: ElementContext,
    pub element_state: ElementState,
    pub locators: LocatorSet,
    pub confidence: f64,
}

impl fmt::Display for ElementRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] <{}>", self.index, self.tag_name)?;
        if !self.text.is_empty() {
            write!(f, " \"{}\"", self.text)?;
        }
        if self.is_shadow_dom {
            write!(f, " (shadow)")?;
        }
        if let Some(best) = self.locators.best() {
            write!(f, " -> {}", best)?;
        }
        Ok(())
    }
}

/// Aggregate counts for one scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanStats {
    pub total_elements: usize,
    /// Records with at least one primary candidate.
    pub primary_elements: usize,
    /// Records with at least one secondary candidate.
    pub secondary_elements: usize,
    pub shadow_elements: usize,
    /// Milliseconds.
    pub scan_duration: u64,
}

/// Records plus statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub scanned_at: DateTime<Utc>,
    pub elements: Vec<ElementRecord>,
    pub stats: ScanStats,
}

/// What a scan reports to its caller: the result, or a failure message.
#[derive(Debug, Clone, Serialize)]
pub struct ScanResponse {
    pub success: bool,
    #[serde(flatten)]
    pub result: Option<ScanResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ScanResponse {
    /// Run a scan and fold any failure into the response.
    pub fn run(doc: &Document, options: &ScanOptions) -> Self {
        scan(doc, options).into()
    }
}

impl From<Result<ScanResult>> for ScanResponse {
    fn from(result: Result<ScanResult>) -> Self {
        match result {
            Ok(result) => Self {
                success: true,
                result: Some(result),
                error: None,
            },
            Err(e) => Self {
                success: false,
                result: None,
                error: Some(e.to_string()),
            },
        }
    }
}

/// Scan `doc` and build a record for every element that passes the filter.
///
/// Fails only when there is nothing to scan yet (no `<body>`); problems with
/// individual elements degrade that element's data instead.
pub fn scan(doc: &Document, options: &ScanOptions) -> Result<ScanResult> {
    let started = Instant::now();
    if doc.body().is_none() {
        debug!("scan requested before body was available");
        return Err(Error::DocumentNotReady("document.body is not available".into()));
    }

    let visits = traverse(doc, doc.root(), options.include_shadow_dom);
    let mut synthesizer = Synthesizer::new(doc);
    let mut elements = Vec::new();
    let mut stats = ScanStats::default();

    for visit in visits {
        let node = visit.node;
        if !classify::should_include(doc, node, options.include_hidden) {
            continue;
        }
        let Some(el) = doc.element(node) else {
            continue;
        };

        let text = classify::clean_text(doc, node);
        let locators = synthesizer.synthesize(node, visit.is_shadow_dom, &text);
        if locators.is_empty() {
            debug!(node = %node, "no locators, skipping");
            continue;
        }

        let record = ElementRecord {
            index: elements.len(),
            tag_name: el.tag().to_string(),
            position: doc.bounding_rect(node).unwrap_or_default(),
            is_shadow_dom: visit.is_shadow_dom,
            shadow_host: visit.shadow_host.and_then(|host| host_info(doc, host)),
            attributes: el
                .attributes()
                .iter()
                .map(|a| (a.name.clone(), a.value.clone()))
                .collect(),
            context: element_context(doc, node),
            element_state: classify::element_state(doc, node, &text),
            confidence: locators.max_confidence(),
            locators,
            text,
        };

        stats.total_elements += 1;
        if !record.locators.primary.is_empty() {
            stats.primary_elements += 1;
        }
        if !record.locators.secondary.is_empty() {
            stats.secondary_elements += 1;
        }
        if record.is_shadow_dom {
            stats.shadow_elements += 1;
        }
        elements.push(record);
    }

    stats.scan_duration = started.elapsed().as_millis() as u64;
    info!(
        elements = stats.total_elements,
        primary = stats.primary_elements,
        shadow = stats.shadow_elements,
        duration_ms = stats.scan_duration,
        "scan complete"
    );

    Ok(ScanResult {
        url: doc.url().map(str::to_string),
        scanned_at: Utc::now(),
        elements,
        stats,
    })
}

fn host_info(doc: &Document, host: NodeId) -> Option<ShadowHostInfo> {
    let el = doc.element(host)?;
    Some(ShadowHostInfo {
        tag_name: el.tag().to_string(),
        id: el.id().map(str::to_string),
        class_name: el.attr("class").filter(|c| !c.is_empty()).map(str::to_string),
    })
}

fn element_context(doc: &Document, node: NodeId) -> ElementContext {
    let parent = doc.parent_element(node);
    ElementContext {
        parent_tag_name: parent
            .and_then(|p| doc.tag_name(p))
            .unwrap_or_default()
            .to_string(),
        parent_id: parent
            .and_then(|p| doc.element(p)?.id())
            .map(str::to_string),
        children_count: doc.element_children(node).count(),
        sibling_index: doc.element_index(node).unwrap_or(0),
        nesting_level: nesting_level(doc, node),
    }
}

fn nesting_level(doc: &Document, node: NodeId) -> usize {
    let mut level = 0;
    let mut current = node;
    while let Some(parent) = doc.parent(current) {
        if doc.is_element(parent) {
            level += 1;
        }
        current = doc.shadow_host(parent).unwrap_or(parent);
        if current != parent {
            level += 1;
        }
    }
    level
}
