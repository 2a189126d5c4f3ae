//! # locator-core
//!
//! Scan a DOM, keep the elements a tester would target, and synthesize ranked
//! CSS/XPath locators for each of them.
//!
//! ## Quick Start
//!
//! ```rust
//! use locator_core::{scan, Document, ScanOptions};
//!
//! # fn main() -> locator_core::Result<()> {
//! let mut doc = Document::new();
//! let body = doc.body().expect("skeleton has a body");
//! let button = doc.append_element(body, "button", &[("data-testid", "submit-btn")]);
//! doc.append_text(button, "Send");
//!
//! let result = scan(&doc, &ScanOptions::default())?;
//! let record = result.elements.iter().find(|r| r.tag_name == "button").unwrap();
//! let best = record.locators.best().unwrap();
//! assert_eq!(best.selector, r#"[data-testid="submit-btn"]"#);
//! # Ok(())
//! # }
//! ```

pub mod classify;
pub mod dom;
pub mod highlight;
pub mod locator;
pub mod scan;
pub mod selector;
pub mod traverse;
pub mod xpath;

pub use dom::{
    ComputedStyle, Document, DocumentSnapshot, NodeId, Rect, ShadowProbe, ShadowRootMode,
    SiblingInfo, Viewport,
};
pub use highlight::{highlight_selector, ClearOutcome, HighlightOutcome, Highlighter};
pub use locator::{pick_best, LocatorCandidate, LocatorSet, SelectorSyntax, UniquenessLevel};
pub use scan::{scan, ElementRecord, ScanOptions, ScanResponse, ScanResult, ScanStats};
pub use traverse::{traverse, Visit};

/// Result type for locator-core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the core.
///
/// Per-element failures (style, layout, uniqueness checks) are recovered where
/// they happen; only [`Error::DocumentNotReady`] aborts a scan.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("document not ready: {0}")]
    DocumentNotReady(String),

    #[error("invalid selector '{selector}': {reason}")]
    InvalidSelector { selector: String, reason: String },

    #[error("invalid xpath '{expr}': {reason}")]
    InvalidXPath { expr: String, reason: String },

    #[error("computed style unavailable for node {0}")]
    StyleUnavailable(NodeId),

    #[error("layout unavailable for node {0}")]
    LayoutUnavailable(NodeId),

    #[error("unknown node {0}")]
    UnknownNode(NodeId),

    #[error("snapshot error: {0}")]
    Snapshot(#[from] serde_json::Error),
}
