//! Locator candidates and tiered synthesis.
//!
//! Candidates are plain data: a selector string plus how it was derived and
//! whether it was unique when generated. Nothing here holds on to nodes, so a
//! candidate has to be resolved again against the current document before use.

mod context;
mod index;
mod synth;

pub use context::ContextStrategy;
pub use index::UniquenessOracle;
pub use synth::{synthesize, Synthesizer};

use std::fmt;

use serde::{Deserialize, Serialize};

// =========================================================================
// Confidence table
// =========================================================================

pub const TEST_HOOK_CONFIDENCE: f64 = 0.95;
pub const ID_CONFIDENCE: f64 = 0.90;
pub const NAME_CONFIDENCE: f64 = 0.85;
pub const ARIA_LABEL_CONFIDENCE: f64 = 0.80;
pub const DATA_ATTR_CONFIDENCE: f64 = 0.75;
pub const PLACEHOLDER_CONFIDENCE: f64 = 0.75;
pub const CLASS_CONFIDENCE: f64 = 0.70;
pub const SINGLE_CLASS_CONFIDENCE: f64 = 0.65;
pub const TEXT_CONFIDENCE: f64 = 0.65;
pub const TYPE_CONFIDENCE: f64 = 0.60;
pub const XPATH_CONFIDENCE: f64 = 0.50;
pub const NTH_CHILD_CONFIDENCE: f64 = 0.40;
pub const TAG_CONFIDENCE: f64 = 0.30;
pub const POSITION_CONFIDENCE: f64 = 0.20;

/// Subtracted from every contextual variant.
pub const CONTEXTUAL_PENALTY: f64 = 0.05;

/// `base - penalty`, rounded to two decimals and floored at zero.
pub(crate) fn adjusted(base: f64, penalty: f64) -> f64 {
    ((base - penalty).max(0.0) * 100.0).round() / 100.0
}

// =========================================================================
// Candidate types
// =========================================================================

/// What language `selector` is written in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SelectorSyntax {
    Css,
    XPath,
    /// A `/* ... */` note for elements no selector can reach.
    Comment,
}

/// How a candidate was derived, with respect to uniqueness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UniquenessLevel {
    Unique,
    DuplicateId,
    NonUnique,
    Contextual,
    ContextualId,
    ContextualClass,
    ContextualSingleClass,
}

impl fmt::Display for UniquenessLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            UniquenessLevel::Unique => "unique",
            UniquenessLevel::DuplicateId => "duplicate-id",
            UniquenessLevel::NonUnique => "non-unique",
            UniquenessLevel::Contextual => "contextual",
            UniquenessLevel::ContextualId => "contextual-id",
            UniquenessLevel::ContextualClass => "contextual-class",
            UniquenessLevel::ContextualSingleClass => "contextual-single-class",
        };
        f.write_str(s)
    }
}

/// One synthesized selector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocatorCandidate {
    /// Category, e.g. `id`, `data-testid`, `class`, `id-contextual-1`.
    #[serde(rename = "type")]
    pub kind: String,
    pub selector: String,
    /// The attribute value or text the selector was built from.
    pub value: String,
    pub syntax: SelectorSyntax,
    /// The element lives in a shadow tree.
    #[serde(rename = "shadowDOM")]
    pub shadow_dom: bool,
    /// Whether `selector` matched exactly one light-DOM element. `None` when
    /// that could not be checked (shadow-scoped elements, positional
    /// fallbacks).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_unique: Option<bool>,
    pub uniqueness_level: UniquenessLevel,
    pub confidence: f64,
}

impl fmt::Display for LocatorCandidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}, {:.2}", self.selector, self.kind, self.confidence)?;
        match self.is_unique {
            Some(true) => write!(f, ", unique)"),
            Some(false) => write!(f, ", {})", self.uniqueness_level),
            None => write!(f, ", unverified)"),
        }
    }
}

/// Candidates grouped by tier.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LocatorSet {
    #[serde(default)]
    pub primary: Vec<LocatorCandidate>,
    #[serde(default)]
    pub secondary: Vec<LocatorCandidate>,
    #[serde(default)]
    pub fallback: Vec<LocatorCandidate>,
}

impl LocatorSet {
    /// Number of candidates across all tiers.
    pub fn total(&self) -> usize {
        self.primary.len() + self.secondary.len() + self.fallback.len()
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }

    /// All candidates, primary first.
    pub fn iter(&self) -> impl Iterator<Item = &LocatorCandidate> {
        self.primary
            .iter()
            .chain(self.secondary.iter())
            .chain(self.fallback.iter())
    }

    pub fn best(&self) -> Option<&LocatorCandidate> {
        pick_best(self)
    }

    /// Highest confidence across tiers, 0 when empty.
    pub fn max_confidence(&self) -> f64 {
        self.iter().map(|c| c.confidence).fold(0.0, f64::max)
    }
}

/// Highest-confidence candidate. Ties go to the earliest one, which puts
/// primary ahead of secondary ahead of fallback.
pub fn pick_best(set: &LocatorSet) -> Option<&LocatorCandidate> {
    let mut best: Option<&LocatorCandidate> = None;
    for candidate in set.iter() {
        if best.map_or(true, |b| candidate.confidence > b.confidence) {
            best = Some(candidate);
        }
    }
    best
}
