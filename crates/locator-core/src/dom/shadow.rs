//! Shadow root access.
//!
//! Open roots are reachable through `element.shadowRoot`. Closed roots are
//! only reachable when a framework keeps a reference on the host under a
//! well-known property; those slots are listed here explicitly.

use serde::{Deserialize, Serialize};
use tracing::trace;

use super::{Document, NodeId};

/// `attachShadow({ mode })`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShadowRootMode {
    Open,
    Closed,
}

/// Host properties frameworks are known to park shadow roots on.
pub const VENDOR_SHADOW_SLOTS: &[&str] = &[
    "_shadowRoot",
    "__shadowRoot",
    "shadowRoot_",
    "_closedShadowRoot",
];

/// One way of getting from a host to its shadow root.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShadowProbe {
    /// Standard `element.shadowRoot` (open roots only).
    Open,
    /// A vendor property holding a root reference.
    Stashed(&'static str),
}

/// Every probe the traversal tries, in order.
pub const KNOWN_PROBES: [ShadowProbe; 5] = [
    ShadowProbe::Open,
    ShadowProbe::Stashed(VENDOR_SHADOW_SLOTS[0]),
    ShadowProbe::Stashed(VENDOR_SHADOW_SLOTS[1]),
    ShadowProbe::Stashed(VENDOR_SHADOW_SLOTS[2]),
    ShadowProbe::Stashed(VENDOR_SHADOW_SLOTS[3]),
];

impl ShadowProbe {
    /// Try this probe on `host`. Anything that is not a shadow root counts as
    /// a miss.
    pub fn probe(self, doc: &Document, host: NodeId) -> Option<NodeId> {
        match self {
            ShadowProbe::Open => doc
                .attached_shadow_root(host)
                .filter(|(_, mode)| *mode == ShadowRootMode::Open)
                .map(|(root, _)| root),
            ShadowProbe::Stashed(slot) => {
                let candidate = doc.stashed_root(host, slot)?;
                if doc.is_shadow_root(candidate) {
                    Some(candidate)
                } else {
                    trace!(host = %host, slot, "stashed value is not a shadow root");
                    None
                }
            }
        }
    }

    /// Distinct roots reachable from `host` through [`KNOWN_PROBES`].
    pub fn reachable_roots(doc: &Document, host: NodeId) -> Vec<NodeId> {
        let mut roots = Vec::new();
        for probe in KNOWN_PROBES {
            if let Some(root) = probe.probe(doc, host) {
                if !roots.contains(&root) {
                    roots.push(root);
                }
            }
        }
        roots
    }
}
