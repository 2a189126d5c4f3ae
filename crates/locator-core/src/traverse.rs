//! Document walk that descends into shadow trees.

use std::collections::HashSet;

use tracing::{debug, trace};

use crate::dom::{Document, NodeId, ShadowProbe};

/// One element reached by [`traverse`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Visit {
    pub node: NodeId,
    pub is_shadow_dom: bool,
    /// Nearest enclosing shadow host.
    pub shadow_host: Option<NodeId>,
}

/// Pre-order walk from `root` over every node (text and comments included),
/// yielding elements in document order. A host's shadow tree is walked before
/// its light children. Each node is processed at most once, so stashed roots
/// that point back up the tree cannot loop.
pub fn traverse(doc: &Document, root: NodeId, include_shadow: bool) -> Vec<Visit> {
    let mut out = Vec::new();
    let mut visited: HashSet<NodeId> = HashSet::new();
    // (node, enclosing host)
    let mut stack: Vec<(NodeId, Option<NodeId>)> = vec![(root, None)];

    while let Some((node, host)) = stack.pop() {
        if !visited.insert(node) {
            trace!(node = %node, "already visited");
            continue;
        }

        let is_element = doc.is_element(node);
        if is_element {
            out.push(Visit {
                node,
                is_shadow_dom: host.is_some(),
                shadow_host: host,
            });
        }

        for &child in doc.children(node).iter().rev() {
            stack.push((child, host));
        }

        if is_element && include_shadow {
            let roots = ShadowProbe::reachable_roots(doc, node);
            for &shadow in roots.iter().rev() {
                if visited.contains(&shadow) {
                    debug!(host = %node, root = %shadow, "shadow root already walked");
                    continue;
                }
                stack.push((shadow, Some(node)));
            }
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::ShadowRootMode;

    fn tags(doc: &Document, visits: &[Visit]) -> Vec<String> {
        visits
            .iter()
            .map(|v| doc.tag_name(v.node).unwrap().to_string())
            .collect()
    }

    #[test]
    fn document_order_with_text_and_comments() {
        let mut doc = Document::new();
        let body = doc.body().unwrap();
        let ul = doc.append_element(body, "ul", &[]);
        doc.append_text(ul, "\n");
        let li = doc.append_element(ul, "li", &[]);
        doc.append_comment(ul, "gap");
        doc.append_element(li, "a", &[]);
        doc.append_element(body, "footer", &[]);

        let visits = traverse(&doc, doc.root(), true);
        assert_eq!(
            tags(&doc, &visits),
            ["html", "head", "body", "ul", "li", "a", "footer"]
        );
        assert!(visits.iter().all(|v| !v.is_shadow_dom));
    }

    #[test]
    fn shadow_tree_tagged_with_host() {
        let mut doc = Document::new();
        let body = doc.body().unwrap();
        let host = doc.append_element(body, "my-card", &[]);
        let root = doc.attach_shadow(host, ShadowRootMode::Open);
        let inner = doc.append_element(root, "button", &[]);
        let nested_host = doc.append_element(root, "my-icon", &[]);
        let nested_root = doc.attach_shadow(nested_host, ShadowRootMode::Open);
        let svg = doc.append_element(nested_root, "svg", &[]);
        let light = doc.append_element(host, "span", &[]);

        let visits = traverse(&doc, doc.root(), true);
        let find = |n| visits.iter().find(|v| v.node == n).copied().unwrap();
        assert_eq!(find(inner).shadow_host, Some(host));
        assert_eq!(find(svg).shadow_host, Some(nested_host));
        assert!(!find(light).is_shadow_dom);
        assert_eq!(
            tags(&doc, &visits)[3..].to_vec(),
            ["my-card", "button", "my-icon", "svg", "span"]
        );

        let light_only = traverse(&doc, doc.root(), false);
        assert!(light_only.iter().all(|v| v.node != inner));
    }

    #[test]
    fn closed_root_needs_a_known_slot() {
        let mut doc = Document::new();
        let body = doc.body().unwrap();
        let host = doc.append_element(body, "x-closed", &[]);
        let root = doc.attach_shadow(host, ShadowRootMode::Closed);
        let hidden = doc.append_element(root, "input", &[]);

        let visits = traverse(&doc, doc.root(), true);
        assert!(visits.iter().all(|v| v.node != hidden));

        doc.stash_shadow_root(host, "_shadowRoot", root);
        let visits = traverse(&doc, doc.root(), true);
        assert!(visits.iter().any(|v| v.node == hidden && v.is_shadow_dom));
    }

    #[test]
    fn circular_stash_does_not_loop() {
        let mut doc = Document::new();
        let body = doc.body().unwrap();
        let outer = doc.append_element(body, "x-outer", &[]);
        let root = doc.attach_shadow(outer, ShadowRootMode::Open);
        let inner = doc.append_element(root, "x-inner", &[]);
        // inner claims the outer root as its own
        doc.stash_shadow_root(inner, "__shadowRoot", root);

        let visits = traverse(&doc, doc.root(), true);
        assert_eq!(visits.iter().filter(|v| v.node == inner).count(), 1);
    }
}
