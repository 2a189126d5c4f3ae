//! Visibility and text heuristics.
//!
//! Both entry points are total: internal failures fall back to the
//! conservative answer (visible, empty text) instead of dropping elements.

use std::sync::LazyLock;

use regex::RegexSet;
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::dom::{Document, NodeId};
use crate::Result;

/// Text longer than this is treated as serialized data, not a label.
pub const MAX_RAW_TEXT: usize = 300;
/// Cleaned text is cut to this many characters.
pub const MAX_TEXT: usize = 150;
/// Minimum share of alphabetic characters for strings longer than
/// [`ALPHA_CHECK_MIN_LEN`].
pub const MIN_ALPHA_RATIO: f64 = 0.3;
pub const ALPHA_CHECK_MIN_LEN: usize = 10;

/// Tags that never produce records.
pub const SKIP_TAGS: &[&str] = &[
    "script", "style", "noscript", "meta", "link", "head", "title", "base", "template",
];

const FORM_TAGS: &[&str] = &[
    "input", "select", "textarea", "button", "form", "label", "fieldset", "option",
];

const INTERACTIVE_TAGS: &[&str] = &[
    "a", "button", "input", "select", "textarea", "details", "summary", "option",
];

const INTERACTIVE_ROLES: &[&str] = &[
    "button", "link", "tab", "menuitem", "checkbox", "radio", "switch", "option", "textbox",
    "combobox",
];

static CODE_PATTERNS: LazyLock<RegexSet> = LazyLock::new(|| {
    RegexSet::new([
        r"\bfunction\s*[\w$]*\s*\(",
        r"\([^()]*\)\s*=>",
        r"\b[\w$]+\s*=>\s*",
        r"\b(?:console|document|window)\.[\w$]+",
        r"\b(?:var|let|const)\s+[A-Za-z_$][\w$]*\s*=",
        r"(?m)^\s*(?:import|export)\s+[\w{*]",
        r"\brequire\s*\(\s*['\x22]",
        r"\.(?:getElementById|getElementsBy\w+|querySelector(?:All)?|addEventListener|appendChild|createElement|setAttribute|innerHTML)\b",
    ])
    .expect("code patterns are valid")
});

/// Whether `text` looks like script source rather than visible copy.
pub fn looks_like_code(text: &str) -> bool {
    CODE_PATTERNS.is_match(text)
}

/// Lenient visibility test. Offscreen, tiny and `visibility: hidden`
/// elements count as visible.
pub fn is_visible(doc: &Document, node: NodeId) -> bool {
    match check_visibility(doc, node) {
        Ok(visible) => visible,
        Err(e) => {
            trace!(node = %node, error = %e, "visibility check failed, keeping element");
            true
        }
    }
}

fn check_visibility(doc: &Document, node: NodeId) -> Result<bool> {
    if !doc.is_connected(node) {
        return Ok(false);
    }
    let style = doc.computed_style(node)?;
    if style.display == "none" || style.opacity == 0.0 {
        return Ok(false);
    }
    // a parent without style is not known to be hidden
    if let Some(parent) = doc.parent_element(node) {
        if doc
            .computed_style(parent)
            .is_ok_and(|style| style.display == "none")
        {
            return Ok(false);
        }
    }
    let rect = doc.bounding_rect(node)?;
    Ok(!rect.is_collapsed())
}

/// Rendered text with code, data blobs and symbol noise filtered out,
/// whitespace collapsed and cut to [`MAX_TEXT`] characters.
pub fn clean_text(doc: &Document, node: NodeId) -> String {
    clean(&doc.rendered_text(node))
}

/// The string-level half of [`clean_text`]. The length and alphabetic
/// checks see the text as rendered, indentation included; collapsing
/// happens last.
pub fn clean(raw: &str) -> String {
    let raw = raw.trim();
    if raw.is_empty() || looks_like_code(raw) {
        return String::new();
    }

    let len = raw.chars().count();
    if len > MAX_RAW_TEXT {
        return String::new();
    }
    if len > ALPHA_CHECK_MIN_LEN {
        let alpha = raw.chars().filter(|c| c.is_alphabetic()).count();
        if (alpha as f64) / (len as f64) < MIN_ALPHA_RATIO {
            return String::new();
        }
    }

    raw.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .chars()
        .take(MAX_TEXT)
        .collect()
}

/// Flags describing what kind of element this is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementState {
    pub is_form_element: bool,
    pub is_interactive: bool,
    pub is_visible: bool,
    pub has_children: bool,
    pub is_empty_element: bool,
}

pub fn element_state(doc: &Document, node: NodeId, text: &str) -> ElementState {
    let Some(el) = doc.element(node) else {
        return ElementState::default();
    };
    let tag = el.tag();
    let has_children = doc.element_children(node).next().is_some();

    let role_interactive = el
        .attr("role")
        .is_some_and(|r| INTERACTIVE_ROLES.contains(&r.trim()));
    let focusable = el
        .attr("tabindex")
        .and_then(|t| t.trim().parse::<i32>().ok())
        .is_some_and(|t| t >= 0);
    let editable = el
        .attr("contenteditable")
        .is_some_and(|v| v.is_empty() || v.eq_ignore_ascii_case("true"));

    ElementState {
        is_form_element: FORM_TAGS.contains(&tag),
        is_interactive: INTERACTIVE_TAGS.contains(&tag)
            || el.has_attr("onclick")
            || role_interactive
            || focusable
            || editable,
        is_visible: is_visible(doc, node),
        has_children,
        is_empty_element: !has_children && text.is_empty(),
    }
}

/// Scan filter: structural tags out, hidden elements out unless asked for.
pub fn should_include(doc: &Document, node: NodeId, include_hidden: bool) -> bool {
    let Some(tag) = doc.tag_name(node) else {
        return false;
    };
    if SKIP_TAGS.contains(&tag) {
        return false;
    }
    include_hidden || is_visible(doc, node)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::{ComputedStyle, Rect};

    #[test]
    fn code_is_rejected() {
        assert_eq!(clean("function(){return 1}"), "");
        assert_eq!(clean("const x = 5"), "");
        assert_eq!(clean("console.log('hi')"), "");
        assert_eq!(clean("items.map(x => x * 2)"), "");
        assert_eq!(clean("import React from 'react'"), "");
        assert_eq!(clean("el.addEventListener('click', go)"), "");
        assert_eq!(clean("var a = require('fs')"), "");
    }

    #[test]
    fn labels_survive() {
        assert_eq!(clean("Submit"), "Submit");
        assert_eq!(clean("  Sign   in\n now "), "Sign in now");
        assert_eq!(clean("Read the documentation"), "Read the documentation");
        assert_eq!(clean("OK"), "OK");
        // short strings skip the alpha check
        assert_eq!(clean("$12.99"), "$12.99");
    }

    #[test]
    fn noise_and_blobs_are_rejected() {
        assert_eq!(clean("1234-5678-9012 / 3456"), "");
        assert_eq!(clean(&"word ".repeat(70)), "");
        assert_eq!(clean(""), "");
    }

    #[test]
    fn indented_blobs_are_measured_before_collapsing() {
        // template indentation: over 300 characters rendered, 124 collapsed
        let blob = "Cell\n        ".repeat(25);
        assert!(blob.trim().chars().count() > MAX_RAW_TEXT);
        assert_eq!(clean(&blob), "");

        // mostly whitespace fails the alphabetic share
        let sparse = format!("Go{}back", " ".repeat(20));
        assert_eq!(clean(&sparse), "");
        assert_eq!(clean("  Go back  "), "Go back");
    }

    #[test]
    fn long_text_is_truncated() {
        let text = "a".repeat(200);
        assert_eq!(clean(&text).chars().count(), MAX_TEXT);
    }

    #[test]
    fn visibility_rules() {
        let mut doc = Document::new();
        let body = doc.body().unwrap();
        let shown = doc.append_element(body, "div", &[]);
        doc.set_rect(shown, Some(Rect::new(0.0, 0.0, 10.0, 10.0)));
        assert!(is_visible(&doc, shown));

        let none = doc.append_element(body, "div", &[]);
        doc.set_style(none, Some(ComputedStyle::hidden()));
        assert!(!is_visible(&doc, none));

        let transparent = doc.append_element(body, "div", &[]);
        doc.set_style(transparent, Some(ComputedStyle::with_opacity(0.0)));
        assert!(!is_visible(&doc, transparent));

        let faint = doc.append_element(body, "div", &[]);
        doc.set_style(faint, Some(ComputedStyle::with_opacity(0.05)));
        assert!(is_visible(&doc, faint));

        let collapsed = doc.append_element(body, "div", &[]);
        doc.set_rect(collapsed, Some(Rect::new(5.0, 5.0, 0.0, 0.0)));
        assert!(!is_visible(&doc, collapsed));

        let thin = doc.append_element(body, "hr", &[]);
        doc.set_rect(thin, Some(Rect::new(5.0, 5.0, 100.0, 0.0)));
        assert!(is_visible(&doc, thin));

        let child = doc.append_element(none, "span", &[]);
        assert!(!is_visible(&doc, child));

        let concealed = doc.append_element(body, "button", &[]);
        doc.set_style(
            concealed,
            Some(ComputedStyle {
                visibility: "hidden".into(),
                ..ComputedStyle::default()
            }),
        );
        assert!(is_visible(&doc, concealed));
    }

    #[test]
    fn failures_default_to_visible_and_detached_is_hidden() {
        let mut doc = Document::new();
        let body = doc.body().unwrap();
        let unknown = doc.append_element(body, "div", &[]);
        doc.set_style(unknown, None);
        assert!(is_visible(&doc, unknown));

        let detached = doc.create_element("div");
        assert!(!is_visible(&doc, detached));
    }

    #[test]
    fn unstyled_parent_does_not_skip_rect_check() {
        let mut doc = Document::new();
        let body = doc.body().unwrap();
        let parent = doc.append_element(body, "div", &[]);
        doc.set_style(parent, None);

        let collapsed = doc.append_element(parent, "span", &[]);
        doc.set_rect(collapsed, Some(Rect::new(0.0, 0.0, 0.0, 0.0)));
        assert!(!is_visible(&doc, collapsed));

        let sized = doc.append_element(parent, "span", &[]);
        doc.set_rect(sized, Some(Rect::new(0.0, 0.0, 40.0, 12.0)));
        assert!(is_visible(&doc, sized));
    }

    #[test]
    fn state_flags() {
        let mut doc = Document::new();
        let body = doc.body().unwrap();
        let input = doc.append_element(body, "input", &[("type", "text")]);
        let state = element_state(&doc, input, "");
        assert!(state.is_form_element && state.is_interactive && state.is_empty_element);

        let div = doc.append_element(body, "div", &[("role", "button")]);
        doc.append_element(div, "span", &[]);
        let state = element_state(&doc, div, "Open");
        assert!(state.is_interactive && !state.is_form_element);
        assert!(state.has_children && !state.is_empty_element);

        let plain = doc.append_element(body, "div", &[("tabindex", "-1")]);
        assert!(!element_state(&doc, plain, "x").is_interactive);
    }

    #[test]
    fn skip_tags_are_excluded() {
        let mut doc = Document::new();
        let body = doc.body().unwrap();
        let script = doc.append_element(body, "script", &[]);
        let hidden = doc.append_element(body, "div", &[]);
        doc.set_style(hidden, Some(ComputedStyle::hidden()));
        assert!(!should_include(&doc, script, true));
        assert!(!should_include(&doc, hidden, false));
        assert!(should_include(&doc, hidden, true));
    }
}
