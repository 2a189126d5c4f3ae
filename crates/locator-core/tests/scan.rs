//! End-to-end scan behaviour over in-memory documents.
//!
//! Run with: cargo test -p locator-core --test scan

use locator_core::classify::{self, clean};
use locator_core::highlight::{is_highlighted, HIGHLIGHT_STYLE};
use locator_core::{
    highlight_selector, pick_best, scan, traverse, xpath, ComputedStyle, Document, DocumentSnapshot,
    Highlighter, NodeId, Rect, ScanOptions, SelectorSyntax, ShadowRootMode, UniquenessLevel,
};

/// A page with a bit of everything: forms, lists, a table, hidden and
/// skipped elements, an open and a closed shadow tree.
fn fixture() -> Document {
    let mut doc = Document::new();
    doc.set_url("https://shop.example/checkout");
    let html = doc.document_element().unwrap();
    let head = doc.element_children(html).next().unwrap();
    doc.append_element(head, "title", &[]);
    let body = doc.body().unwrap();

    doc.append_element(body, "script", &[]);
    let header = doc.append_element(body, "header", &[("class", "top css-1q2w3e")]);
    let nav = doc.append_element(header, "ul", &[("id", "nav")]);
    for label in ["Home", "Cart", "Help"] {
        let li = doc.append_element(nav, "li", &[]);
        let a = doc.append_element(li, "a", &[("href", "#"), ("class", "nav-link")]);
        doc.append_text(a, label);
    }

    let form = doc.append_element(body, "form", &[("id", "checkout"), ("class", "card")]);
    doc.append_element(form, "input", &[("name", "email"), ("type", "email"), ("placeholder", "Email")]);
    doc.append_element(form, "input", &[("name", "zip"), ("type", "text"), ("data-field", "zip")]);
    let submit = doc.append_element(form, "button", &[("data-testid", "pay"), ("type", "submit")]);
    doc.append_text(submit, "Pay now");

    let table = doc.append_element(body, "table", &[]);
    let tbody = doc.append_element(table, "tbody", &[]);
    for row in 0..3 {
        let tr = doc.append_element(tbody, "tr", &[]);
        for col in 0..2 {
            let td = doc.append_element(tr, "td", &[]);
            let edit = doc.append_element(td, "a", &[("class", "edit")]);
            doc.append_text(edit, &format!("Edit {}-{}", row, col));
        }
    }

    let hidden = doc.append_element(body, "div", &[("id", "modal")]);
    doc.set_style(hidden, Some(ComputedStyle::hidden()));
    doc.append_element(hidden, "button", &[("class", "close")]);

    let open_host = doc.append_element(body, "x-widget", &[("id", "widget")]);
    let open_root = doc.attach_shadow(open_host, ShadowRootMode::Open);
    let wrap = doc.append_element(open_root, "div", &[("class", "inner")]);
    let inner = doc.append_element(wrap, "button", &[("id", "inside"), ("class", "btn")]);
    doc.set_rect(inner, Some(Rect::new(40.0, 600.0, 90.0, 32.0)));

    let closed_host = doc.append_element(body, "x-secure", &[]);
    let closed_root = doc.attach_shadow(closed_host, ShadowRootMode::Closed);
    doc.stash_shadow_root(closed_host, "__shadowRoot", closed_root);
    doc.append_element(closed_root, "input", &[("name", "card-number")]);

    doc
}

fn included(doc: &Document, options: &ScanOptions) -> Vec<NodeId> {
    traverse(doc, doc.root(), options.include_shadow_dom)
        .into_iter()
        .map(|v| v.node)
        .filter(|&n| classify::should_include(doc, n, options.include_hidden))
        .collect()
}

// =========================================================================
// Properties
// =========================================================================

#[test]
fn every_included_element_gets_exactly_one_record() {
    let doc = fixture();
    for options in [
        ScanOptions::default(),
        ScanOptions {
            include_hidden: true,
            include_shadow_dom: false,
        },
    ] {
        let result = scan(&doc, &options).unwrap();
        let expected: Vec<String> = included(&doc, &options)
            .into_iter()
            .map(|n| doc.tag_name(n).unwrap().to_string())
            .collect();
        let actual: Vec<String> = result.elements.iter().map(|r| r.tag_name.clone()).collect();
        assert_eq!(actual, expected);
        assert!(actual.iter().all(|t| t != "script" && t != "title" && t != "head"));
    }
}

#[test]
fn every_record_has_a_locator() {
    let doc = fixture();
    let result = scan(&doc, &ScanOptions::default()).unwrap();
    assert!(!result.elements.is_empty());
    for record in &result.elements {
        assert!(record.locators.total() >= 1, "{}", record);
        assert!(!record.locators.fallback.is_empty(), "{}", record);
        assert_eq!(record.confidence, pick_best(&record.locators).unwrap().confidence);
    }
}

#[test]
fn unique_candidates_resolve_to_one_element() {
    let doc = fixture();
    let result = scan(&doc, &ScanOptions::default()).unwrap();
    let mut checked = 0;
    for candidate in result.elements.iter().flat_map(|r| r.locators.iter()) {
        if candidate.shadow_dom || candidate.is_unique != Some(true) {
            continue;
        }
        let matches = match candidate.syntax {
            SelectorSyntax::Css => doc.query_selector_all(&candidate.selector).unwrap(),
            SelectorSyntax::XPath => xpath::evaluate(&doc, doc.root(), &candidate.selector).unwrap(),
            SelectorSyntax::Comment => continue,
        };
        assert_eq!(matches.len(), 1, "{}", candidate);
        checked += 1;
    }
    assert!(checked > 20);
}

#[test]
fn non_unique_flags_are_honest() {
    let doc = fixture();
    let result = scan(&doc, &ScanOptions::default()).unwrap();
    for candidate in result.elements.iter().flat_map(|r| r.locators.iter()) {
        if candidate.is_unique == Some(false) && candidate.syntax == SelectorSyntax::Css {
            let count = doc.query_selector_all(&candidate.selector).unwrap().len();
            assert_ne!(count, 1, "{}", candidate);
        }
    }
}

#[test]
fn xpath_is_deterministic_and_resolves_back() {
    let doc = fixture();
    for node in doc.descendants(doc.root()) {
        let first = xpath::generate(&doc, node);
        assert_eq!(first, xpath::generate(&doc, node));
        assert_eq!(xpath::evaluate(&doc, doc.root(), &first).unwrap(), vec![node], "{}", first);
    }
}

#[test]
fn clearing_twice_leaves_nothing_highlighted() {
    let mut doc = fixture();
    let mut highlighter = Highlighter::new();
    let outcome = highlight_selector(&mut highlighter, &mut doc, "a");
    assert!(outcome.found);
    assert_eq!(outcome.count, 9);

    assert!(highlighter.clear(&mut doc).success);
    assert!(highlighter.clear(&mut doc).success);
    let all = traverse(&doc, doc.root(), true);
    assert!(all.iter().all(|v| !is_highlighted(&doc, v.node)));
    assert!(all
        .iter()
        .all(|v| !doc.attribute(v.node, "style").is_some_and(|s| s.contains(HIGHLIGHT_STYLE))));
}

#[test]
fn text_filtering() {
    assert_eq!(clean("function(){return 1}"), "");
    assert_eq!(clean("Submit"), "Submit");
}

// =========================================================================
// Scenarios
// =========================================================================

#[test]
fn duplicate_ids_are_flagged_and_disambiguated() {
    let mut doc = Document::new();
    let body = doc.body().unwrap();
    let x = doc.append_element(body, "div", &[("id", "a")]);
    doc.append_text(x, "x");
    let y = doc.append_element(body, "div", &[("id", "a")]);
    doc.append_text(y, "y");

    let result = scan(&doc, &ScanOptions::default()).unwrap();
    let divs: Vec<_> = result.elements.iter().filter(|r| r.tag_name == "div").collect();
    assert_eq!(divs.len(), 2);
    for record in divs {
        let id = record.locators.primary.iter().find(|c| c.kind == "id").unwrap();
        assert_eq!(id.uniqueness_level, UniquenessLevel::DuplicateId);
        assert_eq!(id.is_unique, Some(false));
        assert_eq!(id.confidence, 0.90);

        let contextual: Vec<_> = record
            .locators
            .primary
            .iter()
            .filter(|c| c.kind.starts_with("id-contextual-"))
            .collect();
        assert!(!contextual.is_empty());
        assert!(contextual.iter().all(|c| c.is_unique.is_some()));
        assert!(contextual.iter().any(|c| c.is_unique == Some(true)));
    }
}

#[test]
fn unique_test_id_is_picked() {
    let mut doc = Document::new();
    let body = doc.body().unwrap();
    let button = doc.append_element(body, "button", &[("data-testid", "submit-btn")]);
    doc.append_text(button, "Send");

    let result = scan(&doc, &ScanOptions::default()).unwrap();
    let record = result.elements.iter().find(|r| r.tag_name == "button").unwrap();
    let hook = &record.locators.primary[0];
    assert_eq!(hook.kind, "data-testid");
    assert_eq!(hook.confidence, 0.95);
    assert_eq!(hook.is_unique, Some(true));
    assert_eq!(pick_best(&record.locators), Some(hook));
    assert_eq!(record.confidence, 0.95);
}

#[test]
fn shadow_ids_are_never_verified_unique() {
    let doc = fixture();
    let result = scan(&doc, &ScanOptions::default()).unwrap();
    let record = result
        .elements
        .iter()
        .find(|r| r.attributes.get("id").map(String::as_str) == Some("inside"))
        .unwrap();
    assert!(record.is_shadow_dom);
    assert_eq!(record.shadow_host.as_ref().unwrap().id.as_deref(), Some("widget"));

    let id = record.locators.primary.iter().find(|c| c.kind == "id").unwrap();
    assert_ne!(id.is_unique, Some(true));
    assert!(record.locators.iter().all(|c| c.shadow_dom));
    assert!(record.locators.fallback.iter().any(|c| c.kind == "position"));

    // the closed tree was reached through its stashed slot
    assert!(result
        .elements
        .iter()
        .any(|r| r.is_shadow_dom && r.attributes.get("name").map(String::as_str) == Some("card-number")));
    assert_eq!(result.stats.shadow_elements, 3);
}

#[test]
fn large_page_scans_completely() {
    let mut doc = Document::new();
    let body = doc.body().unwrap();
    for section in 0..100 {
        let id = format!("section-{}", section);
        let div = doc.append_element(body, "div", &[("id", &id)]);
        for item in 0..99 {
            let span = doc.append_element(div, "span", &[]);
            doc.append_text(span, &format!("Item {}.{}", section, item));
        }
    }
    assert_eq!(doc.descendants(body).len(), 10_000);

    let options = ScanOptions::default();
    let result = scan(&doc, &options).unwrap();
    assert_eq!(result.stats.total_elements, included(&doc, &options).len());
    assert_eq!(result.stats.total_elements, 10_002);
    assert_eq!(result.stats.primary_elements, 100);
}

#[test]
fn flat_list_with_shared_class_scans_completely() {
    let mut doc = Document::new();
    let body = doc.body().unwrap();
    let list = doc.append_element(body, "ul", &[]);
    for i in 0..10_000 {
        let li = doc.append_element(list, "li", &[("class", "item")]);
        doc.append_text(li, &format!("Result {}", i));
    }

    let options = ScanOptions::default();
    let result = scan(&doc, &options).unwrap();
    assert_eq!(result.stats.total_elements, included(&doc, &options).len());
    assert_eq!(result.stats.total_elements, 10_003);

    // `.item` and `ul .item` repeat, the sibling position settles it
    let record = result.elements.iter().find(|r| r.text == "Result 4999").unwrap();
    let class: Vec<_> = record
        .locators
        .secondary
        .iter()
        .filter(|c| c.kind.starts_with("class"))
        .collect();
    assert_eq!(class.len(), 3);
    assert_eq!(class[0].confidence, 0.70);
    assert_eq!(class[2].selector, ".item:nth-child(5000)");
    assert_eq!(class[2].is_unique, Some(true));
    assert_eq!(class[2].uniqueness_level, UniquenessLevel::ContextualClass);
    assert_eq!(doc.query_selector_all(&class[2].selector).unwrap().len(), 1);

    let nth = record.locators.fallback.iter().find(|c| c.kind == "nth-child").unwrap();
    assert_eq!(nth.selector, "ul > li:nth-child(5000)");
    assert_eq!(nth.is_unique, Some(true));
}

#[test]
fn repeated_table_rows_walk_the_context_chain() {
    let mut doc = Document::new();
    let body = doc.body().unwrap();
    for _ in 0..100 {
        let table = doc.append_element(body, "table", &[]);
        let tbody = doc.append_element(table, "tbody", &[]);
        for _ in 0..100 {
            let tr = doc.append_element(tbody, "tr", &[]);
            let td = doc.append_element(tr, "td", &[]);
            let edit = doc.append_element(td, "a", &[("class", "edit"), ("data-testid", "edit")]);
            doc.append_text(edit, "Edit");
        }
    }

    let options = ScanOptions::default();
    let result = scan(&doc, &options).unwrap();
    assert_eq!(result.stats.total_elements, included(&doc, &options).len());
    assert_eq!(result.stats.total_elements, 30_202);

    let record = result
        .elements
        .iter()
        .find(|r| r.locators.fallback[0].selector == "/html/body/table[57]/tbody/tr[42]/td/a")
        .unwrap();
    let hook: Vec<_> = record.locators.primary.iter().collect();
    let selectors: Vec<&str> = hook.iter().map(|c| c.selector.as_str()).collect();
    assert_eq!(
        selectors,
        [
            r#"[data-testid="edit"]"#,
            r#"td [data-testid="edit"]"#,
            r#"[data-testid="edit"]:nth-child(1)"#,
            r#"table tr:nth-child(42) [data-testid="edit"]"#,
        ]
    );
    assert!(hook.iter().all(|c| c.is_unique == Some(false)));
    assert_eq!(hook[0].confidence, 0.95);
    assert!(hook[1..].iter().all(|c| c.confidence == 0.90));
    assert_eq!(record.confidence, 0.95);
}

#[test]
fn missing_selector_is_found_false() {
    let mut doc = fixture();
    let mut highlighter = Highlighter::new();
    let outcome = highlight_selector(&mut highlighter, &mut doc, ".nonexistent-class");
    assert!(outcome.success);
    assert!(!outcome.found);
    assert_eq!(outcome.count, 0);
}

// =========================================================================
// Snapshots
// =========================================================================

#[test]
fn snapshot_round_trip_scans_the_same() {
    let doc = fixture();
    let json = doc.to_snapshot().to_json(false).unwrap();
    let reloaded = Document::from_snapshot(&DocumentSnapshot::from_json(&json).unwrap());

    let before = scan(&doc, &ScanOptions::default()).unwrap();
    let after = scan(&reloaded, &ScanOptions::default()).unwrap();
    assert_eq!(before.elements, after.elements);
    assert_eq!(after.url.as_deref(), Some("https://shop.example/checkout"));
}
