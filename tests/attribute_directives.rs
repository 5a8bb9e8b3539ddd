//! Integration tests for attribute-position directives

use std::cell::Cell;
use std::rc::Rc;

use weft::{html, node_ref, on, Document, EngineConfig, Error, NodeId, Value};

fn doc_with_host(config: EngineConfig) -> (Document, NodeId) {
    let doc = Document::with_config(config);
    let host = doc.create_element("div");
    doc.append_child(doc.root(), host);
    (doc, host)
}

#[test]
fn test_event_directive_attaches_listener() {
    let (doc, host) = doc_with_host(EngineConfig::default());
    let clicked = Rc::new(Cell::new(false));
    let c = clicked.clone();
    html!("<button " {on("click", move || c.set(true))} ">OK</button>")
        .render(&doc, host)
        .expect("Should render");

    let button = doc.children(doc.root())[0];
    assert_eq!(doc.tag(button).as_deref(), Some("button"));
    // The reserved marker attribute is gone after binding.
    assert_eq!(doc.serialize(button), "<button>OK</button>");

    doc.dispatch(button, "click");
    assert!(clicked.get());
}

#[test]
fn test_multiple_event_directives_on_one_element() {
    let (doc, host) = doc_with_host(EngineConfig::default());
    let clicked = Rc::new(Cell::new(false));
    let focused = Rc::new(Cell::new(false));
    let c = clicked.clone();
    let f = focused.clone();
    html!(
        "<button " {on("click", move || c.set(true))} " " {on("focus", move || f.set(true))}
        ">OK</button>"
    )
    .render(&doc, host)
    .expect("Should render");

    let button = doc.children(doc.root())[0];
    doc.dispatch(button, "click");
    assert!(clicked.get());
    assert!(!focused.get());
    doc.dispatch(button, "focus");
    assert!(focused.get());
}

#[test]
fn test_ref_directive_hands_over_element() {
    let (doc, host) = doc_with_host(EngineConfig::default());
    let seen: Rc<Cell<Option<NodeId>>> = Rc::new(Cell::new(None));
    let s = seen.clone();
    let t = html!("<input " {node_ref(move |n| s.set(Some(n)))} " type=\"text\"/>");
    t.render(&doc, host).expect("Should render");

    let input = doc.children(doc.root())[0];
    assert_eq!(seen.get(), Some(input));

    // The side effect happens exactly once; updates do not re-fire it.
    seen.set(None);
    t.update().expect("Should update");
    assert_eq!(seen.get(), None);
}

#[test]
fn test_attribute_setter_binds_value() {
    let (doc, host) = doc_with_host(EngineConfig::default());
    let width = Rc::new(Cell::new(100i64));
    let w = width.clone();
    let t = html!("<img width=\"" {Value::func(move || Value::Int(w.get()))} "\"/>");
    t.render(&doc, host).expect("Should render");

    let img = doc.children(doc.root())[0];
    assert_eq!(doc.attr(img, "width").as_deref(), Some("100"));

    width.set(150);
    t.update().expect("Should update");
    assert_eq!(doc.attr(img, "width").as_deref(), Some("150"));
    // The element itself was never replaced.
    assert_eq!(doc.children(doc.root())[0], img);
}

#[test]
fn test_attribute_setter_keeps_static_text_around_token() {
    let (doc, host) = doc_with_host(EngineConfig::default());
    let t = html!("<div class=\"card " {Value::func(|| Value::from("wide"))} " rounded\"/>");
    t.render(&doc, host).expect("Should render");
    let div = doc.children(doc.root())[0];
    assert_eq!(doc.attr(div, "class").as_deref(), Some("card wide rounded"));
}

#[test]
fn test_throwing_attribute_value_names_the_attribute() {
    let (doc, host) = doc_with_host(EngineConfig::default());
    let t = html!("<div title=\"" {Value::try_func(|| Err("nope".into()))} "\"/>");
    let err = t.render(&doc, host).expect_err("Should fail");
    let message = err.to_string();
    assert!(message.contains("title"), "{message}");
    assert!(matches!(err, Error::Directive(_)));
    assert!(!t.is_rendered());
    // Nothing was committed to the tree.
    assert_eq!(doc.children(doc.root()), vec![host]);
}

#[test]
fn test_dev_mode_marks_failed_attribute_and_keeps_siblings() {
    let (doc, host) = doc_with_host(EngineConfig::new().with_dev(true));
    let t = html!(
        "<section><div title=\"" {Value::try_func(|| Err("nope".into()))}
        "\"/><p>" {Value::from("alive")} "</p></section>"
    );
    let err = t.render(&doc, host).expect_err("Should still fail");
    assert!(matches!(err, Error::Directive(_)));

    // Best-effort output: the placeholder attribute is visible and the
    // sibling directive rendered anyway.
    let html = doc.html();
    assert!(html.contains('\u{26a0}'), "{html}");
    assert!(html.contains("alive"), "{html}");
}

#[test]
fn test_structured_value_in_attribute_is_an_error() {
    let (doc, host) = doc_with_host(EngineConfig::default());
    let t = html!("<div data-x=\"" {Value::func(|| Value::from(vec![1i64]))} "\"/>");
    let err = t.render(&doc, host).expect_err("Should fail");
    assert!(err.to_string().contains("data-x"), "{err}");
}
