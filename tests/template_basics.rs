//! Integration tests for template rendering and in-place updates

use weft::{html, Document, Error, StateError, Value};

/// A document with a connected `<div>` host, like an app mount point.
fn doc_with_host() -> (Document, weft::NodeId) {
    let doc = Document::new();
    let host = doc.create_element("div");
    doc.append_child(doc.root(), host);
    (doc, host)
}

#[test]
fn test_renders_empty_template_into_text_node() {
    let (doc, host) = doc_with_host();
    html!().render(&doc, host).expect("Should render");
    let children = doc.children(doc.root());
    assert_eq!(children.len(), 1);
    assert_eq!(doc.kind(children[0]), Some(weft::NodeKind::Text));
}

#[test]
fn test_renders_plain_text_template() {
    let (doc, host) = doc_with_host();
    html!("test").render(&doc, host).expect("Should render");
    assert_eq!(doc.html(), "test");
}

#[test]
fn test_does_not_rerender_static_templates() {
    let (doc, host) = doc_with_host();
    let t = html!("<div id=\"4711\">Content</div>");
    t.render(&doc, host).expect("Should render");
    let node = doc.children(doc.root())[0];
    assert_eq!(doc.attr(node, "id").as_deref(), Some("4711"));

    t.update().expect("Should update");
    t.update().expect("Should update");
    assert_eq!(doc.children(doc.root())[0], node);
    assert_eq!(doc.html(), r#"<div id="4711">Content</div>"#);
}

#[test]
fn test_constant_keeps_node_identity_across_updates() {
    // A constant 42 renders the text "42"; updating twice leaves the very
    // same text node in place.
    let (doc, host) = doc_with_host();
    let t = html!("<div>" {42} "</div>");
    t.render(&doc, host).expect("Should render");

    let div = doc.children(doc.root())[0];
    let text = doc.children(div)[0];
    assert_eq!(doc.text(text).as_deref(), Some("42"));

    t.update().expect("Should update");
    t.update().expect("Should update");
    assert_eq!(doc.children(div), vec![text]);
    assert_eq!(doc.text(text).as_deref(), Some("42"));
}

#[test]
fn test_unchanged_dynamic_keeps_node_identity() {
    let (doc, host) = doc_with_host();
    let t = html!("<div>" {Value::func(|| Value::from("Content"))} "</div>");
    t.render(&doc, host).expect("Should render");

    let div = doc.children(doc.root())[0];
    let text = doc.children(div)[0];

    t.update().expect("Should update");
    assert_eq!(doc.children(div), vec![text]);
}

#[test]
fn test_changed_dynamic_replaces_node() {
    let (doc, host) = doc_with_host();
    let content = std::rc::Rc::new(std::cell::RefCell::new("Content".to_string()));
    let c = content.clone();
    let t = html!("<div>" {Value::func(move || Value::from(c.borrow().clone()))} "</div>");
    t.render(&doc, host).expect("Should render");

    let div = doc.children(doc.root())[0];
    let before = doc.children(div)[0];

    *content.borrow_mut() = "Changed".to_string();
    t.update().expect("Should update");

    let after = doc.children(div)[0];
    assert_ne!(before, after);
    assert_eq!(doc.text(after).as_deref(), Some("Changed"));
    assert_eq!(doc.html(), "<div>Changed</div>");
}

#[test]
fn test_update_before_render_is_illegal() {
    let t = html!("<p>hi</p>");
    let err = t.update().expect_err("Should fail");
    assert!(matches!(
        err,
        Error::State(StateError::UpdateBeforeRender)
    ));
}

#[test]
fn test_throwing_accessor_aborts_render() {
    let (doc, host) = doc_with_host();
    let t = html!("<div>" {Value::try_func(|| Err("boom".into()))} "</div>");
    let err = t.render(&doc, host).expect_err("Should fail");
    assert!(matches!(err, Error::Directive(_)));
    assert!(!t.is_rendered());
    // The host was never taken over.
    assert_eq!(doc.children(doc.root()), vec![host]);
}

#[test]
fn test_nested_template_renders_and_updates() {
    let (doc, host) = doc_with_host();
    let count = std::rc::Rc::new(std::cell::Cell::new(0i64));
    let c = count.clone();
    let child = html!("<span>" {Value::func(move || Value::Int(c.get()))} "</span>");
    let t = html!("<div>" {child.clone()} "</div>");
    t.render(&doc, host).expect("Should render");
    assert_eq!(doc.html(), "<div><span>0</span></div>");
    assert!(child.is_rendered());

    count.set(7);
    t.update().expect("Should update");
    assert_eq!(doc.html(), "<div><span>7</span></div>");
}

#[test]
fn test_mount_moves_rendered_output() {
    let (doc, host) = doc_with_host();
    let t = html!("<p>movable</p>");
    t.render(&doc, host).expect("Should render");
    let p = doc.children(doc.root())[0];

    let second = doc.create_element("div");
    doc.append_child(doc.root(), second);
    let slot = doc.create_element("span");
    doc.append_child(second, slot);

    t.mount(slot).expect("Should mount");
    // Same node, new position.
    assert_eq!(doc.children(second), vec![p]);
    assert_eq!(doc.html(), "<div><p>movable</p></div>");
}

#[test]
fn test_mount_before_render_is_illegal() {
    let (_doc, host) = doc_with_host();
    let t = html!("<p>hi</p>");
    let err = t.mount(host).expect_err("Should fail");
    assert!(matches!(err, Error::State(StateError::MountBeforeRender)));
}

#[test]
fn test_deferred_updates_coalesce() {
    let (doc, host) = doc_with_host();
    let hits = std::rc::Rc::new(std::cell::Cell::new(0));
    let h = hits.clone();
    let t = html!("<div>" {Value::func(move || {
        h.set(h.get() + 1);
        Value::from("x")
    })} "</div>");
    t.render(&doc, host).expect("Should render");
    assert_eq!(hits.get(), 1);

    // Many requests within one tick collapse into a single pass.
    let scheduler = doc.scheduler();
    for _ in 0..4 {
        let t = t.clone();
        let id = weft::MarkerId::from("coalesce-test");
        scheduler.request(id, move || {
            t.update().expect("Should update");
        });
    }
    scheduler.run_until_idle();
    assert_eq!(hits.get(), 2);
}

#[test]
fn test_reentrant_update_is_deferred_not_nested() {
    let (doc, host) = doc_with_host();

    // An accessor that re-enters its own template's update mid-sweep. The
    // nested call must not run inline; it lands on the scheduler once.
    let calls = std::rc::Rc::new(std::cell::Cell::new(0));
    let me: std::rc::Rc<std::cell::RefCell<Option<weft::Template>>> = std::rc::Rc::default();

    let c = calls.clone();
    let m = me.clone();
    let t = html!("<p>" {Value::func(move || {
        c.set(c.get() + 1);
        if c.get() == 2 {
            // First update pass: trigger a nested update.
            if let Some(t) = m.borrow().as_ref() {
                t.update().expect("Nested update should defer, not fail");
            }
        }
        Value::from("ok")
    })} "</p>");
    *me.borrow_mut() = Some(t.clone());

    t.render(&doc, host).expect("Should render");
    assert_eq!(calls.get(), 1);

    t.update().expect("Should update");
    // The nested call was deferred, not run inline.
    assert_eq!(calls.get(), 2);
    assert_eq!(doc.scheduler().pending(), 1);

    doc.scheduler().run_until_idle();
    assert_eq!(calls.get(), 3);
    assert_eq!(doc.html(), "<p>ok</p>");
}
