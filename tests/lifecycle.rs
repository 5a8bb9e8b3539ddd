//! Integration tests for the cleanup watcher and template lifecycle

use std::cell::Cell;
use std::rc::Rc;

use weft::{html, Document, EngineConfig, Error, StateError};

#[test]
fn test_cleanup_fires_once_after_detachment() {
    let doc = Document::with_config(EngineConfig::new().with_cleanup_interval(2));
    let host = doc.create_element("div");
    doc.append_child(doc.root(), host);

    let fired = Rc::new(Cell::new(0));
    let f = fired.clone();
    let t = html!("<p>transient</p>");
    t.cleanup(move || f.set(f.get() + 1)).expect("Should register");
    t.render(&doc, host).expect("Should render");
    assert!(t.is_rendered());

    let scheduler = doc.scheduler();
    scheduler.tick();
    scheduler.tick();
    // Still attached: nothing fires.
    assert_eq!(fired.get(), 0);

    let p = doc.children(doc.root())[0];
    doc.discard(p);
    for _ in 0..4 {
        scheduler.tick();
    }
    assert_eq!(fired.get(), 1);
    // The watcher self-cancelled and the template released its nodes.
    assert!(!t.is_rendered());
    for _ in 0..4 {
        scheduler.tick();
    }
    assert_eq!(fired.get(), 1);
}

#[test]
fn test_cleanup_does_not_fire_while_attached() {
    let doc = Document::with_config(EngineConfig::new().with_cleanup_interval(1));
    let host = doc.create_element("div");
    doc.append_child(doc.root(), host);

    let fired = Rc::new(Cell::new(false));
    let f = fired.clone();
    let t = html!("<p>persistent</p>");
    t.render(&doc, host).expect("Should render");
    t.cleanup(move || f.set(true)).expect("Should register");

    for _ in 0..10 {
        doc.scheduler().tick();
    }
    assert!(!fired.get());
    assert!(t.is_rendered());
}

#[test]
fn test_second_cleanup_registration_is_illegal() {
    let t = html!("<p>x</p>");
    t.cleanup(|| {}).expect("Should register");
    let err = t.cleanup(|| {}).expect_err("Should fail");
    assert!(matches!(
        err,
        Error::State(StateError::CleanupAlreadyRegistered)
    ));
}

#[test]
fn test_cleanup_registered_before_render_arms_at_render() {
    let doc = Document::with_config(EngineConfig::new().with_cleanup_interval(1));
    let host = doc.create_element("div");
    doc.append_child(doc.root(), host);

    let fired = Rc::new(Cell::new(false));
    let f = fired.clone();
    let t = html!("<p>late</p>");
    t.cleanup(move || f.set(true)).expect("Should register");

    // No watcher activity before render.
    doc.scheduler().tick();
    assert!(!fired.get());

    t.render(&doc, host).expect("Should render");
    let p = doc.children(doc.root())[0];
    doc.discard(p);
    doc.scheduler().tick();
    doc.scheduler().tick();
    assert!(fired.get());
}

#[test]
fn test_moving_output_does_not_trigger_cleanup() {
    let doc = Document::with_config(EngineConfig::new().with_cleanup_interval(1));
    let host = doc.create_element("div");
    doc.append_child(doc.root(), host);

    let fired = Rc::new(Cell::new(false));
    let f = fired.clone();
    let t = html!("<p>mobile</p>");
    t.render(&doc, host).expect("Should render");
    t.cleanup(move || f.set(true)).expect("Should register");

    // Relocate the output to another connected parent.
    let elsewhere = doc.create_element("aside");
    doc.append_child(doc.root(), elsewhere);
    let slot = doc.create_element("span");
    doc.append_child(elsewhere, slot);
    t.mount(slot).expect("Should mount");

    for _ in 0..5 {
        doc.scheduler().tick();
    }
    assert!(!fired.get());
    assert!(t.is_rendered());
}
