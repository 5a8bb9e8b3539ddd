//! Serialized-tree snapshots for representative scenes.
//!
//! The default document uses the deterministic counter ID source, so the
//! marker comments in the output are stable.

use weft::{html, Document, Value};

#[test]
fn test_snapshot_list_scene() {
    let doc = Document::new();
    let host = doc.create_element("div");
    doc.append_child(doc.root(), host);

    let t = html!(
        "<section class=\"panel\"><h1>inventory</h1>"
        "<ul>" {Value::from(vec![1i64, 2, 3])} "</ul></section>"
    );
    t.render(&doc, host).expect("Should render");

    insta::assert_snapshot!(
        doc.html(),
        @r#"<section class="panel"><h1>inventory</h1><ul><!--wf:d1-->123</ul></section>"#
    );

    // Updating a fixed list keeps the serialized output identical.
    t.update().expect("Should update");
    insta::assert_snapshot!(
        doc.html(),
        @r#"<section class="panel"><h1>inventory</h1><ul><!--wf:d1-->123</ul></section>"#
    );
}

#[test]
fn test_snapshot_attribute_scene() {
    let doc = Document::new();
    let host = doc.create_element("div");
    doc.append_child(doc.root(), host);

    let width = Value::func(|| Value::Int(320));
    let t = html!(
        "<figure><img width=\"" {width} "\" src=\"cat.png\"/>"
        "<figcaption>cat</figcaption></figure>"
    );
    t.render(&doc, host).expect("Should render");

    insta::assert_snapshot!(
        doc.html(),
        @r#"<figure><img src="cat.png" width="320"/><figcaption>cat</figcaption></figure>"#
    );
}
