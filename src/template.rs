//! Template orchestration: first render, in-place updates, mounting and
//! cleanup.
//!
//! A template captures its static text parts and substitutions at
//! construction; each substitution is classified into a directive exactly
//! once. `render` builds one markup string with a marker per directive,
//! parses it, materializes the nodes in a detached fragment, binds every
//! marker to its directive, and only then swaps the finished fragment in
//! over the host node. `update` never re-parses: it walks the bound
//! directives and lets each one re-apply itself.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt::Write as _;
use std::rc::Rc;

use tracing::{debug, trace};

use crate::directive::{classify, Directive, DirectiveKind, Position};
use crate::dom::{Document, NodeId};
use crate::error::{Error, Result, StateError, SyntaxError};
use crate::id::{IdSource, MarkerId};
use crate::markup::{self, Attribute, MarkupNode};
use crate::schedule::report_deferred;
use crate::value::{Key, Value};

const TOKEN_START: &str = "<!--wf:";
const TOKEN_END: &str = "-->";
const COMMENT_PREFIX: &str = "wf:";
const ATTR_PREFIX: &str = "wf-";

/// A top-level output position: either a static node or a directive slot
/// whose materialized range may change across updates.
enum TopPiece {
    Node(NodeId),
    Slot(usize),
}

struct CleanupReg {
    handler: Option<Box<dyn FnOnce()>>,
    watching: bool,
}

struct TemplateInner {
    parts: Vec<String>,
    directives: Vec<Directive>,
    /// Rendered state: the top-level output pieces, or `None` pre-render
    tops: Option<Vec<TopPiece>>,
    doc: Option<Document>,
    list_key: Option<Key>,
    cleanup: Option<CleanupReg>,
    template_id: Option<MarkerId>,
    updating: bool,
}

/// A renderable template: static markup interleaved with dynamic slots.
///
/// Cheaply clonable shared handle; clones refer to the same template.
#[derive(Clone)]
pub struct Template {
    inner: Rc<RefCell<TemplateInner>>,
}

impl Template {
    /// Capture text parts and substitutions. `parts` must have one more
    /// entry than `substitutions`; missing tail parts are treated as empty.
    pub fn new(parts: Vec<String>, substitutions: Vec<Value>) -> Self {
        let mut parts = parts;
        if !parts.is_empty() {
            while parts.len() < substitutions.len() + 1 {
                parts.push(String::new());
            }
        }
        let directives = substitutions.into_iter().map(classify).collect();
        Template {
            inner: Rc::new(RefCell::new(TemplateInner {
                parts,
                directives,
                tops: None,
                doc: None,
                list_key: None,
                cleanup: None,
                template_id: None,
                updating: false,
            })),
        }
    }

    /// Set the placement key used when this template is a keyed list item.
    pub fn key(self, key: impl Into<Key>) -> Self {
        self.inner.borrow_mut().list_key = Some(key.into());
        self
    }

    pub fn list_key(&self) -> Option<Key> {
        self.inner.borrow().list_key.clone()
    }

    pub fn is_rendered(&self) -> bool {
        self.inner.borrow().tops.is_some()
    }

    /// Whether two handles refer to the same template
    pub fn ptr_eq(&self, other: &Template) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// Render into `doc`, taking over `host`'s position in the tree.
    ///
    /// On success the template is *rendered* and may be updated. Parse and
    /// bind failures abort the whole call and leave the template
    /// unrendered; so does a directive evaluation failure, though in dev
    /// mode sibling directives are still rendered best-effort and the
    /// failed slot gets an inline placeholder.
    pub fn render(&self, doc: &Document, host: NodeId) -> Result<()> {
        let (markup, mut directives) = {
            let mut inner = self.inner.borrow_mut();
            if inner.parts.is_empty() {
                return Ok(());
            }
            if inner.template_id.is_none() {
                inner.template_id = Some(doc.ids().next_id());
            }
            let mut directives = std::mem::take(&mut inner.directives);
            let markup = build_markup(&inner.parts, &mut directives, doc.ids());
            inner.updating = true;
            (markup, directives)
        };

        let outcome = render_into(doc, &markup, &mut directives, host);

        let mut inner = self.inner.borrow_mut();
        inner.directives = directives;
        inner.updating = false;
        match outcome {
            Ok(tops) => {
                debug!(
                    template = %inner.template_id.as_ref().map(|i| i.to_string()).unwrap_or_default(),
                    pieces = tops.len(),
                    "template rendered"
                );
                inner.doc = Some(doc.clone());
                inner.tops = Some(tops);
                let needs_watch = inner.cleanup.as_ref().is_some_and(|c| !c.watching);
                drop(inner);
                if needs_watch {
                    self.watch();
                }
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    /// Re-apply every bound directive in place. Requires a prior
    /// successful render. A directive failure aborts the remaining sweep.
    ///
    /// Calling `update` on a template that is already mid-update (a
    /// directive side effect re-entering) is not run nested: it is
    /// coalesced into a single deferred pass on the scheduler.
    pub fn update(&self) -> Result<()> {
        let (doc, mut directives) = {
            let mut inner = self.inner.borrow_mut();
            if inner.tops.is_none() {
                return Err(StateError::UpdateBeforeRender.into());
            }
            let Some(doc) = inner.doc.clone() else {
                return Err(StateError::UpdateBeforeRender.into());
            };
            if inner.updating {
                if let Some(id) = inner.template_id.clone() {
                    trace!(template = %id, "nested update deferred");
                    let template = self.clone();
                    doc.scheduler()
                        .request(id, move || report_deferred(template.update()));
                }
                return Ok(());
            }
            inner.updating = true;
            (doc, std::mem::take(&mut inner.directives))
        };

        let mut result = Ok(());
        for directive in directives.iter_mut() {
            if let Err(err) = directive.update(&doc) {
                result = Err(err);
                break;
            }
        }

        let mut inner = self.inner.borrow_mut();
        inner.directives = directives;
        inner.updating = false;
        result
    }

    /// Move an already-rendered template's output to replace `host`.
    pub fn mount(&self, host: NodeId) -> Result<()> {
        let (doc, tops) = {
            let inner = self.inner.borrow();
            if inner.tops.is_none() {
                return Err(StateError::MountBeforeRender.into());
            }
            let Some(doc) = inner.doc.clone() else {
                return Err(StateError::MountBeforeRender.into());
            };
            (doc, expand_tops(&inner))
        };
        doc.replace_with_many(host, &tops);
        if !tops.contains(&host) {
            doc.discard(host);
        }
        Ok(())
    }

    /// Register a handler to run once all of this template's output has
    /// left the live tree. At most one handler per template.
    pub fn cleanup(&self, handler: impl FnOnce() + 'static) -> Result<()> {
        {
            let mut inner = self.inner.borrow_mut();
            if inner.cleanup.is_some() {
                return Err(StateError::CleanupAlreadyRegistered.into());
            }
            inner.cleanup = Some(CleanupReg {
                handler: Some(Box::new(handler)),
                watching: false,
            });
            if inner.tops.is_none() {
                return Ok(());
            }
        }
        self.watch();
        Ok(())
    }

    /// The template's current top-level output nodes, list children
    /// included.
    pub(crate) fn current_tops(&self) -> Vec<NodeId> {
        let inner = self.inner.borrow();
        if inner.tops.is_none() {
            return Vec::new();
        }
        expand_tops(&inner)
    }

    fn watch(&self) {
        let doc = {
            let mut inner = self.inner.borrow_mut();
            let Some(doc) = inner.doc.clone() else { return };
            let Some(reg) = inner.cleanup.as_mut() else {
                return;
            };
            if reg.watching {
                return;
            }
            reg.watching = true;
            doc
        };

        let template = self.clone();
        let watched = doc.clone();
        // Force a check on the first firing, then only after tree changes.
        let mut last_revision = u64::MAX;
        doc.scheduler()
            .every(doc.config().cleanup_interval, move || {
                let revision = watched.revision();
                if revision == last_revision {
                    return true;
                }
                last_revision = revision;
                if template.all_detached() {
                    template.fire_cleanup();
                    false
                } else {
                    true
                }
            });
    }

    fn all_detached(&self) -> bool {
        let inner = self.inner.borrow();
        let Some(doc) = &inner.doc else { return false };
        if inner.tops.is_none() {
            return false;
        }
        let tops = expand_tops(&inner);
        !tops.is_empty() && tops.iter().all(|n| !doc.is_connected(*n))
    }

    fn fire_cleanup(&self) {
        let handler = {
            let mut inner = self.inner.borrow_mut();
            // Release the rendered node set.
            inner.tops = None;
            inner.cleanup.as_mut().and_then(|reg| reg.handler.take())
        };
        if let Some(handler) = handler {
            handler();
        }
    }
}

impl std::fmt::Debug for Template {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("Template")
            .field("parts", &inner.parts.len())
            .field("directives", &inner.directives.len())
            .field("rendered", &inner.tops.is_some())
            .finish()
    }
}

fn expand_tops(inner: &TemplateInner) -> Vec<NodeId> {
    let mut out = Vec::new();
    for piece in inner.tops.iter().flatten() {
        match piece {
            TopPiece::Node(node) => out.push(*node),
            // The slot can be vacant mid-update, while the directives are
            // checked out of the template.
            TopPiece::Slot(slot) => {
                if let Some(directive) = inner.directives.get(*slot) {
                    out.extend(directive.full_range());
                }
            }
        }
    }
    out
}

/// Concatenate text parts with each directive's marker encoding.
fn build_markup(parts: &[String], directives: &mut [Directive], ids: &dyn IdSource) -> String {
    let mut out = String::new();
    out.push_str(parts.first().map(String::as_str).unwrap_or(""));
    for (i, directive) in directives.iter_mut().enumerate() {
        let id = directive.ensure_id(ids);
        match encoding_position(directive) {
            Position::Element => {
                let _ = write!(out, "{}{}{}", TOKEN_START, id, TOKEN_END);
            }
            Position::Attribute => {
                let _ = write!(out, "{}{}", ATTR_PREFIX, id);
            }
        }
        out.push_str(parts.get(i + 1).map(String::as_str).unwrap_or(""));
    }
    out.trim().to_string()
}

/// How a directive encodes into markup. Attribute setters re-encode as
/// their wrapped token so a re-render binds them the same way.
fn encoding_position(directive: &Directive) -> Position {
    match &directive.kind {
        DirectiveKind::Event { .. } | DirectiveKind::Ref(_) => Position::Attribute,
        _ => Position::Element,
    }
}

/// A marker occurrence found while materializing parsed markup
enum RawBinding {
    /// Comment marker at element position
    Marker { node: NodeId, id: String },
    /// Reserved attribute name (event/ref directives)
    AttrDirective { element: NodeId, id: String },
    /// Token embedded in an attribute value
    AttrValue {
        element: NodeId,
        name: String,
        prefix: String,
        suffix: String,
        id: String,
    },
}

impl RawBinding {
    fn id(&self) -> &str {
        match self {
            RawBinding::Marker { id, .. } => id,
            RawBinding::AttrDirective { id, .. } => id,
            RawBinding::AttrValue { id, .. } => id,
        }
    }
}

/// Parse, materialize, bind and attach. Returns the top-level pieces.
fn render_into(
    doc: &Document,
    markup: &str,
    directives: &mut [Directive],
    host: NodeId,
) -> std::result::Result<Vec<TopPiece>, Error> {
    let ast = markup::parse(markup).map_err(Error::Syntax)?;

    // Materialize into a detached fragment, collecting marker bindings.
    let fragment = doc.create_element("#fragment");
    let mut bindings: Vec<RawBinding> = Vec::new();
    for node in &ast {
        if let Err(err) = build_node(doc, fragment, node, &mut bindings) {
            doc.discard(fragment);
            return Err(err.into());
        }
    }

    // Resolve every marker to its directive by ID.
    let by_id: HashMap<String, usize> = directives
        .iter()
        .enumerate()
        .filter_map(|(i, d)| d.id().map(|id| (id.to_string(), i)))
        .collect();
    let mut resolved: Vec<(usize, RawBinding)> = Vec::with_capacity(bindings.len());
    for binding in bindings {
        match by_id.get(binding.id()) {
            Some(&slot) => resolved.push((slot, binding)),
            None => {
                let id = binding.id().to_string();
                doc.discard(fragment);
                return Err(SyntaxError::UnresolvedMarker { id }.into());
            }
        }
    }

    // Record the top-level pieces before binding mutates the fragment.
    let marker_slots: HashMap<NodeId, usize> = resolved
        .iter()
        .filter_map(|(slot, b)| match b {
            RawBinding::Marker { node, .. } => Some((*node, *slot)),
            _ => None,
        })
        .collect();
    let tops: Vec<TopPiece> = doc
        .children(fragment)
        .into_iter()
        .map(|child| match marker_slots.get(&child) {
            Some(&slot) => TopPiece::Slot(slot),
            None => TopPiece::Node(child),
        })
        .collect();

    // Every directive must be matched by some marker.
    let mut consumed = vec![false; directives.len()];
    for (slot, _) in &resolved {
        consumed[*slot] = true;
    }
    if let Some(missing) = consumed.iter().position(|c| !c) {
        let err = SyntaxError::UnmatchedDirective {
            id: directives[missing]
                .id()
                .map(|i| i.to_string())
                .unwrap_or_else(|| "?".to_string()),
            kind: directives[missing].kind_name().to_string(),
        };
        doc.discard(fragment);
        return Err(err.into());
    }

    // Bind: render each directive at its marker, still inside the fragment.
    let mut first_err: Option<Error> = None;
    for (slot, binding) in resolved {
        let step = bind_one(doc, directives, slot, &binding);
        if let Err(err) = step {
            if !doc.dev() {
                doc.discard(fragment);
                return Err(err);
            }
            // Dev mode: leave a diagnostic placeholder, keep going so
            // sibling directives still render.
            if let RawBinding::Marker { node, .. } = &binding {
                let placeholder = doc.create_text(&format!("\u{26a0} {}", err));
                doc.replace_with(*node, placeholder);
            }
            if first_err.is_none() {
                first_err = Some(err);
            }
        }
    }

    // Swap the finished content in over the host.
    let top_nodes: Vec<NodeId> = tops
        .iter()
        .flat_map(|piece| match piece {
            TopPiece::Node(node) => vec![*node],
            TopPiece::Slot(slot) => directives[*slot].full_range(),
        })
        .collect();
    let top_nodes = if top_nodes.is_empty() {
        // Own at least one node so mount and cleanup have a subject.
        vec![doc.create_text("")]
    } else {
        top_nodes
    };
    doc.replace_with_many(host, &top_nodes);
    if !top_nodes.contains(&host) {
        doc.discard(host);
    }
    doc.discard(fragment);

    match first_err {
        Some(err) => Err(err),
        None => {
            if tops.is_empty() {
                Ok(vec![TopPiece::Node(top_nodes[0])])
            } else {
                Ok(tops)
            }
        }
    }
}

fn bind_one(
    doc: &Document,
    directives: &mut [Directive],
    slot: usize,
    binding: &RawBinding,
) -> std::result::Result<(), Error> {
    match binding {
        RawBinding::Marker { node, .. } => {
            let range = directives[slot].render(doc, *node)?;
            if !range.contains(node) {
                doc.discard(*node);
            }
        }
        RawBinding::AttrDirective { element, id } => {
            doc.remove_attr(*element, &format!("{}{}", ATTR_PREFIX, id));
            directives[slot].render(doc, *element)?;
        }
        RawBinding::AttrValue {
            element,
            name,
            prefix,
            suffix,
            ..
        } => {
            // Wrap the bound directive in its attribute setter, unless a
            // previous render already did.
            if !matches!(directives[slot].kind, DirectiveKind::Attribute(_)) {
                let inner = std::mem::replace(&mut directives[slot], classify(Value::Null));
                directives[slot] = Directive::wrap_attribute(
                    name.clone(),
                    prefix.clone(),
                    suffix.clone(),
                    inner,
                );
            }
            directives[slot].render(doc, *element)?;
        }
    }
    Ok(())
}

/// Materialize one parsed node under `parent`, recording marker bindings.
fn build_node(
    doc: &Document,
    parent: NodeId,
    node: &MarkupNode,
    bindings: &mut Vec<RawBinding>,
) -> std::result::Result<(), SyntaxError> {
    match node {
        MarkupNode::Text(text) => {
            let n = doc.create_text(text);
            doc.append_child(parent, n);
        }
        MarkupNode::Comment(text) => {
            let n = doc.create_comment(text);
            doc.append_child(parent, n);
            if let Some(id) = text.strip_prefix(COMMENT_PREFIX) {
                bindings.push(RawBinding::Marker {
                    node: n,
                    id: id.to_string(),
                });
            }
        }
        MarkupNode::Element {
            tag,
            attrs,
            children,
        } => {
            let element = doc.create_element(tag);
            doc.append_child(parent, element);
            for Attribute { name, value } in attrs {
                match value {
                    None => match name.strip_prefix(ATTR_PREFIX) {
                        Some(id) => bindings.push(RawBinding::AttrDirective {
                            element,
                            id: id.to_string(),
                        }),
                        None => doc.set_attr(element, name, ""),
                    },
                    Some(value) => match split_attr_token(value) {
                        Some((prefix, id, suffix)) => {
                            if suffix.contains(TOKEN_START) {
                                return Err(SyntaxError::MultiTokenAttribute {
                                    name: name.clone(),
                                });
                            }
                            bindings.push(RawBinding::AttrValue {
                                element,
                                name: name.clone(),
                                prefix,
                                suffix,
                                id,
                            });
                        }
                        None => doc.set_attr(element, name, value),
                    },
                }
            }
            for child in children {
                build_node(doc, element, child, bindings)?;
            }
        }
    }
    Ok(())
}

/// Split an attribute value around an embedded marker token.
fn split_attr_token(value: &str) -> Option<(String, String, String)> {
    let start = value.find(TOKEN_START)?;
    let rest = &value[start + TOKEN_START.len()..];
    let end = rest.find(TOKEN_END)?;
    Some((
        value[..start].to_string(),
        rest[..end].to_string(),
        rest[end + TOKEN_END.len()..].to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_attr_token() {
        let (prefix, id, suffix) = split_attr_token("item <!--wf:d4--> end").unwrap();
        assert_eq!(prefix, "item ");
        assert_eq!(id, "d4");
        assert_eq!(suffix, " end");
        assert_eq!(split_attr_token("plain"), None);
    }

    #[test]
    fn test_build_markup_interleaves_markers() {
        let ids = crate::id::CounterIds::new();
        let mut directives = vec![classify(Value::Int(1)), classify(Value::Int(2))];
        let markup = build_markup(
            &[
                "<div>".to_string(),
                "-".to_string(),
                "</div>".to_string(),
            ],
            &mut directives,
            &ids,
        );
        assert_eq!(markup, "<div><!--wf:d0-->-<!--wf:d1--></div>");
    }
}
