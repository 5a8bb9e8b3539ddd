//! Directive runtime: classification, dirty tracking, and the directive
//! variants that render and update dynamic template slots.
//!
//! Every substitution value is classified exactly once into a closed set of
//! behaviors. A directive is one flat capability-tagged record — identity,
//! key, dirty flag, and its kind — rather than a subclass tree; dispatch is
//! a single match on [`DirectiveKind`].

pub mod attribute;
pub mod list;

use std::rc::Rc;

use attribute::AttributeState;
use list::ListState;

use crate::dom::{Document, NodeId};
use crate::error::{DirectiveError, Error};
use crate::id::{IdSource, MarkerId};
use crate::template::Template;
use crate::value::{Accessor, Key, Value};

/// Where a directive binds in parsed markup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Position {
    Element,
    Attribute,
}

/// One dynamic slot's rendering/update behavior
pub struct Directive {
    id: Option<MarkerId>,
    key: Option<Key>,
    dirty: bool,
    /// Top-level nodes produced by the last render
    range: Vec<NodeId>,
    pub(crate) kind: DirectiveKind,
}

pub(crate) enum DirectiveKind {
    /// Fixed primitive value; materializes once
    Constant(Value),
    /// Function-backed slot, reclassified on change
    Dynamic(DynamicState),
    /// Keyed sequence, reconciled in place
    List(ListState),
    /// One named attribute bound to a wrapped directive's value
    Attribute(AttributeState),
    /// Listener attachment, applied once
    Event {
        name: Rc<str>,
        handler: Rc<dyn Fn()>,
    },
    /// Element handoff, applied once
    Ref(Rc<dyn Fn(NodeId)>),
    /// A child template acting as a directive
    Nested(Template),
}

/// Classify a substitution value into its directive.
pub fn classify(value: Value) -> Directive {
    let kind = match value {
        Value::Template(t) => DirectiveKind::Nested(t),
        Value::List(items) => DirectiveKind::List(ListState::new(items)),
        Value::Func(f) => DirectiveKind::Dynamic(DynamicState::new(f)),
        Value::Event { name, handler } => DirectiveKind::Event { name, handler },
        Value::NodeRef(f) => DirectiveKind::Ref(f),
        primitive => DirectiveKind::Constant(primitive),
    };
    Directive {
        id: None,
        key: None,
        dirty: true,
        range: Vec::new(),
        kind,
    }
}

impl Directive {
    /// Stable identity, assigned once on first use.
    pub fn id(&self) -> Option<&MarkerId> {
        self.id.as_ref()
    }

    pub(crate) fn ensure_id(&mut self, ids: &dyn IdSource) -> MarkerId {
        if let Some(id) = &self.id {
            return id.clone();
        }
        let id = ids.next_id();
        self.id = Some(id.clone());
        id
    }

    fn id_label(&self) -> String {
        match &self.id {
            Some(id) => id.to_string(),
            None => "?".to_string(),
        }
    }

    /// Explicit identity for list matching, if any. Falls back to the
    /// wrapped template's placement key for nested templates.
    pub fn key(&self) -> Option<Key> {
        if let Some(key) = &self.key {
            return Some(key.clone());
        }
        if let DirectiveKind::Nested(t) = &self.kind {
            return t.list_key();
        }
        None
    }

    /// The key used for list matching: the explicit key, or the
    /// directive's own generated identity.
    pub(crate) fn identity_key(&mut self, ids: &dyn IdSource) -> Key {
        match self.key() {
            Some(key) => key,
            None => Key::from(self.ensure_id(ids)),
        }
    }

    /// Whether the computed value has changed since last materialization
    pub fn dirty(&self) -> bool {
        self.dirty
    }

    pub(crate) fn kind_name(&self) -> &'static str {
        match &self.kind {
            DirectiveKind::Constant(_) => "constant",
            DirectiveKind::Dynamic(_) => "dynamic",
            DirectiveKind::List(_) => "list",
            DirectiveKind::Attribute(_) => "attribute",
            DirectiveKind::Event { .. } => "event",
            DirectiveKind::Ref(_) => "ref",
            DirectiveKind::Nested(_) => "template",
        }
    }

    pub(crate) fn position(&self) -> Position {
        match &self.kind {
            DirectiveKind::Attribute(_) | DirectiveKind::Event { .. } | DirectiveKind::Ref(_) => {
                Position::Attribute
            }
            _ => Position::Element,
        }
    }

    /// Compute the directive's current semantic value.
    pub fn value(&self) -> Result<Value, DirectiveError> {
        match &self.kind {
            DirectiveKind::Constant(v) => Ok(v.clone()),
            DirectiveKind::Dynamic(state) => {
                (state.accessor)().map_err(|e| DirectiveError::accessor(self.id_label(), e))
            }
            DirectiveKind::List(state) => Ok(Value::List(state.items())),
            DirectiveKind::Attribute(state) => state.inner.value(),
            DirectiveKind::Nested(t) => Ok(Value::Template(t.clone())),
            DirectiveKind::Event { .. } | DirectiveKind::Ref(_) => Ok(Value::Null),
        }
    }

    /// Materialize into the tree at `host` and return the owned top-level
    /// node range. Element-position directives replace `host`;
    /// attribute-position directives act on it and leave it in place.
    pub fn render(&mut self, doc: &Document, host: NodeId) -> Result<Vec<NodeId>, Error> {
        if matches!(self.kind, DirectiveKind::List(_)) && self.id.is_none() {
            // The anchor comment carries the list's identity.
            self.ensure_id(doc.ids());
        }
        let label = self.id_label();
        let range = match &mut self.kind {
            DirectiveKind::Constant(v) => {
                let text = doc.create_text(&v.display_string().unwrap_or_default());
                doc.replace_with(host, text);
                vec![text]
            }
            DirectiveKind::Dynamic(state) => state.render(doc, host, &label)?,
            DirectiveKind::List(state) => state.render(doc, host, &format!("wf:{}", label))?,
            DirectiveKind::Attribute(state) => state.render(doc, host)?,
            DirectiveKind::Event { name, handler } => {
                doc.add_listener(host, name, handler.clone());
                vec![host]
            }
            DirectiveKind::Ref(f) => {
                f(host);
                vec![host]
            }
            DirectiveKind::Nested(t) => {
                if t.is_rendered() {
                    t.mount(host)?;
                } else {
                    t.render(doc, host)?;
                }
                let tops = t.current_tops();
                if tops.is_empty() {
                    // The child produced no output; own a placeholder so
                    // the slot keeps a position in the tree.
                    let placeholder = doc.create_text("");
                    doc.replace_with(host, placeholder);
                    vec![placeholder]
                } else {
                    tops
                }
            }
        };
        self.dirty = false;
        self.range = range.clone();
        Ok(range)
    }

    /// Re-apply in place. No re-parse, no re-materialization of static
    /// structure.
    pub fn update(&mut self, doc: &Document) -> Result<(), Error> {
        let label = self.id_label();
        match &mut self.kind {
            // Identity-stable variants: nothing to re-apply.
            DirectiveKind::Constant(_) | DirectiveKind::Event { .. } | DirectiveKind::Ref(_) => {}
            DirectiveKind::Dynamic(state) => state.update(doc, &label)?,
            DirectiveKind::List(state) => state.update(doc)?,
            DirectiveKind::Attribute(state) => state.update(doc)?,
            DirectiveKind::Nested(t) => t.update()?,
        }
        self.dirty = false;
        Ok(())
    }

    /// Every node currently materialized for this directive, in tree
    /// order. Unlike the render-returned range this includes keyed list
    /// children, which churn across updates.
    pub(crate) fn full_range(&self) -> Vec<NodeId> {
        match &self.kind {
            DirectiveKind::List(state) => state.full_range(),
            DirectiveKind::Dynamic(state) => state.full_range(),
            DirectiveKind::Nested(t) => {
                let tops = t.current_tops();
                if tops.is_empty() {
                    self.range.clone()
                } else {
                    tops
                }
            }
            _ => self.range.clone(),
        }
    }

    /// Release owned nodes beyond the render-returned range. The caller
    /// remains responsible for the returned range itself.
    pub(crate) fn dispose(&mut self, doc: &Document) {
        match &mut self.kind {
            DirectiveKind::List(state) => state.dispose(doc),
            DirectiveKind::Dynamic(state) => {
                if let Some(inner) = &mut state.inner {
                    inner.dispose(doc);
                }
            }
            _ => {}
        }
    }

    /// Wrap a directive bound inside an attribute value into its setter.
    /// The wrapper takes over the marker identity.
    pub(crate) fn wrap_attribute(name: String, prefix: String, suffix: String, inner: Directive) -> Directive {
        Directive {
            id: inner.id.clone(),
            key: None,
            dirty: true,
            range: Vec::new(),
            kind: DirectiveKind::Attribute(AttributeState::new(name, prefix, suffix, inner)),
        }
    }
}

/// State of a function-backed slot
pub(crate) struct DynamicState {
    accessor: Accessor,
    inner: Option<Box<Directive>>,
    rendered: Vec<NodeId>,
    last: Option<Value>,
}

impl DynamicState {
    pub(crate) fn new(accessor: Accessor) -> Self {
        Self {
            accessor,
            inner: None,
            rendered: Vec::new(),
            last: None,
        }
    }

    fn eval(&self, label: &str) -> Result<Value, Error> {
        (self.accessor)()
            .map_err(|e| DirectiveError::accessor(label, e).into())
    }

    fn render(&mut self, doc: &Document, host: NodeId, label: &str) -> Result<Vec<NodeId>, Error> {
        let v = self.eval(label)?;
        self.last = Some(v.clone());
        self.render_value(doc, host, v)
    }

    fn render_value(&mut self, doc: &Document, host: NodeId, v: Value) -> Result<Vec<NodeId>, Error> {
        let mut inner = classify(v);
        let range = inner.render(doc, host)?;
        self.inner = Some(Box::new(inner));
        self.rendered = range.clone();
        Ok(range)
    }

    fn update(&mut self, doc: &Document, label: &str) -> Result<(), Error> {
        let v = self.eval(label)?;

        // Fast path: same value as last time, only propagate the update.
        if let Some(last) = &self.last {
            if Value::same_identity(&v, last) {
                if let Some(inner) = &mut self.inner {
                    inner.update(doc)?;
                }
                return Ok(());
            }
        }
        self.last = Some(v.clone());

        // A fresh collection feeds the existing keyed list, so item
        // identity survives the new collection object.
        if let Value::List(items) = &v {
            if let Some(inner) = &mut self.inner {
                if let DirectiveKind::List(list) = &mut inner.kind {
                    list.set_items(items.clone());
                    inner.update(doc)?;
                    return Ok(());
                }
            }
        }

        // Remount: the first owned node doubles as the replacement host.
        let Some(&host) = self.rendered.first() else {
            return Ok(());
        };
        if let Some(inner) = &mut self.inner {
            inner.dispose(doc);
        }
        for &node in self.rendered.iter().skip(1) {
            doc.discard(node);
        }
        let range = self.render_value(doc, host, v)?;
        if !range.contains(&host) {
            doc.discard(host);
        }
        Ok(())
    }

    fn full_range(&self) -> Vec<NodeId> {
        match &self.inner {
            Some(inner) => inner.full_range(),
            None => self.rendered.clone(),
        }
    }
}
