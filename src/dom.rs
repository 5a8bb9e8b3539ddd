//! The addressable node tree templates render into.
//!
//! A headless stand-in for a UI document: an arena of element, text and
//! comment nodes with the operations the engine needs — swap-in-place,
//! insert-after, range extraction and relocation, attribute access, event
//! listeners, and a revision counter the cleanup watcher observes. All
//! handles are cheap copies; the tree itself lives behind a shared cell and
//! is only touched from the single UI thread.
//!
//! Invalid handles (discarded or detached nodes used where an attached one
//! is required) make mutating operations no-ops rather than panics; the
//! engine's own invariants keep its usage valid, and external misuse cannot
//! corrupt the arena.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use crate::id::{CounterIds, IdSource};
use crate::schedule::Scheduler;
use crate::EngineConfig;

/// Handle to a node in the arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

/// The three node shapes of the surface
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Element,
    Text,
    Comment,
}

#[derive(Debug)]
enum Payload {
    Element {
        tag: String,
        attrs: BTreeMap<String, String>,
    },
    Text(String),
    Comment(String),
}

#[derive(Debug)]
struct NodeData {
    payload: Payload,
    parent: Option<NodeId>,
    prev: Option<NodeId>,
    next: Option<NodeId>,
    first: Option<NodeId>,
    last: Option<NodeId>,
}

struct Store {
    slots: Vec<Option<NodeData>>,
    free: Vec<usize>,
    root: NodeId,
    revision: u64,
    listeners: Vec<(NodeId, String, Rc<dyn Fn()>)>,
}

impl Store {
    fn node(&self, id: NodeId) -> Option<&NodeData> {
        self.slots.get(id.0).and_then(|s| s.as_ref())
    }

    fn node_mut(&mut self, id: NodeId) -> Option<&mut NodeData> {
        self.slots.get_mut(id.0).and_then(|s| s.as_mut())
    }

    fn alloc(&mut self, payload: Payload) -> NodeId {
        let data = NodeData {
            payload,
            parent: None,
            prev: None,
            next: None,
            first: None,
            last: None,
        };
        match self.free.pop() {
            Some(slot) => {
                self.slots[slot] = Some(data);
                NodeId(slot)
            }
            None => {
                self.slots.push(Some(data));
                NodeId(self.slots.len() - 1)
            }
        }
    }

    /// Unlink `id` from its parent and siblings. The subtree stays intact.
    fn unlink(&mut self, id: NodeId) {
        let Some(node) = self.node(id) else { return };
        let (parent, prev, next) = (node.parent, node.prev, node.next);
        if let Some(p) = prev {
            if let Some(n) = self.node_mut(p) {
                n.next = next;
            }
        }
        if let Some(p) = next {
            if let Some(n) = self.node_mut(p) {
                n.prev = prev;
            }
        }
        if let Some(p) = parent {
            if let Some(n) = self.node_mut(p) {
                if n.first == Some(id) {
                    n.first = next;
                }
                if n.last == Some(id) {
                    n.last = prev;
                }
            }
        }
        if let Some(n) = self.node_mut(id) {
            n.parent = None;
            n.prev = None;
            n.next = None;
        }
    }

    /// Link a detached `id` under `parent`, after `prev` (`None` = first).
    fn link_after(&mut self, parent: NodeId, prev: Option<NodeId>, id: NodeId) {
        let next = match prev {
            Some(p) => self.node(p).and_then(|n| n.next),
            None => self.node(parent).and_then(|n| n.first),
        };
        if let Some(n) = self.node_mut(id) {
            n.parent = Some(parent);
            n.prev = prev;
            n.next = next;
        }
        if let Some(p) = prev {
            if let Some(n) = self.node_mut(p) {
                n.next = Some(id);
            }
        }
        if let Some(p) = next {
            if let Some(n) = self.node_mut(p) {
                n.prev = Some(id);
            }
        }
        if let Some(n) = self.node_mut(parent) {
            if prev.is_none() {
                n.first = Some(id);
            }
            if n.last == prev || n.last.is_none() {
                n.last = Some(id);
            }
        }
    }

    fn collect_subtree(&self, id: NodeId, out: &mut Vec<NodeId>) {
        out.push(id);
        let mut child = self.node(id).and_then(|n| n.first);
        while let Some(c) = child {
            self.collect_subtree(c, out);
            child = self.node(c).and_then(|n| n.next);
        }
    }
}

/// Shared handle to a node tree
#[derive(Clone)]
pub struct Document {
    store: Rc<RefCell<Store>>,
    ids: Rc<dyn IdSource>,
    scheduler: Scheduler,
    config: EngineConfig,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    /// Create a document with the default configuration and the
    /// deterministic counter ID source.
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        let mut store = Store {
            slots: Vec::new(),
            free: Vec::new(),
            root: NodeId(0),
            revision: 0,
            listeners: Vec::new(),
        };
        let root = store.alloc(Payload::Element {
            tag: "root".to_string(),
            attrs: BTreeMap::new(),
        });
        store.root = root;
        Self {
            store: Rc::new(RefCell::new(store)),
            ids: Rc::new(CounterIds::new()),
            scheduler: Scheduler::new(),
            config,
        }
    }

    /// Replace the ID source, e.g. with [`UlidIds`](crate::id::UlidIds).
    pub fn with_ids(mut self, ids: Rc<dyn IdSource>) -> Self {
        self.ids = ids;
        self
    }

    pub fn root(&self) -> NodeId {
        self.store.borrow().root
    }

    pub fn scheduler(&self) -> Scheduler {
        self.scheduler.clone()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn dev(&self) -> bool {
        self.config.dev
    }

    pub(crate) fn ids(&self) -> &dyn IdSource {
        self.ids.as_ref()
    }

    /// Bumped on every structural mutation
    pub fn revision(&self) -> u64 {
        self.store.borrow().revision
    }

    fn touch(store: &mut Store) {
        store.revision += 1;
    }

    // ---- node creation ----------------------------------------------------

    pub fn create_element(&self, tag: &str) -> NodeId {
        self.store.borrow_mut().alloc(Payload::Element {
            tag: tag.to_string(),
            attrs: BTreeMap::new(),
        })
    }

    pub fn create_text(&self, text: &str) -> NodeId {
        self.store
            .borrow_mut()
            .alloc(Payload::Text(text.to_string()))
    }

    pub fn create_comment(&self, text: &str) -> NodeId {
        self.store
            .borrow_mut()
            .alloc(Payload::Comment(text.to_string()))
    }

    // ---- structure --------------------------------------------------------

    pub fn append_child(&self, parent: NodeId, child: NodeId) {
        let mut store = self.store.borrow_mut();
        if store.node(parent).is_none() || store.node(child).is_none() {
            return;
        }
        store.unlink(child);
        let last = store.node(parent).and_then(|n| n.last);
        store.link_after(parent, last, child);
        Self::touch(&mut store);
    }

    /// Insert `node` as the next sibling of `anchor`.
    pub fn insert_after(&self, anchor: NodeId, node: NodeId) {
        let mut store = self.store.borrow_mut();
        let Some(parent) = store.node(anchor).and_then(|n| n.parent) else {
            return;
        };
        store.unlink(node);
        store.link_after(parent, Some(anchor), node);
        Self::touch(&mut store);
    }

    /// Insert `nodes` in order as the siblings following `anchor`.
    pub fn insert_all_after(&self, anchor: NodeId, nodes: &[NodeId]) {
        let mut store = self.store.borrow_mut();
        let Some(parent) = store.node(anchor).and_then(|n| n.parent) else {
            return;
        };
        let mut cursor = anchor;
        for &node in nodes {
            store.unlink(node);
            store.link_after(parent, Some(cursor), node);
            cursor = node;
        }
        if !nodes.is_empty() {
            Self::touch(&mut store);
        }
    }

    /// Relocate the contiguous sibling span `first..=last` to sit right
    /// after `anchor`, as one splice. Inner nodes are untouched, so the
    /// cost does not depend on the span's length.
    pub fn move_range_after(&self, first: NodeId, last: NodeId, anchor: NodeId) {
        let mut store = self.store.borrow_mut();
        let Some(parent) = store.node(first).and_then(|n| n.parent) else {
            return;
        };
        if store.node(anchor).and_then(|n| n.parent) != Some(parent) {
            return;
        }
        if anchor == last {
            return;
        }

        // Detach the chain, keeping first..=last linked together.
        let before = store.node(first).and_then(|n| n.prev);
        let after = store.node(last).and_then(|n| n.next);
        if let Some(b) = before {
            if let Some(n) = store.node_mut(b) {
                n.next = after;
            }
        }
        if let Some(a) = after {
            if let Some(n) = store.node_mut(a) {
                n.prev = before;
            }
        }
        if let Some(p) = store.node_mut(parent) {
            if p.first == Some(first) {
                p.first = after;
            }
            if p.last == Some(last) {
                p.last = before;
            }
        }

        // Splice the chain back in after the anchor.
        let tail = store.node(anchor).and_then(|n| n.next);
        if let Some(n) = store.node_mut(anchor) {
            n.next = Some(first);
        }
        if let Some(n) = store.node_mut(first) {
            n.prev = Some(anchor);
        }
        if let Some(n) = store.node_mut(last) {
            n.next = tail;
        }
        match tail {
            Some(t) => {
                if let Some(n) = store.node_mut(t) {
                    n.prev = Some(last);
                }
            }
            None => {
                if let Some(p) = store.node_mut(parent) {
                    p.last = Some(last);
                }
            }
        }
        Self::touch(&mut store);
    }

    /// Swap-in-place: `new` takes over `old`'s position. `old` is left
    /// detached but alive.
    pub fn replace_with(&self, old: NodeId, new: NodeId) {
        let mut store = self.store.borrow_mut();
        let Some(parent) = store.node(old).and_then(|n| n.parent) else {
            return;
        };
        let prev = store.node(old).and_then(|n| n.prev);
        store.unlink(old);
        store.unlink(new);
        store.link_after(parent, prev, new);
        Self::touch(&mut store);
    }

    /// Swap-in-place with a sequence: `old` is replaced by `nodes` in
    /// order. With an empty sequence this is a plain detach.
    pub fn replace_with_many(&self, old: NodeId, nodes: &[NodeId]) {
        let mut store = self.store.borrow_mut();
        let Some(parent) = store.node(old).and_then(|n| n.parent) else {
            return;
        };
        let mut prev = store.node(old).and_then(|n| n.prev);
        store.unlink(old);
        for &node in nodes {
            store.unlink(node);
            store.link_after(parent, prev, node);
            prev = Some(node);
        }
        Self::touch(&mut store);
    }

    /// Unlink a node from its parent, keeping its subtree intact.
    pub fn detach(&self, node: NodeId) {
        let mut store = self.store.borrow_mut();
        if store.node(node).and_then(|n| n.parent).is_none() {
            return;
        }
        store.unlink(node);
        Self::touch(&mut store);
    }

    /// Detach a node and free its entire subtree, dropping any listeners
    /// attached within it.
    pub fn discard(&self, node: NodeId) {
        let mut store = self.store.borrow_mut();
        if store.node(node).is_none() {
            return;
        }
        store.unlink(node);
        let mut doomed = Vec::new();
        store.collect_subtree(node, &mut doomed);
        for id in &doomed {
            store.slots[id.0] = None;
            store.free.push(id.0);
        }
        store
            .listeners
            .retain(|(target, _, _)| !doomed.contains(target));
        Self::touch(&mut store);
    }

    /// Detach `region` into an offscreen holder, run `f`, then put the
    /// region back. Bulk removals inside the region then cost no live-tree
    /// bookkeeping per node.
    pub fn detached_region(&self, region: NodeId, f: impl FnOnce(&Document)) {
        if self.parent(region).is_none() {
            f(self);
            return;
        }
        let placeholder = self.create_comment("");
        self.replace_with(region, placeholder);
        f(self);
        self.replace_with(placeholder, region);
        self.discard(placeholder);
    }

    // ---- queries ----------------------------------------------------------

    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.store.borrow().node(node).and_then(|n| n.parent)
    }

    pub fn next_sibling(&self, node: NodeId) -> Option<NodeId> {
        self.store.borrow().node(node).and_then(|n| n.next)
    }

    pub fn prev_sibling(&self, node: NodeId) -> Option<NodeId> {
        self.store.borrow().node(node).and_then(|n| n.prev)
    }

    pub fn first_child(&self, node: NodeId) -> Option<NodeId> {
        self.store.borrow().node(node).and_then(|n| n.first)
    }

    pub fn children(&self, node: NodeId) -> Vec<NodeId> {
        let store = self.store.borrow();
        let mut out = Vec::new();
        let mut child = store.node(node).and_then(|n| n.first);
        while let Some(c) = child {
            out.push(c);
            child = store.node(c).and_then(|n| n.next);
        }
        out
    }

    pub fn element_children(&self, node: NodeId) -> Vec<NodeId> {
        self.children(node)
            .into_iter()
            .filter(|&c| self.kind(c) == Some(NodeKind::Element))
            .collect()
    }

    pub fn kind(&self, node: NodeId) -> Option<NodeKind> {
        self.store.borrow().node(node).map(|n| match n.payload {
            Payload::Element { .. } => NodeKind::Element,
            Payload::Text(_) => NodeKind::Text,
            Payload::Comment(_) => NodeKind::Comment,
        })
    }

    /// Whether the node is reachable from the document root
    pub fn is_connected(&self, node: NodeId) -> bool {
        let store = self.store.borrow();
        let mut current = node;
        loop {
            if current == store.root {
                return store.node(node).is_some();
            }
            match store.node(current).and_then(|n| n.parent) {
                Some(p) => current = p,
                None => return false,
            }
        }
    }

    // ---- content ----------------------------------------------------------

    pub fn tag(&self, node: NodeId) -> Option<String> {
        match self.store.borrow().node(node).map(|n| &n.payload) {
            Some(Payload::Element { tag, .. }) => Some(tag.clone()),
            _ => None,
        }
    }

    pub fn text(&self, node: NodeId) -> Option<String> {
        match self.store.borrow().node(node).map(|n| &n.payload) {
            Some(Payload::Text(t)) => Some(t.clone()),
            _ => None,
        }
    }

    pub fn set_text(&self, node: NodeId, text: &str) {
        let mut store = self.store.borrow_mut();
        if let Some(Payload::Text(t)) = store.node_mut(node).map(|n| &mut n.payload) {
            *t = text.to_string();
        }
    }

    pub fn comment_text(&self, node: NodeId) -> Option<String> {
        match self.store.borrow().node(node).map(|n| &n.payload) {
            Some(Payload::Comment(c)) => Some(c.clone()),
            _ => None,
        }
    }

    pub fn attr(&self, node: NodeId, name: &str) -> Option<String> {
        match self.store.borrow().node(node).map(|n| &n.payload) {
            Some(Payload::Element { attrs, .. }) => attrs.get(name).cloned(),
            _ => None,
        }
    }

    pub fn set_attr(&self, node: NodeId, name: &str, value: &str) {
        let mut store = self.store.borrow_mut();
        if let Some(Payload::Element { attrs, .. }) = store.node_mut(node).map(|n| &mut n.payload)
        {
            attrs.insert(name.to_string(), value.to_string());
        }
    }

    pub fn remove_attr(&self, node: NodeId, name: &str) {
        let mut store = self.store.borrow_mut();
        if let Some(Payload::Element { attrs, .. }) = store.node_mut(node).map(|n| &mut n.payload)
        {
            attrs.remove(name);
        }
    }

    // ---- events -----------------------------------------------------------

    pub fn add_listener(&self, node: NodeId, event: &str, handler: Rc<dyn Fn()>) {
        self.store
            .borrow_mut()
            .listeners
            .push((node, event.to_string(), handler));
    }

    /// Synchronously invoke every listener registered for `(node, event)`.
    /// Handlers may freely mutate the document.
    pub fn dispatch(&self, node: NodeId, event: &str) {
        let handlers: Vec<Rc<dyn Fn()>> = self
            .store
            .borrow()
            .listeners
            .iter()
            .filter(|(target, name, _)| *target == node && name == event)
            .map(|(_, _, h)| h.clone())
            .collect();
        for handler in handlers {
            handler();
        }
    }

    // ---- serialization ----------------------------------------------------

    /// Serialize a subtree to markup text.
    pub fn serialize(&self, node: NodeId) -> String {
        let store = self.store.borrow();
        let mut out = String::new();
        Self::serialize_into(&store, node, &mut out);
        out
    }

    /// Serialize the whole document (the root's children).
    pub fn html(&self) -> String {
        let store = self.store.borrow();
        let mut out = String::new();
        let mut child = store.node(store.root).and_then(|n| n.first);
        while let Some(c) = child {
            Self::serialize_into(&store, c, &mut out);
            child = store.node(c).and_then(|n| n.next);
        }
        out
    }

    fn serialize_into(store: &Store, node: NodeId, out: &mut String) {
        let Some(data) = store.node(node) else { return };
        match &data.payload {
            Payload::Text(t) => out.push_str(t),
            Payload::Comment(c) => {
                out.push_str("<!--");
                out.push_str(c);
                out.push_str("-->");
            }
            Payload::Element { tag, attrs } => {
                out.push('<');
                out.push_str(tag);
                for (name, value) in attrs {
                    out.push(' ');
                    out.push_str(name);
                    out.push_str("=\"");
                    out.push_str(value);
                    out.push('"');
                }
                if data.first.is_none() {
                    out.push_str("/>");
                    return;
                }
                out.push('>');
                let mut child = data.first;
                while let Some(c) = child {
                    Self::serialize_into(store, c, out);
                    child = store.node(c).and_then(|n| n.next);
                }
                out.push_str("</");
                out.push_str(tag);
                out.push('>');
            }
        }
    }
}

impl std::fmt::Debug for Document {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let store = self.store.borrow();
        f.debug_struct("Document")
            .field("nodes", &(store.slots.len() - store.free.len()))
            .field("revision", &store.revision)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc_with_list() -> (Document, NodeId, Vec<NodeId>) {
        let doc = Document::new();
        let ul = doc.create_element("ul");
        doc.append_child(doc.root(), ul);
        let items: Vec<NodeId> = (0..4)
            .map(|i| {
                let li = doc.create_element("li");
                doc.append_child(ul, li);
                let text = doc.create_text(&i.to_string());
                doc.append_child(li, text);
                li
            })
            .collect();
        (doc, ul, items)
    }

    #[test]
    fn test_append_and_serialize() {
        let (doc, ul, _) = doc_with_list();
        assert_eq!(
            doc.serialize(ul),
            "<ul><li>0</li><li>1</li><li>2</li><li>3</li></ul>"
        );
    }

    #[test]
    fn test_replace_with_many() {
        let (doc, ul, items) = doc_with_list();
        let a = doc.create_text("a");
        let b = doc.create_text("b");
        doc.replace_with_many(items[1], &[a, b]);
        assert_eq!(doc.serialize(ul), "<ul><li>0</li>ab<li>2</li><li>3</li></ul>");
        assert!(!doc.is_connected(items[1]));
    }

    #[test]
    fn test_move_range_after_splices() {
        let (doc, ul, items) = doc_with_list();
        // Move [1, 2] after 3.
        doc.move_range_after(items[1], items[2], items[3]);
        assert_eq!(
            doc.serialize(ul),
            "<ul><li>0</li><li>3</li><li>1</li><li>2</li></ul>"
        );
        // Move the new tail [1, 2] back after 0.
        doc.move_range_after(items[1], items[2], items[0]);
        assert_eq!(
            doc.serialize(ul),
            "<ul><li>0</li><li>1</li><li>2</li><li>3</li></ul>"
        );
    }

    #[test]
    fn test_insert_all_after() {
        let (doc, ul, items) = doc_with_list();
        let a = doc.create_element("li");
        let b = doc.create_element("li");
        doc.insert_all_after(items[0], &[a, b]);
        let children = doc.children(ul);
        assert_eq!(children[1], a);
        assert_eq!(children[2], b);
        assert_eq!(children.len(), 6);
    }

    #[test]
    fn test_discard_frees_subtree_and_listeners() {
        let (doc, _, items) = doc_with_list();
        doc.add_listener(items[0], "click", Rc::new(|| {}));
        doc.discard(items[0]);
        assert_eq!(doc.kind(items[0]), None);
        assert!(doc.store.borrow().listeners.is_empty());
    }

    #[test]
    fn test_is_connected() {
        let (doc, ul, items) = doc_with_list();
        assert!(doc.is_connected(items[2]));
        doc.detach(ul);
        assert!(!doc.is_connected(items[2]));
        assert!(doc.is_connected(doc.root()));
    }

    #[test]
    fn test_detached_region_restores_position() {
        let (doc, ul, items) = doc_with_list();
        let before = doc.serialize(ul);
        doc.detached_region(ul, |doc| {
            assert!(!doc.is_connected(items[0]));
        });
        assert!(doc.is_connected(items[0]));
        assert_eq!(doc.serialize(ul), before);
    }

    #[test]
    fn test_dispatch_runs_handlers() {
        let (doc, _, items) = doc_with_list();
        let hits = Rc::new(std::cell::Cell::new(0));
        let h = hits.clone();
        doc.add_listener(items[0], "click", Rc::new(move || h.set(h.get() + 1)));
        doc.dispatch(items[0], "click");
        doc.dispatch(items[0], "focus");
        doc.dispatch(items[1], "click");
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn test_revision_tracks_structure() {
        let (doc, _, items) = doc_with_list();
        let before = doc.revision();
        doc.set_attr(items[0], "class", "x");
        assert_eq!(doc.revision(), before);
        doc.detach(items[0]);
        assert!(doc.revision() > before);
    }
}
