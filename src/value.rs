//! Substitution values and identity keys.
//!
//! A [`Value`] is what a template substitution slot can hold; the directive
//! factory classifies each one into its runtime behavior exactly once, at
//! template construction. The set is closed on purpose: classification is a
//! single match, not an open-ended type hierarchy.

use std::fmt;
use std::rc::Rc;

use crate::dom::NodeId;
use crate::template::Template;

/// Error type accessors may fail with
pub type AccessorError = Box<dyn std::error::Error>;

/// A zero-argument accessor producing the current value of a dynamic slot
pub type Accessor = Rc<dyn Fn() -> Result<Value, AccessorError>>;

/// One substitution slot's content
#[derive(Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    /// A nested template rendered in place
    Template(Template),
    /// An iterable of items, reconciled by key across updates
    List(Rc<Vec<Value>>),
    /// A function-backed slot, re-evaluated on every update
    Func(Accessor),
    /// Attach an event listener to the host element
    Event {
        name: Rc<str>,
        handler: Rc<dyn Fn()>,
    },
    /// Hand the bound element to a callback once it exists
    NodeRef(Rc<dyn Fn(NodeId)>),
}

impl Value {
    /// Wrap an infallible accessor.
    pub fn func(f: impl Fn() -> Value + 'static) -> Value {
        Value::Func(Rc::new(move || Ok(f())))
    }

    /// Wrap a fallible accessor.
    pub fn try_func(f: impl Fn() -> Result<Value, AccessorError> + 'static) -> Value {
        Value::Func(Rc::new(f))
    }

    /// The engine's notion of "the same value as last time": plain equality
    /// for primitives, shared identity for templates, lists and accessors.
    pub(crate) fn same_identity(a: &Value, b: &Value) -> bool {
        match (a, b) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(x), Value::Bool(y)) => x == y,
            (Value::Int(x), Value::Int(y)) => x == y,
            (Value::Float(x), Value::Float(y)) => x == y,
            (Value::Str(x), Value::Str(y)) => x == y,
            (Value::Template(x), Value::Template(y)) => x.ptr_eq(y),
            (Value::List(x), Value::List(y)) => Rc::ptr_eq(x, y),
            (Value::Func(x), Value::Func(y)) => Rc::ptr_eq(x, y),
            (
                Value::Event { name: xn, handler: xh },
                Value::Event { name: yn, handler: yh },
            ) => xn == yn && Rc::ptr_eq(xh, yh),
            (Value::NodeRef(x), Value::NodeRef(y)) => Rc::ptr_eq(x, y),
            _ => false,
        }
    }

    /// Text rendering for primitive values; `None` for structured ones.
    pub(crate) fn display_string(&self) -> Option<String> {
        match self {
            Value::Null => Some(String::new()),
            Value::Bool(b) => Some(b.to_string()),
            Value::Int(i) => Some(i.to_string()),
            Value::Float(f) => Some(f.to_string()),
            Value::Str(s) => Some(s.clone()),
            _ => None,
        }
    }

    pub(crate) fn kind_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "string",
            Value::Template(_) => "template",
            Value::List(_) => "list",
            Value::Func(_) => "function",
            Value::Event { .. } => "event",
            Value::NodeRef(_) => "ref",
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("Null"),
            Value::Bool(v) => f.debug_tuple("Bool").field(v).finish(),
            Value::Int(v) => f.debug_tuple("Int").field(v).finish(),
            Value::Float(v) => f.debug_tuple("Float").field(v).finish(),
            Value::Str(v) => f.debug_tuple("Str").field(v).finish(),
            Value::Template(_) => f.write_str("Template(..)"),
            Value::List(items) => f.debug_tuple("List").field(&items.len()).finish(),
            Value::Func(_) => f.write_str("Func(..)"),
            Value::Event { name, .. } => f.debug_tuple("Event").field(name).finish(),
            Value::NodeRef(_) => f.write_str("NodeRef(..)"),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<usize> for Value {
    fn from(v: usize) -> Self {
        Value::Int(v as i64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

impl From<Template> for Value {
    fn from(v: Template) -> Self {
        Value::Template(v)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Value::List(Rc::new(items.into_iter().map(Into::into).collect()))
    }
}

/// Attach `handler` as a listener for `event` on the host element.
///
/// The side effect happens exactly once, at render; the bound element's
/// identity is stable across updates.
pub fn on(event: &str, handler: impl Fn() + 'static) -> Value {
    Value::Event {
        name: Rc::from(event),
        handler: Rc::new(handler),
    }
}

/// Invoke `f` with the host element once it is materialized.
pub fn node_ref(f: impl Fn(NodeId) + 'static) -> Value {
    Value::NodeRef(Rc::new(f))
}

/// Identity token matching list items across updates
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Key {
    Int(i64),
    Str(String),
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Int(i) => write!(f, "{}", i),
            Key::Str(s) => f.write_str(s),
        }
    }
}

impl From<i32> for Key {
    fn from(v: i32) -> Self {
        Key::Int(v as i64)
    }
}

impl From<i64> for Key {
    fn from(v: i64) -> Self {
        Key::Int(v)
    }
}

impl From<usize> for Key {
    fn from(v: usize) -> Self {
        Key::Int(v as i64)
    }
}

impl From<&str> for Key {
    fn from(v: &str) -> Self {
        Key::Str(v.to_string())
    }
}

impl From<String> for Key {
    fn from(v: String) -> Self {
        Key::Str(v)
    }
}

impl From<crate::id::MarkerId> for Key {
    fn from(id: crate::id::MarkerId) -> Self {
        Key::Str(id.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_primitive_identity_is_value_equality() {
        assert!(Value::same_identity(&Value::Int(3), &Value::Int(3)));
        assert!(!Value::same_identity(&Value::Int(3), &Value::Int(4)));
        assert!(Value::same_identity(
            &Value::from("abc"),
            &Value::from("abc")
        ));
        assert!(!Value::same_identity(&Value::Int(3), &Value::from("3")));
    }

    #[test]
    fn test_list_identity_is_shared_rc() {
        let items = Rc::new(vec![Value::Int(1)]);
        let a = Value::List(items.clone());
        let b = Value::List(items);
        let c = Value::from(vec![1i64]);
        assert!(Value::same_identity(&a, &b));
        assert!(!Value::same_identity(&a, &c));
    }

    #[test]
    fn test_display_string() {
        assert_eq!(Value::Null.display_string().as_deref(), Some(""));
        assert_eq!(Value::Int(42).display_string().as_deref(), Some("42"));
        assert_eq!(Value::from("x").display_string().as_deref(), Some("x"));
        assert_eq!(Value::from(vec![1i64]).display_string(), None);
    }
}
