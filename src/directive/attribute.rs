//! Attribute-position directives: the value setter.
//!
//! The bind pass wraps a directive whose marker token sits inside an
//! attribute value into an [`AttributeState`]; static text around the token
//! is kept as a prefix/suffix pattern. Event and ref directives need no
//! state of their own and live directly in
//! [`DirectiveKind`](super::DirectiveKind).

use crate::directive::Directive;
use crate::dom::{Document, NodeId};
use crate::error::{DirectiveError, Error};

/// Development-mode stand-in for an attribute whose value failed
pub(crate) const DEV_PLACEHOLDER: &str = "⚠";

/// One named attribute bound to a wrapped directive's value
pub(crate) struct AttributeState {
    pub(crate) name: String,
    prefix: String,
    suffix: String,
    pub(crate) inner: Box<Directive>,
    host: Option<NodeId>,
    committed: Option<String>,
}

impl AttributeState {
    pub(crate) fn new(name: String, prefix: String, suffix: String, inner: Directive) -> Self {
        Self {
            name,
            prefix,
            suffix,
            inner: Box::new(inner),
            host: None,
            committed: None,
        }
    }

    pub(crate) fn render(&mut self, doc: &Document, host: NodeId) -> Result<Vec<NodeId>, Error> {
        self.host = Some(host);
        self.apply(doc)?;
        Ok(vec![host])
    }

    pub(crate) fn update(&mut self, doc: &Document) -> Result<(), Error> {
        self.apply(doc)
    }

    fn apply(&mut self, doc: &Document) -> Result<(), Error> {
        let Some(host) = self.host else {
            return Ok(());
        };

        let value = match self.inner.value() {
            Ok(v) => v,
            Err(err) => {
                if doc.dev() {
                    doc.set_attr(host, &self.name, DEV_PLACEHOLDER);
                }
                return Err(DirectiveError::attribute(&self.name, Box::new(err)).into());
            }
        };

        let Some(text) = value.display_string() else {
            return Err(DirectiveError::attribute(
                &self.name,
                format!("cannot render a {} as an attribute value", value.kind_name()).into(),
            )
            .into());
        };

        let full = format!("{}{}{}", self.prefix, text, self.suffix);
        // Unchanged values skip the attribute write entirely.
        if self.committed.as_deref() != Some(full.as_str()) {
            doc.set_attr(host, &self.name, &full);
            self.committed = Some(full);
        }
        Ok(())
    }
}
