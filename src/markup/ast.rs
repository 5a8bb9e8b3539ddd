//! Parsed markup tree

/// One attribute as written in markup; bare names carry no value.
#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    pub name: String,
    pub value: Option<String>,
}

/// A node of parsed markup, before materialization
#[derive(Debug, Clone, PartialEq)]
pub enum MarkupNode {
    Element {
        tag: String,
        attrs: Vec<Attribute>,
        children: Vec<MarkupNode>,
    },
    Text(String),
    Comment(String),
}
