//! weft - a headless template rendering and reconciliation engine
//!
//! Templates interleave literal markup with dynamic values and render into
//! a live, addressable node tree. Updates never re-parse: each dynamic
//! slot is bound to a directive at first render, and subsequent `update`
//! calls re-apply only the slots whose values changed, keyed lists
//! reconciling in place with minimal node motion.
//!
//! # Example
//!
//! ```rust
//! use weft::{html, Document};
//!
//! let doc = Document::new();
//! let host = doc.create_element("div");
//! doc.append_child(doc.root(), host);
//!
//! let name = "world";
//! let t = html!("<p>hello " {name} "</p>");
//! t.render(&doc, host).unwrap();
//! assert!(doc.html().contains("hello world"));
//! ```

use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

pub mod directive;
pub mod dom;
pub mod error;
pub mod id;
pub mod markup;
pub mod schedule;
pub mod template;
pub mod value;

pub use directive::{classify, Directive, Position};
pub use dom::{Document, NodeId, NodeKind};
pub use error::{DirectiveError, Error, Result, StateError, SyntaxError};
pub use id::{CounterIds, IdSource, MarkerId, UlidIds};
pub use schedule::Scheduler;
pub use template::Template;
pub use value::{node_ref, on, AccessorError, Key, Value};

/// Errors that can occur when loading engine configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Engine configuration carried by a [`Document`]
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Development mode: failed directives leave an inline diagnostic
    /// placeholder and sibling directives still render best-effort.
    pub dev: bool,
    /// Ticks between cleanup watcher checks
    pub cleanup_interval: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            dev: false,
            cleanup_interval: 5,
        }
    }
}

impl EngineConfig {
    /// Create a new configuration with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable or disable development mode
    pub fn with_dev(mut self, dev: bool) -> Self {
        self.dev = dev;
        self
    }

    /// Set the cleanup watcher check interval, in ticks
    pub fn with_cleanup_interval(mut self, ticks: u64) -> Self {
        self.cleanup_interval = ticks.max(1);
        self
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> std::result::Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }
}

/// Build a [`Template`] from literal markup pieces interleaved with
/// `{expression}` substitutions.
///
/// ```rust
/// use weft::{html, on, Value};
///
/// let items = vec![1i64, 2, 3];
/// let t = html!(
///     "<section><button " {on("click", || {})} ">go</button>"
///     "<ul>" {Value::from(items)} "</ul></section>"
/// );
/// assert!(!t.is_rendered());
/// ```
#[macro_export]
macro_rules! html {
    ($($piece:tt)*) => {{
        #[allow(unused_mut)]
        let mut parts: ::std::vec::Vec<::std::string::String> =
            vec![::std::string::String::new()];
        #[allow(unused_mut)]
        let mut subs: ::std::vec::Vec<$crate::Value> = ::std::vec::Vec::new();
        $( $crate::html_piece!(parts, subs, $piece); )*
        $crate::Template::new(parts, subs)
    }};
}

#[macro_export]
#[doc(hidden)]
macro_rules! html_piece {
    ($parts:ident, $subs:ident, $lit:literal) => {
        if let ::std::option::Option::Some(last) = $parts.last_mut() {
            last.push_str($lit);
        }
    };
    ($parts:ident, $subs:ident, {$value:expr}) => {
        $subs.push($crate::Value::from($value));
        $parts.push(::std::string::String::new());
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = EngineConfig::default();
        assert!(!config.dev);
        assert_eq!(config.cleanup_interval, 5);
    }

    #[test]
    fn test_config_builders() {
        let config = EngineConfig::new().with_dev(true).with_cleanup_interval(0);
        assert!(config.dev);
        assert_eq!(config.cleanup_interval, 1);
    }

    #[test]
    fn test_config_from_toml() {
        let config: EngineConfig = toml::from_str("dev = true\ncleanup_interval = 9").unwrap();
        assert!(config.dev);
        assert_eq!(config.cleanup_interval, 9);
    }

    #[test]
    fn test_html_macro_shapes() {
        let t = html!("<p>static</p>");
        assert!(!t.is_rendered());

        let t = html!("<p>" {42} "</p>");
        let doc = Document::new();
        let host = doc.create_element("div");
        doc.append_child(doc.root(), host);
        t.render(&doc, host).unwrap();
        assert_eq!(doc.html(), "<p>42</p>");
    }
}
