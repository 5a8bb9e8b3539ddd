//! Error types for template parsing, binding and directive evaluation

use ariadne::{Color, Label, Report, ReportKind, Source};
use thiserror::Error;

/// Byte range in built markup text
pub type Span = std::ops::Range<usize>;

/// Errors raised while parsing template markup or resolving markers
#[derive(Debug, Error)]
pub enum SyntaxError {
    /// Malformed markup
    #[error("markup error at {span:?}: {message}")]
    Markup {
        span: Span,
        message: String,
        expected: Vec<String>,
    },

    /// A marker appeared in the parsed output with no directive behind it
    #[error("unresolved marker '{id}'")]
    UnresolvedMarker { id: String },

    /// A directive was never matched by any marker during the bind pass
    #[error("directive '{id}' ({kind}) was never matched by a marker")]
    UnmatchedDirective { id: String, kind: String },

    /// An attribute value embedded more than one directive token
    #[error("attribute '{name}' embeds more than one directive")]
    MultiTokenAttribute { name: String },
}

impl SyntaxError {
    /// Format the error with source context using ariadne.
    ///
    /// `source` is the built markup the template was parsed from.
    pub fn format(&self, source: &str, filename: &str) -> String {
        match self {
            SyntaxError::Markup {
                span,
                message,
                expected,
            } => {
                let expected_str = if expected.is_empty() {
                    String::new()
                } else {
                    format!("\nExpected: {}", expected.join(", "))
                };

                let mut buf = Vec::new();
                Report::build(ReportKind::Error, filename, span.start)
                    .with_message(message)
                    .with_label(
                        Label::new((filename, span.clone()))
                            .with_message(format!("{}{}", message, expected_str))
                            .with_color(Color::Red),
                    )
                    .finish()
                    .write((filename, Source::from(source)), &mut buf)
                    .unwrap();
                String::from_utf8_lossy(&buf).into_owned()
            }
            other => other.to_string(),
        }
    }
}

impl<'a> From<chumsky::error::Rich<'a, crate::markup::lexer::Token>> for SyntaxError {
    fn from(err: chumsky::error::Rich<'a, crate::markup::lexer::Token>) -> Self {
        use chumsky::error::RichReason;

        let message = match err.reason() {
            RichReason::ExpectedFound { found, .. } => {
                let found_str = match found {
                    Some(tok) => format_token(tok),
                    None => "end of markup".to_string(),
                };
                format!("Unexpected {}", found_str)
            }
            RichReason::Custom(msg) => msg.to_string(),
        };

        let expected: Vec<String> = err
            .expected()
            .filter_map(|e| match e {
                chumsky::error::RichPattern::Token(tok) => Some(format_token(tok)),
                chumsky::error::RichPattern::Label(label) => Some(label.to_string()),
                chumsky::error::RichPattern::EndOfInput => Some("end of markup".to_string()),
                chumsky::error::RichPattern::Identifier(s) => Some(format!("'{}'", s)),
                chumsky::error::RichPattern::Any => Some("any token".to_string()),
                chumsky::error::RichPattern::SomethingElse => None,
            })
            .collect();

        SyntaxError::Markup {
            span: err.span().into_range(),
            message,
            expected,
        }
    }
}

/// Format a markup token for human-readable error messages
fn format_token(tok: &crate::markup::lexer::Token) -> String {
    use crate::markup::lexer::Token;
    match tok {
        Token::Text(t) => format!("text {:?}", t),
        Token::Comment(c) => format!("comment <!--{}-->", c),
        Token::OpenTag(t) => format!("'<{}'", t),
        Token::CloseTag(t) => format!("'</{}>'", t),
        Token::AttrName(n) => format!("attribute '{}'", n),
        Token::AttrValue(v) => format!("value {:?}", v),
        Token::Eq => "'='".to_string(),
        Token::TagEnd => "'>'".to_string(),
        Token::TagSelfClose => "'/>'".to_string(),
        Token::Error => "invalid markup".to_string(),
    }
}

/// Lifecycle misuse errors
#[derive(Debug, Error)]
pub enum StateError {
    #[error("cannot update unrendered template")]
    UpdateBeforeRender,

    #[error("cannot mount unrendered template")]
    MountBeforeRender,

    #[error("only one cleanup handler may be registered per template")]
    CleanupAlreadyRegistered,
}

/// A directive's value computation failed.
///
/// Wraps the underlying error with the offending directive or attribute
/// named, so the failure can be traced back to its slot in the template.
#[derive(Debug, Error)]
#[error("{context}: {source}")]
pub struct DirectiveError {
    pub context: String,
    #[source]
    pub source: Box<dyn std::error::Error>,
}

impl DirectiveError {
    /// Failure while evaluating a dynamic accessor
    pub fn accessor(id: impl std::fmt::Display, source: Box<dyn std::error::Error>) -> Self {
        Self {
            context: format!("error evaluating directive '{}'", id),
            source,
        }
    }

    /// Failure while computing an attribute's value
    pub fn attribute(name: &str, source: Box<dyn std::error::Error>) -> Self {
        Self {
            context: format!("error setting attribute \"{}\"", name),
            source,
        }
    }

    /// A value that cannot be rendered where it was placed
    pub fn unsupported(context: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            context: context.into(),
            source: message.into().into(),
        }
    }
}

/// Errors that can occur during the render/update pipeline
#[derive(Debug, Error)]
pub enum Error {
    /// Template syntax error: parse or bind failure
    #[error("template syntax error: {}", format_syntax_errors(.0))]
    Syntax(Vec<SyntaxError>),

    /// Illegal lifecycle state
    #[error("illegal state: {0}")]
    State(#[from] StateError),

    /// Directive evaluation error
    #[error(transparent)]
    Directive(#[from] DirectiveError),
}

impl From<SyntaxError> for Error {
    fn from(err: SyntaxError) -> Self {
        Error::Syntax(vec![err])
    }
}

impl From<Vec<SyntaxError>> for Error {
    fn from(errors: Vec<SyntaxError>) -> Self {
        Error::Syntax(errors)
    }
}

fn format_syntax_errors(errors: &[SyntaxError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

pub type Result<T> = std::result::Result<T, Error>;
