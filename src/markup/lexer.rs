//! Two-mode lexer for template markup using logos
//!
//! Markup alternates between content position (text, comments, tag
//! open/close) and tag position (attributes up to the closing `>`). The
//! lexer morphs between two token sets at those boundaries and emits one
//! unified [`Token`] stream for the grammar.

use logos::Logos;

/// Byte range in markup text
pub type Span = std::ops::Range<usize>;

#[derive(Logos, Debug, Clone, PartialEq)]
enum ContentToken {
    #[regex(r"<!--(?:[^-]|-[^-]|--+[^->])*-*-->", comment_text)]
    Comment(String),

    #[regex(r"</[A-Za-z][A-Za-z0-9_-]*>", close_tag_name)]
    CloseTag(String),

    #[regex(r"<[A-Za-z][A-Za-z0-9_-]*", open_tag_name)]
    OpenTag(String),

    #[regex(r"[^<]+", |lex| lex.slice().to_owned())]
    Text(String),
}

fn comment_text(lex: &mut logos::Lexer<'_, ContentToken>) -> String {
    let s = lex.slice();
    s[4..s.len() - 3].to_owned()
}

fn close_tag_name(lex: &mut logos::Lexer<'_, ContentToken>) -> String {
    let s = lex.slice();
    s[2..s.len() - 1].to_owned()
}

fn open_tag_name(lex: &mut logos::Lexer<'_, ContentToken>) -> String {
    lex.slice()[1..].to_owned()
}

#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\r\n]+")]
enum TagToken {
    #[token("/>")]
    SelfClose,

    #[token(">")]
    End,

    #[token("=")]
    Eq,

    #[regex(r#""[^"]*""#, quoted_value)]
    #[regex(r#"'[^']*'"#, quoted_value)]
    Value(String),

    #[regex(r"[A-Za-z_][A-Za-z0-9_:.-]*", |lex| lex.slice().to_owned())]
    Name(String),
}

fn quoted_value(lex: &mut logos::Lexer<'_, TagToken>) -> String {
    let s = lex.slice();
    s[1..s.len() - 1].to_owned()
}

/// Unified token stream fed to the grammar
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Text(String),
    Comment(String),
    OpenTag(String),
    CloseTag(String),
    AttrName(String),
    AttrValue(String),
    Eq,
    TagEnd,
    TagSelfClose,
    /// Anything neither mode could lex
    Error,
}

/// Lex markup into `(token, span)` pairs.
pub fn lex(source: &str) -> Vec<(Token, Span)> {
    let mut tokens = Vec::new();
    let mut content = ContentToken::lexer(source);

    loop {
        let Some(result) = content.next() else { break };
        let span = content.span();
        match result {
            Ok(ContentToken::OpenTag(name)) => {
                tokens.push((Token::OpenTag(name), span));

                // Switch to tag mode until the tag is closed.
                let mut tag = content.morph::<TagToken>();
                while let Some(t) = tag.next() {
                    let tspan = tag.span();
                    match t {
                        Ok(TagToken::End) => {
                            tokens.push((Token::TagEnd, tspan));
                            break;
                        }
                        Ok(TagToken::SelfClose) => {
                            tokens.push((Token::TagSelfClose, tspan));
                            break;
                        }
                        Ok(TagToken::Eq) => tokens.push((Token::Eq, tspan)),
                        Ok(TagToken::Name(n)) => tokens.push((Token::AttrName(n), tspan)),
                        Ok(TagToken::Value(v)) => tokens.push((Token::AttrValue(v), tspan)),
                        Err(()) => tokens.push((Token::Error, tspan)),
                    }
                }
                content = tag.morph();
            }
            Ok(ContentToken::CloseTag(name)) => tokens.push((Token::CloseTag(name), span)),
            Ok(ContentToken::Comment(text)) => tokens.push((Token::Comment(text), span)),
            Ok(ContentToken::Text(text)) => tokens.push((Token::Text(text), span)),
            Err(()) => tokens.push((Token::Error, span)),
        }
    }

    tokens
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<Token> {
        lex(source).into_iter().map(|(t, _)| t).collect()
    }

    #[test]
    fn test_lex_text_and_element() {
        assert_eq!(
            kinds("<p>hi</p>"),
            vec![
                Token::OpenTag("p".into()),
                Token::TagEnd,
                Token::Text("hi".into()),
                Token::CloseTag("p".into()),
            ]
        );
    }

    #[test]
    fn test_lex_attributes() {
        assert_eq!(
            kinds(r#"<div class="big" wf-d0 id='x'/>"#),
            vec![
                Token::OpenTag("div".into()),
                Token::AttrName("class".into()),
                Token::Eq,
                Token::AttrValue("big".into()),
                Token::AttrName("wf-d0".into()),
                Token::AttrName("id".into()),
                Token::Eq,
                Token::AttrValue("x".into()),
                Token::TagSelfClose,
            ]
        );
    }

    #[test]
    fn test_lex_comment_marker() {
        assert_eq!(
            kinds("<div><!--wf:d1--></div>"),
            vec![
                Token::OpenTag("div".into()),
                Token::TagEnd,
                Token::Comment("wf:d1".into()),
                Token::CloseTag("div".into()),
            ]
        );
    }

    #[test]
    fn test_lex_marker_inside_attribute_value() {
        let tokens = kinds(r#"<a href="<!--wf:d2-->"/>"#);
        assert_eq!(
            tokens,
            vec![
                Token::OpenTag("a".into()),
                Token::AttrName("href".into()),
                Token::Eq,
                Token::AttrValue("<!--wf:d2-->".into()),
                Token::TagSelfClose,
            ]
        );
    }

    #[test]
    fn test_lex_stray_angle_is_error() {
        assert!(kinds("a < b").contains(&Token::Error));
    }
}
