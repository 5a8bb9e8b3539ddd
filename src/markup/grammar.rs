//! Markup grammar over the lexed token stream using chumsky

use chumsky::input::{Stream, ValueInput};
use chumsky::prelude::*;

use crate::error::SyntaxError;
use crate::markup::ast::{Attribute, MarkupNode};
use crate::markup::lexer::{lex, Token};

/// Parse markup into a node list.
pub fn parse(input: &str) -> Result<Vec<MarkupNode>, Vec<SyntaxError>> {
    let len = input.len();

    let token_iter = lex(input).into_iter().map(|(tok, span)| (tok, span.into()));

    let token_stream = Stream::from_iter(token_iter)
        // Split (Token, SimpleSpan) into token and span parts
        .map((len..len).into(), |(t, s): (_, _)| (t, s));

    fragment_parser()
        .parse(token_stream)
        .into_result()
        .map_err(|errs| errs.into_iter().map(|e| e.into()).collect())
}

fn fragment_parser<'a, I>() -> impl Parser<'a, I, Vec<MarkupNode>, extra::Err<Rich<'a, Token>>>
where
    I: ValueInput<'a, Token = Token, Span = SimpleSpan>,
{
    let node = recursive(|node| {
        let text = select! {
            Token::Text(t) => MarkupNode::Text(t),
        };

        let comment = select! {
            Token::Comment(c) => MarkupNode::Comment(c),
        };

        let attr_name = select! {
            Token::AttrName(n) => n,
        };
        let attr_value = select! {
            Token::AttrValue(v) => v,
        };
        let attribute = attr_name
            .then(just(Token::Eq).ignore_then(attr_value).or_not())
            .map(|(name, value)| Attribute { name, value });

        let open_tag = select! {
            Token::OpenTag(t) => t,
        };
        let close_tag = select! {
            Token::CloseTag(t) => t,
        };

        let element = open_tag
            .then(attribute.repeated().collect::<Vec<_>>())
            .then(choice((
                just(Token::TagSelfClose).map(|_| None),
                just(Token::TagEnd)
                    .ignore_then(node.repeated().collect::<Vec<_>>())
                    .then(close_tag)
                    .map(Some),
            )))
            .try_map(|((tag, attrs), body), span| match body {
                None => Ok(MarkupNode::Element {
                    tag,
                    attrs,
                    children: Vec::new(),
                }),
                Some((children, closed)) => {
                    if closed == tag {
                        Ok(MarkupNode::Element {
                            tag,
                            attrs,
                            children,
                        })
                    } else {
                        Err(Rich::custom(
                            span,
                            format!("mismatched closing tag </{}>, expected </{}>", closed, tag),
                        ))
                    }
                }
            });

        choice((text, comment, element))
    });

    node.repeated().collect().then_ignore(end())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_text_fragment() {
        let nodes = parse("hello").expect("Should parse");
        assert_eq!(nodes, vec![MarkupNode::Text("hello".to_string())]);
    }

    #[test]
    fn test_parse_nested_elements() {
        let nodes = parse("<div><p>a</p><!--wf:d0--></div>").expect("Should parse");
        let MarkupNode::Element { tag, children, .. } = &nodes[0] else {
            panic!("expected element");
        };
        assert_eq!(tag, "div");
        assert_eq!(children.len(), 2);
        assert_eq!(children[1], MarkupNode::Comment("wf:d0".to_string()));
    }

    #[test]
    fn test_parse_attributes() {
        let nodes = parse(r#"<input type="text" wf-d3 disabled/>"#).expect("Should parse");
        let MarkupNode::Element { attrs, .. } = &nodes[0] else {
            panic!("expected element");
        };
        assert_eq!(attrs.len(), 3);
        assert_eq!(attrs[0].value.as_deref(), Some("text"));
        assert_eq!(attrs[1].name, "wf-d3");
        assert_eq!(attrs[1].value, None);
        assert_eq!(attrs[2].name, "disabled");
    }

    #[test]
    fn test_parse_mismatched_close_tag_fails() {
        let errs = parse("<div><p>a</div></p>").expect_err("Should fail");
        assert!(!errs.is_empty());
        let msg = errs[0].to_string();
        assert!(msg.contains("mismatched") || msg.contains("Unexpected"), "{msg}");
    }

    #[test]
    fn test_parse_unclosed_element_fails() {
        assert!(parse("<div>").is_err());
    }
}
