//! AFX template engine.
//!
//! Parses the body of an ``afx`...` `` literal: text runs, comments,
//! `{expression}` slots and elements. Elements are matched by name against a
//! stack of open elements so a mismatched closing tag can point at every
//! opening tag involved. Every slot is handed to the EEL engine.

use crate::ast::{AfxKind, FusionKind, LiteralKind, Node, NodeKind};
use crate::error::{ErrorKind, ParseError};
use crate::expr_parser::EelParser;
use crate::stream::{Engine, TokenStream};
use quill_lexer::{decode_string, ScannerMode, Span, Token, TokenKind};

const CONTENT: ScannerMode = ScannerMode::AfxContent;
const TAG: ScannerMode = ScannerMode::AfxTag;

#[derive(Debug, Clone, Copy)]
struct OpenElement<'src> {
    name: &'src str,
    tag: Span,
}

/// How an element body ended.
enum BodyEnd<'src> {
    /// `<` of a closing tag; the `/` is still unconsumed.
    Closing(Token<'src>),
    /// The literal's closing backtick, not consumed.
    Terminator(Token<'src>),
}

pub struct AfxParser<'s, 'src> {
    stream: &'s mut TokenStream<'src>,
    /// The ``afx` `` opener, where an unterminated literal is reported.
    opener: Span,
    open: Vec<OpenElement<'src>>,
}

impl<'src> Engine<'src> for AfxParser<'_, 'src> {
    fn stream(&mut self) -> &mut TokenStream<'src> {
        self.stream
    }
}

impl<'s, 'src> AfxParser<'s, 'src> {
    pub fn new(stream: &'s mut TokenStream<'src>, opener: Span) -> Self {
        Self {
            stream,
            opener,
            open: Vec::new(),
        }
    }

    /// Parse a template body up to (not including) the closing backtick.
    pub fn template(mut self) -> Result<Node, ParseError> {
        let start = self.stream.here();
        let mut template = Node::new(NodeKind::Afx(AfxKind::Template), start);

        if let BodyEnd::Closing(lt) = self.body(&mut template)? {
            self.stream.expect(TAG, TokenKind::Slash)?;
            let (_, name) = self.element_name()?;
            self.stream.expect(TAG, TokenKind::Gt)?;
            return Err(ParseError::new(
                ErrorKind::MismatchedClosingTag,
                format!("Closing tag `</{name}>` has no matching opening element"),
                self.stream.span_from(lt.span),
            ));
        }

        template.span = match (template.children.first(), template.children.last()) {
            (Some(first), Some(last)) => first.span.to(last.span),
            _ => start,
        };
        Ok(template)
    }

    // =========================================================================
    // Content
    // =========================================================================

    /// Parse content into `parent` until a closing tag or the terminator.
    fn body(&mut self, parent: &mut Node) -> Result<BodyEnd<'src>, ParseError> {
        loop {
            let token = self.stream.peek(CONTENT)?;
            match token.kind {
                TokenKind::Text => {
                    self.stream.next(CONTENT)?;
                    parent.push(Node::leaf(NodeKind::Afx(AfxKind::Text), token.span, token.text));
                }
                TokenKind::AfxComment => {
                    self.stream.next(CONTENT)?;
                    parent.push(Node::leaf(NodeKind::Afx(AfxKind::Comment), token.span, token.text));
                }
                TokenKind::LBrace => {
                    let slot = self.slot(CONTENT)?;
                    parent.push(slot);
                }
                TokenKind::Lt => {
                    let lt = self.stream.next(CONTENT)?;
                    if self.stream.at(TAG, TokenKind::Slash)? {
                        return Ok(BodyEnd::Closing(lt));
                    }
                    let element = self.element(lt)?;
                    parent.push(element);
                }
                TokenKind::Backtick => return Ok(BodyEnd::Terminator(token)),
                TokenKind::Eof => return Err(self.unterminated()),
                _ => return Err(ParseError::unexpected(&token, &["text", "`<`", "`{`"])),
            }
        }
    }

    // =========================================================================
    // Elements
    // =========================================================================

    fn element(&mut self, lt: Token<'src>) -> Result<Node, ParseError> {
        self.nested(lt.span, |p| p.element_inner(lt))
    }

    fn element_inner(&mut self, lt: Token<'src>) -> Result<Node, ParseError> {
        let (name_node, name) = self.element_name()?;
        let mut attributes = Vec::new();

        let end = loop {
            let token = self.stream.peek(TAG)?;
            match token.kind {
                TokenKind::Identifier | TokenKind::At => attributes.push(self.attribute()?),
                TokenKind::LBrace => attributes.push(self.slot(TAG)?),
                TokenKind::SlashGt | TokenKind::Gt => break self.stream.next(TAG)?,
                TokenKind::Eof => return Err(self.unterminated()),
                _ => {
                    return Err(ParseError::unexpected(
                        &token,
                        &["attribute", "`>`", "`/>`"],
                    ))
                }
            }
        };

        let tag_span = self.stream.span_from(lt.span);
        if end.kind == TokenKind::SlashGt {
            let mut element = Node::new(NodeKind::Afx(AfxKind::SelfClosingElement), tag_span);
            push_tag_parts(&mut element, name_node, attributes);
            return Ok(element);
        }

        let mut opening = Node::new(NodeKind::Afx(AfxKind::OpeningElement), tag_span);
        push_tag_parts(&mut opening, name_node, attributes);

        let mut element = Node::new(NodeKind::Afx(AfxKind::Element), tag_span);
        element.push_field("open_tag", opening);

        self.open.push(OpenElement { name, tag: tag_span });
        let end = self.body(&mut element)?;
        self.open.pop();

        let closing_lt = match end {
            BodyEnd::Closing(lt) => lt,
            BodyEnd::Terminator(terminator) => {
                return Err(ParseError::new(
                    ErrorKind::UnclosedElement,
                    format!("Element `<{name}>` is never closed"),
                    tag_span,
                )
                .with_related(terminator.span))
            }
        };

        self.stream.expect(TAG, TokenKind::Slash)?;
        let (closing_name_node, closing_name) = self.element_name()?;
        self.stream.expect(TAG, TokenKind::Gt)?;
        let closing_span = self.stream.span_from(closing_lt.span);

        if closing_name != name {
            let mut error = ParseError::new(
                ErrorKind::MismatchedClosingTag,
                format!("Expected `</{name}>`, found `</{closing_name}>`"),
                closing_span,
            )
            .with_related(tag_span);
            if let Some(outer) = self.open.iter().rev().find(|e| e.name == closing_name) {
                error = error.with_related(outer.tag);
            }
            error.expected = vec![format!("`</{name}>`")];
            error.found = Some(format!("`</{closing_name}>`"));
            return Err(error);
        }

        let mut closing = Node::new(NodeKind::Afx(AfxKind::ClosingElement), closing_span);
        closing.push_field("name", closing_name_node);
        element.push_field("close_tag", closing);
        element.span = self.stream.span_from(lt.span);
        Ok(element)
    }

    /// `name`, `name.sub`, or a namespaced `Package.Name:Type.Name`. Returns
    /// the node and the exact source text used for tag matching.
    fn element_name(&mut self) -> Result<(Node, &'src str), ParseError> {
        let first = self.stream.expect(TAG, TokenKind::Identifier)?;
        let package_end = self.dotted_tail()?;

        if self.stream.immediate_char() != Some(':') {
            let span = first.span.to(package_end);
            let text = &self.stream.source()[span.start..span.end];
            return Ok((Node::leaf(NodeKind::Afx(AfxKind::TagName), span, text), text));
        }

        let package_span = first.span.to(package_end);
        self.stream.expect(TAG, TokenKind::Colon)?;
        let type_first = self.stream.expect(TAG, TokenKind::Identifier)?;
        let type_span = type_first.span.to(self.dotted_tail()?);

        let source = self.stream.source();
        let span = first.span.to(type_span);
        let mut node = Node::new(NodeKind::Fusion(FusionKind::Type), span);
        node.push_field(
            "namespace",
            Node::leaf(
                NodeKind::Fusion(FusionKind::PackageName),
                package_span,
                &source[package_span.start..package_span.end],
            ),
        );
        node.push_field(
            "name",
            Node::leaf(
                NodeKind::Fusion(FusionKind::TypeName),
                type_span,
                &source[type_span.start..type_span.end],
            ),
        );
        Ok((node, &source[span.start..span.end]))
    }

    /// Consume `.ident` segments glued to the previous token. Returns the span
    /// of the last consumed token.
    fn dotted_tail(&mut self) -> Result<Span, ParseError> {
        while self.stream.immediate_char() == Some('.') {
            self.stream.next(TAG)?;
            if !self.stream.immediate_char().is_some_and(is_identifier_char) {
                let token = self.stream.peek(TAG)?;
                return Err(ParseError::unexpected_kind(&token, TokenKind::Identifier));
            }
            self.stream.expect(TAG, TokenKind::Identifier)?;
        }
        Ok(self.stream.last_span())
    }

    // =========================================================================
    // Attributes and slots
    // =========================================================================

    fn attribute(&mut self) -> Result<Node, ParseError> {
        let first = self.stream.next(TAG)?;
        if first.kind == TokenKind::At {
            self.stream.expect(TAG, TokenKind::Identifier)?;
        }
        if self.stream.at(TAG, TokenKind::Dot)? {
            self.stream.next(TAG)?;
            self.stream.expect(TAG, TokenKind::Identifier)?;
            self.dotted_tail()?;
        }
        let name_span = self.stream.span_from(first.span);
        let name = &self.stream.source()[name_span.start..name_span.end];

        let mut attribute = Node::new(NodeKind::Afx(AfxKind::Attribute), name_span);
        attribute.push_field(
            "name",
            Node::leaf(NodeKind::Afx(AfxKind::AttributeName), name_span, name),
        );

        if self.stream.eat(TAG, TokenKind::Equals)?.is_some() {
            let token = self.stream.peek(TAG)?;
            let value = match token.kind {
                TokenKind::String => {
                    self.stream.next(TAG)?;
                    Node::leaf(
                        NodeKind::Literal(LiteralKind::String),
                        token.span,
                        decode_string(token.text),
                    )
                }
                TokenKind::LBrace => self.slot(TAG)?,
                _ => return Err(ParseError::unexpected(&token, &["string", "`{`"])),
            };
            attribute.push_field("value", value);
            attribute.span = self.stream.span_from(name_span);
        }
        Ok(attribute)
    }

    /// `{expression}` or `{...spread}`, delegated to the EEL engine.
    fn slot(&mut self, mode: ScannerMode) -> Result<Node, ParseError> {
        let open = self.stream.expect(mode, TokenKind::LBrace)?;
        let spread = self.stream.eat(ScannerMode::Eel, TokenKind::Ellipsis)?.is_some();

        let expression = match self.slot_expression() {
            Ok(expression) => expression,
            Err(e) => return Err(e.with_context("expression slot", open.span.to(self.stream.here()))),
        };

        let kind = if spread {
            AfxKind::Spread
        } else {
            AfxKind::ExpressionSlot
        };
        let mut node = Node::new(NodeKind::Afx(kind), self.stream.span_from(open.span));
        node.push_field("expression", expression);
        Ok(node)
    }

    fn slot_expression(&mut self) -> Result<Node, ParseError> {
        let expression = EelParser::new(&mut *self.stream).expression()?;
        let token = self.stream.peek(ScannerMode::Eel)?;
        if token.kind != TokenKind::RBrace {
            return Err(ParseError::unexpected(&token, &["an operator", "`}`"]));
        }
        self.stream.next(ScannerMode::Eel)?;
        Ok(expression)
    }

    fn unterminated(&self) -> ParseError {
        ParseError::new(
            ErrorKind::UnterminatedLiteral,
            "Unterminated afx literal",
            self.opener,
        )
    }
}

fn push_tag_parts(node: &mut Node, name: Node, attributes: Vec<Node>) {
    node.push_field("name", name);
    for attribute in attributes {
        node.push_field("attribute", attribute);
    }
}

fn is_identifier_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-'
}

#[cfg(test)]
mod tests {
    use crate::ast::Node;
    use crate::error::ErrorKind;
    use crate::{parse_fusion, ParseResult};
    use pretty_assertions::assert_eq;

    /// Helper: parse `x = afx`...`` and return the template node.
    fn template(body: &str) -> Node {
        let source = format!("x = afx`{body}`");
        let root = parse_fusion(&source)
            .into_result()
            .unwrap_or_else(|errors| panic!("parse of {source:?} failed: {errors:?}"));
        let property = &root.children[0].children[0];
        let assignment = &property.children[1];
        let dsl = assignment.field("value").unwrap();
        dsl.field("content").unwrap().clone()
    }

    fn parse(body: &str) -> ParseResult {
        parse_fusion(&format!("x = afx`{body}`"))
    }

    // =========================================================================
    // Elements
    // =========================================================================

    #[test]
    fn test_nested_elements() {
        assert_eq!(
            template("<a><b></b></a>").to_sexp(),
            "(afx_template (afx_element open_tag: (afx_opening_element name: (afx_tag_name \"a\")) (afx_element open_tag: (afx_opening_element name: (afx_tag_name \"b\")) close_tag: (afx_closing_element name: (afx_tag_name \"b\"))) close_tag: (afx_closing_element name: (afx_tag_name \"a\"))))"
        );
    }

    #[test]
    fn test_self_closing_with_attributes() {
        let t = template("<img src=\"a.png\" alt={props.alt} {...rest} @if.show={true}/>");
        let element = &t.children[0];
        assert_eq!(element.kind.name(), "afx_element_self_closing");
        let attributes: Vec<_> = element.fields_named("attribute").collect();
        assert_eq!(attributes.len(), 4);
        assert_eq!(attributes[0].field("value").and_then(|v| v.value.as_deref()), Some("a.png"));
        assert_eq!(attributes[1].field("value").unwrap().kind.name(), "afx_expression");
        assert_eq!(attributes[2].kind.name(), "afx_spread");
        assert_eq!(
            attributes[3].field("name").and_then(|n| n.value.as_deref()),
            Some("@if.show")
        );
    }

    #[test]
    fn test_boolean_attribute_without_value() {
        let t = template("<input disabled/>");
        let attribute = t.children[0].field("attribute").unwrap();
        assert!(attribute.field("value").is_none());
    }

    #[test]
    fn test_namespaced_element() {
        let t = template("<Neos.Fusion:Tag tagName=\"p\"></Neos.Fusion:Tag>");
        let opening = t.children[0].field("open_tag").unwrap();
        let name = opening.field("name").unwrap();
        assert_eq!(name.kind.name(), "type");
        assert_eq!(name.field("namespace").and_then(|n| n.value.as_deref()), Some("Neos.Fusion"));
        assert_eq!(name.field("name").and_then(|n| n.value.as_deref()), Some("Tag"));
    }

    // =========================================================================
    // Content
    // =========================================================================

    #[test]
    fn test_text_and_slots() {
        let t = template("<p>Hello {name}, welcome <!-- note --></p>");
        let kinds: Vec<_> = t.children[0].children.iter().map(|c| c.kind.name()).collect();
        assert_eq!(
            kinds,
            vec!["afx_opening_element", "afx_text", "afx_expression", "afx_text", "afx_comment", "afx_closing_element"]
        );
        assert_eq!(t.children[0].children[1].value.as_deref(), Some("Hello"));
        assert_eq!(t.children[0].children[3].value.as_deref(), Some(", welcome"));
    }

    #[test]
    fn test_text_run_is_single_node() {
        let t = template("  one two\n three  ");
        assert_eq!(t.children.len(), 1);
        assert_eq!(t.children[0].value.as_deref(), Some("one two\n three"));
    }

    #[test]
    fn test_empty_template() {
        assert!(template("").children.is_empty());
    }

    // =========================================================================
    // Errors
    // =========================================================================

    #[test]
    fn test_mismatched_closing_tag() {
        let source = "x = afx`<a><b></a>`";
        let result = parse_fusion(source);
        let err = &result.errors()[0];
        assert_eq!(err.kind, ErrorKind::MismatchedClosingTag);
        assert_eq!(&source[err.span.start..err.span.end], "</a>");
        let related: Vec<_> = err.related.iter().map(|s| &source[s.start..s.end]).collect();
        assert_eq!(related, vec!["<b>", "<a>"]);
        assert!(err.context.iter().any(|c| c.construct == "afx template"));
    }

    #[test]
    fn test_stray_closing_tag() {
        let result = parse("</a>");
        assert_eq!(result.errors()[0].kind, ErrorKind::MismatchedClosingTag);
    }

    #[test]
    fn test_unclosed_element() {
        let source = "x = afx`<a><b></b>`";
        let result = parse_fusion(source);
        let err = &result.errors()[0];
        assert_eq!(err.kind, ErrorKind::UnclosedElement);
        assert_eq!(&source[err.span.start..err.span.end], "<a>");
    }

    #[test]
    fn test_unterminated_literal() {
        let source = "x = afx`<a>";
        let result = parse_fusion(source);
        assert!(result.is_fatal());
        let err = &result.errors()[0];
        assert_eq!(err.kind, ErrorKind::UnterminatedLiteral);
        assert_eq!(err.span.start, 4);
    }

    #[test]
    fn test_slot_error_carries_context() {
        let result = parse("<p>{a +}</p>");
        let err = &result.errors()[0];
        assert_eq!(err.kind, ErrorKind::UnexpectedToken);
        let constructs: Vec<_> = err.context.iter().map(|c| c.construct).collect();
        assert_eq!(constructs, vec!["expression slot", "afx template"]);
    }
}
