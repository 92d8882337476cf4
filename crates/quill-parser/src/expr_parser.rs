//! EEL expression engine.
//!
//! Precedence climbing over the [`EEL`](crate::precedence::EEL) table for
//! binary operators, with ternaries and arrow functions handled structurally
//! above it. Used standalone by [`parse_eel`](crate::parse_eel) and embedded
//! by the Fusion (`${...}`) and AFX (`{...}`) engines.

use crate::ast::{EelKind, LiteralKind, Node, NodeKind};
use crate::error::ParseError;
use crate::precedence::{Precedence, Table, EEL};
use crate::stream::{Engine, TokenStream};
use quill_lexer::{decode_string, ScannerMode, Token, TokenKind};

const MODE: ScannerMode = ScannerMode::Eel;

/// EEL expression parser over a shared token stream.
pub struct EelParser<'s, 'src> {
    stream: &'s mut TokenStream<'src>,
}

impl<'src> Engine<'src> for EelParser<'_, 'src> {
    fn stream(&mut self) -> &mut TokenStream<'src> {
        self.stream
    }
}

impl<'s, 'src> EelParser<'s, 'src> {
    pub fn new(stream: &'s mut TokenStream<'src>) -> Self {
        Self { stream }
    }

    /// Parse one expression that must span the rest of the input.
    pub fn parse_standalone(mut self) -> Result<Node, ParseError> {
        let expression = self.expression()?;
        let token = self.stream.peek(MODE)?;
        if token.kind != TokenKind::Eof {
            return Err(ParseError::unexpected(&token, &["an operator", "end of input"]));
        }
        Ok(expression)
    }

    /// Parse a full expression: arrow, ternary or binary.
    pub fn expression(&mut self) -> Result<Node, ParseError> {
        let at = self.stream.peek(MODE)?.span;
        self.nested(at, |p| p.ternary())
    }

    // =========================================================================
    // Operators
    // =========================================================================

    /// `condition ? consequence : alternative`, right-associative: both
    /// branches are full expressions.
    fn ternary(&mut self) -> Result<Node, ParseError> {
        let condition = self.binary(Precedence::LogicalOr)?;
        if self.stream.eat(MODE, TokenKind::Question)?.is_none() {
            return Ok(condition);
        }
        let consequence = self.expression()?;
        self.stream.expect(MODE, TokenKind::Colon)?;
        let alternative = self.expression()?;

        let mut node = Node::new(
            NodeKind::Eel(EelKind::Ternary),
            self.stream.span_from(condition.span),
        );
        node.push_field("condition", condition);
        node.push_field("consequence", consequence);
        node.push_field("alternative", alternative);
        Ok(node)
    }

    fn binary(&mut self, min: Precedence) -> Result<Node, ParseError> {
        let mut left = self.unary()?;
        loop {
            let token = self.stream.peek(MODE)?;
            let Some(op) = EEL.lookup(token.kind) else {
                break;
            };
            if op.precedence < min {
                break;
            }
            self.stream.next(MODE)?;
            let right = self.binary(Table::right_operand_min(op))?;

            let mut node = Node::leaf(
                NodeKind::Eel(EelKind::Binary),
                self.stream.span_from(left.span),
                token.text,
            );
            node.push_field("left", left);
            node.push_field("right", right);
            left = node;
        }
        Ok(left)
    }

    fn unary(&mut self) -> Result<Node, ParseError> {
        let token = self.stream.peek(MODE)?;
        if token.kind != TokenKind::Not {
            return self.primary();
        }
        self.stream.next(MODE)?;
        let argument = self.nested(token.span, |p| p.unary())?;
        let mut node = Node::leaf(
            NodeKind::Eel(EelKind::Not),
            self.stream.span_from(token.span),
            token.text,
        );
        node.push_field("argument", argument);
        Ok(node)
    }

    // =========================================================================
    // Primary terms
    // =========================================================================

    fn primary(&mut self) -> Result<Node, ParseError> {
        let token = self.stream.peek(MODE)?;
        match token.kind {
            TokenKind::String => {
                self.stream.next(MODE)?;
                Ok(Node::leaf(
                    NodeKind::Literal(LiteralKind::String),
                    token.span,
                    decode_string(token.text),
                ))
            }
            TokenKind::Number => {
                self.stream.next(MODE)?;
                Ok(Node::leaf(NodeKind::Literal(LiteralKind::Number), token.span, token.text))
            }
            TokenKind::Minus if self.number_follows(&token) => self.negative_number(),
            TokenKind::Boolean => {
                self.stream.next(MODE)?;
                Ok(Node::leaf(NodeKind::Literal(LiteralKind::Boolean), token.span, token.text))
            }
            TokenKind::Null => {
                self.stream.next(MODE)?;
                Ok(Node::leaf(NodeKind::Literal(LiteralKind::Null), token.span, token.text))
            }
            TokenKind::LBracket => self.array(),
            TokenKind::LBrace => self.object(),
            TokenKind::LParen => self.parenthesized_or_arrow(),
            TokenKind::Identifier => self.object_path(),
            _ => Err(ParseError::unexpected(&token, &["an expression"])),
        }
    }

    /// A `-` immediately followed by a digit is a sign, not an operator.
    fn number_follows(&self, minus: &Token<'_>) -> bool {
        self.stream.source()[minus.span.end..].starts_with(|c: char| c.is_ascii_digit())
    }

    fn negative_number(&mut self) -> Result<Node, ParseError> {
        let minus = self.stream.next(MODE)?;
        let number = self.stream.expect(MODE, TokenKind::Number)?;
        let span = minus.span.to(number.span);
        Ok(Node::leaf(
            NodeKind::Literal(LiteralKind::Number),
            span,
            &self.stream.source()[span.start..span.end],
        ))
    }

    fn array(&mut self) -> Result<Node, ParseError> {
        let open = self.stream.next(MODE)?;
        let items = self.comma_separated(TokenKind::RBracket, |p| p.expression())?;
        let mut node = Node::new(NodeKind::Eel(EelKind::Array), self.stream.span_from(open.span));
        node.children = items;
        Ok(node)
    }

    fn object(&mut self) -> Result<Node, ParseError> {
        let open = self.stream.next(MODE)?;
        let pairs = self.comma_separated(TokenKind::RBrace, |p| p.pair())?;
        let mut node = Node::new(NodeKind::Eel(EelKind::Object), self.stream.span_from(open.span));
        node.children = pairs;
        Ok(node)
    }

    fn pair(&mut self) -> Result<Node, ParseError> {
        let key = self.stream.expect(MODE, TokenKind::Identifier)?;
        self.stream.expect(MODE, TokenKind::Colon)?;
        let value = self.expression()?;

        let mut node = Node::new(NodeKind::Eel(EelKind::Pair), self.stream.span_from(key.span));
        node.push_field(
            "key",
            Node::leaf(NodeKind::Eel(EelKind::Identifier), key.span, key.text),
        );
        node.push_field("value", value);
        Ok(node)
    }

    /// `(expr)` or `(params) => body`. Arrow parameters are tried first and
    /// the stream rewound if the `=>` never shows up.
    fn parenthesized_or_arrow(&mut self) -> Result<Node, ParseError> {
        let snapshot = self.stream.snapshot();
        if let Some(parameters) = self.arrow_parameters()? {
            return self.arrow_function(parameters);
        }
        self.stream.restore(snapshot);

        let open = self.stream.next(MODE)?;
        let inner = self.expression()?;
        self.expect_closing(TokenKind::RParen)?;
        let mut node = Node::new(
            NodeKind::Eel(EelKind::Parenthesized),
            self.stream.span_from(open.span),
        );
        node.push(inner);
        Ok(node)
    }

    fn arrow_parameters(&mut self) -> Result<Option<Node>, ParseError> {
        let open = self.stream.next(MODE)?;
        let mut parameters = Node::new(NodeKind::Eel(EelKind::Parameters), open.span);
        loop {
            let token = self.stream.peek(MODE)?;
            match token.kind {
                TokenKind::RParen => break,
                TokenKind::Identifier => {
                    self.stream.next(MODE)?;
                    parameters.push_field(
                        "parameter",
                        Node::leaf(NodeKind::Eel(EelKind::Identifier), token.span, token.text),
                    );
                    if self.stream.eat(MODE, TokenKind::Comma)?.is_none() {
                        break;
                    }
                }
                _ => return Ok(None),
            }
        }
        if self.stream.eat(MODE, TokenKind::RParen)?.is_none() || !self.stream.at(MODE, TokenKind::Arrow)? {
            return Ok(None);
        }
        parameters.span = self.stream.span_from(open.span);
        Ok(Some(parameters))
    }

    /// Body is `{ expr }` or a bare expression; either way a single expression
    /// that extends as far right as possible.
    fn arrow_function(&mut self, parameters: Node) -> Result<Node, ParseError> {
        self.stream.expect(MODE, TokenKind::Arrow)?;
        let start = parameters.span;

        let body = if self.braced_body_follows()? {
            let open = self.stream.next(MODE)?;
            let body = self.nested(open.span, |p| p.expression())?;
            self.expect_closing(TokenKind::RBrace)?;
            body
        } else {
            self.expression()?
        };

        let mut node = Node::new(NodeKind::Eel(EelKind::ArrowFunction), start);
        node.push_field("parameters", parameters);
        node.push_field("body", body);
        node.span = self.stream.span_from(start);
        Ok(node)
    }

    /// `{` after `=>` opens a braced body unless it reads as an object
    /// literal (`{}` or `{ key: ...`).
    fn braced_body_follows(&mut self) -> Result<bool, ParseError> {
        if !self.stream.at(MODE, TokenKind::LBrace)? {
            return Ok(false);
        }
        let snapshot = self.stream.snapshot();
        self.stream.next(MODE)?;
        let first = self.stream.next(MODE)?;
        let is_object = match first.kind {
            TokenKind::RBrace => true,
            TokenKind::Identifier => self.stream.at(MODE, TokenKind::Colon)?,
            _ => false,
        };
        self.stream.restore(snapshot);
        Ok(!is_object)
    }

    // =========================================================================
    // Object paths
    // =========================================================================

    /// An identifier or method call followed greedily by `.segment` and
    /// `[index]` suffixes.
    fn object_path(&mut self) -> Result<Node, ParseError> {
        let first = self.path_segment()?;
        let start = first.span;
        let mut node = Node::new(NodeKind::Eel(EelKind::ObjectPath), start);
        node.push(first);

        loop {
            let token = self.stream.peek(MODE)?;
            match token.kind {
                TokenKind::Dot => {
                    self.stream.next(MODE)?;
                    let segment = self.path_segment()?;
                    node.push(segment);
                }
                TokenKind::LBracket => {
                    self.stream.next(MODE)?;
                    let index = self.expression()?;
                    self.expect_closing(TokenKind::RBracket)?;
                    let mut access = Node::new(
                        NodeKind::Eel(EelKind::OffsetAccess),
                        self.stream.span_from(token.span),
                    );
                    access.push_field("index", index);
                    node.push(access);
                }
                _ => break,
            }
        }

        node.span = self.stream.span_from(start);
        Ok(node)
    }

    fn path_segment(&mut self) -> Result<Node, ParseError> {
        let name = self.stream.expect(MODE, TokenKind::Identifier)?;
        let identifier = Node::leaf(NodeKind::Eel(EelKind::Identifier), name.span, name.text);
        if !self.stream.at(MODE, TokenKind::LParen)? {
            return Ok(identifier);
        }

        let open = self.stream.next(MODE)?;
        let mut arguments = Node::new(NodeKind::Eel(EelKind::Arguments), open.span);
        for argument in self.comma_separated(TokenKind::RParen, |p| p.expression())? {
            arguments.push_field("parameter", argument);
        }
        arguments.span = self.stream.span_from(open.span);

        let mut call = Node::new(NodeKind::Eel(EelKind::MethodCall), name.span);
        call.push_field("name", identifier);
        call.push_field("arguments", arguments);
        call.span = self.stream.span_from(name.span);
        Ok(call)
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    /// Items separated by commas up to and including `close`. A trailing comma
    /// is accepted.
    fn comma_separated(
        &mut self,
        close: TokenKind,
        mut item: impl FnMut(&mut Self) -> Result<Node, ParseError>,
    ) -> Result<Vec<Node>, ParseError> {
        let mut items = Vec::new();
        while !self.stream.at(MODE, close)? {
            items.push(item(self)?);
            if self.stream.eat(MODE, TokenKind::Comma)?.is_none() {
                break;
            }
        }
        let token = self.stream.peek(MODE)?;
        if token.kind != close {
            return Err(ParseError::unexpected(&token, &["`,`", close.describe()]));
        }
        self.stream.next(MODE)?;
        Ok(items)
    }

    fn expect_closing(&mut self, close: TokenKind) -> Result<Token<'src>, ParseError> {
        let token = self.stream.peek(MODE)?;
        if token.kind != close {
            return Err(ParseError::unexpected(&token, &["an operator", close.describe()]));
        }
        self.stream.next(MODE)
    }
}
