//! RuneScript engine.
//!
//! Scripts are a `[trigger,subject]` header, optional parameter and return
//! type lists, and a statement sequence running up to the next header.
//! Plain expressions are primaries only: operators exist in `if`/`while`
//! conditions and inside `calc(...)`, each with its own precedence table.

use crate::ast::{LiteralKind, Node, NodeKind, RuneKind};
use crate::error::{ErrorKind, ParseError};
use crate::precedence::{foreign_rune_operator, Precedence, Table, RUNE_ARITHMETIC, RUNE_CONDITION};
use crate::stream::{Engine, TokenStream};
use quill_lexer::{ScannerMode, Span, Token, TokenKind};

const MODE: ScannerMode = ScannerMode::RuneScript;
const STRING: ScannerMode = ScannerMode::RuneString;

/// RuneScript parser over a token stream.
pub struct RuneParser<'s, 'src> {
    stream: &'s mut TokenStream<'src>,
    errors: Vec<ParseError>,
}

impl<'src> Engine<'src> for RuneParser<'_, 'src> {
    fn stream(&mut self) -> &mut TokenStream<'src> {
        self.stream
    }
}

impl<'s, 'src> RuneParser<'s, 'src> {
    pub fn new(stream: &'s mut TokenStream<'src>) -> Self {
        Self {
            stream,
            errors: Vec::new(),
        }
    }

    pub fn into_errors(self) -> Vec<ParseError> {
        self.errors
    }

    /// Parse a source file of zero or more scripts.
    ///
    /// A script that fails with a syntax error is replaced by an `ERROR` node
    /// running to the next line that opens a header.
    pub fn source_file(&mut self) -> Result<Node, ParseError> {
        let source = self.stream.source();
        let mut file = Node::new(
            NodeKind::Rune(RuneKind::SourceFile),
            Span::new(0, source.len(), 1, 1),
        );

        loop {
            let token = self.stream.peek(MODE)?;
            let parsed = match token.kind {
                TokenKind::Eof => break,
                TokenKind::LBracket => self.script(),
                _ => Err(ParseError::unexpected(&token, &["script header `[trigger,name]`"])),
            };
            match parsed {
                Ok(script) => file.push(script),
                Err(error) if error.is_fatal() || !self.stream.options().recover => return Err(error),
                Err(error) => {
                    self.errors.push(error);
                    file.push(self.recover(token.span));
                }
            }
        }

        Ok(file)
    }

    fn recover(&mut self, start: Span) -> Node {
        let source = self.stream.source();
        let from = self.stream.offset().max(start.start);
        let end = source[from..]
            .find("\n[")
            .map_or(source.len(), |index| from + index);
        self.stream.skip_to(end);
        Node::new(
            NodeKind::Error,
            Span::new(start.start, end, start.line, start.column),
        )
    }

    // =========================================================================
    // Scripts
    // =========================================================================

    fn script(&mut self) -> Result<Node, ParseError> {
        let open = self.stream.next(MODE)?;
        let trigger = self.word("trigger")?;
        self.stream.expect(MODE, TokenKind::Comma)?;
        let subject = self.word("script name")?;
        self.stream.expect(MODE, TokenKind::RBracket)?;

        let mut script = Node::new(NodeKind::Rune(RuneKind::Script), open.span);
        script.push_field("trigger", trigger);
        script.push_field("subject", subject);

        if self.stream.at(MODE, TokenKind::LParen)? {
            if self.parameters_follow()? {
                let parameters = self.parameter_list()?;
                script.push_field("parameters", parameters);
                if self.stream.at(MODE, TokenKind::LParen)? {
                    let returns = self.type_list()?;
                    script.push_field("returns", returns);
                }
            } else {
                let returns = self.type_list()?;
                script.push_field("returns", returns);
            }
        }

        loop {
            let token = self.stream.peek(MODE)?;
            if matches!(token.kind, TokenKind::Eof | TokenKind::LBracket) {
                break;
            }
            let statement = self.statement()?;
            script.push_field("statement", statement);
        }

        script.span = self.stream.span_from(open.span);
        Ok(script)
    }

    /// The first parenthesised list after a header is the parameter list if
    /// it is empty or its first entry is `type $name`.
    fn parameters_follow(&mut self) -> Result<bool, ParseError> {
        let saved = self.stream.snapshot();
        self.stream.next(MODE)?;
        let first = self.stream.next(MODE)?;
        let follows = first.kind == TokenKind::RParen
            || (is_identifier_like(first.kind) && self.stream.at(MODE, TokenKind::Dollar)?);
        self.stream.restore(saved);
        Ok(follows)
    }

    fn parameter_list(&mut self) -> Result<Node, ParseError> {
        let open = self.stream.next(MODE)?;
        let parameters = self.comma_separated(TokenKind::RParen, |p| p.parameter())?;
        let mut node = Node::new(
            NodeKind::Rune(RuneKind::ParameterList),
            self.stream.span_from(open.span),
        );
        for parameter in parameters {
            node.push_field("parameter", parameter);
        }
        Ok(node)
    }

    /// `type $name`, where the type may be an `*array` type.
    fn parameter(&mut self) -> Result<Node, ParseError> {
        let type_name = self.type_name()?;
        let start = type_name.span;
        let name = self.variable(RuneKind::LocalVariable)?;
        let mut node = Node::new(NodeKind::Rune(RuneKind::Parameter), start);
        node.push_field("type", type_name);
        node.push_field("name", name);
        node.span = self.stream.span_from(start);
        Ok(node)
    }

    fn type_list(&mut self) -> Result<Node, ParseError> {
        let open = self.stream.next(MODE)?;
        let types = self.comma_separated(TokenKind::RParen, |p| p.type_name())?;
        let mut node = Node::new(
            NodeKind::Rune(RuneKind::TypeList),
            self.stream.span_from(open.span),
        );
        for type_name in types {
            node.push_field("type", type_name);
        }
        Ok(node)
    }

    fn type_name(&mut self) -> Result<Node, ParseError> {
        let token = self.stream.peek(MODE)?;
        if !matches!(token.kind, TokenKind::Identifier | TokenKind::TypeArray) {
            return Err(ParseError::unexpected(&token, &["type name"]));
        }
        self.stream.next(MODE)?;
        Ok(Node::leaf(NodeKind::Rune(RuneKind::TypeName), token.span, token.text))
    }

    /// Any word-shaped token, as an identifier. Headers accept numbers and
    /// keywords as names.
    fn word(&mut self, what: &str) -> Result<Node, ParseError> {
        let token = self.stream.peek(MODE)?;
        if !(is_variable_name(token.kind) || token.kind == TokenKind::Number) {
            return Err(ParseError::unexpected(&token, &[what]));
        }
        self.stream.next(MODE)?;
        Ok(Node::leaf(NodeKind::Rune(RuneKind::Identifier), token.span, token.text))
    }

    // =========================================================================
    // Statements
    // =========================================================================

    fn statement(&mut self) -> Result<Node, ParseError> {
        let at = self.stream.peek(MODE)?.span;
        self.nested(at, |p| p.statement_inner())
    }

    fn statement_inner(&mut self) -> Result<Node, ParseError> {
        let token = self.stream.peek(MODE)?;
        match token.kind {
            TokenKind::LBrace => self.block(),
            TokenKind::Return => self.return_statement(),
            TokenKind::If => self.if_statement(),
            TokenKind::While => self.while_statement(),
            TokenKind::SwitchType => self.switch_statement(),
            TokenKind::DefType => self.declaration(),
            TokenKind::Semicolon => {
                self.stream.next(MODE)?;
                Ok(Node::new(NodeKind::Rune(RuneKind::EmptyStmt), token.span))
            }
            _ => self.assignment_or_expression(),
        }
    }

    fn block(&mut self) -> Result<Node, ParseError> {
        let open = self.stream.next(MODE)?;
        let mut block = Node::new(NodeKind::Rune(RuneKind::Block), open.span);
        loop {
            let token = self.stream.peek(MODE)?;
            match token.kind {
                TokenKind::RBrace => {
                    self.stream.next(MODE)?;
                    break;
                }
                TokenKind::Eof | TokenKind::LBracket => {
                    return Err(ParseError::new(
                        ErrorKind::UnclosedElement,
                        "Block is never closed",
                        open.span,
                    )
                    .with_related(token.span))
                }
                _ => block.push(self.statement()?),
            }
        }
        block.span = self.stream.span_from(open.span);
        Ok(block)
    }

    /// `return;` or `return(a, b);`
    fn return_statement(&mut self) -> Result<Node, ParseError> {
        let keyword = self.stream.next(MODE)?;
        let mut node = Node::new(NodeKind::Rune(RuneKind::ReturnStmt), keyword.span);
        if self.stream.eat(MODE, TokenKind::LParen)?.is_some() {
            for value in self.comma_separated(TokenKind::RParen, |p| p.expression())? {
                node.push_field("value", value);
            }
        }
        self.expect_semicolon(&[])?;
        node.span = self.stream.span_from(keyword.span);
        Ok(node)
    }

    /// `if (condition) statement [else statement]`. A trailing `else` is
    /// taken by the innermost `if` that can accept it.
    fn if_statement(&mut self) -> Result<Node, ParseError> {
        let keyword = self.stream.next(MODE)?;
        let condition = self.parenthesized_condition()?;
        let consequence = self.statement()?;

        let mut node = Node::new(NodeKind::Rune(RuneKind::IfStmt), keyword.span);
        node.push_field("condition", condition);
        node.push_field("consequence", consequence);
        if self.stream.eat(MODE, TokenKind::Else)?.is_some() {
            let alternative = self.statement()?;
            node.push_field("alternative", alternative);
        }
        node.span = self.stream.span_from(keyword.span);
        Ok(node)
    }

    fn while_statement(&mut self) -> Result<Node, ParseError> {
        let keyword = self.stream.next(MODE)?;
        let condition = self.parenthesized_condition()?;
        let body = self.statement()?;

        let mut node = Node::new(
            NodeKind::Rune(RuneKind::WhileStmt),
            self.stream.span_from(keyword.span),
        );
        node.push_field("condition", condition);
        node.push_field("body", body);
        Ok(node)
    }

    fn parenthesized_condition(&mut self) -> Result<Node, ParseError> {
        let open = self.stream.expect(MODE, TokenKind::LParen)?;
        let condition = self.nested(open.span, |p| p.binary(RUNE_CONDITION, Precedence::LogicalOr))?;
        self.expect_closing(TokenKind::RParen)?;
        Ok(condition)
    }

    /// `switch_type (value) { case ... }`
    fn switch_statement(&mut self) -> Result<Node, ParseError> {
        let keyword = self.stream.next(MODE)?;
        self.stream.expect(MODE, TokenKind::LParen)?;
        let value = self.expression()?;
        self.expect_closing(TokenKind::RParen)?;
        let open = self.stream.expect(MODE, TokenKind::LBrace)?;

        let mut node = Node::new(NodeKind::Rune(RuneKind::SwitchStmt), keyword.span);
        node.push_field(
            "type",
            Node::leaf(NodeKind::Rune(RuneKind::TypeName), keyword.span, keyword.text),
        );
        node.push_field("value", value);
        loop {
            let token = self.stream.peek(MODE)?;
            match token.kind {
                TokenKind::Case => {
                    let case = self.nested(token.span, |p| p.switch_case())?;
                    node.push_field("case", case);
                }
                TokenKind::RBrace => {
                    self.stream.next(MODE)?;
                    break;
                }
                TokenKind::Eof | TokenKind::LBracket => {
                    return Err(ParseError::new(
                        ErrorKind::UnclosedElement,
                        "Switch body is never closed",
                        open.span,
                    )
                    .with_related(token.span))
                }
                _ => return Err(ParseError::unexpected(&token, &["`case`", "`}`"])),
            }
        }
        node.span = self.stream.span_from(keyword.span);
        Ok(node)
    }

    /// `case default :` or `case a, b :`, followed by statements up to the
    /// next case or the end of the switch.
    fn switch_case(&mut self) -> Result<Node, ParseError> {
        let keyword = self.stream.next(MODE)?;
        let mut node = Node::new(NodeKind::Rune(RuneKind::SwitchCase), keyword.span);
        if let Some(default) = self.stream.eat(MODE, TokenKind::Default)? {
            node.value = Some(default.text.to_string());
        } else {
            node.push_field("value", self.expression()?);
            while self.stream.eat(MODE, TokenKind::Comma)?.is_some() {
                node.push_field("value", self.expression()?);
            }
        }
        self.stream.expect(MODE, TokenKind::Colon)?;

        loop {
            let token = self.stream.peek(MODE)?;
            if matches!(
                token.kind,
                TokenKind::Case | TokenKind::RBrace | TokenKind::Eof | TokenKind::LBracket
            ) {
                break;
            }
            node.push(self.statement()?);
        }
        node.span = self.stream.span_from(keyword.span);
        Ok(node)
    }

    /// `def_type $name [= value];` or `def_type $name(size);`
    fn declaration(&mut self) -> Result<Node, ParseError> {
        let keyword = self.stream.next(MODE)?;
        let type_name = Node::leaf(NodeKind::Rune(RuneKind::TypeName), keyword.span, keyword.text);
        let sigil = self.stream.expect(MODE, TokenKind::Dollar)?;
        let name = self.variable_name(&sigil)?;
        let name = Node::leaf(
            NodeKind::Rune(RuneKind::LocalVariable),
            sigil.span.to(name.span),
            name.text,
        );

        let kind = if let Some(open) = self.stream.eat(MODE, TokenKind::LParen)? {
            let size = self.nested(open.span, |p| p.expression())?;
            self.expect_closing(TokenKind::RParen)?;
            self.expect_semicolon(&[])?;
            let mut node = Node::new(NodeKind::Rune(RuneKind::ArrayDeclaration), keyword.span);
            node.push_field("type", type_name);
            node.push_field("name", name);
            node.push_field("size", size);
            node
        } else {
            let mut node = Node::new(NodeKind::Rune(RuneKind::Declaration), keyword.span);
            node.push_field("type", type_name);
            node.push_field("name", name);
            if self.stream.eat(MODE, TokenKind::Equals)?.is_some() {
                node.push_field("value", self.expression()?);
            }
            self.expect_semicolon(&["`=`"])?;
            node
        };
        Ok(Node {
            span: self.stream.span_from(keyword.span),
            ..kind
        })
    }

    /// `$a, %b = x, y;` or a bare `expression;`. The target list is parsed
    /// as expressions and checked once the `=` is seen.
    fn assignment_or_expression(&mut self) -> Result<Node, ParseError> {
        let first = self.expression()?;
        let start = first.span;
        let mut targets = vec![first];
        while self.stream.eat(MODE, TokenKind::Comma)?.is_some() {
            targets.push(self.expression()?);
        }

        if self.stream.eat(MODE, TokenKind::Equals)?.is_none() {
            let token = self.stream.peek(MODE)?;
            if targets.len() > 1 {
                return Err(ParseError::unexpected(&token, &["`=`"]));
            }
            if token.kind != TokenKind::Semicolon {
                let expected: &[&str] = if is_assignable(&targets[0]) {
                    &["`=`", "`;`"]
                } else {
                    &["`;`"]
                };
                return Err(ParseError::unexpected(&token, expected));
            }
            self.stream.next(MODE)?;
            let mut node = Node::new(
                NodeKind::Rune(RuneKind::ExpressionStmt),
                self.stream.span_from(start),
            );
            node.push_field("expression", targets.remove(0));
            return Ok(node);
        }

        if let Some(target) = targets.iter().find(|target| !is_assignable(target)) {
            return Err(ParseError {
                expected: vec!["variable".into()],
                found: Some(target.kind.name().into()),
                ..ParseError::new(
                    ErrorKind::UnexpectedToken,
                    format!("Cannot assign to {}", target.kind.name()),
                    target.span,
                )
            });
        }

        let mut node = Node::new(NodeKind::Rune(RuneKind::Assignment), start);
        for target in targets {
            node.push_field("target", target);
        }
        node.push_field("value", self.expression()?);
        while self.stream.eat(MODE, TokenKind::Comma)?.is_some() {
            node.push_field("value", self.expression()?);
        }
        self.expect_semicolon(&[])?;
        node.span = self.stream.span_from(start);
        Ok(node)
    }

    fn expect_semicolon(&mut self, also: &[&str]) -> Result<Token<'src>, ParseError> {
        let token = self.stream.peek(MODE)?;
        if token.kind != TokenKind::Semicolon {
            let mut expected = also.to_vec();
            expected.push("`;`");
            return Err(ParseError::unexpected(&token, &expected));
        }
        self.stream.next(MODE)
    }

    // =========================================================================
    // Conditions and calc
    // =========================================================================

    /// Precedence climbing over `table`. An operator that only exists in the
    /// sibling table is reported against this table's operators rather than
    /// ending the expression.
    fn binary(&mut self, table: Table, min: Precedence) -> Result<Node, ParseError> {
        let kind = if table.name == RUNE_ARITHMETIC.name {
            RuneKind::Arithmetic
        } else {
            RuneKind::Condition
        };

        let mut left = self.operand(table)?;
        loop {
            let token = self.stream.peek(MODE)?;
            let Some(op) = table.lookup(token.kind) else {
                if foreign_rune_operator(&table, token.kind) {
                    let expected: Vec<&str> =
                        table.operators().iter().map(|op| op.token.describe()).collect();
                    let construct = if kind == RuneKind::Arithmetic {
                        "calc expression"
                    } else {
                        "condition"
                    };
                    return Err(ParseError {
                        message: format!(
                            "Operator `{}` is not allowed in a {} expression",
                            token.text, table.name
                        ),
                        ..ParseError::unexpected(&token, &expected)
                    }
                    .with_context(construct, left.span.to(token.span)));
                }
                break;
            };
            if op.precedence < min {
                break;
            }
            self.stream.next(MODE)?;
            let right = self.binary(table, Table::right_operand_min(op))?;

            let mut node = Node::leaf(
                NodeKind::Rune(kind),
                self.stream.span_from(left.span),
                token.text,
            );
            node.push_field("left", left);
            node.push_field("right", right);
            left = node;
        }
        Ok(left)
    }

    fn operand(&mut self, table: Table) -> Result<Node, ParseError> {
        if self.stream.at(MODE, TokenKind::LParen)? {
            self.parenthesized(|p| p.binary(table, Precedence::LogicalOr))
        } else {
            self.expression()
        }
    }

    fn calc(&mut self) -> Result<Node, ParseError> {
        let keyword = self.stream.next(MODE)?;
        let open = self.stream.expect(MODE, TokenKind::LParen)?;
        let expression = self.nested(open.span, |p| p.binary(RUNE_ARITHMETIC, Precedence::LogicalOr))?;
        self.expect_closing(TokenKind::RParen)?;

        let mut node = Node::new(
            NodeKind::Rune(RuneKind::Calc),
            self.stream.span_from(keyword.span),
        );
        node.push_field("expression", expression);
        Ok(node)
    }

    fn parenthesized(
        &mut self,
        inner: impl FnOnce(&mut Self) -> Result<Node, ParseError>,
    ) -> Result<Node, ParseError> {
        let open = self.stream.next(MODE)?;
        let expression = self.nested(open.span, inner)?;
        self.expect_closing(TokenKind::RParen)?;
        let mut node = Node::new(
            NodeKind::Rune(RuneKind::Parenthesized),
            self.stream.span_from(open.span),
        );
        node.push_field("expression", expression);
        Ok(node)
    }

    // =========================================================================
    // Expressions
    // =========================================================================

    fn expression(&mut self) -> Result<Node, ParseError> {
        let at = self.stream.peek(MODE)?.span;
        self.nested(at, |p| p.primary())
    }

    fn primary(&mut self) -> Result<Node, ParseError> {
        let token = self.stream.peek(MODE)?;
        let literal = match token.kind {
            TokenKind::LParen => return self.parenthesized(|p| p.expression()),
            TokenKind::Calc => return self.calc(),
            TokenKind::Quote => return self.string(),
            TokenKind::Dollar => return self.variable(RuneKind::LocalVariable),
            TokenKind::Percent => return self.variable(RuneKind::GameVariable),
            TokenKind::DotPercent => return self.variable(RuneKind::DotGameVariable),
            TokenKind::Caret => return self.variable(RuneKind::Constant),
            TokenKind::Tilde => return self.named_call(RuneKind::ProcCall),
            TokenKind::At => return self.named_call(RuneKind::JumpCall),
            TokenKind::Minus if self.number_follows(&token) => return self.negative_number(),
            TokenKind::Number => LiteralKind::Number,
            TokenKind::Hex => LiteralKind::Hex,
            TokenKind::Coord => LiteralKind::Coord,
            TokenKind::Boolean => LiteralKind::Boolean,
            TokenKind::Null => LiteralKind::Null,
            TokenKind::Char => LiteralKind::Char,
            kind if is_identifier_like(kind) => return self.identifier_or_call(),
            _ => return Err(ParseError::unexpected(&token, &["an expression"])),
        };
        self.stream.next(MODE)?;
        Ok(Node::leaf(NodeKind::Literal(literal), token.span, token.text))
    }

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

    /// `name` or `name(args)`. Blanks may separate the name and the `(`.
    fn identifier_or_call(&mut self) -> Result<Node, ParseError> {
        let name = self.stream.next(MODE)?;
        let identifier = Node::leaf(NodeKind::Rune(RuneKind::Identifier), name.span, name.text);
        if !self.stream.at(MODE, TokenKind::LParen)? {
            return Ok(identifier);
        }
        let arguments = self.arguments()?;
        let mut node = Node::new(
            NodeKind::Rune(RuneKind::Call),
            self.stream.span_from(name.span),
        );
        node.push_field("name", identifier);
        node.push_field("arguments", arguments);
        Ok(node)
    }

    /// `~proc` / `@label`, with an optional argument list.
    fn named_call(&mut self, kind: RuneKind) -> Result<Node, ParseError> {
        let sigil = self.stream.next(MODE)?;
        let name = self.variable_name(&sigil)?;
        let mut node = Node::new(NodeKind::Rune(kind), sigil.span);
        node.push_field(
            "name",
            Node::leaf(NodeKind::Rune(RuneKind::Identifier), name.span, name.text),
        );
        if self.stream.at(MODE, TokenKind::LParen)? {
            let arguments = self.arguments()?;
            node.push_field("arguments", arguments);
        }
        node.span = self.stream.span_from(sigil.span);
        Ok(node)
    }

    fn arguments(&mut self) -> Result<Node, ParseError> {
        let open = self.stream.expect(MODE, TokenKind::LParen)?;
        let arguments = self.nested(open.span, |p| {
            p.comma_separated(TokenKind::RParen, |p| p.expression())
        })?;
        let mut node = Node::new(
            NodeKind::Rune(RuneKind::Arguments),
            self.stream.span_from(open.span),
        );
        for argument in arguments {
            node.push_field("argument", argument);
        }
        Ok(node)
    }

    /// Sigil variables. `$name(index)` with a glued `(` is an array element.
    fn variable(&mut self, kind: RuneKind) -> Result<Node, ParseError> {
        let sigil = self.stream.next(MODE)?;
        let name = self.variable_name(&sigil)?;
        let span = sigil.span.to(name.span);

        if kind == RuneKind::LocalVariable && self.stream.immediate_char() == Some('(') {
            let open = self.stream.next(MODE)?;
            let index = self.nested(open.span, |p| p.expression())?;
            self.expect_closing(TokenKind::RParen)?;
            let mut node = Node::leaf(
                NodeKind::Rune(RuneKind::LocalArrayVariable),
                self.stream.span_from(span),
                name.text,
            );
            node.push_field("index", index);
            return Ok(node);
        }

        Ok(Node::leaf(NodeKind::Rune(kind), span, name.text))
    }

    /// The word right after a sigil; no whitespace allowed between them.
    fn variable_name(&mut self, sigil: &Token<'_>) -> Result<Token<'src>, ParseError> {
        let name = self.stream.peek(MODE)?;
        if !is_variable_name(name.kind) || name.span.start != sigil.span.end {
            return Err(ParseError::unexpected(&name, &["name"]));
        }
        self.stream.next(MODE)
    }

    // =========================================================================
    // Strings
    // =========================================================================

    /// `"..."` with escapes, markup tags and `<expr>` interpolations.
    fn string(&mut self) -> Result<Node, ParseError> {
        let open = self.stream.next(MODE)?;
        let mut node = Node::new(NodeKind::Rune(RuneKind::StringLiteral), open.span);
        loop {
            let token = self.stream.peek(STRING)?;
            let kind = match token.kind {
                TokenKind::Quote => {
                    self.stream.next(STRING)?;
                    break;
                }
                TokenKind::Eof => return Err(unterminated_string(open.span)),
                TokenKind::Lt => {
                    let interpolation = self.interpolation(open.span)?;
                    node.push(interpolation);
                    continue;
                }
                TokenKind::EscapeSequence => RuneKind::EscapeSequence,
                TokenKind::StringTag => RuneKind::StringTag,
                _ => RuneKind::StringFragment,
            };
            self.stream.next(STRING)?;
            node.push(Node::leaf(NodeKind::Rune(kind), token.span, token.text));
        }
        node.span = self.stream.span_from(open.span);
        Ok(node)
    }

    fn interpolation(&mut self, quote: Span) -> Result<Node, ParseError> {
        let lt = self.stream.next(STRING)?;
        let expression = match self.interpolated_expression(quote) {
            Ok(expression) => expression,
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => return Err(e.with_context("string interpolation", lt.span.to(self.stream.here()))),
        };
        let mut node = Node::new(
            NodeKind::Rune(RuneKind::StringInterpolation),
            self.stream.span_from(lt.span),
        );
        node.push_field("expression", expression);
        Ok(node)
    }

    fn interpolated_expression(&mut self, quote: Span) -> Result<Node, ParseError> {
        let expression = self.expression()?;
        let token = self.stream.peek(MODE)?;
        match token.kind {
            TokenKind::Gt => {
                self.stream.next(MODE)?;
            }
            // `<$x>=` scans as `>=`; only the `>` closes the slot.
            TokenKind::Gte => {
                self.stream.split(token, TokenKind::Gt, 1);
            }
            TokenKind::Eof => return Err(unterminated_string(quote)),
            _ => return Err(ParseError::unexpected(&token, &["`>`"])),
        }
        Ok(expression)
    }

    // =========================================================================
    // Helpers
    // =========================================================================

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
            return Err(ParseError::unexpected(&token, &[close.describe()]));
        }
        self.stream.next(MODE)
    }
}

fn unterminated_string(quote: Span) -> ParseError {
    ParseError::new(ErrorKind::UnterminatedLiteral, "Unterminated string", quote)
}

/// Word tokens valid where a bare identifier is. Literal and keyword
/// classes win at the scanner; these fall back to identifiers here.
fn is_identifier_like(kind: TokenKind) -> bool {
    matches!(
        kind,
        TokenKind::Identifier
            | TokenKind::MapZone
            | TokenKind::TypeArray
            | TokenKind::SwitchType
            | TokenKind::DefType
            | TokenKind::Default
    )
}

/// Names after a sigil also accept literal-shaped words and control keywords.
fn is_variable_name(kind: TokenKind) -> bool {
    is_identifier_like(kind)
        || matches!(
            kind,
            TokenKind::Hex
                | TokenKind::Coord
                | TokenKind::Boolean
                | TokenKind::Null
                | TokenKind::If
                | TokenKind::Else
                | TokenKind::While
                | TokenKind::Return
                | TokenKind::Calc
                | TokenKind::Case
        )
}

fn is_assignable(node: &Node) -> bool {
    matches!(
        node.kind,
        NodeKind::Rune(
            RuneKind::LocalVariable
                | RuneKind::LocalArrayVariable
                | RuneKind::GameVariable
                | RuneKind::DotGameVariable
        )
    )
}
