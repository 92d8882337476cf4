//! Fusion statement engine.
//!
//! Recursive descent over namespace and include declarations and property
//! statements. Values switch the scanner into value mode, `${...}` hands off
//! to the EEL engine and ``afx`...` `` to the AFX engine.
//!
//! A failing top-level statement is recorded and skipped up to the next
//! newline where its braces balance, so independent errors in one file are
//! all reported.

use crate::afx_parser::AfxParser;
use crate::ast::{FusionKind, LiteralKind, Node, NodeKind};
use crate::error::{ErrorKind, ParseError};
use crate::expr_parser::EelParser;
use crate::stream::{Engine, TokenStream};
use quill_lexer::{decode_string, ExternalToken, ScannerMode, Span, Token, TokenKind};

const FUSION: ScannerMode = ScannerMode::Fusion;
const VALUE: ScannerMode = ScannerMode::FusionValue;

/// Fusion parser over a shared token stream.
pub struct FusionParser<'s, 'src> {
    stream: &'s mut TokenStream<'src>,
    errors: Vec<ParseError>,
}

impl<'src> Engine<'src> for FusionParser<'_, 'src> {
    fn stream(&mut self) -> &mut TokenStream<'src> {
        self.stream
    }
}

impl<'s, 'src> FusionParser<'s, 'src> {
    pub fn new(stream: &'s mut TokenStream<'src>) -> Self {
        Self {
            stream,
            errors: Vec::new(),
        }
    }

    /// Errors recovered from during [`program`](Self::program).
    pub fn into_errors(self) -> Vec<ParseError> {
        self.errors
    }

    /// Parse a whole Fusion source unit.
    ///
    /// Returns `Err` only for a fatal error; recovered syntax errors are
    /// collected and the failing statement becomes an `ERROR` node.
    pub fn program(&mut self) -> Result<Node, ParseError> {
        let source = self.stream.source();
        let mut program = Node::new(
            NodeKind::Fusion(FusionKind::Program),
            Span::new(0, source.len(), 1, 1),
        );

        loop {
            let token = self.stream.peek(FUSION)?;
            match token.kind {
                TokenKind::Eof => break,
                TokenKind::Comment => program.push(self.comment()?),
                _ => match self.statement() {
                    Ok(statement) => program.push(statement),
                    Err(error) if error.is_fatal() || !self.stream.options().recover => {
                        return Err(error)
                    }
                    Err(error) => {
                        self.errors.push(error);
                        program.push(self.recover(token.span));
                    }
                },
            }
        }

        Ok(program)
    }

    /// Skip the statement that started at `start`.
    fn recover(&mut self, start: Span) -> Node {
        let end = recovery_point(self.stream.source(), start.start, self.stream.offset());
        self.stream.skip_to(end);
        Node::new(
            NodeKind::Error,
            Span::new(start.start, end, start.line, start.column),
        )
    }

    // =========================================================================
    // Statements
    // =========================================================================

    fn statement(&mut self) -> Result<Node, ParseError> {
        let token = self.stream.peek(FUSION)?;
        let inner = match token.kind {
            TokenKind::Namespace => self.namespace_declaration()?,
            TokenKind::Include => self.include_statement()?,
            _ => self.property()?,
        };
        let mut statement = Node::new(NodeKind::Fusion(FusionKind::Statement), inner.span);
        statement.push(inner);
        Ok(statement)
    }

    fn comment(&mut self) -> Result<Node, ParseError> {
        let token = self.stream.next(FUSION)?;
        Ok(Node::leaf(NodeKind::Fusion(FusionKind::Comment), token.span, token.text))
    }

    /// `namespace: Alias = Package.Name`
    fn namespace_declaration(&mut self) -> Result<Node, ParseError> {
        let keyword = self.stream.next(FUSION)?;
        self.stream.expect(FUSION, TokenKind::Colon)?;

        let alias = self.stream.peek(FUSION)?;
        if alias.kind != TokenKind::Identifier || !is_alias(alias.text) {
            return Err(ParseError::unexpected(&alias, &["namespace alias"]));
        }
        self.stream.next(FUSION)?;
        self.stream.expect(FUSION, TokenKind::Equals)?;
        let package = self.package_name()?;

        let mut node = Node::new(
            NodeKind::Fusion(FusionKind::NamespaceDecl),
            self.stream.span_from(keyword.span),
        );
        node.push_field(
            "alias",
            Node::leaf(NodeKind::Fusion(FusionKind::AliasNamespace), alias.span, alias.text),
        );
        node.push_field("package", package);
        Ok(node)
    }

    /// `include: <source>`. The source text is scanned opaquely and then
    /// classified as a resource, a glob or a file path.
    fn include_statement(&mut self) -> Result<Node, ParseError> {
        let keyword = self.stream.next(FUSION)?;
        self.stream.expect(FUSION, TokenKind::Colon)?;
        let reference = self.stream.external(ExternalToken::SourceReference)?;

        let source = self.source_reference(&reference)?;
        let mut node = Node::new(
            NodeKind::Fusion(FusionKind::IncludeDecl),
            self.stream.span_from(keyword.span),
        );
        node.push_field("source", source);
        Ok(node)
    }

    fn source_reference(&self, reference: &Token<'src>) -> Result<Node, ParseError> {
        let text = unquote(reference.text);
        let kind = if let Some(rest) = text.strip_prefix("resource://") {
            if !is_resource(rest) {
                return Err(ParseError::unexpected(
                    reference,
                    &["`resource://Package.Name/` followed by a `.fusion` path or glob"],
                ));
            }
            FusionKind::Resource
        } else if is_glob(text) {
            FusionKind::FileGlobbing
        } else if is_file_path(text) {
            FusionKind::FilePath
        } else {
            return Err(ParseError::unexpected(
                reference,
                &["`resource://` reference", "`.fusion` file path", "file glob"],
            ));
        };

        let mut node = Node::leaf(NodeKind::Fusion(kind), reference.span, text);
        if let Some(package) = text
            .strip_prefix("resource://")
            .and_then(|rest| rest.split('/').next())
            .filter(|package| !package.is_empty())
        {
            let quote = usize::from(text.len() != reference.text.len());
            let start = reference.span.start + quote + "resource://".len();
            let span = Span::new(
                start,
                start + package.len(),
                reference.span.line,
                reference.span.column + quote + "resource://".len(),
            );
            node.push_field(
                "package",
                Node::leaf(NodeKind::Fusion(FusionKind::PackageName), span, package),
            );
        }
        Ok(node)
    }

    // =========================================================================
    // Properties
    // =========================================================================

    fn property(&mut self) -> Result<Node, ParseError> {
        let path = self.path()?;
        let token = self.stream.peek(FUSION)?;
        let operation = match token.kind {
            TokenKind::Equals => self.assignment()?,
            TokenKind::Gt => {
                self.stream.next(FUSION)?;
                Node::new(NodeKind::Fusion(FusionKind::Deletion), token.span)
            }
            TokenKind::Lt => self.copy()?,
            TokenKind::LBrace => self.block()?,
            _ => return Err(ParseError::unexpected(&token, &["`=`", "`<`", "`>`", "`{`"])),
        };

        let mut property = Node::new(NodeKind::Fusion(FusionKind::Property), path.span);
        property.push_field("path", path);
        property.push(operation);
        property.span = self.stream.span_from(property.span);
        Ok(property)
    }

    /// Path fragments joined by an immediately adjacent `.`.
    fn path(&mut self) -> Result<Node, ParseError> {
        let first = self.path_fragment()?;
        let start = first.span;
        let mut path = Node::new(NodeKind::Fusion(FusionKind::Path), start);
        path.push(first);

        while self.stream.immediate_char() == Some('.') {
            self.stream.next(FUSION)?;
            let fragment = self.path_fragment()?;
            path.push(fragment);
        }

        path.span = self.stream.span_from(start);
        Ok(path)
    }

    fn path_fragment(&mut self) -> Result<Node, ParseError> {
        let token = self.stream.peek(FUSION)?;
        match token.kind {
            TokenKind::String => {
                self.stream.next(FUSION)?;
                Ok(Node::leaf(
                    NodeKind::Literal(LiteralKind::String),
                    token.span,
                    decode_string(token.text),
                ))
            }
            TokenKind::At => {
                self.stream.next(FUSION)?;
                let name = self.stream.peek(FUSION)?;
                if name.kind != TokenKind::Identifier || name.span.start != token.span.end {
                    return Err(ParseError::unexpected(&name, &["meta property name"]));
                }
                self.stream.next(FUSION)?;
                Ok(Node::leaf(
                    NodeKind::Fusion(FusionKind::MetaProperty),
                    token.span.to(name.span),
                    name.text,
                ))
            }
            TokenKind::Identifier if self.is_prototype_signature(&token) => {
                self.prototype_signature(FUSION)
            }
            TokenKind::Identifier => {
                self.stream.next(FUSION)?;
                Ok(Node::leaf(NodeKind::Fusion(FusionKind::PathPart), token.span, token.text))
            }
            _ => Err(ParseError::unexpected(&token, &["path"])),
        }
    }

    fn is_prototype_signature(&self, token: &Token<'_>) -> bool {
        token.text == "prototype" && self.stream.source()[token.span.end..].starts_with('(')
    }

    /// `prototype(Type)`, with `(` glued to the keyword.
    fn prototype_signature(&mut self, mode: ScannerMode) -> Result<Node, ParseError> {
        let keyword = self.stream.next(mode)?;
        self.stream.expect(mode, TokenKind::LParen)?;
        let fusion_type = self.fusion_type()?;
        self.stream.expect(VALUE, TokenKind::RParen)?;

        let mut node = Node::new(
            NodeKind::Fusion(FusionKind::PrototypeSignature),
            self.stream.span_from(keyword.span),
        );
        node.push_field("type", fusion_type);
        Ok(node)
    }

    fn block(&mut self) -> Result<Node, ParseError> {
        let open = self.stream.expect(FUSION, TokenKind::LBrace)?;
        self.nested(open.span, |p| p.block_contents(open))
    }

    fn block_contents(&mut self, open: Token<'src>) -> Result<Node, ParseError> {
        let mut block = Node::new(NodeKind::Fusion(FusionKind::Block), open.span);
        loop {
            let token = self.stream.peek(FUSION)?;
            match token.kind {
                TokenKind::RBrace => {
                    self.stream.next(FUSION)?;
                    break;
                }
                TokenKind::Comment => block.push(self.comment()?),
                TokenKind::Eof => {
                    return Err(ParseError::new(
                        ErrorKind::UnclosedElement,
                        "Block is never closed",
                        open.span,
                    )
                    .with_related(token.span))
                }
                _ => block.push(self.property()?),
            }
        }
        block.span = self.stream.span_from(open.span);
        Ok(block)
    }

    // =========================================================================
    // Operations
    // =========================================================================

    fn assignment(&mut self) -> Result<Node, ParseError> {
        let equals = self.stream.next(FUSION)?;
        let token = self.stream.peek(VALUE)?;
        let value = match token.kind {
            TokenKind::DollarBrace => self.value_expression()?,
            TokenKind::AfxStart | TokenKind::DslStart => self.dsl()?,
            _ => match self.literal()? {
                Some(literal) => literal,
                None if token.kind == TokenKind::Identifier => self.prototype_instance()?,
                None => {
                    return Err(ParseError::unexpected(
                        &token,
                        &["value", "`${`", "dsl literal", "prototype"],
                    ))
                }
            },
        };

        let mut node = Node::new(
            NodeKind::Fusion(FusionKind::Assignment),
            self.stream.span_from(equals.span),
        );
        node.push_field("value", value);
        Ok(node)
    }

    fn copy(&mut self) -> Result<Node, ParseError> {
        let lt = self.stream.next(FUSION)?;
        let token = self.stream.peek(VALUE)?;

        let mut node = Node::new(NodeKind::Fusion(FusionKind::Copy), lt.span);
        if let Some(literal) = self.literal()? {
            node.push_field("source", literal);
        } else if token.kind == TokenKind::Identifier && self.is_prototype_signature(&token) {
            let signature = self.prototype_signature(VALUE)?;
            node.push_field("source", signature);
            if self.stream.at(FUSION, TokenKind::LBrace)? {
                let block = self.block()?;
                node.push_field("block", block);
            }
        } else if token.kind == TokenKind::Identifier {
            let instance = self.prototype_instance()?;
            node.push_field("source", instance);
        } else {
            return Err(ParseError::unexpected(&token, &["value", "prototype"]));
        }
        node.span = self.stream.span_from(lt.span);
        Ok(node)
    }

    /// Boolean, null, number or string in value position.
    fn literal(&mut self) -> Result<Option<Node>, ParseError> {
        let token = self.stream.peek(VALUE)?;
        let (kind, value) = match token.kind {
            TokenKind::Boolean => (LiteralKind::Boolean, token.text.to_string()),
            TokenKind::Null => (LiteralKind::Null, token.text.to_string()),
            TokenKind::Number => (LiteralKind::Number, token.text.to_string()),
            TokenKind::String => (LiteralKind::String, decode_string(token.text)),
            _ => return Ok(None),
        };
        self.stream.next(VALUE)?;
        Ok(Some(Node::leaf(NodeKind::Literal(kind), token.span, value)))
    }

    /// A type, optionally followed by a block.
    fn prototype_instance(&mut self) -> Result<Node, ParseError> {
        let fusion_type = self.fusion_type()?;
        let start = fusion_type.span;
        let mut node = Node::new(NodeKind::Fusion(FusionKind::PrototypeInstance), start);
        node.push_field("type", fusion_type);
        if self.stream.at(FUSION, TokenKind::LBrace)? {
            let block = self.block()?;
            node.push_field("block", block);
        }
        node.span = self.stream.span_from(start);
        Ok(node)
    }

    /// `Package.Name:Type.Name` or a bare `Type.Name`. The `:` must touch the
    /// package name.
    fn fusion_type(&mut self) -> Result<Node, ParseError> {
        let first = self.stream.expect(VALUE, TokenKind::Identifier)?;
        let first_end = self.dotted_words()?;

        let mut node = Node::new(NodeKind::Fusion(FusionKind::Type), first.span);
        if self.stream.immediate_char() == Some(':') {
            let package_span = first.span.to(first_end);
            self.stream.next(VALUE)?;
            let name = self.stream.expect(VALUE, TokenKind::Identifier)?;
            let name_span = name.span.to(self.dotted_words()?);
            node.push_field("namespace", self.spanned_leaf(FusionKind::PackageName, package_span));
            node.push_field("name", self.spanned_leaf(FusionKind::TypeName, name_span));
        } else {
            let name_span = first.span.to(first_end);
            node.push_field("name", self.spanned_leaf(FusionKind::TypeName, name_span));
        }
        node.span = self.stream.span_from(first.span);
        Ok(node)
    }

    fn package_name(&mut self) -> Result<Node, ParseError> {
        let first = self.stream.expect(VALUE, TokenKind::Identifier)?;
        let span = first.span.to(self.dotted_words()?);
        Ok(self.spanned_leaf(FusionKind::PackageName, span))
    }

    /// Consume `.Word` segments glued to the previous token.
    fn dotted_words(&mut self) -> Result<Span, ParseError> {
        while self.stream.immediate_char() == Some('.') {
            self.stream.next(VALUE)?;
            let word = self.stream.peek(VALUE)?;
            if word.kind != TokenKind::Identifier || word.span.start != self.stream.last_span().end {
                return Err(ParseError::unexpected(&word, &["type name"]));
            }
            self.stream.next(VALUE)?;
        }
        Ok(self.stream.last_span())
    }

    fn spanned_leaf(&self, kind: FusionKind, span: Span) -> Node {
        Node::leaf(
            NodeKind::Fusion(kind),
            span,
            &self.stream.source()[span.start..span.end],
        )
    }

    // =========================================================================
    // Embedded languages
    // =========================================================================

    /// `${ eel }`
    fn value_expression(&mut self) -> Result<Node, ParseError> {
        let open = self.stream.next(VALUE)?;
        let content = match self.embedded_eel() {
            Ok(content) => content,
            Err(e) => return Err(e.with_context("value expression", open.span.to(self.stream.here()))),
        };
        let mut node = Node::new(
            NodeKind::Fusion(FusionKind::ValueExpression),
            self.stream.span_from(open.span),
        );
        node.push_field("content", content);
        Ok(node)
    }

    fn embedded_eel(&mut self) -> Result<Node, ParseError> {
        let expression = EelParser::new(&mut *self.stream).expression()?;
        let token = self.stream.peek(ScannerMode::Eel)?;
        if token.kind != TokenKind::RBrace {
            return Err(ParseError::unexpected(&token, &["an operator", "`}`"]));
        }
        self.stream.next(ScannerMode::Eel)?;
        Ok(expression)
    }

    /// ``name`...` `` raw literal. `afx` bodies are parsed as templates; any
    /// other name is passed through as opaque content.
    fn dsl(&mut self) -> Result<Node, ParseError> {
        let opener = self.stream.next(VALUE)?;
        if closing_backtick(self.stream.source(), opener.span.end).is_none() {
            return Err(ParseError::new(
                ErrorKind::UnterminatedLiteral,
                "Unterminated dsl literal",
                opener.span,
            ));
        }

        let name_span = Span::new(
            opener.span.start,
            opener.span.end - 1,
            opener.span.line,
            opener.span.column,
        );
        let content = if opener.kind == TokenKind::AfxStart {
            match AfxParser::new(&mut *self.stream, opener.span).template() {
                Ok(template) => template,
                Err(e) => return Err(e.with_context("afx template", opener.span)),
            }
        } else {
            let body = self.stream.external(ExternalToken::DslContent)?;
            Node::leaf(NodeKind::Fusion(FusionKind::DslContent), body.span, body.text)
        };
        self.stream.expect(ScannerMode::AfxContent, TokenKind::Backtick)?;

        let mut node = Node::new(
            NodeKind::Fusion(FusionKind::DslExpression),
            self.stream.span_from(opener.span),
        );
        node.push_field("identifier", self.spanned_leaf(FusionKind::DslIdentifier, name_span));
        node.push_field("content", content);
        Ok(node)
    }
}

/// Offset of the backtick closing a raw literal whose body starts at
/// `from`. On a later line, a backtick ending `path = name` (name starting
/// with a letter) opens the next literal instead, so the body has no
/// terminator.
fn closing_backtick(source: &str, from: usize) -> Option<usize> {
    let end = from + source[from..].find('`')?;
    let line_start = source[..end].rfind('\n').map_or(0, |i| i + 1);
    if line_start < from {
        return Some(end);
    }
    let line = &source[line_start..end];
    let before_name = line.trim_end_matches(|c: char| c.is_ascii_alphanumeric() || c == '.');
    let name_starts_alphabetic = line[before_name.len()..]
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic());
    let opens_literal = name_starts_alphabetic
        && before_name
            .trim_end_matches([' ', '\t'])
            .strip_suffix('=')
            .map(|path| path.trim_matches([' ', '\t']))
            .is_some_and(|path| {
                !path.is_empty()
                    && path
                        .chars()
                        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | ':' | '@'))
            });
    (!opens_literal).then_some(end)
}

/// `[A-Za-z][A-Za-z0-9]*`
fn is_alias(text: &str) -> bool {
    let mut chars = text.chars();
    chars.next().is_some_and(|c| c.is_ascii_alphabetic()) && chars.all(|c| c.is_ascii_alphanumeric())
}

fn unquote(text: &str) -> &str {
    for quote in ['"', '\''] {
        if let Some(inner) = text.strip_prefix(quote).and_then(|t| t.strip_suffix(quote)) {
            return inner;
        }
    }
    text
}

/// `Package.Name/path`: an optional dotted package name, then a `/` and a
/// `.fusion` path or a glob.
fn is_resource(rest: &str) -> bool {
    let (package, tail) = rest.find('/').map_or((rest, ""), |i| rest.split_at(i));
    let package_ok = package.is_empty()
        || package
            .split('.')
            .all(|part| !part.is_empty() && part.chars().all(|c| c.is_ascii_alphanumeric()));
    package_ok && tail.len() > 1 && (is_file_path(tail) || is_glob(tail))
}

/// Path fragments followed by `.fusion`.
fn is_file_path(text: &str) -> bool {
    text.strip_suffix(".fusion")
        .is_some_and(|fragments| !fragments.is_empty() && are_path_fragments(fragments))
}

/// Path fragments ending in `/*` or `/**/*`, optionally followed by
/// `.fusion`.
fn is_glob(text: &str) -> bool {
    let text = text.strip_suffix(".fusion").unwrap_or(text);
    ["/**/*", "/*"]
        .iter()
        .find_map(|suffix| text.strip_suffix(suffix))
        .is_some_and(|prefix| prefix.is_empty() || are_path_fragments(prefix))
}

/// `/`-separated segments of `[A-Za-z0-9_-]` and `.`, with an optional
/// leading `/` and no empty segments.
fn are_path_fragments(text: &str) -> bool {
    let text = text.strip_prefix('/').unwrap_or(text);
    !text.is_empty()
        && text.split('/').all(|segment| {
            !segment.is_empty()
                && segment
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
        })
}

/// Offset of the first newline at or after `floor` where the braces opened
/// since `from` are balanced. Quoted strings and raw literals are skipped.
fn recovery_point(source: &str, from: usize, floor: usize) -> usize {
    let bytes = source.as_bytes();
    let mut depth: i32 = 0;
    let mut i = from;
    while i < bytes.len() {
        match bytes[i] {
            b'{' => depth += 1,
            b'}' => depth -= 1,
            quote @ (b'"' | b'\'' | b'`') => {
                let mut j = i + 1;
                while j < bytes.len() && bytes[j] != quote {
                    if quote != b'`' && bytes[j] == b'\n' {
                        break;
                    }
                    if quote != b'`' && bytes[j] == b'\\' {
                        j += 1;
                    }
                    j += 1;
                }
                if j < bytes.len() && bytes[j] == b'\n' {
                    i = j;
                    continue;
                }
                i = j;
            }
            b'\n' if depth <= 0 && i >= floor => return i,
            _ => {}
        }
        i += 1;
    }
    bytes.len()
}
