//! Parse errors, the parse result, and diagnostic rendering.

use crate::ast::Node;
use quill_lexer::{Extra, LexErrorKind, LexerError, Span, Token, TokenKind};
use serde::Serialize;

/// Error classification.
///
/// Lexical kinds and `NestingTooDeep` are fatal; the syntactic kinds allow
/// statement-level recovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorKind {
    UnterminatedLiteral,
    InvalidEscape,
    UnrecognizedCharacter,
    UnexpectedToken,
    MismatchedClosingTag,
    UnclosedElement,
    /// An operator with no row in the active precedence table. Complete
    /// tables never produce it.
    AmbiguousPrecedence,
    NestingTooDeep,
}

impl ErrorKind {
    pub fn is_fatal(self) -> bool {
        matches!(
            self,
            ErrorKind::UnterminatedLiteral
                | ErrorKind::InvalidEscape
                | ErrorKind::UnrecognizedCharacter
                | ErrorKind::NestingTooDeep
        )
    }

    pub fn describe(self) -> &'static str {
        match self {
            ErrorKind::UnterminatedLiteral => "unterminated literal",
            ErrorKind::InvalidEscape => "invalid escape",
            ErrorKind::UnrecognizedCharacter => "unrecognized character",
            ErrorKind::UnexpectedToken => "unexpected token",
            ErrorKind::MismatchedClosingTag => "mismatched closing tag",
            ErrorKind::UnclosedElement => "unclosed element",
            ErrorKind::AmbiguousPrecedence => "ambiguous precedence",
            ErrorKind::NestingTooDeep => "nesting too deep",
        }
    }
}

impl From<LexErrorKind> for ErrorKind {
    fn from(kind: LexErrorKind) -> Self {
        match kind {
            LexErrorKind::UnterminatedLiteral => ErrorKind::UnterminatedLiteral,
            LexErrorKind::InvalidEscape => ErrorKind::InvalidEscape,
            LexErrorKind::UnrecognizedCharacter => ErrorKind::UnrecognizedCharacter,
        }
    }
}

/// An outer construct an error propagated through.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorContext {
    pub construct: &'static str,
    pub span: Span,
}

/// Parser error with position information.
#[derive(Debug, Clone, PartialEq, Serialize, thiserror::Error)]
#[error("Parse error at line {}, column {}: {message}", .span.line, .span.column)]
pub struct ParseError {
    pub kind: ErrorKind,
    pub message: String,
    pub span: Span,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub expected: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub found: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub related: Vec<Span>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub context: Vec<ErrorContext>,
}

impl ParseError {
    pub fn new(kind: ErrorKind, message: impl Into<String>, span: Span) -> Self {
        Self {
            kind,
            message: message.into(),
            span,
            expected: Vec::new(),
            found: None,
            related: Vec::new(),
            context: Vec::new(),
        }
    }

    /// "Expected X, found Y" at `found`.
    pub fn unexpected(found: &Token<'_>, expected: &[&str]) -> Self {
        let message = match expected {
            [] => format!("Unexpected {}", found.describe()),
            [one] => format!("Expected {one}, found {}", found.describe()),
            [init @ .., last] => format!(
                "Expected {} or {last}, found {}",
                init.join(", "),
                found.describe()
            ),
        };
        Self {
            expected: expected.iter().map(|e| e.to_string()).collect(),
            found: Some(found.describe()),
            ..Self::new(ErrorKind::UnexpectedToken, message, found.span)
        }
    }

    pub fn unexpected_kind(found: &Token<'_>, expected: TokenKind) -> Self {
        Self::unexpected(found, &[expected.describe()])
    }

    pub fn with_related(mut self, span: Span) -> Self {
        self.related.push(span);
        self
    }

    /// Record the outer construct this error surfaced through.
    pub fn with_context(mut self, construct: &'static str, span: Span) -> Self {
        self.context.push(ErrorContext { construct, span });
        self
    }

    pub fn is_fatal(&self) -> bool {
        self.kind.is_fatal()
    }

    /// Render a compiler-style diagnostic with the offending line and a caret.
    ///
    /// ```text
    /// error[unexpected token]: Expected `}`, found end of input
    ///   --> Root.fusion:3:1
    ///    |
    ///  3 | foo {
    ///    | ^
    /// ```
    pub fn render(&self, file_name: &str, source: &str) -> String {
        let Span { line, column, .. } = self.span;
        let src_line = source.lines().nth(line.saturating_sub(1)).unwrap_or("");
        let gutter = line.to_string().len().max(2);

        let mut out = format!(
            "error[{}]: {}\n{:>gutter$}--> {file_name}:{line}:{column}\n",
            self.kind.describe(),
            self.message,
            ""
        );
        out.push_str(&format!("{:>gutter$} |\n", ""));
        out.push_str(&format!("{line:>gutter$} | {src_line}\n"));
        let pad: String = src_line
            .chars()
            .take(column.saturating_sub(1))
            .map(|c| if c == '\t' { '\t' } else { ' ' })
            .collect();
        out.push_str(&format!("{:>gutter$} | {pad}^\n", ""));

        for related in &self.related {
            out.push_str(&format!(
                "{:>gutter$} = note: related location at {}:{}\n",
                "", related.line, related.column
            ));
        }
        for context in &self.context {
            out.push_str(&format!(
                "{:>gutter$} = note: inside {} at {}:{}\n",
                "", context.construct, context.span.line, context.span.column
            ));
        }
        out
    }
}

impl From<LexerError> for ParseError {
    fn from(error: LexerError) -> Self {
        ParseError::new(error.kind.into(), error.message, error.span)
    }
}

/// Render every error in order, separated by blank lines.
pub fn render_errors(file_name: &str, source: &str, errors: &[ParseError]) -> String {
    errors
        .iter()
        .map(|e| e.render(file_name, source))
        .collect::<Vec<_>>()
        .join("\n")
}

// ---------------------------------------------------------------------------
// ParseResult
// ---------------------------------------------------------------------------

/// A successfully built tree, with any errors recovered from along the way.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyntaxTree {
    pub root: Node,
    pub errors: Vec<ParseError>,
    pub extras: Vec<Extra>,
}

/// Outcome of one parse: a tree (possibly with recovered errors) or a fatal
/// error list. Never both.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ParseResult {
    Tree(SyntaxTree),
    Fatal(Vec<ParseError>),
}

impl ParseResult {
    /// A tree with no recovered errors.
    pub fn is_ok(&self) -> bool {
        matches!(self, ParseResult::Tree(tree) if tree.errors.is_empty())
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, ParseResult::Fatal(_))
    }

    pub fn tree(&self) -> Option<&SyntaxTree> {
        match self {
            ParseResult::Tree(tree) => Some(tree),
            ParseResult::Fatal(_) => None,
        }
    }

    pub fn root(&self) -> Option<&Node> {
        self.tree().map(|tree| &tree.root)
    }

    /// Every error, recovered or fatal.
    pub fn errors(&self) -> &[ParseError] {
        match self {
            ParseResult::Tree(tree) => &tree.errors,
            ParseResult::Fatal(errors) => errors,
        }
    }

    /// Strict view: any error at all becomes `Err`.
    pub fn into_result(self) -> Result<Node, Vec<ParseError>> {
        match self {
            ParseResult::Tree(tree) if tree.errors.is_empty() => Ok(tree.root),
            ParseResult::Tree(tree) => Err(tree.errors),
            ParseResult::Fatal(errors) => Err(errors),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn token(text: &str) -> Token<'_> {
        Token::new(TokenKind::Identifier, text, Span::new(4, 4 + text.len(), 1, 5))
    }

    #[test]
    fn test_unexpected_message() {
        let err = ParseError::unexpected(&token("foo"), &["`=`", "`{`", "`>`"]);
        assert_eq!(err.message, "Expected `=`, `{` or `>`, found `foo`");
        assert_eq!(err.expected, vec!["`=`", "`{`", "`>`"]);
        assert_eq!(err.found.as_deref(), Some("`foo`"));
        assert_eq!(err.kind, ErrorKind::UnexpectedToken);
    }

    #[test]
    fn test_display() {
        let err = ParseError::unexpected_kind(&token("x"), TokenKind::RBrace);
        assert_eq!(
            err.to_string(),
            "Parse error at line 1, column 5: Expected `}`, found `x`"
        );
    }

    #[test]
    fn test_fatal_kinds() {
        assert!(ErrorKind::UnterminatedLiteral.is_fatal());
        assert!(ErrorKind::NestingTooDeep.is_fatal());
        assert!(!ErrorKind::UnexpectedToken.is_fatal());
        assert!(!ErrorKind::MismatchedClosingTag.is_fatal());
    }

    #[test]
    fn test_from_lexer_error() {
        let lex = LexerError {
            kind: LexErrorKind::InvalidEscape,
            message: "bad".into(),
            span: Span::new(3, 4, 1, 4),
        };
        let err = ParseError::from(lex);
        assert_eq!(err.kind, ErrorKind::InvalidEscape);
        assert_eq!(err.span.start, 3);
    }

    #[test]
    fn test_render_caret() {
        let err = ParseError::unexpected_kind(&token("bar"), TokenKind::Equals);
        let rendered = err.render("a.fusion", "foo bar");
        assert_eq!(
            rendered,
            "error[unexpected token]: Expected `=`, found `bar`\n  --> a.fusion:1:5\n   |\n 1 | foo bar\n   |     ^\n"
        );
    }

    #[test]
    fn test_render_context_note() {
        let err = ParseError::unexpected_kind(&token("bar"), TokenKind::Equals)
            .with_context("value expression", Span::new(0, 3, 1, 1));
        assert!(err
            .render("a.fusion", "foo bar")
            .contains("= note: inside value expression at 1:1"));
    }
}
