//! Mode-aware token stream shared by the engines.
//!
//! Wraps the scanner with a one-token lookahead cache, consumed-span
//! tracking, backtracking snapshots and the nesting-depth guard.

use crate::error::{ErrorKind, ParseError};
use quill_lexer::{Cursor, Extra, ExternalToken, Scanner, ScannerMode, Span, Token, TokenKind};

/// Default cap on nested blocks, elements and sub-expressions.
pub const DEFAULT_MAX_DEPTH: usize = 128;

/// Parser configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseOptions {
    /// Maximum nesting depth before the parse fails with `NestingTooDeep`.
    pub max_depth: usize,
    /// Skip to the next statement after a syntax error instead of stopping.
    pub recover: bool,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            recover: true,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Lookahead<'src> {
    at: usize,
    mode: ScannerMode,
    token: Token<'src>,
    after: Cursor,
}

/// Saved stream position for speculative parsing.
#[derive(Debug, Clone, Copy)]
pub struct Snapshot {
    cursor: Cursor,
    last: Span,
}

pub struct TokenStream<'src> {
    scanner: Scanner<'src>,
    lookahead: Option<Lookahead<'src>>,
    last: Span,
    depth: usize,
    options: ParseOptions,
}

impl<'src> TokenStream<'src> {
    pub fn new(source: &'src str, options: ParseOptions) -> Self {
        Self {
            scanner: Scanner::new(source),
            lookahead: None,
            last: Span::new(0, 0, 1, 1),
            depth: 0,
            options,
        }
    }

    pub fn source(&self) -> &'src str {
        self.scanner.source()
    }

    pub fn options(&self) -> ParseOptions {
        self.options
    }

    // --- Token access ---

    /// Look at the next token in `mode` without consuming it.
    pub fn peek(&mut self, mode: ScannerMode) -> Result<Token<'src>, ParseError> {
        let at = self.scanner.cursor();
        if let Some(lookahead) = &self.lookahead {
            if lookahead.at == at.offset && lookahead.mode == mode {
                return Ok(lookahead.token);
            }
        }
        let token = self.scanner.scan(mode)?;
        let after = self.scanner.cursor();
        self.scanner.reset(at);
        self.lookahead = Some(Lookahead {
            at: at.offset,
            mode,
            token,
            after,
        });
        Ok(token)
    }

    pub fn next(&mut self, mode: ScannerMode) -> Result<Token<'src>, ParseError> {
        let token = self.peek(mode)?;
        if let Some(lookahead) = self.lookahead.take() {
            self.scanner.reset(lookahead.after);
        }
        self.last = token.span;
        Ok(token)
    }

    pub fn at(&mut self, mode: ScannerMode, kind: TokenKind) -> Result<bool, ParseError> {
        Ok(self.peek(mode)?.kind == kind)
    }

    /// Consume the next token if it is `kind`.
    pub fn eat(&mut self, mode: ScannerMode, kind: TokenKind) -> Result<Option<Token<'src>>, ParseError> {
        if self.at(mode, kind)? {
            self.next(mode).map(Some)
        } else {
            Ok(None)
        }
    }

    pub fn expect(&mut self, mode: ScannerMode, kind: TokenKind) -> Result<Token<'src>, ParseError> {
        let token = self.peek(mode)?;
        if token.kind == kind {
            self.next(mode)
        } else {
            Err(ParseError::unexpected_kind(&token, kind))
        }
    }

    /// Scan an opaque region through the scanner's external hook.
    pub fn external(&mut self, external: ExternalToken) -> Result<Token<'src>, ParseError> {
        self.lookahead = None;
        let token = self.scanner.scan_external(external)?;
        self.last = token.span;
        Ok(token)
    }

    /// Consume only the first `len` bytes of `token` (which must be the
    /// token just peeked) as a token of `kind`.
    pub fn split(&mut self, token: Token<'src>, kind: TokenKind, len: usize) -> Token<'src> {
        self.lookahead = None;
        self.scanner.reset(Cursor {
            offset: token.span.start,
            line: token.span.line,
            column: token.span.column,
        });
        let end = (token.span.start + len).min(token.span.end);
        self.scanner.advance_to(end);
        let span = Span::new(token.span.start, end, token.span.line, token.span.column);
        self.last = span;
        Token::new(kind, &self.source()[span.start..span.end], span)
    }

    /// The character at the cursor, with no extras skipped. Used to check
    /// that two tokens are immediately adjacent.
    pub fn immediate_char(&self) -> Option<char> {
        self.scanner.peek_char()
    }

    // --- Positions ---

    pub fn offset(&self) -> usize {
        self.scanner.cursor().offset
    }

    /// Span of the last consumed token.
    pub fn last_span(&self) -> Span {
        self.last
    }

    /// Span from the start of `start` through the last consumed token.
    pub fn span_from(&self, start: Span) -> Span {
        Span::new(
            start.start,
            self.last.end.max(start.end),
            start.line,
            start.column,
        )
    }

    /// Empty span at the cursor.
    pub fn here(&self) -> Span {
        let cursor = self.scanner.cursor();
        Span::new(cursor.offset, cursor.offset, cursor.line, cursor.column)
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            cursor: self.scanner.cursor(),
            last: self.last,
        }
    }

    pub fn restore(&mut self, snapshot: Snapshot) {
        self.scanner.reset(snapshot.cursor);
        self.last = snapshot.last;
    }

    /// Discard everything up to `offset`. Used by error recovery.
    pub fn skip_to(&mut self, offset: usize) {
        self.lookahead = None;
        self.scanner.advance_to(offset);
    }

    // --- Nesting ---

    pub fn enter(&mut self, at: Span) -> Result<(), ParseError> {
        if self.depth >= self.options.max_depth {
            return Err(ParseError::new(
                ErrorKind::NestingTooDeep,
                format!("Nesting exceeds the maximum depth of {}", self.options.max_depth),
                at,
            ));
        }
        self.depth += 1;
        Ok(())
    }

    pub fn leave(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }

    pub fn into_extras(self) -> Vec<Extra> {
        self.scanner.into_extras()
    }
}

/// Shared plumbing for the engines: access to the stream and the depth guard.
pub(crate) trait Engine<'src>: Sized {
    fn stream(&mut self) -> &mut TokenStream<'src>;

    /// Run `parse` one nesting level deeper.
    fn nested<T>(
        &mut self,
        at: Span,
        parse: impl FnOnce(&mut Self) -> Result<T, ParseError>,
    ) -> Result<T, ParseError> {
        self.stream().enter(at)?;
        let result = parse(self);
        self.stream().leave();
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn stream(source: &str) -> TokenStream<'_> {
        TokenStream::new(source, ParseOptions::default())
    }

    #[test]
    fn test_peek_does_not_consume() {
        let mut s = stream("a b");
        assert_eq!(s.peek(ScannerMode::Eel).unwrap().text, "a");
        assert_eq!(s.peek(ScannerMode::Eel).unwrap().text, "a");
        assert_eq!(s.next(ScannerMode::Eel).unwrap().text, "a");
        assert_eq!(s.next(ScannerMode::Eel).unwrap().text, "b");
        assert!(s.at(ScannerMode::Eel, TokenKind::Eof).unwrap());
    }

    #[test]
    fn test_peek_in_different_modes() {
        let mut s = stream("-1");
        assert_eq!(s.peek(ScannerMode::Eel).unwrap().kind, TokenKind::Minus);
        assert_eq!(s.peek(ScannerMode::FusionValue).unwrap().kind, TokenKind::Number);
    }

    #[test]
    fn test_expect_reports_found_token() {
        let mut s = stream("x");
        let err = s.expect(ScannerMode::Eel, TokenKind::LParen).unwrap_err();
        assert_eq!(err.kind, ErrorKind::UnexpectedToken);
        assert_eq!(err.message, "Expected `(`, found `x`");
    }

    #[test]
    fn test_snapshot_restore() {
        let mut s = stream("a b c");
        s.next(ScannerMode::Eel).unwrap();
        let saved = s.snapshot();
        s.next(ScannerMode::Eel).unwrap();
        s.next(ScannerMode::Eel).unwrap();
        s.restore(saved);
        assert_eq!(s.next(ScannerMode::Eel).unwrap().text, "b");
    }

    #[test]
    fn test_split_token() {
        let mut s = stream(">=");
        let token = s.peek(ScannerMode::RuneScript).unwrap();
        assert_eq!(token.kind, TokenKind::Gte);
        let gt = s.split(token, TokenKind::Gt, 1);
        assert_eq!(gt.text, ">");
        assert_eq!(s.immediate_char(), Some('='));
    }

    #[test]
    fn test_span_from() {
        let mut s = stream("a + b");
        let first = s.next(ScannerMode::Eel).unwrap();
        s.next(ScannerMode::Eel).unwrap();
        s.next(ScannerMode::Eel).unwrap();
        assert_eq!(s.span_from(first.span), Span::new(0, 5, 1, 1));
    }

    #[test]
    fn test_depth_guard() {
        let mut s = TokenStream::new("", ParseOptions { max_depth: 2, recover: true });
        s.enter(Span::default()).unwrap();
        s.enter(Span::default()).unwrap();
        let err = s.enter(Span::default()).unwrap_err();
        assert_eq!(err.kind, ErrorKind::NestingTooDeep);
        s.leave();
        assert_eq!(s.depth, 1);
        s.enter(Span::default()).unwrap();
    }
}
