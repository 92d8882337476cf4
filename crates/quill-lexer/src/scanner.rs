use crate::token::{Extra, ExtraKind, Span, Token, TokenKind, RUNE_STRING_TAGS};
use crate::{LexErrorKind, LexerError};

/// Scanner mode selects the lexical regime for the next token.
///
/// A single Fusion source moves between several regimes: property paths,
/// values, embedded EEL expressions and AFX markup. RuneScript has its own
/// word rules and a separate regime for the inside of string literals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScannerMode {
    /// Fusion statement position: paths, declarations, comments as tokens.
    Fusion,
    /// Fusion value position: literals, type names, `${`, raw-DSL openers.
    FusionValue,
    /// EEL expressions inside `${...}` and AFX `{...}` slots.
    Eel,
    /// Inside an AFX tag, between `<` and `>`.
    AfxTag,
    /// AFX element content: text runs, tags, expression slots.
    AfxContent,
    /// RuneScript statements and expressions.
    RuneScript,
    /// Inside a RuneScript `"..."` literal. No extras are skipped.
    RuneString,
}

/// Opaque regions scanned outside the regular token rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExternalToken {
    /// Body of a raw-DSL literal, up to (not including) the closing backtick.
    DslContent,
    /// Target of a Fusion `include:` statement, optionally quoted.
    SourceReference,
    /// An AFX `<!-- ... -->` comment.
    AfxComment,
}

/// A saved scanner position. Restoring one replays scanning from there.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cursor {
    pub offset: usize,
    pub line: usize,
    pub column: usize,
}

impl Default for Cursor {
    fn default() -> Self {
        Self {
            offset: 0,
            line: 1,
            column: 1,
        }
    }
}

/// Multi-mode source scanner.
///
/// Scans one token at a time in whatever mode the caller asks for, so the
/// parsers can switch regimes at exactly the grammar points where one
/// language embeds another. Whitespace and (outside Fusion statement position)
/// comments are skipped and recorded as [`Extra`]s.
pub struct Scanner<'src> {
    source: &'src str,
    cursor: Cursor,
    extras: Vec<Extra>,
    extras_end: usize,
}

impl<'src> Scanner<'src> {
    /// Create a new scanner positioned at the start of `source`.
    pub fn new(source: &'src str) -> Self {
        Self {
            source,
            cursor: Cursor::default(),
            extras: Vec::new(),
            extras_end: 0,
        }
    }

    /// Lazily scan `source` in a single mode, from offset 0.
    pub fn tokens(source: &'src str, mode: ScannerMode) -> Tokens<'src> {
        Tokens {
            scanner: Scanner::new(source),
            mode,
            done: false,
        }
    }

    /// Tokenize the entire source in a single mode. The last token is `Eof`.
    pub fn tokenize(source: &'src str, mode: ScannerMode) -> Result<Vec<Token<'src>>, LexerError> {
        Scanner::tokens(source, mode).collect()
    }

    pub fn source(&self) -> &'src str {
        self.source
    }

    pub fn cursor(&self) -> Cursor {
        self.cursor
    }

    /// Move back (or forward) to a previously saved cursor.
    pub fn reset(&mut self, cursor: Cursor) {
        self.cursor = cursor;
    }

    /// Extras recorded so far, in source order.
    pub fn extras(&self) -> &[Extra] {
        &self.extras
    }

    pub fn into_extras(self) -> Vec<Extra> {
        self.extras
    }

    /// The character at the cursor, without skipping extras.
    pub fn peek_char(&self) -> Option<char> {
        self.rest().chars().next()
    }

    pub fn is_at_end(&self) -> bool {
        self.cursor.offset >= self.source.len()
    }

    /// Advance over raw characters until `offset` (clamped to the source end).
    pub fn advance_to(&mut self, offset: usize) {
        while self.cursor.offset < offset.min(self.source.len()) {
            self.advance();
        }
    }

    /// Scan the next token in the given mode.
    pub fn scan(&mut self, mode: ScannerMode) -> Result<Token<'src>, LexerError> {
        self.skip_extras(mode)?;

        let start = self.cursor;
        let Some(ch) = self.peek_char() else {
            return Ok(self.finish(TokenKind::Eof, start));
        };

        match mode {
            ScannerMode::Fusion => self.scan_fusion(start, ch),
            ScannerMode::FusionValue => self.scan_fusion_value(start, ch),
            ScannerMode::Eel => self.scan_eel(start, ch),
            ScannerMode::AfxTag => self.scan_afx_tag(start, ch),
            ScannerMode::AfxContent => self.scan_afx_content(start, ch),
            ScannerMode::RuneScript => self.scan_rune(start, ch),
            ScannerMode::RuneString => self.scan_rune_string(start, ch),
        }
    }

    /// Scan an opaque region whose inside the grammars do not tokenize.
    pub fn scan_external(&mut self, external: ExternalToken) -> Result<Token<'src>, LexerError> {
        match external {
            ExternalToken::DslContent => {
                let start = self.cursor;
                self.advance_while(|c| c != '`');
                Ok(self.finish(TokenKind::DslContent, start))
            }
            ExternalToken::SourceReference => {
                self.skip_extras(ScannerMode::FusionValue)?;
                let start = self.cursor;
                match self.peek_char() {
                    Some(quote @ ('"' | '\'')) => {
                        self.advance();
                        self.advance_while(|c| c != quote && c != '\n');
                        if self.peek_char() != Some(quote) {
                            return Err(self.unterminated(start, "Unterminated include source"));
                        }
                        self.advance();
                    }
                    _ => self.advance_while(|c| !is_extra_whitespace(c)),
                }
                Ok(self.finish(TokenKind::SourceReference, start))
            }
            ExternalToken::AfxComment => {
                let start = self.cursor;
                if !self.rest().starts_with("<!--") {
                    return Err(self.error(
                        LexErrorKind::UnrecognizedCharacter,
                        "Expected `<!--`".into(),
                        start,
                    ));
                }
                match self.rest()[4..].find("-->") {
                    Some(len) => {
                        self.advance_to(start.offset + 4 + len + 3);
                        Ok(self.finish(TokenKind::AfxComment, start))
                    }
                    None => Err(self.unterminated(start, "Unterminated afx comment")),
                }
            }
        }
    }

    // --- Extras ---

    fn skip_extras(&mut self, mode: ScannerMode) -> Result<(), LexerError> {
        if mode == ScannerMode::RuneString {
            return Ok(());
        }

        loop {
            let start = self.cursor;
            match self.peek_char() {
                Some(c) if is_extra_whitespace(c) => {
                    self.advance_while(is_extra_whitespace);
                    self.record_extra(ExtraKind::Whitespace, start);
                }
                Some('/') if mode == ScannerMode::RuneScript && self.rest().starts_with("//") => {
                    self.advance_while(|c| c != '\n' && c != '\r');
                    self.record_extra(ExtraKind::Comment, start);
                }
                Some('/') if mode == ScannerMode::RuneScript && self.rest().starts_with("/*") => {
                    self.block_comment(start)?;
                    self.record_extra(ExtraKind::Comment, start);
                }
                _ => return Ok(()),
            }
        }
    }

    fn record_extra(&mut self, kind: ExtraKind, start: Cursor) {
        // Backtracking re-scans regions that were already recorded.
        if start.offset < self.extras_end {
            return;
        }
        self.extras_end = self.cursor.offset;
        self.extras.push(Extra {
            kind,
            span: self.span_from(start),
        });
    }

    // --- Fusion ---

    fn scan_fusion(&mut self, start: Cursor, ch: char) -> Result<Token<'src>, LexerError> {
        match ch {
            '/' if self.rest().starts_with("//") => {
                self.advance_while(|c| c != '\n' && c != '\r');
                Ok(self.finish(TokenKind::Comment, start))
            }
            '#' => {
                self.advance_while(|c| c != '\n' && c != '\r');
                Ok(self.finish(TokenKind::Comment, start))
            }
            '/' if self.rest().starts_with("/*") => {
                self.block_comment(start)?;
                Ok(self.finish(TokenKind::Comment, start))
            }
            '"' | '\'' => self.quoted_string(start, ch),
            '$' if self.rest().starts_with("${") => Ok(self.fixed(TokenKind::DollarBrace, 2, start)),
            '@' => Ok(self.fixed(TokenKind::At, 1, start)),
            '.' => Ok(self.fixed(TokenKind::Dot, 1, start)),
            '=' => Ok(self.fixed(TokenKind::Equals, 1, start)),
            '<' => Ok(self.fixed(TokenKind::Lt, 1, start)),
            '>' => Ok(self.fixed(TokenKind::Gt, 1, start)),
            '{' => Ok(self.fixed(TokenKind::LBrace, 1, start)),
            '}' => Ok(self.fixed(TokenKind::RBrace, 1, start)),
            '(' => Ok(self.fixed(TokenKind::LParen, 1, start)),
            ')' => Ok(self.fixed(TokenKind::RParen, 1, start)),
            ':' => Ok(self.fixed(TokenKind::Colon, 1, start)),
            c if is_path_word_char(c) => {
                if let Some((kind, len)) = self.declaration_keyword() {
                    return Ok(self.fixed(kind, len, start));
                }
                self.path_part(start)
            }
            _ => Err(self.unrecognized(start, ch)),
        }
    }

    /// `namespace` and `include` are keywords only when a `:` follows.
    fn declaration_keyword(&self) -> Option<(TokenKind, usize)> {
        let rest = self.rest();
        [
            ("namespace", TokenKind::Namespace),
            ("include", TokenKind::Include),
        ]
        .into_iter()
        .find_map(|(keyword, kind)| {
            let after = rest.strip_prefix(keyword)?;
            after
                .trim_start_matches([' ', '\t'])
                .starts_with(':')
                .then_some((kind, keyword.len()))
        })
    }

    /// A path part is word characters with inner `:` or `-`; it never ends
    /// with either.
    fn path_part(&mut self, start: Cursor) -> Result<Token<'src>, LexerError> {
        let mut last_word_end = self.cursor;
        while let Some(c) = self.peek_char() {
            if is_path_word_char(c) {
                self.advance();
                last_word_end = self.cursor;
            } else if c == ':' || c == '-' {
                self.advance();
            } else {
                break;
            }
        }
        self.cursor = last_word_end;
        Ok(self.finish(TokenKind::Identifier, start))
    }

    fn scan_fusion_value(&mut self, start: Cursor, ch: char) -> Result<Token<'src>, LexerError> {
        match ch {
            '$' if self.rest().starts_with("${") => Ok(self.fixed(TokenKind::DollarBrace, 2, start)),
            '"' | '\'' => self.quoted_string(start, ch),
            '-' if self.rest()[1..].starts_with(|c: char| c.is_ascii_digit()) => {
                self.advance();
                self.number(start)
            }
            c if c.is_ascii_alphanumeric() || c == '.' => {
                if let Some(token) = self.dsl_start(start) {
                    return Ok(token);
                }
                if c == '.' {
                    Ok(self.fixed(TokenKind::Dot, 1, start))
                } else if c.is_ascii_digit() {
                    self.number(start)
                } else {
                    self.advance_while(|c| c.is_ascii_alphanumeric());
                    let kind = match &self.source[start.offset..self.cursor.offset] {
                        "true" | "TRUE" | "false" | "FALSE" => TokenKind::Boolean,
                        "null" | "NULL" => TokenKind::Null,
                        _ => TokenKind::Identifier,
                    };
                    Ok(self.finish(kind, start))
                }
            }
            ':' => Ok(self.fixed(TokenKind::Colon, 1, start)),
            '(' => Ok(self.fixed(TokenKind::LParen, 1, start)),
            ')' => Ok(self.fixed(TokenKind::RParen, 1, start)),
            '{' => Ok(self.fixed(TokenKind::LBrace, 1, start)),
            '}' => Ok(self.fixed(TokenKind::RBrace, 1, start)),
            _ => Err(self.unrecognized(start, ch)),
        }
    }

    /// Raw-DSL opener: `[A-Za-z0-9.]+` immediately followed by a backtick.
    fn dsl_start(&mut self, start: Cursor) -> Option<Token<'src>> {
        let rest = self.rest();
        let name_len = rest
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '.'))
            .unwrap_or(rest.len());
        if name_len == 0 || !rest[name_len..].starts_with('`') {
            return None;
        }
        let kind = if &rest[..name_len] == "afx" {
            TokenKind::AfxStart
        } else {
            TokenKind::DslStart
        };
        Some(self.fixed(kind, name_len + 1, start))
    }

    // --- EEL ---

    fn scan_eel(&mut self, start: Cursor, ch: char) -> Result<Token<'src>, LexerError> {
        let rest = self.rest();
        match ch {
            '"' | '\'' => self.quoted_string(start, ch),
            c if c.is_ascii_digit() => self.number(start),
            c if c.is_ascii_alphabetic() || c == '_' => {
                self.advance_while(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
                let kind = match &self.source[start.offset..self.cursor.offset] {
                    "and" => TokenKind::And,
                    "or" => TokenKind::Or,
                    "not" => TokenKind::Not,
                    "true" | "TRUE" | "false" | "FALSE" => TokenKind::Boolean,
                    "null" | "NULL" => TokenKind::Null,
                    _ => TokenKind::Identifier,
                };
                Ok(self.finish(kind, start))
            }
            '&' if rest.starts_with("&&") => Ok(self.fixed(TokenKind::And, 2, start)),
            '|' if rest.starts_with("||") => Ok(self.fixed(TokenKind::Or, 2, start)),
            '=' if rest.starts_with("==") => Ok(self.fixed(TokenKind::EqEq, 2, start)),
            '=' if rest.starts_with("=>") => Ok(self.fixed(TokenKind::Arrow, 2, start)),
            '!' if rest.starts_with("!=") => Ok(self.fixed(TokenKind::NotEq, 2, start)),
            '<' if rest.starts_with("<=") => Ok(self.fixed(TokenKind::Lte, 2, start)),
            '>' if rest.starts_with(">=") => Ok(self.fixed(TokenKind::Gte, 2, start)),
            '.' if rest.starts_with("...") => Ok(self.fixed(TokenKind::Ellipsis, 3, start)),
            '&' => Ok(self.fixed(TokenKind::Amp, 1, start)),
            '|' => Ok(self.fixed(TokenKind::Pipe, 1, start)),
            '=' => Ok(self.fixed(TokenKind::Equals, 1, start)),
            '!' => Ok(self.fixed(TokenKind::Not, 1, start)),
            '<' => Ok(self.fixed(TokenKind::Lt, 1, start)),
            '>' => Ok(self.fixed(TokenKind::Gt, 1, start)),
            '+' => Ok(self.fixed(TokenKind::Plus, 1, start)),
            '-' => Ok(self.fixed(TokenKind::Minus, 1, start)),
            '*' => Ok(self.fixed(TokenKind::Star, 1, start)),
            '/' => Ok(self.fixed(TokenKind::Slash, 1, start)),
            '%' => Ok(self.fixed(TokenKind::Percent, 1, start)),
            '?' => Ok(self.fixed(TokenKind::Question, 1, start)),
            ':' => Ok(self.fixed(TokenKind::Colon, 1, start)),
            '.' => Ok(self.fixed(TokenKind::Dot, 1, start)),
            ',' => Ok(self.fixed(TokenKind::Comma, 1, start)),
            '(' => Ok(self.fixed(TokenKind::LParen, 1, start)),
            ')' => Ok(self.fixed(TokenKind::RParen, 1, start)),
            '[' => Ok(self.fixed(TokenKind::LBracket, 1, start)),
            ']' => Ok(self.fixed(TokenKind::RBracket, 1, start)),
            '{' => Ok(self.fixed(TokenKind::LBrace, 1, start)),
            '}' => Ok(self.fixed(TokenKind::RBrace, 1, start)),
            '`' => Ok(self.fixed(TokenKind::Backtick, 1, start)),
            _ => Err(self.unrecognized(start, ch)),
        }
    }

    // --- AFX ---

    fn scan_afx_tag(&mut self, start: Cursor, ch: char) -> Result<Token<'src>, LexerError> {
        match ch {
            '"' | '\'' => self.quoted_string(start, ch),
            '/' if self.rest().starts_with("/>") => Ok(self.fixed(TokenKind::SlashGt, 2, start)),
            '/' => Ok(self.fixed(TokenKind::Slash, 1, start)),
            '>' => Ok(self.fixed(TokenKind::Gt, 1, start)),
            '<' => Ok(self.fixed(TokenKind::Lt, 1, start)),
            '=' => Ok(self.fixed(TokenKind::Equals, 1, start)),
            '.' => Ok(self.fixed(TokenKind::Dot, 1, start)),
            ':' => Ok(self.fixed(TokenKind::Colon, 1, start)),
            '@' => Ok(self.fixed(TokenKind::At, 1, start)),
            '{' => Ok(self.fixed(TokenKind::LBrace, 1, start)),
            '}' => Ok(self.fixed(TokenKind::RBrace, 1, start)),
            '`' => Ok(self.fixed(TokenKind::Backtick, 1, start)),
            c if is_afx_identifier_char(c) => {
                self.advance_while(is_afx_identifier_char);
                Ok(self.finish(TokenKind::Identifier, start))
            }
            _ => Err(self.unrecognized(start, ch)),
        }
    }

    fn scan_afx_content(&mut self, start: Cursor, ch: char) -> Result<Token<'src>, LexerError> {
        match ch {
            '<' if self.rest().starts_with("<!--") => self.scan_external(ExternalToken::AfxComment),
            '<' => Ok(self.fixed(TokenKind::Lt, 1, start)),
            '>' => Ok(self.fixed(TokenKind::Gt, 1, start)),
            '{' => Ok(self.fixed(TokenKind::LBrace, 1, start)),
            '}' => Ok(self.fixed(TokenKind::RBrace, 1, start)),
            '`' => Ok(self.fixed(TokenKind::Backtick, 1, start)),
            _ => {
                // Trailing whitespace is left for the next scan to record as an extra.
                let mut text_end = self.cursor;
                while let Some(c) = self.peek_char() {
                    if matches!(c, '{' | '}' | '<' | '>' | '`') {
                        break;
                    }
                    self.advance();
                    if !is_extra_whitespace(c) {
                        text_end = self.cursor;
                    }
                }
                self.cursor = text_end;
                Ok(self.finish(TokenKind::Text, start))
            }
        }
    }

    // --- RuneScript ---

    fn scan_rune(&mut self, start: Cursor, ch: char) -> Result<Token<'src>, LexerError> {
        let rest = self.rest();
        let next = rest[ch.len_utf8()..].chars().next();
        match ch {
            '"' => Ok(self.fixed(TokenKind::Quote, 1, start)),
            '\'' => self.char_literal(start),
            '.' if rest.starts_with(".%") => Ok(self.fixed(TokenKind::DotPercent, 2, start)),
            '+' if !next.is_some_and(is_rune_word_char) => Ok(self.fixed(TokenKind::Plus, 1, start)),
            ':' if !next.is_some_and(is_rune_word_char) => Ok(self.fixed(TokenKind::Colon, 1, start)),
            c if is_rune_word_char(c) => self.rune_word(start),
            '<' if rest.starts_with("<=") => Ok(self.fixed(TokenKind::Lte, 2, start)),
            '>' if rest.starts_with(">=") => Ok(self.fixed(TokenKind::Gte, 2, start)),
            '<' => Ok(self.fixed(TokenKind::Lt, 1, start)),
            '>' => Ok(self.fixed(TokenKind::Gt, 1, start)),
            '=' => Ok(self.fixed(TokenKind::Equals, 1, start)),
            '!' => Ok(self.fixed(TokenKind::Bang, 1, start)),
            '&' => Ok(self.fixed(TokenKind::Amp, 1, start)),
            '|' => Ok(self.fixed(TokenKind::Pipe, 1, start)),
            '*' => Ok(self.fixed(TokenKind::Star, 1, start)),
            '/' => Ok(self.fixed(TokenKind::Slash, 1, start)),
            '-' => Ok(self.fixed(TokenKind::Minus, 1, start)),
            '%' => Ok(self.fixed(TokenKind::Percent, 1, start)),
            '$' => Ok(self.fixed(TokenKind::Dollar, 1, start)),
            '^' => Ok(self.fixed(TokenKind::Caret, 1, start)),
            '~' => Ok(self.fixed(TokenKind::Tilde, 1, start)),
            '@' => Ok(self.fixed(TokenKind::At, 1, start)),
            ',' => Ok(self.fixed(TokenKind::Comma, 1, start)),
            ';' => Ok(self.fixed(TokenKind::Semicolon, 1, start)),
            '(' => Ok(self.fixed(TokenKind::LParen, 1, start)),
            ')' => Ok(self.fixed(TokenKind::RParen, 1, start)),
            '[' => Ok(self.fixed(TokenKind::LBracket, 1, start)),
            ']' => Ok(self.fixed(TokenKind::RBracket, 1, start)),
            '{' => Ok(self.fixed(TokenKind::LBrace, 1, start)),
            '}' => Ok(self.fixed(TokenKind::RBrace, 1, start)),
            _ => Err(self.unrecognized(start, ch)),
        }
    }

    /// A RuneScript word. Trailing colons belong to the surrounding syntax
    /// (`case 1:`), so they are left unconsumed.
    fn rune_word(&mut self, start: Cursor) -> Result<Token<'src>, LexerError> {
        let mut word_end = self.cursor;
        while let Some(c) = self.peek_char() {
            if !is_rune_word_char(c) {
                break;
            }
            self.advance();
            if c != ':' {
                word_end = self.cursor;
            }
        }
        self.cursor = word_end;
        let kind = classify_rune_word(&self.source[start.offset..self.cursor.offset]);
        Ok(self.finish(kind, start))
    }

    fn char_literal(&mut self, start: Cursor) -> Result<Token<'src>, LexerError> {
        self.advance(); // opening quote
        match self.peek_char() {
            Some('\\') => {
                self.advance();
                match self.peek_char() {
                    Some('\\' | '\'') => self.advance(),
                    _ => {
                        return Err(self.error(
                            LexErrorKind::InvalidEscape,
                            "Invalid escape in char literal".into(),
                            start,
                        ))
                    }
                }
            }
            Some(c) if c != '\r' && c != '\n' => self.advance(),
            _ => return Err(self.unterminated(start, "Unterminated char literal")),
        }
        if self.peek_char() != Some('\'') {
            return Err(self.unterminated(start, "Unterminated char literal"));
        }
        self.advance();
        Ok(self.finish(TokenKind::Char, start))
    }

    fn scan_rune_string(&mut self, start: Cursor, ch: char) -> Result<Token<'src>, LexerError> {
        match ch {
            '"' => Ok(self.fixed(TokenKind::Quote, 1, start)),
            '\\' => match self.rest()[1..].chars().next() {
                Some('\\' | '"' | '<') => Ok(self.fixed(TokenKind::EscapeSequence, 2, start)),
                Some(other) => Err(self.error(
                    LexErrorKind::InvalidEscape,
                    format!("Invalid escape sequence: '\\{other}'"),
                    start,
                )),
                // A dangling backslash; the missing closing quote is reported by the parser.
                None => Ok(self.fixed(TokenKind::StringFragment, 1, start)),
            },
            '<' => match string_tag_len(self.rest()) {
                Some(len) => Ok(self.fixed(TokenKind::StringTag, len, start)),
                None => Ok(self.fixed(TokenKind::Lt, 1, start)),
            },
            _ => {
                self.advance_while(|c| !matches!(c, '"' | '\\' | '<'));
                Ok(self.finish(TokenKind::StringFragment, start))
            }
        }
    }

    // --- Shared literal scanners ---

    /// Single- or double-quoted string. `\\` and `\<quote>` are escapes; any
    /// other backslash is literal.
    fn quoted_string(&mut self, start: Cursor, quote: char) -> Result<Token<'src>, LexerError> {
        self.advance(); // opening quote
        loop {
            match self.peek_char() {
                None => return Err(self.unterminated(start, "Unterminated string")),
                Some('\\') => {
                    self.advance();
                    if self.peek_char().is_some() {
                        self.advance();
                    }
                }
                Some(c) if c == quote => {
                    self.advance();
                    return Ok(self.finish(TokenKind::String, start));
                }
                Some(_) => self.advance(),
            }
        }
    }

    /// Decimal number with an optional fraction; a sign has already been consumed.
    fn number(&mut self, start: Cursor) -> Result<Token<'src>, LexerError> {
        self.advance_while(|c| c.is_ascii_digit());
        let rest = self.rest();
        if rest.starts_with('.') && rest[1..].starts_with(|c: char| c.is_ascii_digit()) {
            self.advance();
            self.advance_while(|c| c.is_ascii_digit());
        }
        Ok(self.finish(TokenKind::Number, start))
    }

    fn block_comment(&mut self, start: Cursor) -> Result<(), LexerError> {
        match self.rest()[2..].find("*/") {
            Some(len) => {
                self.advance_to(start.offset + 2 + len + 2);
                Ok(())
            }
            None => Err(self.unterminated(start, "Unterminated block comment")),
        }
    }

    // --- Helpers ---

    fn rest(&self) -> &'src str {
        &self.source[self.cursor.offset..]
    }

    fn advance(&mut self) {
        if let Some(c) = self.peek_char() {
            self.cursor.offset += c.len_utf8();
            if c == '\n' {
                self.cursor.line += 1;
                self.cursor.column = 1;
            } else {
                self.cursor.column += 1;
            }
        }
    }

    fn advance_while(&mut self, predicate: impl Fn(char) -> bool) {
        while self.peek_char().is_some_and(&predicate) {
            self.advance();
        }
    }

    /// Consume `len` bytes and produce a token of `kind`.
    fn fixed(&mut self, kind: TokenKind, len: usize, start: Cursor) -> Token<'src> {
        self.advance_to(start.offset + len);
        self.finish(kind, start)
    }

    fn finish(&self, kind: TokenKind, start: Cursor) -> Token<'src> {
        Token::new(
            kind,
            &self.source[start.offset..self.cursor.offset],
            self.span_from(start),
        )
    }

    fn span_from(&self, start: Cursor) -> Span {
        Span::new(start.offset, self.cursor.offset, start.line, start.column)
    }

    fn error(&self, kind: LexErrorKind, message: String, start: Cursor) -> LexerError {
        let width = self.source[start.offset..]
            .chars()
            .next()
            .map_or(0, char::len_utf8);
        LexerError {
            kind,
            message,
            span: Span::new(start.offset, start.offset + width, start.line, start.column),
        }
    }

    fn unterminated(&self, start: Cursor, message: &str) -> LexerError {
        self.error(LexErrorKind::UnterminatedLiteral, message.into(), start)
    }

    fn unrecognized(&self, start: Cursor, ch: char) -> LexerError {
        self.error(
            LexErrorKind::UnrecognizedCharacter,
            format!("Unexpected character: '{ch}'"),
            start,
        )
    }
}

/// Lazy token iterator returned by [`Scanner::tokens`]. Ends after `Eof` or
/// the first error.
pub struct Tokens<'src> {
    scanner: Scanner<'src>,
    mode: ScannerMode,
    done: bool,
}

impl<'src> Iterator for Tokens<'src> {
    type Item = Result<Token<'src>, LexerError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let result = self.scanner.scan(self.mode);
        self.done = !matches!(&result, Ok(token) if token.kind != TokenKind::Eof);
        Some(result)
    }
}

/// Decode a quoted Fusion/EEL/AFX string token: strip the quotes and resolve
/// `\\` and the escaped quote character.
pub fn decode_string(text: &str) -> String {
    let mut chars = text.chars();
    let Some(quote) = chars.next() else {
        return String::new();
    };
    let body = chars.as_str();
    let body = body.strip_suffix(quote).unwrap_or(body);

    let mut value = String::with_capacity(body.len());
    let mut chars = body.chars().peekable();
    while let Some(c) = chars.next() {
        match (c, chars.peek()) {
            ('\\', Some(&next)) if next == '\\' || next == quote => {
                value.push(next);
                chars.next();
            }
            _ => value.push(c),
        }
    }
    value
}

/// Whitespace extras, including the zero-width characters Fusion files carry.
pub fn is_extra_whitespace(c: char) -> bool {
    c.is_whitespace() || matches!(c, '\u{FEFF}' | '\u{2060}' | '\u{200B}')
}

fn is_path_word_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn is_afx_identifier_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-'
}

fn is_rune_word_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '+' | '.' | ':')
}

/// Classify a RuneScript word by ordered alternation: every specific literal
/// or keyword pattern is tried against the whole word before it falls back
/// to a plain identifier.
pub fn classify_rune_word(word: &str) -> TokenKind {
    if is_digit_groups(word, 5) {
        TokenKind::Coord
    } else if is_digit_groups(word, 3) {
        TokenKind::MapZone
    } else if is_hex_literal(word) {
        TokenKind::Hex
    } else if !word.is_empty() && word.bytes().all(|b| b.is_ascii_digit()) {
        TokenKind::Number
    } else if word == "true" || word == "false" {
        TokenKind::Boolean
    } else if word == "null" {
        TokenKind::Null
    } else if word == "default" {
        TokenKind::Default
    } else if word.len() > "switch_".len() && word.starts_with("switch_") {
        TokenKind::SwitchType
    } else if word.len() > "def_".len() && word.starts_with("def_") {
        TokenKind::DefType
    } else if word.len() > "array".len() && word.ends_with("array") {
        TokenKind::TypeArray
    } else {
        match word {
            "if" => TokenKind::If,
            "else" => TokenKind::Else,
            "while" => TokenKind::While,
            "return" => TokenKind::Return,
            "calc" => TokenKind::Calc,
            "case" => TokenKind::Case,
            _ => TokenKind::Identifier,
        }
    }
}

fn is_digit_groups(word: &str, groups: usize) -> bool {
    let parts: Vec<&str> = word.split('_').collect();
    parts.len() == groups
        && parts
            .iter()
            .all(|part| !part.is_empty() && part.bytes().all(|b| b.is_ascii_digit()))
}

fn is_hex_literal(word: &str) -> bool {
    word.strip_prefix("0x")
        .or_else(|| word.strip_prefix("0X"))
        .is_some_and(|digits| !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_hexdigit()))
}

/// Length of a RuneScript markup tag at the start of `rest`, if there is one:
/// `<tag>`, `</tag>`, `<tag=value>` or `<p,value>`.
fn string_tag_len(rest: &str) -> Option<usize> {
    let body = rest.strip_prefix('<')?;
    let value_len = |value: &str| -> Option<usize> {
        let len = value.find(|c| c == '<' || c == '>')?;
        (len > 0 && value[len..].starts_with('>')).then_some(len)
    };

    if let Some(value) = body.strip_prefix("p,") {
        return value_len(value).map(|len| 1 + 2 + len + 1);
    }

    let (slash, body) = match body.strip_prefix('/') {
        Some(body) => (1, body),
        None => (0, body),
    };
    RUNE_STRING_TAGS.iter().find_map(|tag| {
        let after = body.strip_prefix(tag)?;
        if after.starts_with('>') {
            Some(1 + slash + tag.len() + 1)
        } else {
            let value = after.strip_prefix('=')?;
            value_len(value).map(|len| 1 + slash + tag.len() + 1 + len + 1)
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    /// Helper: tokenize and return token kinds.
    fn kinds(source: &str, mode: ScannerMode) -> Vec<TokenKind> {
        Scanner::tokenize(source, mode)
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    /// Helper: tokenize and return token texts (without the trailing Eof).
    fn texts(source: &str, mode: ScannerMode) -> Vec<&str> {
        Scanner::tokenize(source, mode)
            .unwrap()
            .into_iter()
            .filter(|t| t.kind != TokenKind::Eof)
            .map(|t| t.text)
            .collect()
    }

    // =========================================================================
    // Structure
    // =========================================================================

    #[test]
    fn test_empty_source() {
        for mode in [ScannerMode::Fusion, ScannerMode::Eel, ScannerMode::RuneScript] {
            assert_eq!(kinds("", mode), vec![TokenKind::Eof]);
        }
    }

    #[test]
    fn test_whitespace_recorded_as_extra() {
        let mut scanner = Scanner::new("  a");
        let token = scanner.scan(ScannerMode::Eel).unwrap();
        assert_eq!(token.text, "a");
        assert_eq!(scanner.extras().len(), 1);
        assert_eq!(scanner.extras()[0].kind, ExtraKind::Whitespace);
        assert_eq!(scanner.extras()[0].span.end, 2);
    }

    #[test]
    fn test_backtracking_does_not_duplicate_extras() {
        let mut scanner = Scanner::new("  a  b");
        let saved = scanner.cursor();
        scanner.scan(ScannerMode::Eel).unwrap();
        scanner.reset(saved);
        scanner.scan(ScannerMode::Eel).unwrap();
        scanner.scan(ScannerMode::Eel).unwrap();
        assert_eq!(scanner.extras().len(), 2);
    }

    #[test]
    fn test_span_tracking_lines() {
        let tokens = Scanner::tokenize("a\n  b", ScannerMode::Eel).unwrap();
        assert_eq!(tokens[0].span, Span::new(0, 1, 1, 1));
        assert_eq!(tokens[1].span, Span::new(4, 5, 2, 3));
    }

    #[test]
    fn test_iterator_stops_after_error() {
        let items: Vec<_> = Scanner::tokens("a ¤ b", ScannerMode::Eel).collect();
        assert_eq!(items.len(), 2);
        assert!(items[1].is_err());
    }

    // =========================================================================
    // Fusion
    // =========================================================================

    #[test]
    fn test_fusion_path() {
        assert_eq!(
            kinds("root.@process.'quoted' = ", ScannerMode::Fusion),
            vec![
                TokenKind::Identifier,
                TokenKind::Dot,
                TokenKind::At,
                TokenKind::Identifier,
                TokenKind::Dot,
                TokenKind::String,
                TokenKind::Equals,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_fusion_path_part_with_colon_and_dash() {
        assert_eq!(
            texts("Neos.Neos:Page data-id", ScannerMode::Fusion),
            vec!["Neos", ".", "Neos:Page", "data-id"]
        );
    }

    #[test]
    fn test_fusion_path_part_never_ends_with_dash() {
        assert_eq!(texts("data-id: x", ScannerMode::Fusion), vec!["data-id", ":", "x"]);
    }

    #[test]
    fn test_fusion_declaration_keywords() {
        assert_eq!(
            kinds("namespace: Foo", ScannerMode::Fusion)[..2],
            [TokenKind::Namespace, TokenKind::Colon]
        );
        assert_eq!(
            kinds("include : x", ScannerMode::Fusion)[..2],
            [TokenKind::Include, TokenKind::Colon]
        );
        assert_eq!(kinds("namespaced = 1", ScannerMode::Fusion)[0], TokenKind::Identifier);
    }

    #[test]
    fn test_fusion_comments_are_tokens() {
        assert_eq!(
            kinds("// a\n# b\n/* c\n d */", ScannerMode::Fusion),
            vec![
                TokenKind::Comment,
                TokenKind::Comment,
                TokenKind::Comment,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_fusion_unterminated_block_comment() {
        let err = Scanner::tokenize("  /* open", ScannerMode::Fusion).unwrap_err();
        assert_eq!(err.kind, LexErrorKind::UnterminatedLiteral);
        assert_eq!(err.span.start, 2);
    }

    #[test]
    fn test_fusion_value_literals() {
        assert_eq!(
            kinds("-1.5 'x' TRUE null Neos.Fusion:Value", ScannerMode::FusionValue),
            vec![
                TokenKind::Number,
                TokenKind::String,
                TokenKind::Boolean,
                TokenKind::Null,
                TokenKind::Identifier,
                TokenKind::Dot,
                TokenKind::Identifier,
                TokenKind::Colon,
                TokenKind::Identifier,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_fusion_value_dsl_openers() {
        let tokens = Scanner::tokenize("afx` x", ScannerMode::FusionValue).unwrap();
        assert_eq!(tokens[0].kind, TokenKind::AfxStart);
        assert_eq!(tokens[0].text, "afx`");

        let tokens = Scanner::tokenize("markdown`", ScannerMode::FusionValue).unwrap();
        assert_eq!(tokens[0].kind, TokenKind::DslStart);
    }

    #[test]
    fn test_dsl_content_external() {
        let mut scanner = Scanner::new("md`# Title\nbody` rest");
        assert_eq!(scanner.scan(ScannerMode::FusionValue).unwrap().kind, TokenKind::DslStart);
        let body = scanner.scan_external(ExternalToken::DslContent).unwrap();
        assert_eq!(body.text, "# Title\nbody");
        assert_eq!(scanner.scan(ScannerMode::AfxContent).unwrap().kind, TokenKind::Backtick);
    }

    #[test]
    fn test_source_reference_external() {
        let mut scanner = Scanner::new("  \"resource://Foo/Private/**/*\" next");
        let token = scanner.scan_external(ExternalToken::SourceReference).unwrap();
        assert_eq!(token.text, "\"resource://Foo/Private/**/*\"");

        let mut scanner = Scanner::new("Root.fusion\nfoo = 1");
        let token = scanner.scan_external(ExternalToken::SourceReference).unwrap();
        assert_eq!(token.text, "Root.fusion");
    }

    // =========================================================================
    // EEL
    // =========================================================================

    #[test]
    fn test_eel_operators() {
        assert_eq!(
            kinds("a && b || !c and d or not e", ScannerMode::Eel),
            vec![
                TokenKind::Identifier,
                TokenKind::And,
                TokenKind::Identifier,
                TokenKind::Or,
                TokenKind::Not,
                TokenKind::Identifier,
                TokenKind::And,
                TokenKind::Identifier,
                TokenKind::Or,
                TokenKind::Not,
                TokenKind::Identifier,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_eel_comparison_and_arrow() {
        assert_eq!(
            kinds("== != <= >= < > => ...", ScannerMode::Eel),
            vec![
                TokenKind::EqEq,
                TokenKind::NotEq,
                TokenKind::Lte,
                TokenKind::Gte,
                TokenKind::Lt,
                TokenKind::Gt,
                TokenKind::Arrow,
                TokenKind::Ellipsis,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_eel_identifier_allows_dash() {
        assert_eq!(texts("data-id - 1", ScannerMode::Eel), vec!["data-id", "-", "1"]);
    }

    #[test]
    fn test_eel_number_fraction() {
        assert_eq!(texts("2.75 items.0", ScannerMode::Eel), vec!["2.75", "items", ".", "0"]);
    }

    #[test]
    fn test_eel_unterminated_string_anchored_at_quote() {
        let err = Scanner::tokenize("a + 'hello", ScannerMode::Eel).unwrap_err();
        assert_eq!(err.kind, LexErrorKind::UnterminatedLiteral);
        assert_eq!(err.span.start, 4);
        assert_eq!(err.span.end, 5);
    }

    #[test]
    fn test_escaped_quote_does_not_terminate() {
        let tokens = Scanner::tokenize(r#""a\"b""#, ScannerMode::Eel).unwrap();
        assert_eq!(tokens[0].kind, TokenKind::String);
        assert_eq!(tokens[0].text, r#""a\"b""#);
    }

    #[test]
    fn test_decode_string() {
        assert_eq!(decode_string(r#""a\"b""#), "a\"b");
        assert_eq!(decode_string(r"'a\\b'"), "a\\b");
        assert_eq!(decode_string(r"'it\'s'"), "it's");
        assert_eq!(decode_string(r#""keep\n""#), "keep\\n");
    }

    // =========================================================================
    // AFX
    // =========================================================================

    #[test]
    fn test_afx_content_text_is_trimmed() {
        let tokens = Scanner::tokenize("  Hello world  <", ScannerMode::AfxContent).unwrap();
        assert_eq!(tokens[0].kind, TokenKind::Text);
        assert_eq!(tokens[0].text, "Hello world");
        assert_eq!(tokens[1].kind, TokenKind::Lt);
    }

    #[test]
    fn test_afx_comment() {
        let tokens = Scanner::tokenize("<!-- a <b> -->text", ScannerMode::AfxContent).unwrap();
        assert_eq!(tokens[0].kind, TokenKind::AfxComment);
        assert_eq!(tokens[0].text, "<!-- a <b> -->");
        assert_eq!(tokens[1].kind, TokenKind::Text);
    }

    #[test]
    fn test_afx_unterminated_comment() {
        let err = Scanner::tokenize("<!-- open", ScannerMode::AfxContent).unwrap_err();
        assert_eq!(err.kind, LexErrorKind::UnterminatedLiteral);
    }

    #[test]
    fn test_afx_tag_tokens() {
        assert_eq!(
            kinds("Neos.Fusion:Tag @if.x=\"y\" {z} />", ScannerMode::AfxTag),
            vec![
                TokenKind::Identifier,
                TokenKind::Dot,
                TokenKind::Identifier,
                TokenKind::Colon,
                TokenKind::Identifier,
                TokenKind::At,
                TokenKind::Identifier,
                TokenKind::Dot,
                TokenKind::Identifier,
                TokenKind::Equals,
                TokenKind::String,
                TokenKind::LBrace,
                TokenKind::Identifier,
                TokenKind::RBrace,
                TokenKind::SlashGt,
                TokenKind::Eof,
            ]
        );
    }

    // =========================================================================
    // RuneScript
    // =========================================================================

    #[test]
    fn test_rune_word_classification() {
        assert_eq!(classify_rune_word("0_50_50_22_22"), TokenKind::Coord);
        assert_eq!(classify_rune_word("0_50_50"), TokenKind::MapZone);
        assert_eq!(classify_rune_word("0xFF"), TokenKind::Hex);
        assert_eq!(classify_rune_word("42"), TokenKind::Number);
        assert_eq!(classify_rune_word("true"), TokenKind::Boolean);
        assert_eq!(classify_rune_word("null"), TokenKind::Null);
        assert_eq!(classify_rune_word("default"), TokenKind::Default);
        assert_eq!(classify_rune_word("switch_int"), TokenKind::SwitchType);
        assert_eq!(classify_rune_word("def_string"), TokenKind::DefType);
        assert_eq!(classify_rune_word("intarray"), TokenKind::TypeArray);
        assert_eq!(classify_rune_word("if"), TokenKind::If);
        assert_eq!(classify_rune_word("trueish"), TokenKind::Identifier);
        assert_eq!(classify_rune_word("array"), TokenKind::Identifier);
        assert_eq!(classify_rune_word("switch_"), TokenKind::Identifier);
        assert_eq!(classify_rune_word("npc_find"), TokenKind::Identifier);
    }

    #[test]
    fn test_rune_sigils_and_operators() {
        assert_eq!(
            kinds("$a %b .%c ^d ~e @f + 1", ScannerMode::RuneScript),
            vec![
                TokenKind::Dollar,
                TokenKind::Identifier,
                TokenKind::Percent,
                TokenKind::Identifier,
                TokenKind::DotPercent,
                TokenKind::Identifier,
                TokenKind::Caret,
                TokenKind::Identifier,
                TokenKind::Tilde,
                TokenKind::Identifier,
                TokenKind::At,
                TokenKind::Identifier,
                TokenKind::Plus,
                TokenKind::Number,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_rune_case_label_colon() {
        assert_eq!(texts("case 1: ;", ScannerMode::RuneScript), vec!["case", "1", ":", ";"]);
    }

    #[test]
    fn test_rune_comments_are_extras() {
        let mut scanner = Scanner::new("// c\n/* d */ x");
        let token = scanner.scan(ScannerMode::RuneScript).unwrap();
        assert_eq!(token.text, "x");
        let comments = scanner
            .extras()
            .iter()
            .filter(|e| e.kind == ExtraKind::Comment)
            .count();
        assert_eq!(comments, 2);
    }

    #[test]
    fn test_rune_char_literal() {
        assert_eq!(kinds(r"'a' '\''", ScannerMode::RuneScript)[..2], [TokenKind::Char, TokenKind::Char]);
        let err = Scanner::tokenize("'ab'", ScannerMode::RuneScript).unwrap_err();
        assert_eq!(err.kind, LexErrorKind::UnterminatedLiteral);
    }

    #[test]
    fn test_rune_string_parts() {
        assert_eq!(
            kinds(r#"Hi <col=ff0000>\<x</col><br><p,a b><$name>""#, ScannerMode::RuneString),
            vec![
                TokenKind::StringFragment,
                TokenKind::StringTag,
                TokenKind::EscapeSequence,
                TokenKind::StringFragment,
                TokenKind::StringTag,
                TokenKind::StringTag,
                TokenKind::StringTag,
                TokenKind::Lt,
                TokenKind::StringFragment,
                TokenKind::Quote,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_rune_string_invalid_escape() {
        let err = Scanner::tokenize(r"a\n", ScannerMode::RuneString).unwrap_err();
        assert_eq!(err.kind, LexErrorKind::InvalidEscape);
        assert_eq!(err.span.start, 1);
    }

    #[test]
    fn test_string_tag_len() {
        assert_eq!(string_tag_len("<br>"), Some(4));
        assert_eq!(string_tag_len("</col>"), Some(6));
        assert_eq!(string_tag_len("<col=ff>x"), Some(8));
        assert_eq!(string_tag_len("<p,x>"), Some(5));
        assert_eq!(string_tag_len("<strength>"), None);
        assert_eq!(string_tag_len("<col=>"), None);
        assert_eq!(string_tag_len("<$a>"), None);
    }
}
