use serde::Serialize;

/// A region of source text, tracking line and column for error reporting.
///
/// `start` and `end` are byte offsets; `line` and `column` are 1-based and
/// describe `start`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
    pub line: usize,
    pub column: usize,
}

impl Span {
    pub fn new(start: usize, end: usize, line: usize, column: usize) -> Self {
        Self {
            start,
            end,
            line,
            column,
        }
    }

    /// Span covering `self` through the end of `other`.
    pub fn to(self, other: Span) -> Span {
        Span {
            start: self.start,
            end: other.end.max(self.end),
            line: self.line,
            column: self.column,
        }
    }

    pub fn contains(&self, other: &Span) -> bool {
        self.start <= other.start && other.end <= self.end
    }
}

/// Token classification shared by every lexical mode.
///
/// Which kinds a scan can produce depends on the [`ScannerMode`] it runs in;
/// the token text always carries the exact source slice.
///
/// [`ScannerMode`]: crate::ScannerMode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum TokenKind {
    // Words and literals
    Identifier,
    Number,
    String,
    Boolean,
    Null,

    // Fusion
    Comment,
    Namespace,
    Include,
    DollarBrace,
    DslStart,
    AfxStart,
    DslContent,
    SourceReference,
    Backtick,

    // AFX
    Text,
    AfxComment,
    SlashGt,

    // RuneScript words
    Hex,
    Coord,
    MapZone,
    Char,
    TypeArray,
    SwitchType,
    DefType,
    Default,
    If,
    Else,
    While,
    Return,
    Calc,
    Case,

    // RuneScript strings
    Quote,
    StringFragment,
    EscapeSequence,
    StringTag,

    // Operators
    And,
    Or,
    Not,
    EqEq,
    NotEq,
    Lt,
    Lte,
    Gt,
    Gte,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Question,
    Arrow,
    Ellipsis,
    Amp,
    Pipe,
    Bang,

    // Sigils
    Dollar,
    DotPercent,
    Caret,
    Tilde,
    At,

    // Punctuation
    Equals,
    Dot,
    Comma,
    Colon,
    Semicolon,
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,

    // End of input
    Eof,
}

impl TokenKind {
    /// Human readable description used in "expected ..." diagnostics.
    pub fn describe(self) -> &'static str {
        match self {
            TokenKind::Identifier => "identifier",
            TokenKind::Number => "number",
            TokenKind::String => "string",
            TokenKind::Boolean => "boolean",
            TokenKind::Null => "null",
            TokenKind::Comment => "comment",
            TokenKind::Namespace => "`namespace`",
            TokenKind::Include => "`include`",
            TokenKind::DollarBrace => "`${`",
            TokenKind::DslStart => "dsl literal",
            TokenKind::AfxStart => "``afx` ``",
            TokenKind::DslContent => "dsl content",
            TokenKind::SourceReference => "include source",
            TokenKind::Backtick => "```",
            TokenKind::Text => "text",
            TokenKind::AfxComment => "afx comment",
            TokenKind::SlashGt => "`/>`",
            TokenKind::Hex => "hex literal",
            TokenKind::Coord => "coord literal",
            TokenKind::MapZone => "map zone",
            TokenKind::Char => "char literal",
            TokenKind::TypeArray => "array type",
            TokenKind::SwitchType => "switch keyword",
            TokenKind::DefType => "def keyword",
            TokenKind::Default => "`default`",
            TokenKind::If => "`if`",
            TokenKind::Else => "`else`",
            TokenKind::While => "`while`",
            TokenKind::Return => "`return`",
            TokenKind::Calc => "`calc`",
            TokenKind::Case => "`case`",
            TokenKind::Quote => "`\"`",
            TokenKind::StringFragment => "string characters",
            TokenKind::EscapeSequence => "escape sequence",
            TokenKind::StringTag => "string tag",
            TokenKind::And => "`&&`",
            TokenKind::Or => "`||`",
            TokenKind::Not => "`!`",
            TokenKind::EqEq => "`==`",
            TokenKind::NotEq => "`!=`",
            TokenKind::Lt => "`<`",
            TokenKind::Lte => "`<=`",
            TokenKind::Gt => "`>`",
            TokenKind::Gte => "`>=`",
            TokenKind::Plus => "`+`",
            TokenKind::Minus => "`-`",
            TokenKind::Star => "`*`",
            TokenKind::Slash => "`/`",
            TokenKind::Percent => "`%`",
            TokenKind::Question => "`?`",
            TokenKind::Arrow => "`=>`",
            TokenKind::Ellipsis => "`...`",
            TokenKind::Amp => "`&`",
            TokenKind::Pipe => "`|`",
            TokenKind::Bang => "`!`",
            TokenKind::Dollar => "`$`",
            TokenKind::DotPercent => "`.%`",
            TokenKind::Caret => "`^`",
            TokenKind::Tilde => "`~`",
            TokenKind::At => "`@`",
            TokenKind::Equals => "`=`",
            TokenKind::Dot => "`.`",
            TokenKind::Comma => "`,`",
            TokenKind::Colon => "`:`",
            TokenKind::Semicolon => "`;`",
            TokenKind::LParen => "`(`",
            TokenKind::RParen => "`)`",
            TokenKind::LBracket => "`[`",
            TokenKind::RBracket => "`]`",
            TokenKind::LBrace => "`{`",
            TokenKind::RBrace => "`}`",
            TokenKind::Eof => "end of input",
        }
    }
}

/// A token produced by the scanner. The text borrows from the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token<'src> {
    pub kind: TokenKind,
    pub text: &'src str,
    pub span: Span,
}

impl<'src> Token<'src> {
    pub fn new(kind: TokenKind, text: &'src str, span: Span) -> Self {
        Self { kind, text, span }
    }

    /// Short form of the token for "found ..." diagnostics.
    pub fn describe(&self) -> String {
        match self.kind {
            TokenKind::Eof => "end of input".into(),
            _ if self.text.chars().count() > 24 => {
                let head: String = self.text.chars().take(24).collect();
                format!("`{head}...`")
            }
            _ => format!("`{}`", self.text),
        }
    }
}

/// Classification of skipped source regions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ExtraKind {
    Whitespace,
    Comment,
}

/// A whitespace run or comment the scanner skipped. Kept addressable by span.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Extra {
    pub kind: ExtraKind,
    pub span: Span,
}

/// Markup tags recognised inside RuneScript string literals.
pub const RUNE_STRING_TAGS: &[&str] = &["br", "col", "str", "shad", "u", "img", "gt", "lt"];
