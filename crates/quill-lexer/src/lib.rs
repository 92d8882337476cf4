//! Quill Lexer
//!
//! Scans Fusion, EEL, AFX and RuneScript source text into tokens.
//! The scanner is mode-driven: the parser asks for one token at a time in
//! the lexical regime valid at that grammar position, which is how one
//! source file can embed expressions and markup inside declarations.
//! Whitespace and comments that carry no grammar meaning are kept as
//! [`Extra`]s so tooling can still address them.
//!
//! # Example
//!
//! ```
//! use quill_lexer::{Scanner, ScannerMode};
//!
//! let tokens = Scanner::tokenize("", ScannerMode::Eel).unwrap();
//! assert_eq!(tokens.len(), 1); // Just EOF
//! ```

pub mod scanner;
pub mod token;

use serde::Serialize;

pub use scanner::{
    classify_rune_word, decode_string, is_extra_whitespace, Cursor, ExternalToken, Scanner,
    ScannerMode, Tokens,
};
pub use token::{Extra, ExtraKind, Span, Token, TokenKind, RUNE_STRING_TAGS};

/// Classification of lexical failures. All of them are fatal to a parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LexErrorKind {
    UnterminatedLiteral,
    InvalidEscape,
    UnrecognizedCharacter,
}

/// Lexer error with position information.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("Lexer error at line {}, column {}: {message}", .span.line, .span.column)]
pub struct LexerError {
    pub kind: LexErrorKind,
    pub message: String,
    pub span: Span,
}
