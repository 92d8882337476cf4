//! Quill Parser
//!
//! Recursive-descent parsers for two unrelated languages:
//!
//! - **Fusion**, a configuration language with two embedded sub-languages:
//!   EEL expressions in `${...}` and AFX markup in ``afx`...` `` literals.
//! - **RuneScript**, a scripting language with trigger/subject headers and
//!   strings carrying markup tags and `<expr>` interpolations.
//!
//! All engines share one [`TokenStream`](stream::TokenStream), so an
//! embedded region is parsed in place and its spans index the outer source.
//!
//! ```
//! use quill_parser::parse_eel;
//!
//! let root = parse_eel("a + b * 2").into_result().unwrap();
//! assert_eq!(root.kind.name(), "binary_expression");
//! assert_eq!(root.value.as_deref(), Some("+"));
//! ```

pub mod afx_parser;
pub mod ast;
pub mod error;
pub mod expr_parser;
pub mod fusion_parser;
pub mod precedence;
pub mod rune_parser;
pub mod stream;

pub use ast::{AfxKind, EelKind, Field, FusionKind, LiteralKind, Node, NodeKind, RuneKind};
pub use error::{render_errors, ErrorContext, ErrorKind, ParseError, ParseResult, SyntaxTree};
pub use quill_lexer::Span;
pub use stream::{ParseOptions, DEFAULT_MAX_DEPTH};

use expr_parser::EelParser;
use fusion_parser::FusionParser;
use rune_parser::RuneParser;
use std::path::Path;
use stream::TokenStream;

/// Parse a Fusion source unit with default options.
pub fn parse_fusion(source: &str) -> ParseResult {
    parse_fusion_with(source, &ParseOptions::default())
}

pub fn parse_fusion_with(source: &str, options: &ParseOptions) -> ParseResult {
    let mut stream = TokenStream::new(source, *options);
    let mut parser = FusionParser::new(&mut stream);
    let outcome = parser.program();
    let errors = parser.into_errors();
    finish(stream, outcome, errors)
}

/// Parse a standalone EEL expression (no `${` `}` delimiters).
///
/// An expression has no statement boundary to resume at, so any error
/// ends the parse.
pub fn parse_eel(source: &str) -> ParseResult {
    parse_eel_with(source, &ParseOptions::default())
}

pub fn parse_eel_with(source: &str, options: &ParseOptions) -> ParseResult {
    let mut stream = TokenStream::new(source, *options);
    let outcome = EelParser::new(&mut stream).parse_standalone();
    finish(stream, outcome, Vec::new())
}

/// Parse a RuneScript source unit with default options.
pub fn parse_runescript(source: &str) -> ParseResult {
    parse_runescript_with(source, &ParseOptions::default())
}

pub fn parse_runescript_with(source: &str, options: &ParseOptions) -> ParseResult {
    let mut stream = TokenStream::new(source, *options);
    let mut parser = RuneParser::new(&mut stream);
    let outcome = parser.source_file();
    let errors = parser.into_errors();
    finish(stream, outcome, errors)
}

fn finish(
    stream: TokenStream<'_>,
    outcome: Result<Node, ParseError>,
    mut errors: Vec<ParseError>,
) -> ParseResult {
    match outcome {
        Ok(root) => ParseResult::Tree(SyntaxTree {
            root,
            errors,
            extras: stream.into_extras(),
        }),
        Err(fatal) => {
            errors.push(fatal);
            ParseResult::Fatal(errors)
        }
    }
}

/// The languages with a standalone entry point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Language {
    Fusion,
    Eel,
    RuneScript,
}

impl Language {
    /// Infer the language from a file extension.
    pub fn from_path(path: &Path) -> Option<Language> {
        match path.extension()?.to_str()? {
            "fusion" => Some(Language::Fusion),
            "eel" => Some(Language::Eel),
            "rs2" => Some(Language::RuneScript),
            _ => None,
        }
    }

    pub fn parse(self, source: &str, options: &ParseOptions) -> ParseResult {
        match self {
            Language::Fusion => parse_fusion_with(source, options),
            Language::Eel => parse_eel_with(source, options),
            Language::RuneScript => parse_runescript_with(source, options),
        }
    }
}
