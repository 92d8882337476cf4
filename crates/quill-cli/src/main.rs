use clap::{Parser, Subcommand, ValueEnum};
use quill_parser::{render_errors, Language, ParseOptions, ParseResult, DEFAULT_MAX_DEPTH};
use std::path::Path;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "quill")]
#[command(about = "Parser for Fusion, EEL and RuneScript sources")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Parse a file and print its syntax tree
    Parse {
        /// Input file (.fusion, .eel or .rs2)
        path: String,

        /// Language to parse as, overriding the file extension
        #[arg(long, value_enum)]
        lang: Option<Lang>,

        /// Print the tree as JSON instead of an S-expression
        #[arg(long)]
        json: bool,

        /// Maximum nesting depth before the parse is abandoned
        #[arg(long, default_value_t = DEFAULT_MAX_DEPTH)]
        max_depth: usize,
    },

    /// Check files for syntax errors without printing trees
    Check {
        /// Input files
        #[arg(required = true)]
        paths: Vec<String>,

        /// Language to parse as, overriding the file extension
        #[arg(long, value_enum)]
        lang: Option<Lang>,

        /// Stop at the first syntax error in each file
        #[arg(long)]
        no_recover: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Lang {
    Fusion,
    Eel,
    #[value(alias = "rs2")]
    Runescript,
}

impl From<Lang> for Language {
    fn from(lang: Lang) -> Self {
        match lang {
            Lang::Fusion => Language::Fusion,
            Lang::Eel => Language::Eel,
            Lang::Runescript => Language::RuneScript,
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let ok = match cli.command {
        Command::Parse {
            path,
            lang,
            json,
            max_depth,
        } => {
            let options = ParseOptions {
                max_depth,
                ..ParseOptions::default()
            };
            cmd_parse(&path, lang, json, &options)
        }
        Command::Check {
            paths,
            lang,
            no_recover,
        } => {
            let options = ParseOptions {
                recover: !no_recover,
                ..ParseOptions::default()
            };
            // Check every file even after a failure.
            paths
                .iter()
                .map(|path| cmd_check(path, lang, &options))
                .fold(true, |all, ok| all && ok)
        }
    };

    if ok {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

fn read_source(path: &str) -> Option<String> {
    let p = Path::new(path);
    if !p.exists() {
        eprintln!("Error: file not found: {path}");
        return None;
    }
    match std::fs::read_to_string(p) {
        Ok(source) => Some(source),
        Err(e) => {
            eprintln!("Error reading {path}: {e}");
            None
        }
    }
}

fn language_for(path: &str, lang: Option<Lang>) -> Option<Language> {
    if let Some(lang) = lang {
        return Some(lang.into());
    }
    let language = Language::from_path(Path::new(path));
    if language.is_none() {
        eprintln!("Error: cannot infer language of {path}; pass --lang");
    }
    language
}

fn parse_file(path: &str, lang: Option<Lang>, options: &ParseOptions) -> Option<(String, ParseResult)> {
    let language = language_for(path, lang)?;
    let source = read_source(path)?;
    let result = language.parse(&source, options);
    Some((source, result))
}

fn cmd_parse(path: &str, lang: Option<Lang>, json: bool, options: &ParseOptions) -> bool {
    let Some((source, result)) = parse_file(path, lang, options) else {
        return false;
    };

    if !result.errors().is_empty() {
        eprintln!("{}", render_errors(path, &source, result.errors()));
    }

    let Some(tree) = result.tree() else {
        return false;
    };
    if json {
        match serde_json::to_string_pretty(&tree.root) {
            Ok(text) => println!("{text}"),
            Err(e) => {
                eprintln!("Error serializing tree: {e}");
                return false;
            }
        }
    } else {
        println!("{}", tree.root.to_sexp());
    }
    tree.errors.is_empty()
}

fn cmd_check(path: &str, lang: Option<Lang>, options: &ParseOptions) -> bool {
    let Some((source, result)) = parse_file(path, lang, options) else {
        return false;
    };

    if result.is_ok() {
        eprintln!("OK: {path}");
        return true;
    }

    eprintln!("{}", render_errors(path, &source, result.errors()));
    eprintln!(
        "FAILED: {path} ({} error{})",
        result.errors().len(),
        if result.errors().len() == 1 { "" } else { "s" }
    );
    false
}
