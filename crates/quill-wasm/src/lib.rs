//! WASM bindings for the quill parsers.
//!
//! Exposes `parseFusion()`, `parseEel()` and `parseRunescript()` to
//! JavaScript via wasm-bindgen. Each returns a JS object
//! `{ root, errors, rendered }` or throws when the parse is fatal.

use quill_parser::{render_errors, Language, ParseOptions, ParseResult, SyntaxTree};
use wasm_bindgen::prelude::*;

const FILE_NAME: &str = "<input>";

/// Parse Fusion source.
///
/// `errors` lists the syntax errors recovered from; `rendered` is the same
/// list formatted for display (empty when there are none).
#[wasm_bindgen(js_name = parseFusion)]
pub fn parse_fusion(source: &str) -> Result<JsValue, JsError> {
    to_js(source, run(Language::Fusion, source)?)
}

/// Parse a bare EEL expression. Any error throws.
#[wasm_bindgen(js_name = parseEel)]
pub fn parse_eel(source: &str) -> Result<JsValue, JsError> {
    to_js(source, run(Language::Eel, source)?)
}

/// Parse RuneScript source.
#[wasm_bindgen(js_name = parseRunescript)]
pub fn parse_runescript(source: &str) -> Result<JsValue, JsError> {
    to_js(source, run(Language::RuneScript, source)?)
}

/// Get the parser version.
#[wasm_bindgen]
pub fn version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

fn run(language: Language, source: &str) -> Result<SyntaxTree, JsError> {
    parse_native(language, source).map_err(|message| JsError::new(&message))
}

/// The JS-independent half of every binding: a tree, or the rendered fatal
/// errors as the message to throw.
fn parse_native(language: Language, source: &str) -> Result<SyntaxTree, String> {
    match language.parse(source, &ParseOptions::default()) {
        ParseResult::Tree(tree) => Ok(tree),
        ParseResult::Fatal(errors) => Err(render_errors(FILE_NAME, source, &errors)),
    }
}

fn to_js(source: &str, tree: SyntaxTree) -> Result<JsValue, JsError> {
    let root = serde_wasm_bindgen::to_value(&tree.root)?;
    let errors = serde_wasm_bindgen::to_value(&tree.errors)?;
    let rendered = render_errors(FILE_NAME, source, &tree.errors);

    let js_obj = js_sys::Object::new();
    js_sys::Reflect::set(&js_obj, &"root".into(), &root)
        .map_err(|_| JsError::new("Failed to set root property"))?;
    js_sys::Reflect::set(&js_obj, &"errors".into(), &errors)
        .map_err(|_| JsError::new("Failed to set errors property"))?;
    js_sys::Reflect::set(&js_obj, &"rendered".into(), &rendered.into())
        .map_err(|_| JsError::new("Failed to set rendered property"))?;

    Ok(js_obj.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    // =========================================================================
    // Native tests (non-WASM): the parse half of each binding
    // =========================================================================

    #[test]
    fn test_fusion_tree() {
        let tree = parse_native(Language::Fusion, "a = 1").unwrap();
        assert_eq!(tree.root.kind.name(), "program");
        assert!(tree.errors.is_empty());
    }

    #[test]
    fn test_recovered_errors_do_not_throw() {
        let tree = parse_native(Language::Fusion, "a.b\nc = 1").unwrap();
        assert_eq!(tree.errors.len(), 1);
        assert_eq!(tree.root.children.len(), 2);
    }

    #[test]
    fn test_fatal_error_message() {
        let message = parse_native(Language::Fusion, "a = 'open").unwrap_err();
        assert!(message.starts_with("error[unterminated literal]"));
        assert!(message.contains("--> <input>:1:5"));
    }

    #[test]
    fn test_eel_error_is_fatal() {
        assert!(parse_native(Language::Eel, "1 +").is_err());
        let tree = parse_native(Language::Eel, "a.b(1)").unwrap();
        assert_eq!(tree.root.kind.name(), "object_path");
        assert_eq!(tree.root.children[1].kind.name(), "method_call");
    }

    #[test]
    fn test_runescript_tree() {
        let tree = parse_native(Language::RuneScript, "[proc,x]\nreturn;").unwrap();
        assert_eq!(tree.root.kind.name(), "source_file");
        assert_eq!(tree.root.children.len(), 1);
    }

    #[test]
    fn test_version() {
        let v = version();
        assert!(!v.is_empty());
        assert!(v.contains('.'));
    }

    #[test]
    fn test_multiple_parses() {
        let first = parse_native(Language::Fusion, "x = 0").unwrap();
        let second = parse_native(Language::Fusion, "y = 1").unwrap();
        assert!(first.root.to_sexp().contains("\"x\""));
        assert!(!second.root.to_sexp().contains("\"x\""));
    }
}
