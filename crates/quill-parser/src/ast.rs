//! Syntax tree shared by every engine.
//!
//! A single [`Node`] type carries all four grammars: the [`NodeKind`] tag says
//! which grammar and construct a node belongs to, `children` hold the ordered
//! sub-nodes and `fields` label some of those children by role.

use quill_lexer::Span;
use serde::Serialize;

// ---------------------------------------------------------------------------
// Node kinds
// ---------------------------------------------------------------------------

/// Closed union of node kinds, one enum per grammar plus shared literals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum NodeKind {
    Fusion(FusionKind),
    Eel(EelKind),
    Afx(AfxKind),
    Rune(RuneKind),
    Literal(LiteralKind),
    /// Source skipped by error recovery.
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum FusionKind {
    Program,
    Statement,
    Comment,
    NamespaceDecl,
    AliasNamespace,
    PackageName,
    IncludeDecl,
    Resource,
    FilePath,
    FileGlobbing,
    Property,
    Path,
    PathPart,
    MetaProperty,
    PrototypeSignature,
    Type,
    TypeName,
    Block,
    Assignment,
    Deletion,
    Copy,
    PrototypeInstance,
    ValueExpression,
    DslExpression,
    DslIdentifier,
    DslContent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum EelKind {
    Binary,
    Ternary,
    Not,
    Parenthesized,
    ObjectPath,
    Identifier,
    MethodCall,
    Arguments,
    OffsetAccess,
    Array,
    Object,
    Pair,
    ArrowFunction,
    Parameters,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum AfxKind {
    Template,
    Element,
    OpeningElement,
    ClosingElement,
    SelfClosingElement,
    TagName,
    Attribute,
    AttributeName,
    Spread,
    ExpressionSlot,
    Text,
    Comment,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum RuneKind {
    SourceFile,
    Script,
    ParameterList,
    Parameter,
    TypeList,
    TypeName,
    Block,
    ReturnStmt,
    IfStmt,
    WhileStmt,
    SwitchStmt,
    SwitchCase,
    Declaration,
    ArrayDeclaration,
    Assignment,
    ExpressionStmt,
    EmptyStmt,
    Condition,
    Arithmetic,
    Parenthesized,
    Calc,
    Call,
    ProcCall,
    JumpCall,
    Arguments,
    Identifier,
    LocalVariable,
    LocalArrayVariable,
    GameVariable,
    DotGameVariable,
    Constant,
    StringLiteral,
    StringFragment,
    EscapeSequence,
    StringTag,
    StringInterpolation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum LiteralKind {
    String,
    Number,
    Boolean,
    Null,
    Hex,
    Coord,
    Char,
}

impl NodeKind {
    /// Snake-case name used in S-expression output.
    pub fn name(self) -> &'static str {
        match self {
            NodeKind::Error => "ERROR",
            NodeKind::Literal(kind) => match kind {
                LiteralKind::String => "string",
                LiteralKind::Number => "number",
                LiteralKind::Boolean => "boolean",
                LiteralKind::Null => "null",
                LiteralKind::Hex => "hex",
                LiteralKind::Coord => "coord",
                LiteralKind::Char => "char",
            },
            NodeKind::Fusion(kind) => match kind {
                FusionKind::Program => "program",
                FusionKind::Statement => "statement",
                FusionKind::Comment => "comment",
                FusionKind::NamespaceDecl => "namespace_declaration",
                FusionKind::AliasNamespace => "alias_namespace",
                FusionKind::PackageName => "package_name",
                FusionKind::IncludeDecl => "include_statement",
                FusionKind::Resource => "source_resource",
                FusionKind::FilePath => "source_filepath",
                FusionKind::FileGlobbing => "source_fileglobbing",
                FusionKind::Property => "property",
                FusionKind::Path => "path",
                FusionKind::PathPart => "path_part",
                FusionKind::MetaProperty => "meta_property",
                FusionKind::PrototypeSignature => "prototype_signature",
                FusionKind::Type => "type",
                FusionKind::TypeName => "type_name",
                FusionKind::Block => "block",
                FusionKind::Assignment => "assignment",
                FusionKind::Deletion => "deletion",
                FusionKind::Copy => "copy",
                FusionKind::PrototypeInstance => "prototype_instance",
                FusionKind::ValueExpression => "value_expression",
                FusionKind::DslExpression => "dsl_expression",
                FusionKind::DslIdentifier => "dsl_identifier",
                FusionKind::DslContent => "dsl_content",
            },
            NodeKind::Eel(kind) => match kind {
                EelKind::Binary => "binary_expression",
                EelKind::Ternary => "ternary_expression",
                EelKind::Not => "not_expression",
                EelKind::Parenthesized => "parenthesized_expression",
                EelKind::ObjectPath => "object_path",
                EelKind::Identifier => "identifier",
                EelKind::MethodCall => "method_call",
                EelKind::Arguments => "arguments",
                EelKind::OffsetAccess => "offset_access",
                EelKind::Array => "array",
                EelKind::Object => "object",
                EelKind::Pair => "pair",
                EelKind::ArrowFunction => "arrow_function",
                EelKind::Parameters => "parameters",
            },
            NodeKind::Afx(kind) => match kind {
                AfxKind::Template => "afx_template",
                AfxKind::Element => "afx_element",
                AfxKind::OpeningElement => "afx_opening_element",
                AfxKind::ClosingElement => "afx_closing_element",
                AfxKind::SelfClosingElement => "afx_element_self_closing",
                AfxKind::TagName => "afx_tag_name",
                AfxKind::Attribute => "afx_attribute",
                AfxKind::AttributeName => "afx_attribute_name",
                AfxKind::Spread => "afx_spread",
                AfxKind::ExpressionSlot => "afx_expression",
                AfxKind::Text => "afx_text",
                AfxKind::Comment => "afx_comment",
            },
            NodeKind::Rune(kind) => match kind {
                RuneKind::SourceFile => "source_file",
                RuneKind::Script => "script",
                RuneKind::ParameterList => "parameter_list",
                RuneKind::Parameter => "parameter",
                RuneKind::TypeList => "type_list",
                RuneKind::TypeName => "type",
                RuneKind::Block => "block",
                RuneKind::ReturnStmt => "return_statement",
                RuneKind::IfStmt => "if_statement",
                RuneKind::WhileStmt => "while_statement",
                RuneKind::SwitchStmt => "switch_statement",
                RuneKind::SwitchCase => "switch_case",
                RuneKind::Declaration => "declaration_statement",
                RuneKind::ArrayDeclaration => "array_declaration_statement",
                RuneKind::Assignment => "assignment_statement",
                RuneKind::ExpressionStmt => "expression_statement",
                RuneKind::EmptyStmt => "empty_statement",
                RuneKind::Condition => "condition_expression",
                RuneKind::Arithmetic => "arithmetic_expression",
                RuneKind::Parenthesized => "parenthesized_expression",
                RuneKind::Calc => "calc_expression",
                RuneKind::Call => "call_expression",
                RuneKind::ProcCall => "gosub_expression",
                RuneKind::JumpCall => "jump_expression",
                RuneKind::Arguments => "argument_list",
                RuneKind::Identifier => "identifier",
                RuneKind::LocalVariable => "local_variable",
                RuneKind::LocalArrayVariable => "local_array_variable",
                RuneKind::GameVariable => "game_variable",
                RuneKind::DotGameVariable => "dot_game_variable",
                RuneKind::Constant => "constant_variable",
                RuneKind::StringLiteral => "string_literal",
                RuneKind::StringFragment => "string_fragment",
                RuneKind::EscapeSequence => "escape_sequence",
                RuneKind::StringTag => "tag",
                RuneKind::StringInterpolation => "string_interpolation",
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Node
// ---------------------------------------------------------------------------

/// A labelled child: `name` applies to `children[index]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Field {
    pub name: &'static str,
    pub index: usize,
}

/// The universal tree unit.
///
/// `value` holds leaf text: identifier names, operators, and the decoded
/// contents of string literals.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Node {
    pub kind: NodeKind,
    pub span: Span,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<Node>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<Field>,
}

impl Node {
    pub fn new(kind: NodeKind, span: Span) -> Self {
        Self {
            kind,
            span,
            value: None,
            children: Vec::new(),
            fields: Vec::new(),
        }
    }

    pub fn leaf(kind: NodeKind, span: Span, value: impl Into<String>) -> Self {
        Self {
            value: Some(value.into()),
            ..Self::new(kind, span)
        }
    }

    pub fn push(&mut self, child: Node) {
        self.children.push(child);
    }

    /// Append a child and label it.
    pub fn push_field(&mut self, name: &'static str, child: Node) {
        self.fields.push(Field {
            name,
            index: self.children.len(),
        });
        self.children.push(child);
    }

    /// First child labelled `name`.
    pub fn field<'a>(&'a self, name: &'a str) -> Option<&'a Node> {
        self.fields_named(name).next()
    }

    /// All children labelled `name`, in order.
    pub fn fields_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Node> + 'a {
        self.fields
            .iter()
            .filter(move |f| f.name == name)
            .filter_map(|f| self.children.get(f.index))
    }

    fn field_name_of(&self, index: usize) -> Option<&'static str> {
        self.fields.iter().find(|f| f.index == index).map(|f| f.name)
    }

    /// The source slice this node covers.
    pub fn text<'a>(&self, source: &'a str) -> &'a str {
        source.get(self.span.start..self.span.end).unwrap_or("")
    }

    /// Render the tree as an S-expression. Leaves show their value.
    ///
    /// ```text
    /// (binary_expression "+" left: (number "1") right: (number "2"))
    /// ```
    pub fn to_sexp(&self) -> String {
        let mut out = String::new();
        self.write_sexp(&mut out);
        out
    }

    fn write_sexp(&self, out: &mut String) {
        out.push('(');
        out.push_str(self.kind.name());
        if let Some(value) = &self.value {
            out.push_str(&format!(" {value:?}"));
        }
        for (index, child) in self.children.iter().enumerate() {
            out.push(' ');
            if let Some(name) = self.field_name_of(index) {
                out.push_str(name);
                out.push_str(": ");
            }
            child.write_sexp(out);
        }
        out.push(')');
    }

    /// Breadth-first walk over this node and its descendants.
    pub fn walk(&self) -> Vec<&Node> {
        let mut nodes = vec![self];
        let mut index = 0;
        while index < nodes.len() {
            let node = nodes[index];
            index += 1;
            nodes.extend(node.children.iter());
        }
        nodes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn span(start: usize, end: usize) -> Span {
        Span::new(start, end, 1, start + 1)
    }

    fn binary() -> Node {
        let mut node = Node::leaf(NodeKind::Eel(EelKind::Binary), span(0, 5), "+");
        node.push_field(
            "left",
            Node::leaf(NodeKind::Literal(LiteralKind::Number), span(0, 1), "1"),
        );
        node.push_field(
            "right",
            Node::leaf(NodeKind::Literal(LiteralKind::Number), span(4, 5), "2"),
        );
        node
    }

    #[test]
    fn test_fields() {
        let node = binary();
        assert_eq!(node.field("left").and_then(|n| n.value.as_deref()), Some("1"));
        assert_eq!(node.field("right").and_then(|n| n.value.as_deref()), Some("2"));
        assert!(node.field("operator").is_none());
    }

    #[test]
    fn test_fields_named_multiple() {
        let mut list = Node::new(NodeKind::Eel(EelKind::Parameters), span(0, 6));
        list.push_field("parameter", Node::leaf(NodeKind::Eel(EelKind::Identifier), span(1, 2), "a"));
        list.push_field("parameter", Node::leaf(NodeKind::Eel(EelKind::Identifier), span(4, 5), "b"));
        let names: Vec<_> = list
            .fields_named("parameter")
            .filter_map(|n| n.value.as_deref())
            .collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn test_to_sexp() {
        assert_eq!(
            binary().to_sexp(),
            r#"(binary_expression "+" left: (number "1") right: (number "2"))"#
        );
    }

    #[test]
    fn test_walk_visits_parent_first() {
        let kinds: Vec<_> = binary().walk().iter().map(|n| n.kind.name()).collect();
        assert_eq!(kinds, vec!["binary_expression", "number", "number"]);
    }

    #[test]
    fn test_text() {
        assert_eq!(binary().text("1 + 2"), "1 + 2");
        assert_eq!(binary().children[1].text("1 + 2"), "2");
    }
}
