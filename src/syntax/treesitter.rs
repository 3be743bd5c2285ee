//! Tree-sitter backed [`SyntaxProvider`] for C and C++.
//!
//! The concrete syntax tree is lowered into [`SyntaxNode`]s: only named
//! nodes are kept, field names become [`Role`]s, and node kinds are folded
//! into the handful of categories the decision finder looks at. Anything in
//! a constant-expression or unevaluated context is lowered to a childless
//! [`NodeKind::ConstantContext`] node.

use super::{
    ControlKind, Dialect, ExpressionKind, NodeKind, Role, StatementKind, SyntaxNode,
    SyntaxProvider, SyntaxTree,
};
use crate::core::{CodePosition, CodeSection};
use crate::errors::{InstrumentError, Result};
use std::path::Path;
use tracing::debug;
use tree_sitter::{Node, Parser, Point};

const PERSISTENT_SPECIFIERS: &[&str] = &[
    "static",
    "extern",
    "thread_local",
    "_Thread_local",
    "__thread",
    "constexpr",
    "constinit",
];

const CONSTANT_FUNCTION_SPECIFIERS: &[&str] = &["constexpr", "consteval"];

/// Node kinds whose subtree is never evaluated at run time, or must stay a
/// constant expression.
const CONSTANT_KINDS: &[&str] = &[
    "preproc_def",
    "preproc_function_def",
    "preproc_call",
    "preproc_include",
    "static_assert_declaration",
    "enumerator_list",
    "bitfield_clause",
    "field_declaration",
    "template_argument_list",
    "template_parameter_list",
    "sizeof_expression",
    "alignof_expression",
    "offsetof_expression",
    "generic_expression",
    "decltype",
    "noexcept",
    "requires_clause",
    "requires_expression",
    "concept_definition",
    "attribute_specifier",
    "attribute_declaration",
    "ms_declspec_modifier",
    "alignas_qualifier",
    "gnu_asm_expression",
];

const CONTAINER_KINDS: &[&str] = &[
    "labeled_statement",
    "case_statement",
    "else_clause",
    "attributed_statement",
    "preproc_if",
    "preproc_ifdef",
    "preproc_else",
    "preproc_elif",
    "preproc_elifdef",
];

#[derive(Debug, Clone, Copy, Default)]
pub struct TreeSitterProvider;

impl TreeSitterProvider {
    pub fn new() -> Self {
        Self
    }

    /// Flags win over the file extension.
    pub fn dialect_for(&self, path: &Path, flags: &[String]) -> Dialect {
        Dialect::from_flags(flags).unwrap_or_else(|| Dialect::from_path(path))
    }

    fn parser_for(dialect: Dialect) -> std::result::Result<Parser, String> {
        let mut parser = Parser::new();
        let language = match dialect {
            Dialect::C => tree_sitter_c::LANGUAGE.into(),
            Dialect::Cpp => tree_sitter_cpp::LANGUAGE.into(),
        };
        parser
            .set_language(&language)
            .map_err(|e| format!("failed to load {dialect:?} grammar: {e}"))?;
        Ok(parser)
    }
}

impl SyntaxProvider for TreeSitterProvider {
    fn parse(&self, path: &Path, source: &str, flags: &[String]) -> Result<SyntaxTree> {
        let dialect = self.dialect_for(path, flags);
        debug!(path = %path.display(), ?dialect, "parsing with tree-sitter");

        let mut parser = Self::parser_for(dialect)
            .map_err(|message| parse_error(path, CodePosition::new(1, 1), message))?;
        let tree = parser.parse(source, None).ok_or_else(|| {
            parse_error(path, CodePosition::new(1, 1), "parser produced no tree")
        })?;

        let root = tree.root_node();
        if root.has_error() {
            let (position, message) = first_error(root);
            return Err(parse_error(path, position, message));
        }

        let lowering = Lowering {
            source: source.as_bytes(),
            dialect,
        };
        Ok(SyntaxTree {
            dialect,
            root: lowering.lower(root, None, None),
        })
    }
}

fn parse_error(path: &Path, position: CodePosition, message: impl Into<String>) -> InstrumentError {
    InstrumentError::Parse {
        path: path.to_path_buf(),
        line: position.line,
        column: position.column,
        message: message.into(),
    }
}

/// Location and description of the first `ERROR` or `MISSING` node.
fn first_error(root: Node<'_>) -> (CodePosition, String) {
    let mut node = root;
    'descend: loop {
        if node.is_missing() {
            return (position_of(node.start_position()), format!("missing `{}`", node.kind()));
        }
        if node.is_error() {
            return (position_of(node.start_position()), "unexpected syntax".to_string());
        }
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            if child.has_error() || child.is_missing() {
                node = child;
                continue 'descend;
            }
        }
        return (position_of(node.start_position()), "unexpected syntax".to_string());
    }
}

fn position_of(point: Point) -> CodePosition {
    let line = u32::try_from(point.row + 1).unwrap_or(u32::MAX);
    let column = u32::try_from(point.column + 1).unwrap_or(u32::MAX);
    CodePosition::new(line, column)
}

fn section_of(node: Node<'_>) -> CodeSection {
    CodeSection::new(
        position_of(node.start_position()),
        position_of(node.end_position()),
    )
}

fn role_for(field: Option<&str>) -> Role {
    match field {
        Some("condition") => Role::Condition,
        Some("body") => Role::Body,
        Some("consequence") => Role::Consequence,
        Some("alternative") => Role::Alternative,
        Some("initializer") => Role::Initializer,
        Some("update") => Role::Update,
        Some("left") => Role::Left,
        Some("right") => Role::Right,
        Some("argument") => Role::Operand,
        _ => Role::None,
    }
}

struct Lowering<'src> {
    source: &'src [u8],
    dialect: Dialect,
}

impl Lowering<'_> {
    fn lower(&self, node: Node<'_>, parent: Option<Node<'_>>, field: Option<&str>) -> SyntaxNode {
        let kind = self.classify(node, parent, field);
        let children = match kind {
            NodeKind::ConstantContext => Vec::new(),
            _ => self.lower_children(node),
        };
        // A constructor's member initializers run before its body.
        let role = match node.kind() {
            "field_initializer_list" => Role::Initializer,
            _ => role_for(field),
        };
        SyntaxNode::new(kind, section_of(node))
            .with_role(role)
            .with_children(children)
    }

    fn lower_children(&self, node: Node<'_>) -> Vec<SyntaxNode> {
        let mut children = Vec::new();
        let mut cursor = node.walk();
        if !cursor.goto_first_child() {
            return children;
        }
        loop {
            let child = cursor.node();
            if child.is_named() && !child.is_extra() {
                if child.kind() == "condition_clause" {
                    children.extend(self.lower_condition_clause(child, node));
                } else {
                    children.push(self.lower(child, Some(node), cursor.field_name()));
                }
            }
            if !cursor.goto_next_sibling() {
                break;
            }
        }
        children
    }

    /// C++ `if (init; cond)` / `while (cond)`: hoist the clause parts into the
    /// control statement. A declaration used as the condition is not a
    /// boolean expression that can be wrapped, so it becomes an initializer.
    fn lower_condition_clause(&self, clause: Node<'_>, control: Node<'_>) -> Vec<SyntaxNode> {
        let mut parts = Vec::new();
        let mut cursor = clause.walk();
        if !cursor.goto_first_child() {
            return parts;
        }
        loop {
            let child = cursor.node();
            if child.is_named() && !child.is_extra() {
                let field = match cursor.field_name() {
                    Some("value") if child.kind() != "declaration" => "condition",
                    _ => "initializer",
                };
                parts.push(self.lower(child, Some(control), Some(field)));
            }
            if !cursor.goto_next_sibling() {
                break;
            }
        }
        parts
    }

    fn classify(&self, node: Node<'_>, parent: Option<Node<'_>>, field: Option<&str>) -> NodeKind {
        if let (Some(parent), Some(field)) = (parent, field) {
            match (parent.kind(), field) {
                ("case_statement", "value")
                | ("preproc_if", "condition")
                | ("preproc_elif", "condition")
                | ("array_declarator", "size") => return NodeKind::ConstantContext,
                ("if_statement", "condition") if self.is_constant_if(parent) => {
                    return NodeKind::ConstantContext
                }
                ("init_declarator", "value") if self.is_constant_local(parent) => {
                    return NodeKind::ConstantContext
                }
                _ => {}
            }
        }

        let kind = node.kind();
        if CONSTANT_KINDS.contains(&kind) {
            return NodeKind::ConstantContext;
        }
        if CONTAINER_KINDS.contains(&kind) {
            return NodeKind::Container;
        }

        match kind {
            "translation_unit" => NodeKind::Unit,
            "function_definition" => NodeKind::Function {
                constant: self.has_specifier(node, CONSTANT_FUNCTION_SPECIFIERS),
            },
            "lambda_expression" => NodeKind::Function { constant: false },
            "compound_statement" => NodeKind::Compound,
            "expression_statement" if node.named_child_count() == 0 => {
                NodeKind::Statement(StatementKind::Empty)
            }
            "expression_statement" | "co_yield_statement" => {
                NodeKind::Statement(StatementKind::Expression)
            }
            "declaration" => NodeKind::Statement(StatementKind::Declaration {
                initialized: self.has_named_child(node, "init_declarator"),
                persistent: self.has_specifier(node, PERSISTENT_SPECIFIERS),
            }),
            "return_statement" | "co_return_statement" => NodeKind::Statement(StatementKind::Return),
            "break_statement" | "continue_statement" | "goto_statement" => {
                NodeKind::Statement(StatementKind::Jump)
            }
            "throw_statement" => NodeKind::Statement(StatementKind::Throw),
            "if_statement" => NodeKind::Control(ControlKind::If),
            "while_statement" => NodeKind::Control(ControlKind::While),
            "do_statement" => NodeKind::Control(ControlKind::DoWhile),
            "for_statement" => NodeKind::Control(ControlKind::For),
            "for_range_loop" => NodeKind::Control(ControlKind::RangeFor),
            "switch_statement" => NodeKind::Control(ControlKind::Switch),
            "binary_expression" => match self.operator(node) {
                Some("&&" | "and") => NodeKind::Expression(ExpressionKind::And),
                Some("||" | "or") => NodeKind::Expression(ExpressionKind::Or),
                _ => NodeKind::Expression(ExpressionKind::Other),
            },
            "unary_expression" => match self.operator(node) {
                Some("!" | "not") => NodeKind::Expression(ExpressionKind::Not),
                _ => NodeKind::Expression(ExpressionKind::Other),
            },
            "conditional_expression" => NodeKind::Expression(ExpressionKind::Conditional {
                elvis: node.child_by_field_name("consequence").is_none(),
            }),
            "parenthesized_expression" => NodeKind::Expression(ExpressionKind::Parenthesized),
            _ if kind.ends_with("_expression") => NodeKind::Expression(ExpressionKind::Other),
            _ => NodeKind::Other,
        }
    }

    fn operator(&self, node: Node<'_>) -> Option<&'static str> {
        node.child_by_field_name("operator").map(|op| op.kind())
    }

    fn text<'a>(&'a self, node: Node<'_>) -> &'a str {
        node.utf8_text(self.source).unwrap_or_default()
    }

    fn has_named_child(&self, node: Node<'_>, kind: &str) -> bool {
        let mut cursor = node.walk();
        let found = node.named_children(&mut cursor).any(|child| child.kind() == kind);
        found
    }

    /// Declaration specifiers such as `static` or `constexpr`, whether the
    /// grammar exposes them as keyword tokens or wrapped in a specifier node.
    fn has_specifier(&self, node: Node<'_>, specifiers: &[&str]) -> bool {
        let mut cursor = node.walk();
        let found = node.children(&mut cursor).any(|child| {
            let kind = child.kind();
            specifiers.contains(&kind)
                || (matches!(kind, "storage_class_specifier" | "type_qualifier")
                    && specifiers.contains(&self.text(child)))
        });
        found
    }

    /// A C++ `const` variable of integral or enumeration type, whose
    /// initializer may be relied on as a constant expression (`case K:`,
    /// array bounds, template arguments).
    fn is_constant_local(&self, declarator: Node<'_>) -> bool {
        if self.dialect != Dialect::Cpp {
            return false;
        }
        let names_variable = declarator
            .child_by_field_name("declarator")
            .is_some_and(|name| name.kind() == "identifier");
        let Some(declaration) = declarator.parent().filter(|p| p.kind() == "declaration") else {
            return false;
        };
        names_variable
            && self.has_specifier(declaration, &["const"])
            && declaration
                .child_by_field_name("type")
                .is_some_and(|ty| self.is_integral_type(ty))
    }

    fn is_integral_type(&self, ty: Node<'_>) -> bool {
        match ty.kind() {
            "primitive_type" | "sized_type_specifier" => {
                let name = self.text(ty);
                !name.contains("float") && !name.contains("double")
            }
            "placeholder_type_specifier" | "enum_specifier" => true,
            _ => false,
        }
    }

    /// `if constexpr` and `if consteval` conditions must stay constant.
    fn is_constant_if(&self, node: Node<'_>) -> bool {
        let mut cursor = node.walk();
        let found = node
            .children(&mut cursor)
            .any(|child| matches!(child.kind(), "constexpr" | "consteval"));
        found
    }
}
