//! Language-neutral syntax tree consumed by the decision finder.
//!
//! A [`SyntaxProvider`] turns source text into a [`SyntaxTree`] of
//! [`SyntaxNode`]s. Nodes only carry what instrumentation needs: a category
//! ([`NodeKind`]), the role they play in their parent ([`Role`]), and their
//! exact section in the original text. The tree-sitter backed provider lives
//! in [`treesitter`].

pub mod treesitter;
pub mod visit;

use crate::core::CodeSection;
use crate::errors::Result;
use std::path::Path;

pub use treesitter::TreeSitterProvider;
pub use visit::{walk_node, Visit};

/// Source dialect, which selects the grammar and the probe spelling.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum Dialect {
    #[default]
    C,
    Cpp,
}

impl Dialect {
    const CPP_EXTENSIONS: &'static [&'static str] =
        &["cc", "cpp", "cxx", "c++", "cp", "hpp", "hh", "hxx", "h++", "ipp", "tpp"];

    /// Dialect implied by a file extension, C unless it is a known C++ one.
    pub fn from_path(path: &Path) -> Self {
        let is_cpp = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| Self::CPP_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
            .unwrap_or(false);
        if is_cpp {
            Self::Cpp
        } else {
            Self::C
        }
    }

    /// Dialect forced by compiler flags (`-x c`, `-xc++`, `-std=c++17`, ...).
    ///
    /// The last matching flag wins, as it does for the compiler driver.
    pub fn from_flags(flags: &[String]) -> Option<Self> {
        let mut dialect = None;
        let mut iter = flags.iter();
        while let Some(flag) = iter.next() {
            let language = if flag == "-x" {
                iter.next().map(String::as_str)
            } else {
                flag.strip_prefix("-x")
            };
            if let Some(language) = language {
                match language {
                    "c" | "c-header" => dialect = Some(Self::C),
                    "c++" | "c++-header" => dialect = Some(Self::Cpp),
                    _ => {}
                }
                continue;
            }
            if let Some(standard) = flag.strip_prefix("-std=") {
                dialect = if standard.contains("++") {
                    Some(Self::Cpp)
                } else {
                    Some(Self::C)
                };
            }
        }
        dialect
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StatementKind {
    Expression,
    /// A lone `;`.
    Empty,
    Declaration {
        initialized: bool,
        /// `static`, `extern`, `thread_local`, `constexpr` or `constinit`.
        persistent: bool,
    },
    Return,
    /// `break`, `continue`, `goto`.
    Jump,
    Throw,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ControlKind {
    If,
    While,
    DoWhile,
    For,
    RangeFor,
    Switch,
}

impl ControlKind {
    /// Control statements whose condition is evaluated for its truth value.
    pub fn has_boolean_condition(self) -> bool {
        matches!(self, Self::If | Self::While | Self::DoWhile | Self::For)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExpressionKind {
    /// `&&` or `and`
    And,
    /// `||` or `or`
    Or,
    /// `!` or `not`
    Not,
    /// `c ? a : b`; `elvis` is the GNU `c ?: b` form whose value is `c` itself.
    Conditional { elvis: bool },
    Parenthesized,
    Other,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeKind {
    Unit,
    /// Function definition or lambda; `constant` for `constexpr`/`consteval`.
    Function { constant: bool },
    Compound,
    Statement(StatementKind),
    Control(ControlKind),
    /// Labels, `case`, `else`, attributes and preprocessor blocks.
    Container,
    Expression(ExpressionKind),
    /// Nodes whose contents must never be instrumented (case labels, array
    /// sizes, `sizeof`, preprocessor conditions, ...).
    ConstantContext,
    Other,
}

/// Role of a node inside its parent.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Role {
    #[default]
    None,
    Condition,
    Body,
    Consequence,
    Alternative,
    Initializer,
    Update,
    Left,
    Right,
    Operand,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SyntaxNode {
    pub kind: NodeKind,
    pub role: Role,
    pub section: CodeSection,
    pub children: Vec<SyntaxNode>,
}

impl SyntaxNode {
    pub fn new(kind: NodeKind, section: CodeSection) -> Self {
        Self {
            kind,
            role: Role::None,
            section,
            children: Vec::new(),
        }
    }

    pub fn with_role(mut self, role: Role) -> Self {
        self.role = role;
        self
    }

    pub fn with_children(mut self, children: Vec<SyntaxNode>) -> Self {
        self.children = children;
        self
    }

    /// First child playing `role`.
    pub fn child(&self, role: Role) -> Option<&SyntaxNode> {
        self.children.iter().find(|child| child.role == role)
    }

    pub fn expression_kind(&self) -> Option<ExpressionKind> {
        match self.kind {
            NodeKind::Expression(kind) => Some(kind),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SyntaxTree {
    pub dialect: Dialect,
    pub root: SyntaxNode,
}

/// Produces a syntax tree for one compilation unit.
///
/// `flags` are the compiler arguments the unit is built with; providers use
/// whichever of them affect parsing.
pub trait SyntaxProvider: Send + Sync {
    fn parse(&self, path: &Path, source: &str, flags: &[String]) -> Result<SyntaxTree>;
}
