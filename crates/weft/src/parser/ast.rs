//! Public AST types for templates.
//!
//! These types are public so that extensions can build nodes from their
//! parse hooks and external tooling can inspect parsed templates. The tree
//! is built once by the parser and never mutated afterwards.

use serde::{Deserialize, Serialize};

use crate::lexer::Pos;

/// A parsed template.
#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    pub body: Vec<Stmt>,
    /// Hoisted `{% extends %}` target, resolved at render time.
    pub extends: Option<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Stmt {
    pub kind: StmtKind,
    pub pos: Pos,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    /// Literal template text.
    TemplateData(String),
    /// `{{ expr }}`
    Output(Expr),
    If {
        branches: Vec<IfBranch>,
        otherwise: Option<Vec<Stmt>>,
    },
    For {
        targets: Vec<String>,
        iter: Expr,
        body: Vec<Stmt>,
        otherwise: Option<Vec<Stmt>>,
    },
    Block {
        name: String,
        body: Vec<Stmt>,
    },
    Include {
        template: Expr,
        ignore_missing: bool,
    },
    Import {
        template: Expr,
        alias: String,
        with_context: bool,
    },
    FromImport {
        template: Expr,
        names: Vec<ImportName>,
        with_context: bool,
    },
    Set {
        targets: Vec<String>,
        value: SetValue,
    },
    FilterBlock {
        name: String,
        args: Vec<Expr>,
        kwargs: Vec<(String, Expr)>,
        body: Vec<Stmt>,
    },
    Macro(MacroDef),
    /// `{% call %}`: the body becomes an anonymous `caller` macro passed to
    /// the called expression.
    Call {
        call: Expr,
        caller: MacroDef,
    },
    CallExtension(CallExtension),
}

/// One `if`/`elif` arm.
#[derive(Debug, Clone, PartialEq)]
pub struct IfBranch {
    pub cond: Expr,
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImportName {
    pub name: String,
    pub alias: Option<String>,
}

impl ImportName {
    /// The name the import is bound to in the importing template.
    pub fn binding(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SetValue {
    Expr(Expr),
    /// `{% set x %}...{% endset %}`
    Capture(Vec<Stmt>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct MacroDef {
    pub name: String,
    pub params: Vec<MacroParam>,
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MacroParam {
    pub name: String,
    pub default: Option<Expr>,
}

/// A statement contributed by a registered extension.
#[derive(Debug, Clone, PartialEq)]
pub struct CallExtension {
    /// Name of the extension that handles this node at render time.
    pub extension: String,
    pub args: Vec<Expr>,
    pub kwargs: Vec<(String, Expr)>,
    /// Bodies captured with [`Parser::parse_until`](super::Parser::parse_until).
    pub bodies: Vec<Vec<Stmt>>,
}

impl CallExtension {
    pub fn new(extension: impl Into<String>) -> Self {
        Self {
            extension: extension.into(),
            args: Vec::new(),
            kwargs: Vec::new(),
            bodies: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expr {
    pub kind: ExprKind,
    pub pos: Pos,
}

impl Expr {
    pub fn new(kind: ExprKind, pos: Pos) -> Self {
        Self { kind, pos }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ExprKind {
    Literal(Literal),
    Symbol(String),
    /// Parenthesized expression.
    Group(Box<Expr>),
    /// `[a, b]` or a parenthesized tuple `(a, b)`.
    Array(Vec<Expr>),
    Dict(Vec<(Expr, Expr)>),
    BinOp {
        op: BinOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    UnaryOp {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    /// A (possibly chained) comparison: `a < b <= c`.
    Compare {
        first: Box<Expr>,
        rest: Vec<(CmpOp, Expr)>,
    },
    /// `body if cond else otherwise`
    InlineIf {
        cond: Box<Expr>,
        body: Box<Expr>,
        otherwise: Option<Box<Expr>>,
    },
    FunCall {
        callee: Box<Expr>,
        args: Vec<Expr>,
        kwargs: Vec<(String, Expr)>,
    },
    Filter {
        name: String,
        target: Box<Expr>,
        args: Vec<Expr>,
        kwargs: Vec<(String, Expr)>,
    },
    GetAttr {
        target: Box<Expr>,
        name: String,
    },
    GetItem {
        target: Box<Expr>,
        key: Box<Expr>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Literal {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinOp {
    Or,
    And,
    Add,
    Sub,
    /// `~`
    Concat,
    Mul,
    Div,
    FloorDiv,
    Mod,
    Pow,
}

impl BinOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinOp::Or => "or",
            BinOp::And => "and",
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Concat => "~",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::FloorDiv => "//",
            BinOp::Mod => "%",
            BinOp::Pow => "**",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOp {
    Not,
    Neg,
    Pos,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    In,
    NotIn,
}

impl CmpOp {
    pub fn symbol(self) -> &'static str {
        match self {
            CmpOp::Eq => "==",
            CmpOp::Ne => "!=",
            CmpOp::Lt => "<",
            CmpOp::Le => "<=",
            CmpOp::Gt => ">",
            CmpOp::Ge => ">=",
            CmpOp::In => "in",
            CmpOp::NotIn => "not in",
        }
    }
}
