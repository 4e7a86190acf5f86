//! The executable representation produced by the compiler.
//!
//! A [`Program`] is a tree of instructions run by the renderer. It is plain
//! data: serializable so that it can be precompiled, stored, and loaded
//! without going through the lexer, parser and compiler again.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::lexer::Pos;
use crate::parser::{BinOp, CmpOp, Literal, UnaryOp};

/// A compiled template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Program {
    pub name: String,
    /// FNV-1a hash of the source text this program was compiled from.
    pub source_hash: u64,
    pub root: Routine,
    /// Block routines by block name, in source order.
    pub blocks: IndexMap<String, Routine>,
    /// Macro and `caller` bodies, referenced by index.
    pub macros: Vec<MacroRoutine>,
    /// Hoisted `extends` target.
    pub parent: Option<Expr>,
    /// Whether any routine in this program contains async work.
    pub is_async: bool,
}

impl Program {
    pub fn block(&self, name: &str) -> Option<&Routine> {
        self.blocks.get(name)
    }

    pub fn macro_routine(&self, id: usize) -> Option<&MacroRoutine> {
        self.macros.get(id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Routine {
    /// `root` or `b_<block name>`.
    pub name: String,
    pub body: Vec<Instr>,
    pub is_async: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MacroRoutine {
    pub name: String,
    pub params: Vec<Param>,
    pub body: Vec<Instr>,
    /// Collect unmatched keyword arguments into `kwargs`.
    pub catch_kwargs: bool,
    pub is_async: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Param {
    pub name: String,
    pub default: Option<Expr>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instr {
    pub kind: InstrKind,
    pub pos: Pos,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum InstrKind {
    Text(String),
    Output(Expr),
    If {
        branches: Vec<(Expr, Vec<Instr>)>,
        otherwise: Vec<Instr>,
    },
    For {
        targets: Vec<String>,
        iter: Expr,
        body: Vec<Instr>,
        otherwise: Vec<Instr>,
        /// Run iterations concurrently when rendering asynchronously.
        concurrent: bool,
    },
    Set {
        targets: Vec<String>,
        value: Expr,
        export: bool,
    },
    SetCapture {
        targets: Vec<String>,
        body: Vec<Instr>,
        export: bool,
    },
    /// Render the most-derived implementation of a block.
    Block {
        name: String,
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
        /// `(exported name, local binding)` pairs.
        names: Vec<(String, String)>,
        with_context: bool,
    },
    /// Bind the macro `id` under `name` in the current frame.
    Macro {
        id: usize,
        name: String,
        export: bool,
    },
    FilterBlock {
        name: String,
        args: Vec<Expr>,
        kwargs: Vec<(String, Expr)>,
        body: Vec<Instr>,
        is_async: bool,
    },
    CallExtension {
        extension: String,
        args: Vec<Expr>,
        kwargs: Vec<(String, Expr)>,
        bodies: Vec<Vec<Instr>>,
        is_async: bool,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    Const(Literal),
    /// A name bound in the frame `depth` levels up.
    Local {
        name: String,
        depth: usize,
    },
    /// A name resolved through the frame chain, then the context.
    Lookup {
        name: String,
    },
    Array(Vec<Expr>),
    Dict(Vec<(Expr, Expr)>),
    Binary {
        op: BinOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Compare {
        first: Box<Expr>,
        rest: Vec<(CmpOp, Expr)>,
    },
    InlineIf {
        cond: Box<Expr>,
        body: Box<Expr>,
        otherwise: Option<Box<Expr>>,
    },
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
        kwargs: Vec<(String, Expr)>,
        /// Macro id of a `{% call %}` body passed as `caller`.
        caller: Option<usize>,
        /// Evaluate arguments concurrently when rendering asynchronously.
        concurrent_args: bool,
    },
    /// `super()` inside the block `block`.
    Super {
        block: String,
    },
    Filter {
        name: String,
        target: Box<Expr>,
        args: Vec<Expr>,
        kwargs: Vec<(String, Expr)>,
        is_async: bool,
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
