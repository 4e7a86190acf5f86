//! Token types produced by the lexer.

use std::fmt::{Display, Formatter, Result as FmtResult};

use serde::{Deserialize, Serialize};

/// A 1-based source position.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Pos {
    pub line: usize,
    pub column: usize,
}

impl Pos {
    pub fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }
}

impl Display for Pos {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// A single lexical token with its starting position.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub pos: Pos,
}

impl Token {
    pub fn new(kind: TokenKind, pos: Pos) -> Self {
        Self { kind, pos }
    }

    /// Check whether this token is the identifier `word`.
    ///
    /// Keywords (`if`, `in`, `and`, `endfor`, ...) are lexed as names; the
    /// parser decides from context whether a name is a keyword.
    pub fn is_name(&self, word: &str) -> bool {
        matches!(&self.kind, TokenKind::Name(name) if name == word)
    }

    /// Check whether this token is the operator or punctuation `op`.
    pub fn is_op(&self, op: &str) -> bool {
        matches!(self.kind, TokenKind::Op(o) if o == op)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    /// Literal text outside of tags.
    Text(String),
    /// `{%`
    BlockStart,
    /// `%}`
    BlockEnd,
    /// `{{`
    VariableStart,
    /// `}}`
    VariableEnd,
    /// Identifier or keyword.
    Name(String),
    /// Quoted string literal with escapes resolved.
    String(String),
    Int(i64),
    Float(f64),
    /// Operator or punctuation.
    Op(&'static str),
    Eof,
}

impl Display for TokenKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            TokenKind::Text(_) => f.write_str("template text"),
            TokenKind::BlockStart => f.write_str("block start"),
            TokenKind::BlockEnd => f.write_str("block end"),
            TokenKind::VariableStart => f.write_str("variable start"),
            TokenKind::VariableEnd => f.write_str("variable end"),
            TokenKind::Name(name) => write!(f, "'{name}'"),
            TokenKind::String(s) => write!(f, "string {s:?}"),
            TokenKind::Int(n) => write!(f, "number {n}"),
            TokenKind::Float(n) => write!(f, "number {n}"),
            TokenKind::Op(op) => write!(f, "'{op}'"),
            TokenKind::Eof => f.write_str("end of template"),
        }
    }
}

/// Operators and punctuation, longest first so that prefix matching picks
/// `**` over `*`.
pub(crate) const OPERATORS: &[&str] = &[
    "**", "//", "==", "!=", "<=", ">=", "+", "-", "*", "/", "%", "~", "<", ">", "=", "|", ".",
    ",", ":", "(", ")", "[", "]", "{", "}",
];
