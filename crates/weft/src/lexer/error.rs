//! Lexer error types.

use thiserror::Error;

use super::token::Pos;

/// An error produced while splitting template source into tokens.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{kind} at {pos}")]
pub struct LexError {
    pub kind: LexErrorKind,
    pub pos: Pos,
}

impl LexError {
    pub fn new(kind: LexErrorKind, pos: Pos) -> Self {
        Self { kind, pos }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum LexErrorKind {
    #[error("unterminated tag")]
    UnterminatedTag,

    #[error("unterminated string")]
    UnterminatedString,

    #[error("unterminated comment")]
    UnterminatedComment,

    #[error("unterminated raw block")]
    UnterminatedRaw,

    #[error("invalid character '{0}'")]
    InvalidCharacter(char),
}
