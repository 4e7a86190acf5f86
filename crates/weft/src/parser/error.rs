//! Parse error types.

use thiserror::Error;

use crate::lexer::{LexError, Pos};

/// An error that occurred while parsing a template.
///
/// Parse errors are fatal for the template; no partial AST is produced.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseError {
    /// The token stream itself was malformed.
    #[error(transparent)]
    Lex(#[from] LexError),

    #[error("expected {expected}, found {found} at {pos}")]
    Unexpected {
        expected: String,
        found: String,
        pos: Pos,
    },

    /// An opening tag was never closed.
    #[error("unclosed '{tag}' tag opened at {pos}")]
    UnmatchedTag { tag: String, pos: Pos },

    /// A closing or continuation tag appeared without its opening tag.
    #[error("unexpected '{tag}' at {pos}")]
    UnexpectedEndTag { tag: String, pos: Pos },

    #[error("unknown tag '{tag}' at {pos}{}", format_suggestions(suggestions))]
    UnknownTag {
        tag: String,
        suggestions: Vec<String>,
        pos: Pos,
    },

    #[error("template extends more than one parent at {pos}")]
    DuplicateExtends { pos: Pos },

    #[error("'extends' must appear at the top level of a template at {pos}")]
    NestedExtends { pos: Pos },

    #[error("block '{name}' defined twice at {pos}")]
    DuplicateBlock { name: String, pos: Pos },

    #[error("can only assign to names at {pos}")]
    InvalidAssignment { pos: Pos },
}

impl ParseError {
    /// Source position of the error.
    pub fn pos(&self) -> Pos {
        match self {
            ParseError::Lex(err) => err.pos,
            ParseError::Unexpected { pos, .. }
            | ParseError::UnmatchedTag { pos, .. }
            | ParseError::UnexpectedEndTag { pos, .. }
            | ParseError::UnknownTag { pos, .. }
            | ParseError::DuplicateExtends { pos }
            | ParseError::NestedExtends { pos }
            | ParseError::DuplicateBlock { pos, .. }
            | ParseError::InvalidAssignment { pos } => *pos,
        }
    }
}

pub(crate) fn format_suggestions(suggestions: &[String]) -> String {
    if suggestions.is_empty() {
        String::new()
    } else {
        format!(" (did you mean: {}?)", suggestions.join(", "))
    }
}
