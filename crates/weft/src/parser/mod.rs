//! Template parser.
//!
//! A recursive-descent parser over the token stream produced by
//! [`crate::lexer`]. Statements are handled in `stmt`, expressions (with
//! their precedence ladder) in `expr`. The token helpers on [`Parser`] are
//! public so that extension parse hooks can consume their own tag syntax.

pub mod ast;
mod error;
mod expr;
mod stmt;

pub use ast::*;
pub use error::ParseError;
pub(crate) use error::format_suggestions;

use std::collections::HashSet;
use std::sync::Arc;

use crate::environment::Extension;
use crate::lexer::{self, LexOptions, Pos, Syntax, Token, TokenKind};

/// Parse a token stream into a template AST.
///
/// `extensions` supply parse hooks for tags the core grammar does not know.
pub fn parse(tokens: Vec<Token>, extensions: &[Arc<dyn Extension>]) -> Result<Template, ParseError> {
    Parser::new(tokens, extensions).parse_template()
}

/// Tokenize and parse template source in one step.
pub fn parse_source(
    source: &str,
    syntax: &Syntax,
    options: LexOptions,
    extensions: &[Arc<dyn Extension>],
) -> Result<Template, ParseError> {
    let tokens = lexer::tokenize(source, syntax, options)?;
    parse(tokens, extensions)
}

/// Parser state over a token stream.
pub struct Parser<'a> {
    tokens: Vec<Token>,
    index: usize,
    extensions: &'a [Arc<dyn Extension>],
    /// Stack of currently open block-structured tags, innermost last.
    open_tags: Vec<(String, Pos)>,
    blocks: HashSet<String>,
    extends: Option<ast::Expr>,
}

impl<'a> Parser<'a> {
    fn new(mut tokens: Vec<Token>, extensions: &'a [Arc<dyn Extension>]) -> Self {
        if !matches!(tokens.last(), Some(Token { kind: TokenKind::Eof, .. })) {
            let pos = tokens.last().map(|t| t.pos).unwrap_or_default();
            tokens.push(Token::new(TokenKind::Eof, pos));
        }
        Self {
            tokens,
            index: 0,
            extensions,
            open_tags: Vec::new(),
            blocks: HashSet::new(),
            extends: None,
        }
    }

    fn parse_template(mut self) -> Result<Template, ParseError> {
        let (body, _) = self.parse_body(&[])?;
        Ok(Template {
            body,
            extends: self.extends,
        })
    }

    /// The current token. At the end of input this is always `Eof`.
    pub fn peek(&self) -> &Token {
        self.peek_at(0)
    }

    /// The token `offset` positions ahead of the cursor.
    pub fn peek_at(&self, offset: usize) -> &Token {
        let last = self.tokens.len() - 1;
        &self.tokens[(self.index + offset).min(last)]
    }

    /// Consume and return the current token. Never advances past `Eof`.
    pub fn next_token(&mut self) -> Token {
        let token = self.peek().clone();
        if self.index < self.tokens.len() - 1 {
            self.index += 1;
        }
        token
    }

    /// Consume the current token if it is the name `word`.
    pub fn skip_name(&mut self, word: &str) -> bool {
        if self.peek().is_name(word) {
            self.index += 1;
            true
        } else {
            false
        }
    }

    /// Consume the current token if it is the operator `op`.
    pub fn skip_op(&mut self, op: &str) -> bool {
        if self.peek().is_op(op) {
            self.index += 1;
            true
        } else {
            false
        }
    }

    pub fn expect_name(&mut self) -> Result<(String, Pos), ParseError> {
        let token = self.next_token();
        match token.kind {
            TokenKind::Name(name) => Ok((name, token.pos)),
            other => Err(unexpected("a name", &other, token.pos)),
        }
    }

    /// Consume the keyword `word`, failing otherwise.
    pub fn expect_keyword(&mut self, word: &str) -> Result<Pos, ParseError> {
        let token = self.next_token();
        if token.is_name(word) {
            Ok(token.pos)
        } else {
            Err(unexpected(&format!("'{word}'"), &token.kind, token.pos))
        }
    }

    pub fn expect_op(&mut self, op: &str) -> Result<Pos, ParseError> {
        let token = self.next_token();
        if token.is_op(op) {
            Ok(token.pos)
        } else {
            Err(unexpected(&format!("'{op}'"), &token.kind, token.pos))
        }
    }

    /// Consume the `%}` closing the current tag.
    pub fn expect_block_end(&mut self) -> Result<(), ParseError> {
        let token = self.next_token();
        match token.kind {
            TokenKind::BlockEnd => Ok(()),
            other => Err(unexpected("end of tag", &other, token.pos)),
        }
    }

    pub(crate) fn expect_variable_end(&mut self) -> Result<(), ParseError> {
        let token = self.next_token();
        match token.kind {
            TokenKind::VariableEnd => Ok(()),
            other => Err(unexpected("end of variable", &other, token.pos)),
        }
    }

    /// Parse statements until one of the tag keywords in `ends` is reached.
    ///
    /// The terminating keyword is consumed and returned; the rest of that
    /// tag (arguments and `%}`) is left for the caller. Extension parse hooks
    /// use this to capture bodies, and nested extension blocks work because
    /// only the innermost terminator list is consulted.
    pub fn parse_until(&mut self, ends: &[&str]) -> Result<(Vec<Stmt>, String), ParseError> {
        let pos = self.peek().pos;
        let (body, end) = self.parse_body(ends)?;
        match end {
            Some(end) => Ok((body, end)),
            None => Err(ParseError::UnmatchedTag {
                tag: ends.first().map(ToString::to_string).unwrap_or_default(),
                pos,
            }),
        }
    }

    /// Run `f` with `tag` recorded as the innermost open tag.
    fn with_open_tag<T>(
        &mut self,
        tag: &str,
        pos: Pos,
        f: impl FnOnce(&mut Self) -> Result<T, ParseError>,
    ) -> Result<T, ParseError> {
        self.open_tags.push((tag.to_string(), pos));
        let result = f(self);
        self.open_tags.pop();
        result
    }

    fn extension_for(&self, tag: &str) -> Option<Arc<dyn Extension>> {
        self.extensions
            .iter()
            .find(|ext| ext.tags().iter().any(|t| *t == tag))
            .cloned()
    }
}

pub(crate) fn unexpected(expected: &str, found: &TokenKind, pos: Pos) -> ParseError {
    ParseError::Unexpected {
        expected: expected.to_string(),
        found: found.to_string(),
        pos,
    }
}
