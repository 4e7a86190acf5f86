//! Template lexer.
//!
//! Splits template source into a flat token stream. The lexer alternates
//! between two modes: text mode, where everything up to the next opening
//! delimiter is literal data, and code mode inside `{{ }}` and `{% %}`.
//! Comments are dropped here and never reach the parser, `{% raw %}` bodies
//! are emitted as a single text token, and whitespace control (`-` next to a
//! delimiter, `trim_blocks`, `lstrip_blocks`) is applied to the adjacent text
//! tokens rather than recorded in the AST.

mod error;
mod syntax;
mod token;

pub use error::{LexError, LexErrorKind};
pub use syntax::Syntax;
pub use token::{Pos, Token, TokenKind};

use std::mem;

use token::OPERATORS;
use winnow::ascii::digit1;
use winnow::combinator::opt;
use winnow::prelude::*;
use winnow::token::{any, one_of, take_till, take_while};

/// Whitespace handling switches that affect tokenization.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LexOptions {
    /// Drop the first newline after a block tag or comment.
    pub trim_blocks: bool,
    /// Strip spaces and tabs before a block tag when they start the line.
    pub lstrip_blocks: bool,
}

/// Tokenize template source.
///
/// The returned stream always ends with a single [`TokenKind::Eof`].
pub fn tokenize(
    source: &str,
    syntax: &Syntax,
    options: LexOptions,
) -> Result<Vec<Token>, LexError> {
    Lexer::new(source, syntax, options).run()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Delimiter {
    Block,
    Variable,
    Comment,
}

struct Lexer<'s> {
    rest: &'s str,
    syntax: &'s Syntax,
    options: LexOptions,
    line: usize,
    column: usize,
    /// Set by a `-` on the previous closing delimiter.
    trim_next: bool,
    tokens: Vec<Token>,
}

impl<'s> Lexer<'s> {
    fn new(source: &'s str, syntax: &'s Syntax, options: LexOptions) -> Self {
        Self {
            rest: source,
            syntax,
            options,
            line: 1,
            column: 1,
            trim_next: false,
            tokens: Vec::new(),
        }
    }

    fn run(mut self) -> Result<Vec<Token>, LexError> {
        while !self.rest.is_empty() {
            self.lex_text()?;
        }
        let pos = self.pos();
        self.tokens.push(Token::new(TokenKind::Eof, pos));
        Ok(self.tokens)
    }

    fn pos(&self) -> Pos {
        Pos::new(self.line, self.column)
    }

    /// Consume `len` bytes, keeping line and column in sync.
    fn advance(&mut self, len: usize) -> &'s str {
        let (taken, rest) = self.rest.split_at(len);
        for c in taken.chars() {
            if c == '\n' {
                self.line += 1;
                self.column = 1;
            } else {
                self.column += 1;
            }
        }
        self.rest = rest;
        taken
    }

    fn delimiter(&self, delimiter: Delimiter) -> (&'s str, &'s str) {
        let syntax = self.syntax;
        match delimiter {
            Delimiter::Block => (&syntax.block_start, &syntax.block_end),
            Delimiter::Variable => (&syntax.variable_start, &syntax.variable_end),
            Delimiter::Comment => (&syntax.comment_start, &syntax.comment_end),
        }
    }

    /// Find the earliest opening delimiter in the remaining input.
    fn find_open(&self) -> Option<(usize, Delimiter)> {
        [Delimiter::Block, Delimiter::Variable, Delimiter::Comment]
            .into_iter()
            .filter_map(|d| {
                let (open, _) = self.delimiter(d);
                self.rest.find(open).map(|offset| (offset, open.len(), d))
            })
            .min_by(|a, b| a.0.cmp(&b.0).then(b.1.cmp(&a.1)))
            .map(|(offset, _, d)| (offset, d))
    }

    fn push_text(&mut self, text: &str, pos: Pos) {
        if !text.is_empty() {
            self.tokens
                .push(Token::new(TokenKind::Text(text.to_string()), pos));
        }
    }

    /// Lex literal text up to (and including) the next tag.
    fn lex_text(&mut self) -> Result<(), LexError> {
        let text_pos = self.pos();
        let trim_left = mem::take(&mut self.trim_next);

        let Some((offset, delimiter)) = self.find_open() else {
            let text = self.advance(self.rest.len());
            let text = if trim_left { text.trim_start() } else { text };
            self.push_text(text, text_pos);
            return Ok(());
        };

        let (open, _) = self.delimiter(delimiter);
        let trim_right = self.rest[offset + open.len()..].starts_with('-');
        let mut text = self.advance(offset);
        if trim_left {
            text = text.trim_start();
        }
        if trim_right {
            text = text.trim_end();
        } else if self.options.lstrip_blocks && delimiter != Delimiter::Variable {
            text = lstrip_line(text, text_pos.column == 1);
        }
        self.push_text(text, text_pos);

        match delimiter {
            Delimiter::Comment => self.lex_comment(),
            Delimiter::Block | Delimiter::Variable => self.lex_tag(delimiter),
        }
    }

    fn lex_comment(&mut self) -> Result<(), LexError> {
        let start = self.pos();
        let (open, close) = self.delimiter(Delimiter::Comment);
        self.advance(open.len());
        let Some(end) = self.rest.find(close) else {
            return Err(LexError::new(LexErrorKind::UnterminatedComment, start));
        };
        self.trim_next = self.rest[..end].ends_with('-');
        self.advance(end + close.len());
        if self.options.trim_blocks {
            self.skip_newline();
        }
        Ok(())
    }

    fn lex_tag(&mut self, delimiter: Delimiter) -> Result<(), LexError> {
        let start = self.pos();
        let (open, close) = self.delimiter(delimiter);

        if delimiter == Delimiter::Block && self.lex_raw(start)? {
            return Ok(());
        }

        self.advance(open.len());
        if self.rest.starts_with('-') {
            self.advance(1);
        }
        let (open_kind, close_kind) = match delimiter {
            Delimiter::Block => (TokenKind::BlockStart, TokenKind::BlockEnd),
            Delimiter::Variable | Delimiter::Comment => {
                (TokenKind::VariableStart, TokenKind::VariableEnd)
            }
        };
        self.tokens.push(Token::new(open_kind, start));

        loop {
            self.skip_whitespace();
            if self.rest.is_empty() {
                return Err(LexError::new(LexErrorKind::UnterminatedTag, start));
            }
            let pos = self.pos();
            let trimmed_close = self.rest.starts_with('-') && self.rest[1..].starts_with(close);
            if trimmed_close || self.rest.starts_with(close) {
                let len = close.len() + usize::from(trimmed_close);
                self.advance(len);
                self.tokens.push(Token::new(close_kind, pos));
                self.trim_next = trimmed_close;
                if delimiter == Delimiter::Block && self.options.trim_blocks {
                    self.skip_newline();
                }
                return Ok(());
            }
            self.lex_code_token()?;
        }
    }

    /// Handle `{% raw %}...{% endraw %}` (and its `verbatim` spelling).
    ///
    /// Returns `false` without consuming anything when the tag at the cursor
    /// is not a raw tag.
    fn lex_raw(&mut self, start: Pos) -> Result<bool, LexError> {
        let (open, close) = self.delimiter(Delimiter::Block);
        let Some((keyword, header_len, trim_body_start)) = raw_header(self.rest, open, close)
        else {
            return Ok(false);
        };
        let end_keyword = if keyword == "raw" {
            "endraw"
        } else {
            "endverbatim"
        };

        self.advance(header_len);
        let body_pos = self.pos();
        let Some((body_len, end_len, trim_body_end, trim_after)) =
            find_raw_end(self.rest, open, close, end_keyword)
        else {
            return Err(LexError::new(LexErrorKind::UnterminatedRaw, start));
        };

        let mut body = self.advance(body_len);
        if trim_body_start {
            body = body.trim_start();
        }
        if trim_body_end {
            body = body.trim_end();
        }
        self.push_text(body, body_pos);
        self.advance(end_len);
        self.trim_next = trim_after;
        if self.options.trim_blocks {
            self.skip_newline();
        }
        Ok(true)
    }

    fn skip_whitespace(&mut self) {
        let len = self.rest.len() - self.rest.trim_start().len();
        self.advance(len);
    }

    fn skip_newline(&mut self) {
        if self.rest.starts_with("\r\n") {
            self.advance(2);
        } else if self.rest.starts_with('\n') {
            self.advance(1);
        }
    }

    /// Lex one token inside a tag.
    fn lex_code_token(&mut self) -> Result<(), LexError> {
        let pos = self.pos();
        let mut input = self.rest;
        let Some(first) = input.chars().next() else {
            return Err(LexError::new(LexErrorKind::UnterminatedTag, pos));
        };

        let kind = if first == '"' || first == '\'' {
            string_literal
                .parse_next(&mut input)
                .map_err(|_| LexError::new(LexErrorKind::UnterminatedString, pos))?
        } else if first.is_ascii_digit() {
            number
                .parse_next(&mut input)
                .map_err(|_| LexError::new(LexErrorKind::InvalidCharacter(first), pos))?
        } else if is_ident_start(first) {
            identifier
                .parse_next(&mut input)
                .map(|name| TokenKind::Name(name.to_string()))
                .map_err(|_| LexError::new(LexErrorKind::InvalidCharacter(first), pos))?
        } else if let Some(op) = OPERATORS.iter().find(|op| input.starts_with(**op)) {
            input = &input[op.len()..];
            TokenKind::Op(op)
        } else {
            return Err(LexError::new(LexErrorKind::InvalidCharacter(first), pos));
        };

        let consumed = self.rest.len() - input.len();
        self.advance(consumed);
        self.tokens.push(Token::new(kind, pos));
        Ok(())
    }
}

/// Strip trailing spaces and tabs when they are the only content on the
/// line preceding a block tag.
fn lstrip_line(text: &str, starts_line: bool) -> &str {
    let line_start = match text.rfind('\n') {
        Some(i) => i + 1,
        None if starts_line => 0,
        None => return text,
    };
    if text[line_start..].chars().all(|c| c == ' ' || c == '\t') {
        &text[..line_start]
    } else {
        text
    }
}

/// Recognise `{% raw %}` at the start of `input`.
///
/// Returns the keyword, the header length and whether the header ended with
/// `-%}`.
fn raw_header(input: &str, open: &str, close: &str) -> Option<(&'static str, usize, bool)> {
    let mut rest = input.strip_prefix(open)?;
    rest = rest.strip_prefix('-').unwrap_or(rest).trim_start();
    let keyword = ["raw", "verbatim"]
        .into_iter()
        .find(|k| rest.starts_with(k))?;
    rest = &rest[keyword.len()..];
    // `{% rawish %}` is an ordinary tag
    if !(rest.starts_with(char::is_whitespace) || rest.starts_with('-') || rest.starts_with(close))
    {
        return None;
    }
    rest = rest.trim_start();
    let trim = rest.starts_with('-');
    rest = rest.strip_prefix('-').unwrap_or(rest);
    rest = rest.strip_prefix(close)?;
    Some((keyword, input.len() - rest.len(), trim))
}

/// Locate the closing `{% endraw %}`.
///
/// Returns the body length, the length of the end tag, and the whitespace
/// control flags found on the end tag (`{%-` and `-%}`).
fn find_raw_end(
    input: &str,
    open: &str,
    close: &str,
    end_keyword: &str,
) -> Option<(usize, usize, bool, bool)> {
    let mut search = 0;
    while let Some(found) = input[search..].find(open) {
        let tag_start = search + found;
        let mut rest = &input[tag_start + open.len()..];
        let trim_body_end = rest.starts_with('-');
        rest = rest.strip_prefix('-').unwrap_or(rest).trim_start();
        if let Some(after) = rest.strip_prefix(end_keyword) {
            let after = after.trim_start();
            let trim_after = after.starts_with('-');
            let after = after.strip_prefix('-').unwrap_or(after);
            if let Some(after) = after.strip_prefix(close) {
                let end_len = input.len() - after.len() - tag_start;
                return Some((tag_start, end_len, trim_body_end, trim_after));
            }
        }
        search = tag_start + open.len();
    }
    None
}

/// Parse a quoted string literal, resolving backslash escapes.
fn string_literal(input: &mut &str) -> ModalResult<TokenKind> {
    let quote = one_of(['"', '\'']).parse_next(input)?;
    let mut value = String::new();
    loop {
        let chunk: &str = take_till(0.., |c: char| c == quote || c == '\\').parse_next(input)?;
        value.push_str(chunk);
        let c = any.parse_next(input)?;
        if c == quote {
            return Ok(TokenKind::String(value));
        }
        let escaped = any.parse_next(input)?;
        value.push(match escaped {
            'n' => '\n',
            't' => '\t',
            'r' => '\r',
            other => other,
        });
    }
}

/// Parse an integer or decimal number.
fn number(input: &mut &str) -> ModalResult<TokenKind> {
    let text: &str = (digit1, opt(('.', digit1))).take().parse_next(input)?;
    if text.contains('.') {
        Ok(TokenKind::Float(text.parse().unwrap_or(f64::NAN)))
    } else {
        Ok(text
            .parse()
            .map_or_else(|_| TokenKind::Float(text.parse().unwrap_or(f64::NAN)), TokenKind::Int))
    }
}

/// Parse an identifier.
fn identifier<'i>(input: &mut &'i str) -> ModalResult<&'i str> {
    (one_of(is_ident_start), take_while(0.., is_ident_cont))
        .take()
        .parse_next(input)
}

/// Check if a character can start an identifier.
fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

/// Check if a character can continue an identifier.
fn is_ident_cont(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}
