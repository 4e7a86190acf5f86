//! Statement grammar: template text, output tags and block-structured tags.

use super::ast::{
    IfBranch, ImportName, MacroDef, MacroParam, SetValue, Stmt, StmtKind,
};
use super::{ParseError, Parser, unexpected};
use crate::error::compute_suggestions;
use crate::lexer::{Pos, Token, TokenKind};

/// Tag keywords understood by the core grammar.
const CORE_TAGS: &[&str] = &[
    "if", "for", "block", "extends", "include", "import", "from", "set", "filter", "macro",
    "call", "raw", "verbatim",
];

/// Tags that continue or close another tag and are only valid as terminators.
const CONTINUATION_TAGS: &[&str] = &["elif", "elseif", "else"];

impl Parser<'_> {
    /// Parse statements until a tag named in `ends` or the end of input.
    ///
    /// Returns the terminator that stopped the body, or `None` at the end of
    /// input (only allowed when `ends` is empty).
    pub(super) fn parse_body(
        &mut self,
        ends: &[&str],
    ) -> Result<(Vec<Stmt>, Option<String>), ParseError> {
        let mut body = Vec::new();
        loop {
            let token = self.next_token();
            let pos = token.pos;
            match token.kind {
                TokenKind::Text(text) => body.push(Stmt {
                    kind: StmtKind::TemplateData(text),
                    pos,
                }),
                TokenKind::VariableStart => {
                    let expr = self.parse_expression()?;
                    self.expect_variable_end()?;
                    body.push(Stmt {
                        kind: StmtKind::Output(expr),
                        pos,
                    });
                }
                TokenKind::BlockStart => {
                    if let TokenKind::Name(tag) = &self.peek().kind
                        && ends.iter().any(|end| *end == tag.as_str())
                    {
                        let tag = tag.clone();
                        self.next_token();
                        return Ok((body, Some(tag)));
                    }
                    if let Some(stmt) = self.parse_statement(pos)? {
                        body.push(stmt);
                    }
                }
                TokenKind::Eof if ends.is_empty() => return Ok((body, None)),
                TokenKind::Eof => {
                    let (tag, pos) = self
                        .open_tags
                        .last()
                        .cloned()
                        .unwrap_or_else(|| (ends[0].to_string(), pos));
                    return Err(ParseError::UnmatchedTag { tag, pos });
                }
                other => return Err(unexpected("template text or a tag", &other, pos)),
            }
        }
    }

    /// Parse one `{% ... %}` statement whose opening delimiter was at `start`.
    ///
    /// Returns `None` for `extends`, which is hoisted onto the template.
    fn parse_statement(&mut self, start: Pos) -> Result<Option<Stmt>, ParseError> {
        let (tag, tag_pos) = self.expect_name()?;
        let kind = match tag.as_str() {
            "if" => self.parse_if(start)?,
            "for" => self.parse_for(start)?,
            "block" => self.parse_block(start)?,
            "extends" => {
                self.parse_extends(start)?;
                return Ok(None);
            }
            "include" => self.parse_include()?,
            "import" => self.parse_import()?,
            "from" => self.parse_from_import()?,
            "set" => self.parse_set(start)?,
            "filter" => self.parse_filter_block(start)?,
            "macro" => StmtKind::Macro(self.parse_macro(start)?),
            "call" => self.parse_call(start)?,
            _ => match self.extension_for(&tag) {
                Some(extension) => {
                    let token = Token::new(TokenKind::Name(tag.clone()), tag_pos);
                    let node =
                        self.with_open_tag(&tag, start, |p| extension.parse(p, &token))?;
                    StmtKind::CallExtension(node)
                }
                None => return Err(self.unknown_tag(tag, tag_pos)),
            },
        };
        Ok(Some(Stmt { kind, pos: start }))
    }

    fn unknown_tag(&self, tag: String, pos: Pos) -> ParseError {
        if tag.starts_with("end") || CONTINUATION_TAGS.iter().any(|t| *t == tag) {
            return ParseError::UnexpectedEndTag { tag, pos };
        }
        let mut available: Vec<&str> = CORE_TAGS.to_vec();
        for extension in self.extensions {
            available.extend(extension.tags().iter().copied());
        }
        let suggestions = compute_suggestions(&tag, &available);
        ParseError::UnknownTag {
            tag,
            suggestions,
            pos,
        }
    }

    fn parse_if(&mut self, start: Pos) -> Result<StmtKind, ParseError> {
        self.with_open_tag("if", start, |p| {
            let mut branches = Vec::new();
            loop {
                let cond = p.parse_expression()?;
                p.expect_block_end()?;
                let (body, end) = p.parse_until(&["elif", "elseif", "else", "endif"])?;
                branches.push(IfBranch { cond, body });
                match end.as_str() {
                    "elif" | "elseif" => {}
                    "else" => {
                        p.expect_block_end()?;
                        let (otherwise, _) = p.parse_until(&["endif"])?;
                        p.expect_block_end()?;
                        return Ok(StmtKind::If {
                            branches,
                            otherwise: Some(otherwise),
                        });
                    }
                    _ => {
                        p.expect_block_end()?;
                        return Ok(StmtKind::If {
                            branches,
                            otherwise: None,
                        });
                    }
                }
            }
        })
    }

    fn parse_for(&mut self, start: Pos) -> Result<StmtKind, ParseError> {
        let parenthesized = self.skip_op("(");
        let targets = self.parse_targets()?;
        if parenthesized {
            self.expect_op(")")?;
        }
        self.expect_keyword("in")?;
        let iter = self.parse_expression()?;
        self.expect_block_end()?;

        self.with_open_tag("for", start, |p| {
            let (body, end) = p.parse_until(&["else", "endfor"])?;
            p.expect_block_end()?;
            let otherwise = if end == "else" {
                let (otherwise, _) = p.parse_until(&["endfor"])?;
                p.expect_block_end()?;
                Some(otherwise)
            } else {
                None
            };
            Ok(StmtKind::For {
                targets,
                iter,
                body,
                otherwise,
            })
        })
    }

    fn parse_block(&mut self, start: Pos) -> Result<StmtKind, ParseError> {
        let (name, pos) = self.expect_name()?;
        if !self.blocks.insert(name.clone()) {
            return Err(ParseError::DuplicateBlock { name, pos });
        }
        self.expect_block_end()?;

        let body = self.with_open_tag("block", start, |p| {
            let (body, _) = p.parse_until(&["endblock"])?;
            // `{% endblock name %}`
            if matches!(p.peek().kind, TokenKind::Name(_)) {
                p.next_token();
            }
            p.expect_block_end()?;
            Ok(body)
        })?;
        Ok(StmtKind::Block { name, body })
    }

    fn parse_extends(&mut self, start: Pos) -> Result<(), ParseError> {
        if !self.open_tags.is_empty() {
            return Err(ParseError::NestedExtends { pos: start });
        }
        if self.extends.is_some() {
            return Err(ParseError::DuplicateExtends { pos: start });
        }
        let parent = self.parse_expression()?;
        self.expect_block_end()?;
        self.extends = Some(parent);
        Ok(())
    }

    fn parse_include(&mut self) -> Result<StmtKind, ParseError> {
        let template = self.parse_expression()?;
        let ignore_missing = if self.skip_name("ignore") {
            self.expect_keyword("missing")?;
            true
        } else {
            false
        };
        self.expect_block_end()?;
        Ok(StmtKind::Include {
            template,
            ignore_missing,
        })
    }

    fn parse_import(&mut self) -> Result<StmtKind, ParseError> {
        let template = self.parse_expression()?;
        self.expect_keyword("as")?;
        let (alias, _) = self.expect_name()?;
        let with_context = self.parse_context_modifier();
        self.expect_block_end()?;
        Ok(StmtKind::Import {
            template,
            alias,
            with_context,
        })
    }

    fn parse_from_import(&mut self) -> Result<StmtKind, ParseError> {
        let template = self.parse_expression()?;
        self.expect_keyword("import")?;

        let mut names = Vec::new();
        loop {
            if self.at_context_modifier() {
                break;
            }
            let (name, _) = self.expect_name()?;
            let alias = if self.skip_name("as") {
                Some(self.expect_name()?.0)
            } else {
                None
            };
            names.push(ImportName { name, alias });
            if !self.skip_op(",") {
                break;
            }
        }
        if names.is_empty() {
            let token = self.peek();
            return Err(unexpected("a name to import", &token.kind, token.pos));
        }

        let with_context = self.parse_context_modifier();
        self.expect_block_end()?;
        Ok(StmtKind::FromImport {
            template,
            names,
            with_context,
        })
    }

    fn at_context_modifier(&self) -> bool {
        (self.peek().is_name("with") || self.peek().is_name("without"))
            && self.peek_at(1).is_name("context")
    }

    /// Consume an optional `with context` / `without context` suffix.
    fn parse_context_modifier(&mut self) -> bool {
        if !self.at_context_modifier() {
            return false;
        }
        let with = self.next_token().is_name("with");
        self.next_token();
        with
    }

    fn parse_set(&mut self, start: Pos) -> Result<StmtKind, ParseError> {
        let targets = self.parse_targets()?;
        if self.skip_op("=") {
            let value = self.parse_expression()?;
            self.expect_block_end()?;
            return Ok(StmtKind::Set {
                targets,
                value: SetValue::Expr(value),
            });
        }

        let token = self.peek();
        match token.kind {
            TokenKind::BlockEnd => {}
            TokenKind::Op("." | "[") => {
                return Err(ParseError::InvalidAssignment { pos: token.pos });
            }
            ref other => return Err(unexpected("'=' or end of tag", other, token.pos)),
        }
        self.expect_block_end()?;
        let body = self.with_open_tag("set", start, |p| {
            let (body, _) = p.parse_until(&["endset"])?;
            p.expect_block_end()?;
            Ok(body)
        })?;
        Ok(StmtKind::Set {
            targets,
            value: SetValue::Capture(body),
        })
    }

    /// Comma-separated assignment targets; only plain names are allowed.
    fn parse_targets(&mut self) -> Result<Vec<String>, ParseError> {
        let mut targets = Vec::new();
        loop {
            let token = self.next_token();
            match token.kind {
                TokenKind::Name(name) => targets.push(name),
                _ => return Err(ParseError::InvalidAssignment { pos: token.pos }),
            }
            if !self.skip_op(",") {
                return Ok(targets);
            }
        }
    }

    fn parse_filter_block(&mut self, start: Pos) -> Result<StmtKind, ParseError> {
        let (name, _) = self.parse_filter_name()?;
        let (args, kwargs) = if self.peek().is_op("(") {
            self.parse_arguments()?
        } else {
            (Vec::new(), Vec::new())
        };
        self.expect_block_end()?;
        let body = self.with_open_tag("filter", start, |p| {
            let (body, _) = p.parse_until(&["endfilter"])?;
            p.expect_block_end()?;
            Ok(body)
        })?;
        Ok(StmtKind::FilterBlock {
            name,
            args,
            kwargs,
            body,
        })
    }

    fn parse_macro(&mut self, start: Pos) -> Result<MacroDef, ParseError> {
        let (name, _) = self.expect_name()?;
        let params = self.parse_signature()?;
        self.expect_block_end()?;
        let body = self.with_open_tag("macro", start, |p| {
            let (body, _) = p.parse_until(&["endmacro"])?;
            if matches!(p.peek().kind, TokenKind::Name(_)) {
                p.next_token();
            }
            p.expect_block_end()?;
            Ok(body)
        })?;
        Ok(MacroDef { name, params, body })
    }

    fn parse_call(&mut self, start: Pos) -> Result<StmtKind, ParseError> {
        let params = if self.peek().is_op("(") {
            self.parse_signature()?
        } else {
            Vec::new()
        };
        let call = self.parse_expression()?;
        self.expect_block_end()?;
        let body = self.with_open_tag("call", start, |p| {
            let (body, _) = p.parse_until(&["endcall"])?;
            p.expect_block_end()?;
            Ok(body)
        })?;
        Ok(StmtKind::Call {
            call,
            caller: MacroDef {
                name: "caller".to_string(),
                params,
                body,
            },
        })
    }

    /// Parse a parenthesized parameter list: `(a, b, c=10)`.
    pub fn parse_signature(&mut self) -> Result<Vec<MacroParam>, ParseError> {
        self.expect_op("(")?;
        let mut params = Vec::new();
        loop {
            if self.skip_op(")") {
                return Ok(params);
            }
            let (name, _) = self.expect_name()?;
            let default = if self.skip_op("=") {
                Some(self.parse_expression()?)
            } else {
                None
            };
            params.push(MacroParam { name, default });
            if !self.skip_op(",") {
                self.expect_op(")")?;
                return Ok(params);
            }
        }
    }
}
