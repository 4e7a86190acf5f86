//! Expression grammar.
//!
//! Precedence, lowest first: inline `if`, `or`, `and`, `not`, comparisons,
//! additive (`+ - ~`), multiplicative (`* / // %`), `**`, unary sign,
//! filters (`|`), then attribute access, subscripts and calls.

use super::ast::{BinOp, CmpOp, Expr, ExprKind, Literal, UnaryOp};
use super::{ParseError, Parser, unexpected};
use crate::lexer::{Pos, TokenKind};

type Arguments = (Vec<Expr>, Vec<(String, Expr)>);

impl Parser<'_> {
    /// Parse a full expression at the lowest precedence level.
    pub fn parse_expression(&mut self) -> Result<Expr, ParseError> {
        self.parse_inline_if()
    }

    fn parse_inline_if(&mut self) -> Result<Expr, ParseError> {
        let body = self.parse_or()?;
        if !self.skip_name("if") {
            return Ok(body);
        }
        let cond = self.parse_or()?;
        let otherwise = if self.skip_name("else") {
            Some(Box::new(self.parse_inline_if()?))
        } else {
            None
        };
        let pos = body.pos;
        Ok(Expr::new(
            ExprKind::InlineIf {
                cond: Box::new(cond),
                body: Box::new(body),
                otherwise,
            },
            pos,
        ))
    }

    fn parse_or(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_and()?;
        while self.skip_name("or") {
            let right = self.parse_and()?;
            left = binary(BinOp::Or, left, right);
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_not()?;
        while self.skip_name("and") {
            let right = self.parse_not()?;
            left = binary(BinOp::And, left, right);
        }
        Ok(left)
    }

    fn parse_not(&mut self) -> Result<Expr, ParseError> {
        let pos = self.peek().pos;
        if self.skip_name("not") {
            let operand = self.parse_not()?;
            return Ok(unary(UnaryOp::Not, operand, pos));
        }
        self.parse_compare()
    }

    fn parse_compare(&mut self) -> Result<Expr, ParseError> {
        let first = self.parse_additive()?;
        let mut rest = Vec::new();
        loop {
            let op = match &self.peek().kind {
                TokenKind::Op("==") => CmpOp::Eq,
                TokenKind::Op("!=") => CmpOp::Ne,
                TokenKind::Op("<") => CmpOp::Lt,
                TokenKind::Op("<=") => CmpOp::Le,
                TokenKind::Op(">") => CmpOp::Gt,
                TokenKind::Op(">=") => CmpOp::Ge,
                TokenKind::Name(name) if name == "in" => CmpOp::In,
                TokenKind::Name(name) if name == "not" && self.peek_at(1).is_name("in") => {
                    CmpOp::NotIn
                }
                _ => break,
            };
            self.next_token();
            if op == CmpOp::NotIn {
                self.next_token();
            }
            rest.push((op, self.parse_additive()?));
        }

        if rest.is_empty() {
            return Ok(first);
        }
        let pos = first.pos;
        Ok(Expr::new(
            ExprKind::Compare {
                first: Box::new(first),
                rest,
            },
            pos,
        ))
    }

    fn parse_additive(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_multiplicative()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Op("+") => BinOp::Add,
                TokenKind::Op("-") => BinOp::Sub,
                TokenKind::Op("~") => BinOp::Concat,
                _ => return Ok(left),
            };
            self.next_token();
            let right = self.parse_multiplicative()?;
            left = binary(op, left, right);
        }
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_pow()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Op("*") => BinOp::Mul,
                TokenKind::Op("/") => BinOp::Div,
                TokenKind::Op("//") => BinOp::FloorDiv,
                TokenKind::Op("%") => BinOp::Mod,
                _ => return Ok(left),
            };
            self.next_token();
            let right = self.parse_pow()?;
            left = binary(op, left, right);
        }
    }

    fn parse_pow(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_unary()?;
        while self.skip_op("**") {
            let right = self.parse_unary()?;
            left = binary(BinOp::Pow, left, right);
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr, ParseError> {
        let pos = self.peek().pos;
        if self.skip_op("-") {
            let operand = self.parse_unary()?;
            return Ok(unary(UnaryOp::Neg, operand, pos));
        }
        if self.skip_op("+") {
            let operand = self.parse_unary()?;
            return Ok(unary(UnaryOp::Pos, operand, pos));
        }
        self.parse_filter()
    }

    fn parse_filter(&mut self) -> Result<Expr, ParseError> {
        let mut target = self.parse_postfix()?;
        while self.skip_op("|") {
            let (name, pos) = self.parse_filter_name()?;
            let (args, kwargs) = if self.peek().is_op("(") {
                self.parse_arguments()?
            } else {
                (Vec::new(), Vec::new())
            };
            target = Expr::new(
                ExprKind::Filter {
                    name,
                    target: Box::new(target),
                    args,
                    kwargs,
                },
                pos,
            );
        }
        Ok(target)
    }

    /// A filter name, optionally dotted (`ns.filter`).
    pub(super) fn parse_filter_name(&mut self) -> Result<(String, Pos), ParseError> {
        let (mut name, pos) = self.expect_name()?;
        while self.peek().is_op(".") && matches!(self.peek_at(1).kind, TokenKind::Name(_)) {
            self.next_token();
            let (part, _) = self.expect_name()?;
            name.push('.');
            name.push_str(&part);
        }
        Ok((name, pos))
    }

    fn parse_postfix(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.parse_primary()?;
        loop {
            let pos = self.peek().pos;
            if self.skip_op(".") {
                let token = self.next_token();
                let kind = match token.kind {
                    TokenKind::Name(name) => ExprKind::GetAttr {
                        target: Box::new(expr),
                        name,
                    },
                    TokenKind::Int(index) => ExprKind::GetItem {
                        target: Box::new(expr),
                        key: Box::new(Expr::new(
                            ExprKind::Literal(Literal::Int(index)),
                            token.pos,
                        )),
                    },
                    other => return Err(unexpected("an attribute name", &other, token.pos)),
                };
                expr = Expr::new(kind, pos);
            } else if self.skip_op("[") {
                let key = self.parse_expression()?;
                self.expect_op("]")?;
                expr = Expr::new(
                    ExprKind::GetItem {
                        target: Box::new(expr),
                        key: Box::new(key),
                    },
                    pos,
                );
            } else if self.peek().is_op("(") {
                let (args, kwargs) = self.parse_arguments()?;
                expr = Expr::new(
                    ExprKind::FunCall {
                        callee: Box::new(expr),
                        args,
                        kwargs,
                    },
                    pos,
                );
            } else {
                return Ok(expr);
            }
        }
    }

    fn parse_primary(&mut self) -> Result<Expr, ParseError> {
        let token = self.next_token();
        let pos = token.pos;
        let kind = match token.kind {
            TokenKind::Name(name) => match name.as_str() {
                "true" | "True" => ExprKind::Literal(Literal::Bool(true)),
                "false" | "False" => ExprKind::Literal(Literal::Bool(false)),
                "none" | "None" => ExprKind::Literal(Literal::None),
                _ => ExprKind::Symbol(name),
            },
            TokenKind::String(value) => ExprKind::Literal(Literal::String(value)),
            TokenKind::Int(value) => ExprKind::Literal(Literal::Int(value)),
            TokenKind::Float(value) => ExprKind::Literal(Literal::Float(value)),
            TokenKind::Op("(") => return self.parse_group(pos),
            TokenKind::Op("[") => ExprKind::Array(self.parse_list("]")?),
            TokenKind::Op("{") => self.parse_dict()?,
            other => return Err(unexpected("an expression", &other, pos)),
        };
        Ok(Expr::new(kind, pos))
    }

    /// `(expr)` is a group, `(a, b)` and `()` are tuples.
    fn parse_group(&mut self, pos: Pos) -> Result<Expr, ParseError> {
        if self.skip_op(")") {
            return Ok(Expr::new(ExprKind::Array(Vec::new()), pos));
        }
        let first = self.parse_expression()?;
        if self.skip_op(",") {
            let mut items = vec![first];
            items.extend(self.parse_list(")")?);
            return Ok(Expr::new(ExprKind::Array(items), pos));
        }
        self.expect_op(")")?;
        Ok(Expr::new(ExprKind::Group(Box::new(first)), pos))
    }

    /// Comma-separated expressions up to `close`, trailing comma allowed.
    fn parse_list(&mut self, close: &str) -> Result<Vec<Expr>, ParseError> {
        let mut items = Vec::new();
        loop {
            if self.skip_op(close) {
                return Ok(items);
            }
            items.push(self.parse_expression()?);
            if !self.skip_op(",") {
                self.expect_op(close)?;
                return Ok(items);
            }
        }
    }

    fn parse_dict(&mut self) -> Result<ExprKind, ParseError> {
        let mut pairs = Vec::new();
        loop {
            if self.skip_op("}") {
                return Ok(ExprKind::Dict(pairs));
            }
            let mut key = self.parse_expression()?;
            // Bare names are keys, not lookups: `{ a: 1 }`
            if let ExprKind::Symbol(name) = &key.kind {
                key.kind = ExprKind::Literal(Literal::String(name.clone()));
            }
            self.expect_op(":")?;
            let value = self.parse_expression()?;
            pairs.push((key, value));
            if !self.skip_op(",") {
                self.expect_op("}")?;
                return Ok(ExprKind::Dict(pairs));
            }
        }
    }

    /// Parse a parenthesized argument list with positional and keyword
    /// arguments: `(a, b, key=value)`.
    pub fn parse_arguments(&mut self) -> Result<Arguments, ParseError> {
        self.expect_op("(")?;
        let mut args = Vec::new();
        let mut kwargs = Vec::new();
        loop {
            if self.skip_op(")") {
                return Ok((args, kwargs));
            }
            let keyword = match &self.peek().kind {
                TokenKind::Name(name) if self.peek_at(1).is_op("=") => Some(name.clone()),
                _ => None,
            };
            match keyword {
                Some(name) => {
                    self.next_token();
                    self.next_token();
                    kwargs.push((name, self.parse_expression()?));
                }
                None => args.push(self.parse_expression()?),
            }
            if !self.skip_op(",") {
                self.expect_op(")")?;
                return Ok((args, kwargs));
            }
        }
    }
}

fn binary(op: BinOp, left: Expr, right: Expr) -> Expr {
    let pos = left.pos;
    Expr::new(
        ExprKind::BinOp {
            op,
            left: Box::new(left),
            right: Box::new(right),
        },
        pos,
    )
}

fn unary(op: UnaryOp, operand: Expr, pos: Pos) -> Expr {
    Expr::new(
        ExprKind::UnaryOp {
            op,
            operand: Box::new(operand),
        },
        pos,
    )
}
