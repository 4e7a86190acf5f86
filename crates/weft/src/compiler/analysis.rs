//! Static detection of async work.
//!
//! A construct is async when it applies an async filter, runs an async
//! extension, or calls a macro of the same template whose body is async.
//! Macro async-ness is propagated to a fixpoint so that chains of macro
//! calls are detected regardless of definition order.
//!
//! Macros that come from elsewhere, such as imports or `caller`, cannot be
//! seen here. A loop that calls one of them may still await, so
//! `body_may_await` treats such calls as possibly async when deciding
//! whether iterations run concurrently.

use std::collections::HashSet;

use super::CompileOptions;
use crate::parser::{Expr, ExprKind, MacroDef, SetValue, Stmt, StmtKind};

pub(crate) struct AsyncAnalysis<'o> {
    options: &'o CompileOptions,
    async_macros: HashSet<String>,
    local_macros: HashSet<String>,
}

impl<'o> AsyncAnalysis<'o> {
    pub fn new(options: &'o CompileOptions, body: &[Stmt]) -> Self {
        let mut macros = Vec::new();
        collect_macros(body, &mut macros);
        let mut analysis = Self {
            options,
            async_macros: HashSet::new(),
            local_macros: macros.iter().map(|def| def.name.clone()).collect(),
        };

        loop {
            let newly_async: Vec<String> = macros
                .iter()
                .filter(|def| !analysis.async_macros.contains(&def.name))
                .filter(|def| analysis.body_is_async(&def.body))
                .map(|def| def.name.clone())
                .collect();
            if newly_async.is_empty() {
                return analysis;
            }
            analysis.async_macros.extend(newly_async);
        }
    }

    pub fn filter_is_async(&self, name: &str) -> bool {
        self.options.async_filters.contains(name)
    }

    pub fn extension_is_async(&self, name: &str) -> bool {
        self.options.async_extensions.contains(name)
    }

    pub fn body_is_async(&self, body: &[Stmt]) -> bool {
        self.body_awaits(body, false)
    }

    /// Like [`body_is_async`](Self::body_is_async), but calls to anything
    /// other than a macro of this template count as possibly async.
    pub fn body_may_await(&self, body: &[Stmt]) -> bool {
        self.body_awaits(body, true)
    }

    pub fn expr_is_async(&self, expr: &Expr) -> bool {
        self.expr_awaits(expr, false)
    }

    fn body_awaits(&self, body: &[Stmt], opaque: bool) -> bool {
        body.iter().any(|stmt| self.stmt_awaits(stmt, opaque))
    }

    fn stmt_awaits(&self, stmt: &Stmt, opaque: bool) -> bool {
        match &stmt.kind {
            StmtKind::TemplateData(_) | StmtKind::Macro(_) => false,
            StmtKind::Output(expr) => self.expr_awaits(expr, opaque),
            StmtKind::If {
                branches,
                otherwise,
            } => {
                branches.iter().any(|b| {
                    self.expr_awaits(&b.cond, opaque) || self.body_awaits(&b.body, opaque)
                }) || otherwise.as_deref().is_some_and(|o| self.body_awaits(o, opaque))
            }
            StmtKind::For {
                iter,
                body,
                otherwise,
                ..
            } => {
                self.expr_awaits(iter, opaque)
                    || self.body_awaits(body, opaque)
                    || otherwise.as_deref().is_some_and(|o| self.body_awaits(o, opaque))
            }
            StmtKind::Block { body, .. } => self.body_awaits(body, opaque),
            StmtKind::Include { template, .. }
            | StmtKind::Import { template, .. }
            | StmtKind::FromImport { template, .. } => self.expr_awaits(template, opaque),
            StmtKind::Set { value, .. } => match value {
                SetValue::Expr(expr) => self.expr_awaits(expr, opaque),
                SetValue::Capture(body) => self.body_awaits(body, opaque),
            },
            StmtKind::FilterBlock {
                name,
                args,
                kwargs,
                body,
            } => {
                self.filter_is_async(name)
                    || self.exprs_await(args, kwargs, opaque)
                    || self.body_awaits(body, opaque)
            }
            StmtKind::Call { call, caller } => {
                self.expr_awaits(call, opaque) || self.body_awaits(&caller.body, opaque)
            }
            StmtKind::CallExtension(node) => {
                self.extension_is_async(&node.extension)
                    || self.exprs_await(&node.args, &node.kwargs, opaque)
                    || node.bodies.iter().any(|b| self.body_awaits(b, opaque))
            }
        }
    }

    fn expr_awaits(&self, expr: &Expr, opaque: bool) -> bool {
        match &expr.kind {
            ExprKind::Literal(_) | ExprKind::Symbol(_) => false,
            ExprKind::Group(inner) => self.expr_awaits(inner, opaque),
            ExprKind::Array(items) => items.iter().any(|e| self.expr_awaits(e, opaque)),
            ExprKind::Dict(pairs) => pairs
                .iter()
                .any(|(k, v)| self.expr_awaits(k, opaque) || self.expr_awaits(v, opaque)),
            ExprKind::BinOp { left, right, .. } => {
                self.expr_awaits(left, opaque) || self.expr_awaits(right, opaque)
            }
            ExprKind::UnaryOp { operand, .. } => self.expr_awaits(operand, opaque),
            ExprKind::Compare { first, rest } => {
                self.expr_awaits(first, opaque)
                    || rest.iter().any(|(_, e)| self.expr_awaits(e, opaque))
            }
            ExprKind::InlineIf {
                cond,
                body,
                otherwise,
            } => {
                self.expr_awaits(cond, opaque)
                    || self.expr_awaits(body, opaque)
                    || otherwise.as_deref().is_some_and(|o| self.expr_awaits(o, opaque))
            }
            ExprKind::FunCall {
                callee,
                args,
                kwargs,
            } => {
                let calls_async_macro = match &callee.kind {
                    ExprKind::Symbol(name) => {
                        self.async_macros.contains(name)
                            || (opaque && !self.local_macros.contains(name))
                    }
                    _ => opaque,
                };
                calls_async_macro
                    || self.expr_awaits(callee, opaque)
                    || self.exprs_await(args, kwargs, opaque)
            }
            ExprKind::Filter {
                name,
                target,
                args,
                kwargs,
            } => {
                self.filter_is_async(name)
                    || self.expr_awaits(target, opaque)
                    || self.exprs_await(args, kwargs, opaque)
            }
            ExprKind::GetAttr { target, .. } => self.expr_awaits(target, opaque),
            ExprKind::GetItem { target, key } => {
                self.expr_awaits(target, opaque) || self.expr_awaits(key, opaque)
            }
        }
    }

    fn exprs_await(&self, args: &[Expr], kwargs: &[(String, Expr)], opaque: bool) -> bool {
        args.iter().any(|e| self.expr_awaits(e, opaque))
            || kwargs.iter().any(|(_, e)| self.expr_awaits(e, opaque))
    }
}

/// Collect every macro definition in `body`, at any nesting depth.
fn collect_macros<'a>(body: &'a [Stmt], out: &mut Vec<&'a MacroDef>) {
    for stmt in body {
        match &stmt.kind {
            StmtKind::Macro(def) => {
                out.push(def);
                collect_macros(&def.body, out);
            }
            StmtKind::If {
                branches,
                otherwise,
            } => {
                for branch in branches {
                    collect_macros(&branch.body, out);
                }
                if let Some(otherwise) = otherwise {
                    collect_macros(otherwise, out);
                }
            }
            StmtKind::For {
                body, otherwise, ..
            } => {
                collect_macros(body, out);
                if let Some(otherwise) = otherwise {
                    collect_macros(otherwise, out);
                }
            }
            StmtKind::Block { body, .. }
            | StmtKind::FilterBlock { body, .. }
            | StmtKind::Set {
                value: SetValue::Capture(body),
                ..
            } => collect_macros(body, out),
            StmtKind::Call { caller, .. } => collect_macros(&caller.body, out),
            StmtKind::CallExtension(node) => {
                for body in &node.bodies {
                    collect_macros(body, out);
                }
            }
            StmtKind::TemplateData(_)
            | StmtKind::Output(_)
            | StmtKind::Include { .. }
            | StmtKind::Import { .. }
            | StmtKind::FromImport { .. }
            | StmtKind::Set { .. } => {}
        }
    }
}
