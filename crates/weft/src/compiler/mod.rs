//! Template compiler.
//!
//! Walks the AST once and produces a [`Program`]: a root routine, one
//! routine per `{% block %}` and one per macro or `{% call %}` body. While
//! walking, a compile-time [`scope`] model decides for every symbol whether
//! it can be read from a known frame or must be looked up dynamically.

mod analysis;
mod program;
mod scope;

pub use program::{Expr, Instr, InstrKind, MacroRoutine, Param, Program, Routine};

use std::collections::HashSet;

use indexmap::IndexMap;
use thiserror::Error;
use tracing::debug;

use crate::lexer::Pos;
use crate::parser::{self as ast, ExprKind, MacroDef, SetValue, StmtKind};
use analysis::AsyncAnalysis;
use scope::{Resolution, Scope, ScopeKind};

/// An error detected while compiling a parsed template.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CompileError {
    #[error("super() called outside of a block at {pos}")]
    SuperOutsideBlock { pos: Pos },
}

impl CompileError {
    pub fn pos(&self) -> Pos {
        match self {
            CompileError::SuperOutsideBlock { pos } => *pos,
        }
    }
}

/// Registry facts the compiler needs to mark async work.
#[derive(Debug, Clone, Default)]
pub struct CompileOptions {
    pub async_filters: HashSet<String>,
    pub async_extensions: HashSet<String>,
}

/// Compile a parsed template.
pub fn compile(
    name: &str,
    template: &ast::Template,
    options: &CompileOptions,
) -> Result<Program, CompileError> {
    debug!(template = name, "Compiling template");
    let mut compiler = Compiler {
        scope: Scope::new(),
        analysis: AsyncAnalysis::new(options, &template.body),
        blocks: IndexMap::new(),
        macros: Vec::new(),
        has_parent: template.extends.is_some(),
    };

    let parent = template
        .extends
        .as_ref()
        .map(|expr| compiler.compile_expr(expr))
        .transpose()?;
    let body = compiler.compile_body(&template.body)?;
    let root = Routine {
        name: "root".to_string(),
        is_async: compiler.analysis.body_is_async(&template.body)
            || template
                .extends
                .as_ref()
                .is_some_and(|e| compiler.analysis.expr_is_async(e)),
        body,
    };

    let is_async = root.is_async
        || compiler.blocks.values().any(|b| b.is_async)
        || compiler.macros.iter().any(|m| m.is_async);
    debug!(
        template = name,
        blocks = compiler.blocks.len(),
        macros = compiler.macros.len(),
        is_async,
        "Compiled template"
    );

    Ok(Program {
        name: name.to_string(),
        source_hash: 0,
        root,
        blocks: compiler.blocks,
        macros: compiler.macros,
        parent,
        is_async,
    })
}

struct Compiler<'o> {
    scope: Scope,
    analysis: AsyncAnalysis<'o>,
    blocks: IndexMap<String, Routine>,
    macros: Vec<MacroRoutine>,
    has_parent: bool,
}

impl Compiler<'_> {
    fn compile_body(&mut self, body: &[ast::Stmt]) -> Result<Vec<Instr>, CompileError> {
        let mut instrs = Vec::with_capacity(body.len());
        for stmt in body {
            if let Some(instr) = self.compile_stmt(stmt)? {
                instrs.push(instr);
            }
        }
        Ok(instrs)
    }

    fn compile_stmt(&mut self, stmt: &ast::Stmt) -> Result<Option<Instr>, CompileError> {
        let kind = match &stmt.kind {
            StmtKind::TemplateData(text) => InstrKind::Text(text.clone()),
            StmtKind::Output(expr) => InstrKind::Output(self.compile_expr(expr)?),
            StmtKind::If {
                branches,
                otherwise,
            } => {
                let mut compiled = Vec::with_capacity(branches.len());
                for branch in branches {
                    let cond = self.compile_expr(&branch.cond)?;
                    compiled.push((cond, self.compile_body(&branch.body)?));
                }
                InstrKind::If {
                    branches: compiled,
                    otherwise: self.compile_optional_body(otherwise.as_deref())?,
                }
            }
            StmtKind::For {
                targets,
                iter,
                body,
                otherwise,
            } => {
                let iter = self.compile_expr(iter)?;
                self.scope.push(ScopeKind::For);
                for target in targets {
                    self.scope.declare(target);
                }
                self.scope.declare("loop");
                let compiled = self.compile_body(body);
                self.scope.pop();
                InstrKind::For {
                    targets: targets.clone(),
                    iter,
                    body: compiled?,
                    otherwise: self.compile_optional_body(otherwise.as_deref())?,
                    concurrent: self.analysis.body_may_await(body),
                }
            }
            StmtKind::Block { name, body } => {
                let top_level = self.scope.is_top_level();
                self.scope.push(ScopeKind::Block(name.clone()));
                let compiled = self.compile_body(body);
                self.scope.pop();
                self.blocks.insert(
                    name.clone(),
                    Routine {
                        name: format!("b_{name}"),
                        body: compiled?,
                        is_async: self.analysis.body_is_async(body),
                    },
                );
                // A child template's own output is discarded in favour of
                // its parent, so its top-level blocks are only registered.
                if self.has_parent && top_level {
                    return Ok(None);
                }
                InstrKind::Block { name: name.clone() }
            }
            StmtKind::Include {
                template,
                ignore_missing,
            } => InstrKind::Include {
                template: self.compile_expr(template)?,
                ignore_missing: *ignore_missing,
            },
            StmtKind::Import {
                template,
                alias,
                with_context,
            } => {
                let template = self.compile_expr(template)?;
                self.scope.declare(alias);
                InstrKind::Import {
                    template,
                    alias: alias.clone(),
                    with_context: *with_context,
                }
            }
            StmtKind::FromImport {
                template,
                names,
                with_context,
            } => {
                let template = self.compile_expr(template)?;
                let names = names
                    .iter()
                    .map(|import| {
                        self.scope.declare(import.binding());
                        (import.name.clone(), import.binding().to_string())
                    })
                    .collect();
                InstrKind::FromImport {
                    template,
                    names,
                    with_context: *with_context,
                }
            }
            StmtKind::Set { targets, value } => {
                let export = self.scope.is_top_level();
                let kind = match value {
                    SetValue::Expr(expr) => InstrKind::Set {
                        targets: targets.clone(),
                        value: self.compile_expr(expr)?,
                        export,
                    },
                    SetValue::Capture(body) => InstrKind::SetCapture {
                        targets: targets.clone(),
                        body: self.compile_body(body)?,
                        export,
                    },
                };
                for target in targets {
                    self.scope.declare(target);
                }
                kind
            }
            StmtKind::FilterBlock {
                name,
                args,
                kwargs,
                body,
            } => InstrKind::FilterBlock {
                name: name.clone(),
                args: self.compile_exprs(args)?,
                kwargs: self.compile_kwargs(kwargs)?,
                body: self.compile_body(body)?,
                is_async: self.analysis.filter_is_async(name),
            },
            StmtKind::Macro(def) => {
                // Declared before the body so the macro can call itself.
                self.scope.declare(&def.name);
                let id = self.compile_macro(def, ScopeKind::Macro)?;
                InstrKind::Macro {
                    id,
                    name: def.name.clone(),
                    export: self.scope.is_top_level(),
                }
            }
            StmtKind::Call { call, caller } => {
                let id = self.compile_macro(caller, ScopeKind::Caller)?;
                let expr = match &call.kind {
                    ExprKind::FunCall {
                        callee,
                        args,
                        kwargs,
                    } => self.compile_call(callee, args, kwargs, Some(id), call.pos)?,
                    _ => Expr::Call {
                        callee: Box::new(self.compile_expr(call)?),
                        args: Vec::new(),
                        kwargs: Vec::new(),
                        caller: Some(id),
                        concurrent_args: false,
                    },
                };
                InstrKind::Output(expr)
            }
            StmtKind::CallExtension(node) => {
                let mut bodies = Vec::with_capacity(node.bodies.len());
                for body in &node.bodies {
                    bodies.push(self.compile_body(body)?);
                }
                InstrKind::CallExtension {
                    extension: node.extension.clone(),
                    args: self.compile_exprs(&node.args)?,
                    kwargs: self.compile_kwargs(&node.kwargs)?,
                    bodies,
                    is_async: self.analysis.extension_is_async(&node.extension),
                }
            }
        };
        Ok(Some(Instr {
            kind,
            pos: stmt.pos,
        }))
    }

    fn compile_optional_body(
        &mut self,
        body: Option<&[ast::Stmt]>,
    ) -> Result<Vec<Instr>, CompileError> {
        match body {
            Some(body) => self.compile_body(body),
            None => Ok(Vec::new()),
        }
    }

    /// Compile a macro or `caller` body into its own routine.
    fn compile_macro(&mut self, def: &MacroDef, kind: ScopeKind) -> Result<usize, CompileError> {
        let is_caller = kind == ScopeKind::Caller;
        self.scope.push(kind);
        let result = self.compile_macro_body(def, is_caller);
        let frame = self.scope.pop();
        let (params, body) = result?;

        let declares_kwargs = def.params.iter().any(|p| p.name == "kwargs");
        let catch_kwargs = !declares_kwargs && frame.is_some_and(|f| f.kwargs_used);
        self.macros.push(MacroRoutine {
            name: def.name.clone(),
            params,
            body,
            catch_kwargs,
            is_async: self.analysis.body_is_async(&def.body),
        });
        Ok(self.macros.len() - 1)
    }

    /// A `caller` body does not get its own `kwargs`: it closes over the
    /// frame of the macro it was written in and sees that macro's.
    fn compile_macro_body(
        &mut self,
        def: &MacroDef,
        is_caller: bool,
    ) -> Result<(Vec<Param>, Vec<Instr>), CompileError> {
        let mut params = Vec::with_capacity(def.params.len());
        for param in &def.params {
            let default = param
                .default
                .as_ref()
                .map(|d| self.compile_expr(d))
                .transpose()?;
            self.scope.declare(&param.name);
            params.push(Param {
                name: param.name.clone(),
                default,
            });
        }
        if !is_caller {
            self.scope.declare("kwargs");
        }
        self.scope.declare("caller");
        let body = self.compile_body(&def.body)?;
        Ok((params, body))
    }

    fn compile_exprs(&mut self, exprs: &[ast::Expr]) -> Result<Vec<Expr>, CompileError> {
        exprs.iter().map(|e| self.compile_expr(e)).collect()
    }

    fn compile_kwargs(
        &mut self,
        kwargs: &[(String, ast::Expr)],
    ) -> Result<Vec<(String, Expr)>, CompileError> {
        kwargs
            .iter()
            .map(|(name, e)| Ok((name.clone(), self.compile_expr(e)?)))
            .collect()
    }

    fn compile_call(
        &mut self,
        callee: &ast::Expr,
        args: &[ast::Expr],
        kwargs: &[(String, ast::Expr)],
        caller: Option<usize>,
        pos: Pos,
    ) -> Result<Expr, CompileError> {
        if let ExprKind::Symbol(name) = &callee.kind
            && name == "super"
            && self.scope.resolve(name) == Resolution::Dynamic
        {
            return match self.scope.current_block() {
                Some(block) => Ok(Expr::Super {
                    block: block.to_string(),
                }),
                None => Err(CompileError::SuperOutsideBlock { pos }),
            };
        }

        let async_args = args
            .iter()
            .chain(kwargs.iter().map(|(_, e)| e))
            .filter(|e| self.analysis.expr_is_async(e))
            .count();
        Ok(Expr::Call {
            callee: Box::new(self.compile_expr(callee)?),
            args: self.compile_exprs(args)?,
            kwargs: self.compile_kwargs(kwargs)?,
            caller,
            concurrent_args: async_args > 0 && args.len() + kwargs.len() > 1,
        })
    }

    fn compile_expr(&mut self, expr: &ast::Expr) -> Result<Expr, CompileError> {
        Ok(match &expr.kind {
            ExprKind::Literal(literal) => Expr::Const(literal.clone()),
            ExprKind::Symbol(name) => match self.scope.resolve(name) {
                Resolution::Local { depth } => Expr::Local {
                    name: name.clone(),
                    depth,
                },
                Resolution::Dynamic => Expr::Lookup { name: name.clone() },
            },
            ExprKind::Group(inner) => self.compile_expr(inner)?,
            ExprKind::Array(items) => Expr::Array(self.compile_exprs(items)?),
            ExprKind::Dict(pairs) => {
                let mut compiled = Vec::with_capacity(pairs.len());
                for (key, value) in pairs {
                    compiled.push((self.compile_expr(key)?, self.compile_expr(value)?));
                }
                Expr::Dict(compiled)
            }
            ExprKind::BinOp { op, left, right } => Expr::Binary {
                op: *op,
                left: Box::new(self.compile_expr(left)?),
                right: Box::new(self.compile_expr(right)?),
            },
            ExprKind::UnaryOp { op, operand } => Expr::Unary {
                op: *op,
                operand: Box::new(self.compile_expr(operand)?),
            },
            ExprKind::Compare { first, rest } => {
                let first = Box::new(self.compile_expr(first)?);
                let mut compiled = Vec::with_capacity(rest.len());
                for (op, operand) in rest {
                    compiled.push((*op, self.compile_expr(operand)?));
                }
                Expr::Compare {
                    first,
                    rest: compiled,
                }
            }
            ExprKind::InlineIf {
                cond,
                body,
                otherwise,
            } => Expr::InlineIf {
                cond: Box::new(self.compile_expr(cond)?),
                body: Box::new(self.compile_expr(body)?),
                otherwise: match otherwise {
                    Some(o) => Some(Box::new(self.compile_expr(o)?)),
                    None => None,
                },
            },
            ExprKind::FunCall {
                callee,
                args,
                kwargs,
            } => self.compile_call(callee, args, kwargs, None, expr.pos)?,
            ExprKind::Filter {
                name,
                target,
                args,
                kwargs,
            } => Expr::Filter {
                name: name.clone(),
                target: Box::new(self.compile_expr(target)?),
                args: self.compile_exprs(args)?,
                kwargs: self.compile_kwargs(kwargs)?,
                is_async: self.analysis.filter_is_async(name),
            },
            ExprKind::GetAttr { target, name } => Expr::GetAttr {
                target: Box::new(self.compile_expr(target)?),
                name: name.clone(),
            },
            ExprKind::GetItem { target, key } => Expr::GetItem {
                target: Box::new(self.compile_expr(target)?),
                key: Box::new(self.compile_expr(key)?),
            },
        })
    }
}
