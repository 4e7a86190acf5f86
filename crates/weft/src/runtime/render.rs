//! The program evaluator.
//!
//! Every routine runs as a boxed future so that one code path serves both
//! render shapes: a synchronous render drives it with
//! `futures::executor::block_on` and refuses to reach async work, while an
//! async render lets independent branches run through [`join_ordered`].

use std::slice;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;
use tracing::trace;

use super::context::Context;
use super::escape::{captured, suppress_value};
use super::frame::Frame;
use super::join::join_ordered;
use super::macros::{MacroValue, bind_arguments};
use super::{RenderError, ops};
use crate::Error;
use crate::compiler::{Expr, Instr, InstrKind, Program};
use crate::environment::{Environment, ExtensionCall, FilterKind, Template};
use crate::error::compute_suggestions;
use crate::parser::BinOp;
use crate::types::{Kwargs, Map, Value};

/// Whether async filters and extensions may be awaited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RenderMode {
    Sync,
    Async,
}

/// Render `program` as the entry point of a render call.
pub(crate) async fn render_root(
    env: &Environment,
    program: Arc<Program>,
    data: Arc<Map>,
    mode: RenderMode,
) -> Result<String, RenderError> {
    let ctx = Context::new(data, env.globals());
    let renderer = Renderer {
        env,
        ctx,
        program,
        mode,
        depth: 0,
    };
    let frame = Frame::root();
    let mut out = String::new();
    renderer.render_program(&frame, &mut out).await?;
    Ok(out)
}

type Rendered<'a> = BoxFuture<'a, Result<(), RenderError>>;
type Evaluated<'a> = BoxFuture<'a, Result<Value, RenderError>>;

/// Executes the routines of one program against one context.
///
/// Entering another program (a parent, an include, a block override or a
/// macro from an import) derives a new renderer one level deeper.
struct Renderer<'e> {
    env: &'e Environment,
    ctx: Arc<Context>,
    program: Arc<Program>,
    mode: RenderMode,
    depth: usize,
}

impl<'e> Renderer<'e> {
    fn derive(&self, ctx: Arc<Context>, program: Arc<Program>) -> Result<Renderer<'e>, RenderError> {
        let depth = self.depth + 1;
        if depth > self.env.max_depth() {
            return Err(RenderError::MaxDepthExceeded);
        }
        Ok(Renderer {
            env: self.env,
            ctx,
            program,
            mode: self.mode,
            depth,
        })
    }

    fn autoescape(&self) -> bool {
        self.env.autoescape()
    }

    fn require_async(&self, name: &str) -> Result<(), RenderError> {
        match self.mode {
            RenderMode::Async => Ok(()),
            RenderMode::Sync => Err(RenderError::AsyncInSyncRender {
                name: name.to_string(),
            }),
        }
    }

    /// Register this program's blocks, run its root routine, and hand over
    /// to the parent template when there is one.
    fn render_program<'a>(&'a self, frame: &'a Arc<Frame>, out: &'a mut String) -> Rendered<'a> {
        async move {
            let program = &self.program;
            if program.is_async {
                self.require_async(&program.name)?;
            }
            self.ctx.enter_template(&program.name)?;
            for name in program.blocks.keys() {
                self.ctx.add_block(name, program);
            }

            let mut buffer = String::new();
            self.exec_body(&program.root.body, frame, &mut buffer).await?;

            let Some(parent) = &program.parent else {
                out.push_str(&buffer);
                return Ok(());
            };
            let name = self.eval(parent, frame).await?;
            let parent = self.load_template(&name)?;
            trace!(template = %program.name, parent = %parent.name(), "Rendering parent template");
            let renderer = self.derive(Arc::clone(&self.ctx), Arc::clone(parent.program()))?;
            renderer.render_program(frame, out).await
        }
        .boxed()
    }

    fn exec_body<'a>(
        &'a self,
        body: &'a [Instr],
        frame: &'a Arc<Frame>,
        out: &'a mut String,
    ) -> Rendered<'a> {
        async move {
            for instr in body {
                self.exec(instr, frame, out)
                    .await
                    .map_err(|e| e.located(&self.program.name, instr.pos))?;
            }
            Ok(())
        }
        .boxed()
    }

    fn exec<'a>(&'a self, instr: &'a Instr, frame: &'a Arc<Frame>, out: &'a mut String) -> Rendered<'a> {
        async move {
            match &instr.kind {
                InstrKind::Text(text) => out.push_str(text),
                InstrKind::Output(expr) => {
                    let value = self.eval(expr, frame).await?;
                    if self.env.throw_on_undefined() && (value.is_undefined() || value.is_none()) {
                        return Err(RenderError::Undefined {
                            name: describe(expr),
                        });
                    }
                    out.push_str(&suppress_value(&value, self.autoescape()));
                }
                InstrKind::If {
                    branches,
                    otherwise,
                } => {
                    for (cond, body) in branches {
                        if self.eval(cond, frame).await?.is_true() {
                            return self.exec_body(body, frame, out).await;
                        }
                    }
                    self.exec_body(otherwise, frame, out).await?;
                }
                InstrKind::For {
                    targets,
                    iter,
                    body,
                    otherwise,
                    concurrent,
                } => {
                    let items = loop_items(self.eval(iter, frame).await?, targets.len())?;
                    if items.is_empty() {
                        return self.exec_body(otherwise, frame, out).await;
                    }
                    let length = items.len();
                    if *concurrent && self.mode == RenderMode::Async {
                        let iterations = items.into_iter().enumerate().map(move |(index, item)| async move {
                            let mut buffer = String::new();
                            let info = loop_info(index, length);
                            self.iterate(targets, body, frame, item, info, &mut buffer)
                                .await?;
                            Ok::<_, RenderError>(buffer)
                        });
                        for chunk in join_ordered(iterations).await? {
                            out.push_str(&chunk);
                        }
                    } else {
                        for (index, item) in items.into_iter().enumerate() {
                            let info = loop_info(index, length);
                            self.iterate(targets, body, frame, item, info, out).await?;
                        }
                    }
                }
                InstrKind::Set {
                    targets,
                    value,
                    export,
                } => {
                    let value = self.eval(value, frame).await?;
                    self.assign(targets, &value, *export, frame);
                }
                InstrKind::SetCapture {
                    targets,
                    body,
                    export,
                } => {
                    let mut buffer = String::new();
                    self.exec_body(body, frame, &mut buffer).await?;
                    let value = captured(buffer, self.autoescape());
                    self.assign(targets, &value, *export, frame);
                }
                InstrKind::Block { name } => self.render_block(name, frame, out).await?,
                InstrKind::Include {
                    template,
                    ignore_missing,
                } => {
                    let name = self.eval(template, frame).await?;
                    let template = match self.load_template(&name) {
                        Ok(template) => template,
                        Err(RenderError::TemplateNotFound { name }) if *ignore_missing => {
                            trace!(template = %name, "Skipping missing include");
                            return Ok(());
                        }
                        Err(err) => return Err(err),
                    };
                    let ctx = Context::new(Arc::clone(self.ctx.data()), Arc::clone(self.ctx.globals()));
                    let renderer = self.derive(ctx, Arc::clone(template.program()))?;
                    let child = frame.push();
                    renderer.render_program(&child, out).await?;
                }
                InstrKind::Import {
                    template,
                    alias,
                    with_context,
                } => {
                    let (_, exports) = self.import(template, *with_context, frame).await?;
                    frame.set(alias, Value::from(exports));
                }
                InstrKind::FromImport {
                    template,
                    names,
                    with_context,
                } => {
                    let (source, exports) = self.import(template, *with_context, frame).await?;
                    for (name, binding) in names {
                        let value = exports.get(name).cloned().ok_or_else(|| {
                            RenderError::UnknownExport {
                                name: name.clone(),
                                template: source.clone(),
                            }
                        })?;
                        frame.set(binding, value);
                    }
                }
                InstrKind::Macro { id, name, export } => {
                    let value = Value::Macro(Arc::new(MacroValue::new(
                        name,
                        Arc::clone(&self.program),
                        *id,
                        frame,
                        &self.ctx,
                    )));
                    self.assign(slice::from_ref(name), &value, *export, frame);
                }
                InstrKind::FilterBlock {
                    name,
                    args,
                    kwargs,
                    body,
                    ..
                } => {
                    let mut buffer = String::new();
                    self.exec_body(body, frame, &mut buffer).await?;
                    let (args, kwargs) = self.eval_arguments(args, kwargs, false, frame).await?;
                    let target = captured(buffer, self.autoescape());
                    let value = self.apply_filter(name, target, args, kwargs).await?;
                    out.push_str(&suppress_value(&value, self.autoescape()));
                }
                InstrKind::CallExtension {
                    extension,
                    args,
                    kwargs,
                    bodies,
                    ..
                } => {
                    let value = self.call_extension(extension, args, kwargs, bodies, frame).await?;
                    out.push_str(&suppress_value(&value, self.autoescape()));
                }
            }
            Ok(())
        }
        .boxed()
    }

    fn iterate<'a>(
        &'a self,
        targets: &'a [String],
        body: &'a [Instr],
        frame: &'a Arc<Frame>,
        item: Value,
        info: Value,
        out: &'a mut String,
    ) -> Rendered<'a> {
        async move {
            let scope = frame.push();
            bind_targets(&scope, targets, item);
            scope.set("loop", info);
            self.exec_body(body, &scope, out).await
        }
        .boxed()
    }

    fn assign(&self, targets: &[String], value: &Value, export: bool, frame: &Frame) {
        for target in targets {
            frame.set(target, value.clone());
            if export && !target.starts_with('_') {
                self.ctx.add_export(target, value.clone());
            }
        }
    }

    /// Render the most-derived implementation of the block `name`.
    fn render_block<'a>(&'a self, name: &'a str, frame: &'a Arc<Frame>, out: &'a mut String) -> Rendered<'a> {
        async move {
            let block = self.ctx.get_block(name).ok_or_else(|| RenderError::UnknownBlock {
                name: name.to_string(),
            })?;
            trace!(block = name, template = %block.program.name, "Rendering block");
            let renderer = self.derive(Arc::clone(&self.ctx), Arc::clone(&block.program))?;
            renderer.run_block(name, frame, out).await
        }
        .boxed()
    }

    /// Run this renderer's own implementation of `name` in a fresh scope.
    fn run_block<'a>(&'a self, name: &'a str, frame: &'a Arc<Frame>, out: &'a mut String) -> Rendered<'a> {
        async move {
            let routine = self.program.block(name).ok_or_else(|| RenderError::UnknownBlock {
                name: name.to_string(),
            })?;
            let scope = frame.push();
            self.exec_body(&routine.body, &scope, out).await
        }
        .boxed()
    }

    /// Render a template for its exports.
    ///
    /// The module gets its own context; with context it also sees the
    /// caller's data and current frame.
    fn import<'a>(
        &'a self,
        template: &'a Expr,
        with_context: bool,
        frame: &'a Arc<Frame>,
    ) -> BoxFuture<'a, Result<(String, Map), RenderError>> {
        async move {
            let name = self.eval(template, frame).await?;
            let template = self.load_template(&name)?;
            let data = if with_context {
                Arc::clone(self.ctx.data())
            } else {
                Arc::new(Map::new())
            };
            let ctx = Context::new(data, Arc::clone(self.ctx.globals()));
            let module_frame = if with_context { frame.push() } else { Frame::root() };

            let renderer = self.derive(Arc::clone(&ctx), Arc::clone(template.program()))?;
            let mut discarded = String::new();
            renderer.render_program(&module_frame, &mut discarded).await?;

            let exports = ctx.exports();
            trace!(template = %template.name(), exports = exports.len(), "Imported template");
            self.ctx.retain_module(ctx, module_frame);
            Ok((template.name().to_string(), exports))
        }
        .boxed()
    }

    fn load_template(&self, name: &Value) -> Result<Arc<Template>, RenderError> {
        let Some(name) = name.as_str() else {
            return Err(RenderError::type_error(format!(
                "template name must be a string, not '{}'",
                name.kind()
            )));
        };
        self.env.get_template(name).map_err(|err| match err {
            Error::TemplateNotFound { name } => RenderError::TemplateNotFound { name },
            Error::Render(err) => err,
            other => RenderError::Template {
                name: name.to_string(),
                source: Box::new(other),
            },
        })
    }

    fn eval<'a>(&'a self, expr: &'a Expr, frame: &'a Arc<Frame>) -> Evaluated<'a> {
        async move {
            Ok(match expr {
                Expr::Const(literal) => ops::literal(literal),
                Expr::Local { name, depth } => frame
                    .lookup_from(name, *depth)
                    .or_else(|| self.ctx.lookup(name))
                    .unwrap_or_default(),
                Expr::Lookup { name } => frame
                    .lookup(name)
                    .or_else(|| self.ctx.lookup(name))
                    .unwrap_or_default(),
                Expr::Array(items) => {
                    let mut values = Vec::with_capacity(items.len());
                    for item in items {
                        values.push(self.eval(item, frame).await?);
                    }
                    Value::from(values)
                }
                Expr::Dict(pairs) => {
                    let mut map = Map::with_capacity(pairs.len());
                    for (key, value) in pairs {
                        let key = self.eval(key, frame).await?.to_string();
                        map.insert(key, self.eval(value, frame).await?);
                    }
                    Value::from(map)
                }
                Expr::Binary { op, left, right } => {
                    let left = self.eval(left, frame).await?;
                    match op {
                        BinOp::And if !left.is_true() => left,
                        BinOp::Or if left.is_true() => left,
                        BinOp::And | BinOp::Or => self.eval(right, frame).await?,
                        _ => {
                            let right = self.eval(right, frame).await?;
                            ops::binary(*op, &left, &right, self.autoescape())?
                        }
                    }
                }
                Expr::Unary { op, operand } => ops::unary(*op, &self.eval(operand, frame).await?)?,
                Expr::Compare { first, rest } => {
                    let mut left = self.eval(first, frame).await?;
                    for (op, operand) in rest {
                        let right = self.eval(operand, frame).await?;
                        if !ops::compare(*op, &left, &right)? {
                            return Ok(Value::Bool(false));
                        }
                        left = right;
                    }
                    Value::Bool(true)
                }
                Expr::InlineIf {
                    cond,
                    body,
                    otherwise,
                } => {
                    if self.eval(cond, frame).await?.is_true() {
                        self.eval(body, frame).await?
                    } else if let Some(otherwise) = otherwise {
                        self.eval(otherwise, frame).await?
                    } else {
                        Value::Undefined
                    }
                }
                Expr::Call {
                    callee,
                    args,
                    kwargs,
                    caller,
                    concurrent_args,
                } => {
                    let target = self.eval(callee, frame).await?;
                    let Value::Macro(target) = target else {
                        return Err(RenderError::NotCallable {
                            name: describe(callee),
                        });
                    };
                    let (args, kwargs) = self
                        .eval_arguments(args, kwargs, *concurrent_args, frame)
                        .await?;
                    let caller = caller.map(|id| {
                        Value::Macro(Arc::new(MacroValue::new(
                            "caller",
                            Arc::clone(&self.program),
                            id,
                            frame,
                            &self.ctx,
                        )))
                    });
                    self.call_macro(&target, args, kwargs, caller).await?
                }
                Expr::Super { block } => self.render_super(block, frame).await?,
                Expr::Filter {
                    name,
                    target,
                    args,
                    kwargs,
                    ..
                } => {
                    let target = self.eval(target, frame).await?;
                    let (args, kwargs) = self.eval_arguments(args, kwargs, false, frame).await?;
                    self.apply_filter(name, target, args, kwargs).await?
                }
                Expr::GetAttr { target, name } => self.eval(target, frame).await?.get_attr(name),
                Expr::GetItem { target, key } => {
                    let target = self.eval(target, frame).await?;
                    target.get_item(&self.eval(key, frame).await?)
                }
            })
        }
        .boxed()
    }

    /// Evaluate call arguments in source order. When `concurrent` is set and
    /// the render is async, all of them are awaited together.
    fn eval_arguments<'a>(
        &'a self,
        args: &'a [Expr],
        kwargs: &'a [(String, Expr)],
        concurrent: bool,
        frame: &'a Arc<Frame>,
    ) -> BoxFuture<'a, Result<(Vec<Value>, Kwargs), RenderError>> {
        async move {
            let exprs = args.iter().chain(kwargs.iter().map(|(_, e)| e));
            let mut values = if concurrent && self.mode == RenderMode::Async {
                join_ordered(exprs.map(move |e| self.eval(e, frame))).await?
            } else {
                let mut values = Vec::with_capacity(args.len() + kwargs.len());
                for expr in exprs {
                    values.push(self.eval(expr, frame).await?);
                }
                values
            };
            let named = values.split_off(args.len());
            let kwargs = kwargs
                .iter()
                .map(|(name, _)| name.clone())
                .zip(named)
                .collect();
            Ok((values, kwargs))
        }
        .boxed()
    }

    fn call_macro<'a>(
        &'a self,
        target: &'a Arc<MacroValue>,
        args: Vec<Value>,
        kwargs: Kwargs,
        caller: Option<Value>,
    ) -> Evaluated<'a> {
        async move {
            let routine = target.routine().ok_or_else(|| RenderError::NotCallable {
                name: target.name().to_string(),
            })?;
            if routine.is_async {
                self.require_async(target.name())?;
            }
            trace!(name = target.name(), args = args.len(), kwargs = kwargs.len(), "Calling macro");

            let ctx = target.context().unwrap_or_else(|| Arc::clone(&self.ctx));
            let closure = target.closure().unwrap_or_else(Frame::root);
            let call_frame = closure.push();
            let pending = bind_arguments(routine, &call_frame, args, kwargs, caller);

            let renderer = self.derive(ctx, Arc::clone(target.program()))?;
            for param in pending.iter().filter_map(|index| routine.params.get(*index)) {
                let value = match &param.default {
                    Some(default) => renderer.eval(default, &call_frame).await?,
                    None => Value::Undefined,
                };
                call_frame.set(&param.name, value);
            }

            let mut out = String::new();
            renderer.exec_body(&routine.body, &call_frame, &mut out).await?;
            Ok(Value::safe(out))
        }
        .boxed()
    }

    /// Render the next implementation of `block` after the one running now.
    fn render_super<'a>(&'a self, block: &'a str, frame: &'a Arc<Frame>) -> Evaluated<'a> {
        async move {
            let next = self.ctx.get_super(block, &self.program)?;
            let renderer = self.derive(Arc::clone(&self.ctx), next.program)?;
            let mut out = String::new();
            renderer.run_block(block, frame, &mut out).await?;
            Ok(Value::safe(out))
        }
        .boxed()
    }

    fn apply_filter<'a>(
        &'a self,
        name: &'a str,
        target: Value,
        mut args: Vec<Value>,
        kwargs: Kwargs,
    ) -> Evaluated<'a> {
        async move {
            let Some(filter) = self.env.filter(name) else {
                return Err(RenderError::UnknownFilter {
                    name: name.to_string(),
                    suggestions: compute_suggestions(name, self.env.filter_names()),
                });
            };
            if !kwargs.is_empty() {
                args.push(Value::from(kwargs));
            }
            let result = match filter.kind() {
                FilterKind::Sync(apply) => apply(&target, &args),
                FilterKind::Async(apply) => {
                    self.require_async(name)?;
                    apply(target, args).await
                }
            };
            let value = result.map_err(|err| RenderError::Filter {
                name: name.to_string(),
                message: err.to_string(),
            })?;
            Ok(if filter.returns_safe() {
                value.into_safe()
            } else {
                value
            })
        }
        .boxed()
    }

    fn call_extension<'a>(
        &'a self,
        name: &'a str,
        args: &'a [Expr],
        kwargs: &'a [(String, Expr)],
        bodies: &'a [Vec<Instr>],
        frame: &'a Arc<Frame>,
    ) -> Evaluated<'a> {
        async move {
            let extension = self.env.extension(name).ok_or_else(|| RenderError::UnknownExtension {
                name: name.to_string(),
            })?;
            let (args, kwargs) = self.eval_arguments(args, kwargs, false, frame).await?;
            let mut rendered = Vec::with_capacity(bodies.len());
            for body in bodies {
                let mut buffer = String::new();
                self.exec_body(body, frame, &mut buffer).await?;
                rendered.push(captured(buffer, self.autoescape()));
            }
            let call = ExtensionCall {
                args,
                kwargs,
                bodies: rendered,
            };
            let result = if extension.is_async() {
                self.require_async(name)?;
                extension.run_async(call).await
            } else {
                extension.run(call)
            };
            result.map_err(|err| RenderError::Extension {
                name: name.to_string(),
                message: err.to_string(),
            })
        }
        .boxed()
    }
}

/// Values a `for` loop iterates over.
///
/// Maps yield their keys, or `[key, value]` pairs when the loop unpacks two
/// or more targets. Undefined and none iterate as empty.
fn loop_items(value: Value, targets: usize) -> Result<Vec<Value>, RenderError> {
    match value {
        Value::Undefined | Value::None => Ok(Vec::new()),
        Value::Array(items) => Ok(items.as_ref().clone()),
        Value::Map(map) => Ok(map
            .iter()
            .map(|(key, value)| {
                if targets > 1 {
                    Value::from(vec![Value::from(key.as_str()), value.clone()])
                } else {
                    Value::from(key.as_str())
                }
            })
            .collect()),
        Value::String(s) | Value::Safe(s) => Ok(ops::chars(&s)),
        other => Err(RenderError::type_error(format!(
            "'{}' is not iterable",
            other.kind()
        ))),
    }
}

fn bind_targets(frame: &Frame, targets: &[String], item: Value) {
    if let [target] = targets {
        frame.set(target, item);
        return;
    }
    for (index, target) in targets.iter().enumerate() {
        let value = item
            .as_array()
            .and_then(|items| items.get(index))
            .cloned()
            .unwrap_or_default();
        frame.set(target, value);
    }
}

fn loop_info(index: usize, length: usize) -> Value {
    let remaining = length - index;
    let mut info = Map::new();
    info.insert("index".to_string(), Value::from(index + 1));
    info.insert("index0".to_string(), Value::from(index));
    info.insert("revindex".to_string(), Value::from(remaining));
    info.insert("revindex0".to_string(), Value::from(remaining - 1));
    info.insert("first".to_string(), Value::Bool(index == 0));
    info.insert("last".to_string(), Value::Bool(remaining == 1));
    info.insert("length".to_string(), Value::from(length));
    Value::from(info)
}

/// A short label for an expression in error messages.
fn describe(expr: &Expr) -> String {
    match expr {
        Expr::Local { name, .. } | Expr::Lookup { name } => name.clone(),
        Expr::GetAttr { target, name } => format!("{}.{name}", describe(target)),
        Expr::GetItem { target, .. } => format!("{}[...]", describe(target)),
        Expr::Call { callee, .. } => format!("{}()", describe(callee)),
        Expr::Filter { name, .. } => format!("filter '{name}'"),
        _ => "expression".to_string(),
    }
}
