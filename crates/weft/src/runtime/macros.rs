//! Macro values and the argument binding convention.

use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::sync::{Arc, Weak};

use tracing::trace;

use super::context::Context;
use super::frame::Frame;
use crate::compiler::{MacroRoutine, Program};
use crate::types::{Kwargs, Value};

/// A callable macro, or the `caller` body of a `{% call %}` block.
///
/// Holds the program that defines it and weak links to the frame and
/// context it was declared in. The links are weak because the declaring
/// frame usually stores the macro value itself.
pub struct MacroValue {
    name: String,
    program: Arc<Program>,
    id: usize,
    closure: Weak<Frame>,
    context: Weak<Context>,
}

impl MacroValue {
    pub(crate) fn new(
        name: &str,
        program: Arc<Program>,
        id: usize,
        closure: &Arc<Frame>,
        context: &Arc<Context>,
    ) -> Self {
        Self {
            name: name.to_string(),
            program,
            id,
            closure: Arc::downgrade(closure),
            context: Arc::downgrade(context),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn program(&self) -> &Arc<Program> {
        &self.program
    }

    pub(crate) fn routine(&self) -> Option<&MacroRoutine> {
        self.program.macro_routine(self.id)
    }

    pub(crate) fn closure(&self) -> Option<Arc<Frame>> {
        self.closure.upgrade()
    }

    pub(crate) fn context(&self) -> Option<Arc<Context>> {
        self.context.upgrade()
    }
}

impl Debug for MacroValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("MacroValue")
            .field("name", &self.name)
            .field("template", &self.program.name)
            .field("id", &self.id)
            .finish()
    }
}

/// Bind call arguments into the macro's frame.
///
/// Positional arguments bind first, in declaration order; arguments beyond
/// the declared parameters are ignored. Keyword arguments then fill the
/// remaining parameters by name. Unmatched keywords are collected into
/// `kwargs` when the routine asks for them and dropped otherwise.
///
/// Returns the indexes of parameters still unbound, whose defaults the
/// caller evaluates in the new frame.
pub(crate) fn bind_arguments(
    routine: &MacroRoutine,
    frame: &Frame,
    args: Vec<Value>,
    mut kwargs: Kwargs,
    caller: Option<Value>,
) -> Vec<usize> {
    let positional = args.len();
    if positional > routine.params.len() {
        trace!(
            name = %routine.name,
            extra = positional - routine.params.len(),
            "Ignoring extra positional macro arguments"
        );
    }
    for (param, value) in routine.params.iter().zip(args) {
        frame.set(&param.name, value);
    }

    let mut pending = Vec::new();
    for (index, param) in routine.params.iter().enumerate().skip(positional) {
        match kwargs.shift_remove(&param.name) {
            Some(value) => frame.set(&param.name, value),
            None => pending.push(index),
        }
    }

    if routine.catch_kwargs {
        frame.set("kwargs", Value::from(kwargs));
    }
    if let Some(caller) = caller {
        frame.set("caller", caller);
    }
    pending
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::Param;

    fn routine(params: &[&str], catch_kwargs: bool) -> MacroRoutine {
        MacroRoutine {
            name: "field".to_string(),
            params: params
                .iter()
                .map(|name| Param {
                    name: (*name).to_string(),
                    default: None,
                })
                .collect(),
            body: Vec::new(),
            catch_kwargs,
            is_async: false,
        }
    }

    #[test]
    fn positional_then_keyword() {
        let routine = routine(&["x", "y", "z"], false);
        let frame = Frame::root();
        let mut kwargs = Kwargs::new();
        kwargs.insert("z".to_string(), 5.into());

        let pending = bind_arguments(&routine, &frame, vec![1.into(), 2.into()], kwargs, None);

        assert!(pending.is_empty());
        assert_eq!(frame.get("x"), Some(Value::from(1)));
        assert_eq!(frame.get("y"), Some(Value::from(2)));
        assert_eq!(frame.get("z"), Some(Value::from(5)));
    }

    #[test]
    fn missing_parameters_are_pending() {
        let routine = routine(&["x", "y", "z"], false);
        let frame = Frame::root();
        let pending = bind_arguments(&routine, &frame, vec![1.into()], Kwargs::new(), None);
        assert_eq!(pending, vec![1, 2]);
    }

    #[test]
    fn extra_positional_arguments_are_ignored() {
        let routine = routine(&["x"], false);
        let frame = Frame::root();
        let pending =
            bind_arguments(&routine, &frame, vec![1.into(), 2.into(), 3.into()], Kwargs::new(), None);
        assert!(pending.is_empty());
        assert_eq!(frame.vars().len(), 1);
    }

    #[test]
    fn unmatched_keywords_go_to_kwargs() {
        let routine = routine(&["x"], true);
        let frame = Frame::root();
        let mut kwargs = Kwargs::new();
        kwargs.insert("class".to_string(), "wide".into());
        kwargs.insert("x".to_string(), 1.into());

        bind_arguments(&routine, &frame, Vec::new(), kwargs, None);

        assert_eq!(frame.get("x"), Some(Value::from(1)));
        let caught = frame.get("kwargs").unwrap();
        assert_eq!(caught.get_attr("class"), Value::from("wide"));
        assert_eq!(caught.len(), Some(1));
    }
}
