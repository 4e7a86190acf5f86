//! Compile-time scope model.
//!
//! Mirrors the frames the renderer pushes at runtime so that a name
//! declared in an enclosing, still-open region can be compiled to a direct
//! frame reference instead of a dynamic lookup.

use std::collections::HashSet;

/// What opened a scope. Each kind corresponds to exactly one runtime frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ScopeKind {
    Root,
    For,
    Macro,
    Caller,
    /// A block body. Names outside it may come from another template in the
    /// inheritance chain, so resolution never crosses this boundary.
    Block(String),
}

#[derive(Debug)]
pub(crate) struct ScopeFrame {
    pub kind: ScopeKind,
    names: HashSet<String>,
    /// Set when `kwargs` resolved to this (macro) frame.
    pub kwargs_used: bool,
}

/// How a symbol reference is resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Resolution {
    /// Bound in the frame `depth` levels above the current one.
    Local { depth: usize },
    /// Resolved at render time through the frame chain, then the context.
    Dynamic,
}

#[derive(Debug)]
pub(crate) struct Scope {
    frames: Vec<ScopeFrame>,
}

impl Scope {
    pub fn new() -> Self {
        Self {
            frames: vec![ScopeFrame {
                kind: ScopeKind::Root,
                names: HashSet::new(),
                kwargs_used: false,
            }],
        }
    }

    pub fn push(&mut self, kind: ScopeKind) {
        self.frames.push(ScopeFrame {
            kind,
            names: HashSet::new(),
            kwargs_used: false,
        });
    }

    /// Pop the innermost scope. The root scope is never popped.
    pub fn pop(&mut self) -> Option<ScopeFrame> {
        if self.frames.len() > 1 {
            self.frames.pop()
        } else {
            None
        }
    }

    pub fn declare(&mut self, name: &str) {
        if let Some(frame) = self.frames.last_mut() {
            frame.names.insert(name.to_string());
        }
    }

    pub fn resolve(&mut self, name: &str) -> Resolution {
        for (depth, frame) in self.frames.iter_mut().rev().enumerate() {
            if frame.names.contains(name) {
                if name == "kwargs" && frame.kind == ScopeKind::Macro {
                    frame.kwargs_used = true;
                }
                return Resolution::Local { depth };
            }
            if matches!(frame.kind, ScopeKind::Block(_)) {
                break;
            }
        }
        Resolution::Dynamic
    }

    /// True when no loop, macro or block scope is open.
    pub fn is_top_level(&self) -> bool {
        self.frames.len() == 1
    }

    /// Name of the innermost enclosing block, if any.
    pub fn current_block(&self) -> Option<&str> {
        self.frames.iter().rev().find_map(|frame| match &frame.kind {
            ScopeKind::Block(name) => Some(name.as_str()),
            _ => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_depth_through_nested_scopes() {
        let mut scope = Scope::new();
        scope.declare("title");
        scope.push(ScopeKind::For);
        scope.declare("item");
        scope.push(ScopeKind::Macro);
        scope.declare("x");

        assert_eq!(scope.resolve("x"), Resolution::Local { depth: 0 });
        assert_eq!(scope.resolve("item"), Resolution::Local { depth: 1 });
        assert_eq!(scope.resolve("title"), Resolution::Local { depth: 2 });
        assert_eq!(scope.resolve("missing"), Resolution::Dynamic);
    }

    #[test]
    fn block_boundary_forces_dynamic_lookup() {
        let mut scope = Scope::new();
        scope.declare("title");
        scope.push(ScopeKind::Block("content".to_string()));
        scope.push(ScopeKind::For);
        scope.declare("item");

        assert_eq!(scope.resolve("item"), Resolution::Local { depth: 0 });
        assert_eq!(scope.resolve("title"), Resolution::Dynamic);
        assert_eq!(scope.current_block(), Some("content"));
    }

    #[test]
    fn kwargs_use_is_tracked_per_macro() {
        let mut scope = Scope::new();
        scope.push(ScopeKind::Macro);
        scope.declare("kwargs");
        scope.resolve("kwargs");
        let frame = scope.pop().unwrap();
        assert!(frame.kwargs_used);
        assert!(scope.is_top_level());
        assert!(scope.pop().is_none());
    }
}
