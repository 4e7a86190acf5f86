//! Runtime lexical scopes.

use std::sync::{Arc, Weak};

use indexmap::IndexMap;
use parking_lot::Mutex;

use crate::types::Value;

/// A scope holding the locals introduced by a loop iteration, macro call or
/// block.
///
/// Frames are always handled through `Arc`. The parent link is weak: the
/// render call stack owns frames, and the link is only used for lookup.
#[derive(Debug, Default)]
pub struct Frame {
    parent: Option<Weak<Frame>>,
    vars: Mutex<IndexMap<String, Value>>,
}

impl Frame {
    /// A frame with no parent.
    pub fn root() -> Arc<Frame> {
        Arc::new(Frame::default())
    }

    /// Open a child scope. The caller keeps `self` alive for as long as the
    /// child is in use.
    pub fn push(self: &Arc<Self>) -> Arc<Frame> {
        Arc::new(Frame {
            parent: Some(Arc::downgrade(self)),
            vars: Mutex::new(IndexMap::new()),
        })
    }

    /// The enclosing scope, if it is still alive.
    pub fn pop(&self) -> Option<Arc<Frame>> {
        self.parent.as_ref().and_then(Weak::upgrade)
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    /// Bind `name` in this frame.
    pub fn set(&self, name: &str, value: Value) {
        self.vars.lock().insert(name.to_string(), value);
    }

    /// Look up `name` in this frame only.
    pub fn get(&self, name: &str) -> Option<Value> {
        self.vars.lock().get(name).cloned()
    }

    /// Look up `name` in this frame, then each enclosing frame.
    pub fn lookup(&self, name: &str) -> Option<Value> {
        if let Some(value) = self.get(name) {
            return Some(value);
        }
        let mut current = self.pop();
        while let Some(frame) = current {
            if let Some(value) = frame.get(name) {
                return Some(value);
            }
            current = frame.pop();
        }
        None
    }

    /// Look up a name the compiler resolved to the frame `depth` levels up.
    ///
    /// Falls back to a full chain walk when the binding is not there, which
    /// happens when the declaring statement was skipped at runtime.
    pub fn lookup_from(self: &Arc<Self>, name: &str, depth: usize) -> Option<Value> {
        self.ancestor(depth)
            .and_then(|frame| frame.get(name))
            .or_else(|| self.lookup(name))
    }

    fn ancestor(self: &Arc<Self>, depth: usize) -> Option<Arc<Frame>> {
        let mut frame = Arc::clone(self);
        for _ in 0..depth {
            frame = frame.pop()?;
        }
        Some(frame)
    }

    /// Snapshot of the bindings in this frame, in insertion order.
    pub fn vars(&self) -> IndexMap<String, Value> {
        self.vars.lock().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_walks_parent_chain() {
        let root = Frame::root();
        root.set("site", "weft".into());
        let child = root.push();
        child.set("item", 1.into());

        assert_eq!(child.lookup("item"), Some(Value::from(1)));
        assert_eq!(child.lookup("site"), Some(Value::from("weft")));
        assert_eq!(root.lookup("item"), None);
    }

    #[test]
    fn inner_binding_shadows_outer() {
        let root = Frame::root();
        root.set("x", 1.into());
        let child = root.push();
        child.set("x", 2.into());

        assert_eq!(child.lookup("x"), Some(Value::from(2)));
        assert_eq!(child.pop().and_then(|f| f.lookup("x")), Some(Value::from(1)));
    }

    #[test]
    fn lookup_from_falls_back_to_chain() {
        let root = Frame::root();
        root.set("title", "Home".into());
        let child = root.push();
        let grandchild = child.push();

        assert_eq!(grandchild.lookup_from("title", 2), Some(Value::from("Home")));
        // Declared one level up but never bound there.
        assert_eq!(grandchild.lookup_from("title", 1), Some(Value::from("Home")));
        assert_eq!(grandchild.lookup_from("title", 7), Some(Value::from("Home")));
    }

    #[test]
    fn dropped_parent_ends_chain() {
        let child = {
            let root = Frame::root();
            root.set("x", 1.into());
            root.push()
        };
        assert!(!child.is_root());
        assert!(child.pop().is_none());
        assert_eq!(child.lookup("x"), None);
    }
}
