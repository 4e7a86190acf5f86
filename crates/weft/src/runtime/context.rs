//! Per-render state: caller data, block registry and exports.

use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::Mutex;
use tracing::trace;

use super::RenderError;
use super::frame::Frame;
use crate::compiler::Program;
use crate::types::{Map, Value};

/// One implementation of a block: the program that defines it.
#[derive(Debug, Clone)]
pub struct BlockRef {
    pub program: Arc<Program>,
    pub name: String,
}

impl BlockRef {
    fn is(&self, program: &Arc<Program>) -> bool {
        Arc::ptr_eq(&self.program, program)
    }
}

/// State shared by every routine of one render call.
///
/// The caller's data is never written to. `set` writes into frames, and
/// names published for `import` go into the export set.
#[derive(Debug)]
pub struct Context {
    data: Arc<Map>,
    globals: Arc<Map>,
    /// Block name to implementations, most-derived first.
    blocks: Mutex<IndexMap<String, Vec<BlockRef>>>,
    exports: Mutex<Map>,
    /// Template names along the `extends` chain rendered so far.
    inheritance: Mutex<Vec<String>>,
    /// Imported module state kept alive for the macros it exported.
    modules: Mutex<Vec<(Arc<Context>, Arc<Frame>)>>,
}

impl Context {
    pub fn new(data: Arc<Map>, globals: Arc<Map>) -> Arc<Context> {
        Arc::new(Context {
            data,
            globals,
            blocks: Mutex::new(IndexMap::new()),
            exports: Mutex::new(Map::new()),
            inheritance: Mutex::new(Vec::new()),
            modules: Mutex::new(Vec::new()),
        })
    }

    pub fn data(&self) -> &Arc<Map> {
        &self.data
    }

    pub fn globals(&self) -> &Arc<Map> {
        &self.globals
    }

    /// Resolve a name that no frame binds: caller data, then globals.
    pub fn lookup(&self, name: &str) -> Option<Value> {
        self.data
            .get(name)
            .or_else(|| self.globals.get(name))
            .cloned()
    }

    /// Append `program`'s implementation of `name` to the registry.
    ///
    /// Templates register in inheritance order, child before parent, so the
    /// registry stays most-derived first.
    pub fn add_block(&self, name: &str, program: &Arc<Program>) {
        self.blocks
            .lock()
            .entry(name.to_string())
            .or_default()
            .push(BlockRef {
                program: Arc::clone(program),
                name: name.to_string(),
            });
    }

    /// The most-derived implementation of `name`.
    pub fn get_block(&self, name: &str) -> Option<BlockRef> {
        self.blocks
            .lock()
            .get(name)
            .and_then(|impls| impls.first())
            .cloned()
    }

    /// The implementation after `current` in the registry for `name`.
    pub fn get_super(&self, name: &str, current: &Arc<Program>) -> Result<BlockRef, RenderError> {
        let blocks = self.blocks.lock();
        let next = blocks.get(name).and_then(|impls| {
            let index = impls.iter().position(|b| b.is(current))?;
            impls.get(index + 1)
        });
        match next {
            Some(block) => {
                trace!(block = name, template = %block.program.name, "Resolved super block");
                Ok(block.clone())
            }
            None => Err(RenderError::NoSuperBlock {
                block: name.to_string(),
            }),
        }
    }

    pub fn add_export(&self, name: &str, value: Value) {
        self.exports.lock().insert(name.to_string(), value);
    }

    /// Snapshot of the exported names.
    pub fn exports(&self) -> Map {
        self.exports.lock().clone()
    }

    /// Record that the template `name` is being rendered in this context's
    /// inheritance chain, failing if it already is.
    pub(crate) fn enter_template(&self, name: &str) -> Result<(), RenderError> {
        let mut chain = self.inheritance.lock();
        if chain.iter().any(|n| n == name) {
            let mut chain = chain.clone();
            chain.push(name.to_string());
            return Err(RenderError::CyclicInheritance { chain });
        }
        chain.push(name.to_string());
        Ok(())
    }

    pub(crate) fn retain_module(&self, context: Arc<Context>, frame: Arc<Frame>) {
        self.modules.lock().push((context, frame));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::Routine;

    fn program(name: &str) -> Arc<Program> {
        Arc::new(Program {
            name: name.to_string(),
            source_hash: 0,
            root: Routine {
                name: "root".to_string(),
                body: Vec::new(),
                is_async: false,
            },
            blocks: IndexMap::new(),
            macros: Vec::new(),
            parent: None,
            is_async: false,
        })
    }

    fn context() -> Arc<Context> {
        let mut data = Map::new();
        data.insert("user".to_string(), "ada".into());
        let mut globals = Map::new();
        globals.insert("site".to_string(), "weft".into());
        globals.insert("user".to_string(), "shadowed".into());
        Context::new(Arc::new(data), Arc::new(globals))
    }

    #[test]
    fn lookup_prefers_data_over_globals() {
        let ctx = context();
        assert_eq!(ctx.lookup("user"), Some(Value::from("ada")));
        assert_eq!(ctx.lookup("site"), Some(Value::from("weft")));
        assert_eq!(ctx.lookup("missing"), None);
    }

    #[test]
    fn blocks_resolve_most_derived_first() {
        let ctx = context();
        let child = program("child.html");
        let parent = program("parent.html");
        ctx.add_block("footer", &child);
        ctx.add_block("footer", &parent);

        let block = ctx.get_block("footer").unwrap();
        assert!(Arc::ptr_eq(&block.program, &child));

        let next = ctx.get_super("footer", &child).unwrap();
        assert!(Arc::ptr_eq(&next.program, &parent));
    }

    #[test]
    fn super_fails_past_the_base() {
        let ctx = context();
        let base = program("base.html");
        ctx.add_block("footer", &base);

        let err = ctx.get_super("footer", &base).unwrap_err();
        assert!(matches!(err, RenderError::NoSuperBlock { block } if block == "footer"));

        let other = program("other.html");
        assert!(ctx.get_super("footer", &other).is_err());
        assert!(ctx.get_block("header").is_none());
    }

    #[test]
    fn inheritance_cycle_is_detected() {
        let ctx = context();
        ctx.enter_template("a.html").unwrap();
        ctx.enter_template("b.html").unwrap();
        let err = ctx.enter_template("a.html").unwrap_err();
        assert_eq!(
            err.to_string(),
            "cyclic template inheritance: a.html -> b.html -> a.html"
        );
    }
}
