//! Precompiled template bundles.
//!
//! A bundle maps template names to compiled programs. It serializes to
//! JSON, and a [`PrecompiledLoader`](super::PrecompiledLoader) serves it
//! back without going through the compiler.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::Environment;
use crate::Error;
use crate::compiler::Program;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PrecompiledBundle {
    templates: IndexMap<String, Program>,
}

impl PrecompiledBundle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a program under its own name.
    pub fn insert(&mut self, program: Program) {
        self.templates.insert(program.name.clone(), program);
    }

    pub fn get(&self, name: &str) -> Option<&Program> {
        self.templates.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.templates.keys().map(String::as_str)
    }

    pub fn programs(&self) -> impl Iterator<Item = &Program> {
        self.templates.values()
    }

    pub fn into_programs(self) -> impl Iterator<Item = (String, Program)> {
        self.templates.into_iter()
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// Compile the named templates through `env`'s loaders into a bundle.
///
/// # Example
///
/// ```
/// use weft::Environment;
/// use weft::environment::{MemoryLoader, PrecompiledLoader, precompile};
///
/// let source = MemoryLoader::new();
/// source.insert("page.html", "<p>{{ text }}</p>");
/// let env = Environment::builder().build();
/// env.add_loader(source);
/// let bundle = precompile(&env, ["page.html"]).unwrap();
///
/// let runtime = Environment::builder().build();
/// runtime.add_loader(PrecompiledLoader::new(bundle));
/// let out = runtime.render("page.html", weft::data! { "text" => "hi" }).unwrap();
/// assert_eq!(out, "<p>hi</p>");
/// ```
pub fn precompile<I, S>(env: &Environment, names: I) -> Result<PrecompiledBundle, Error>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut bundle = PrecompiledBundle::new();
    for name in names {
        let template = env.get_template(name.as_ref())?;
        bundle.insert(template.program().as_ref().clone());
    }
    debug!(templates = bundle.len(), "Precompiled bundle");
    Ok(bundle)
}
