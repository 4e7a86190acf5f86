//! The environment: configuration, registries and the template cache.

mod extension;
mod filters;
mod loader;
mod precompile;
mod template;
mod view;

pub use extension::{Extension, ExtensionCall, ExtensionError};
pub use filters::{AsyncFilterFn, Filter, FilterError, FilterKind, FilterRegistry, SyncFilterFn};
pub use loader::{
    FileSystemLoader, Loader, LoaderError, MemoryLoader, PrecompiledLoader, Source, SourceContent,
    UpToDate,
};
pub use precompile::{PrecompiledBundle, precompile};
pub use template::Template;
pub use view::View;

use std::collections::HashMap;
use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::sync::Arc;

use bon::bon;
use const_fnv1a_hash::fnv1a_hash_str_64;
use futures::future::BoxFuture;
use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::Error;
use crate::compiler::{self, CompileOptions, Program};
use crate::lexer::{LexOptions, Syntax};
use crate::parser::parse_source;
use crate::types::{Map, Value};

/// Default bound on nested template, block and macro evaluation.
pub const DEFAULT_MAX_DEPTH: usize = 64;

/// Name given to templates compiled from strings.
const STRING_TEMPLATE_NAME: &str = "<string>";

/// Shared configuration, registries and compiled-template cache.
///
/// An environment is built once and shared by reference between renders.
/// Registries and the cache sit behind locks that are only held briefly;
/// cache entries are replaced whole, never modified in place.
///
/// # Example
///
/// ```
/// use weft::Environment;
///
/// let env = Environment::builder().build();
/// env.add_filter("shout", |value, _| Ok(value.to_string().to_uppercase().into()));
///
/// let out = env.render_str("{{ greeting | shout }}, {{ name }}!", weft::data! {
///     "greeting" => "hello",
///     "name" => "<Ada>",
/// });
/// assert_eq!(out.unwrap(), "HELLO, &lt;Ada&gt;!");
/// ```
pub struct Environment {
    autoescape: bool,
    throw_on_undefined: bool,
    lex_options: LexOptions,
    syntax: Syntax,
    max_depth: usize,
    loaders: RwLock<Vec<Arc<dyn Loader>>>,
    filters: RwLock<FilterRegistry>,
    extensions: RwLock<Vec<Arc<dyn Extension>>>,
    globals: RwLock<Arc<Map>>,
    cache: RwLock<HashMap<String, Arc<Template>>>,
}

#[bon]
impl Environment {
    #[builder]
    pub fn new(
        /// Escape output unless it is marked safe.
        #[builder(default = true)]
        autoescape: bool,
        /// Fail when an output expression is undefined or none.
        #[builder(default)]
        throw_on_undefined: bool,
        /// Drop the first newline after a block tag.
        #[builder(default)]
        trim_blocks: bool,
        /// Strip whitespace before a block tag at the start of a line.
        #[builder(default)]
        lstrip_blocks: bool,
        #[builder(default)] syntax: Syntax,
        #[builder(default = DEFAULT_MAX_DEPTH)] max_depth: usize,
        /// Consulted in order; the first loader that knows a name wins.
        #[builder(default)]
        loaders: Vec<Arc<dyn Loader>>,
    ) -> Self {
        Self {
            autoescape,
            throw_on_undefined,
            lex_options: LexOptions {
                trim_blocks,
                lstrip_blocks,
            },
            syntax,
            max_depth,
            loaders: RwLock::new(loaders),
            filters: RwLock::new(FilterRegistry::new()),
            extensions: RwLock::new(Vec::new()),
            globals: RwLock::new(Arc::new(Map::new())),
            cache: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for Environment {
    fn default() -> Self {
        Environment::builder().build()
    }
}

impl Environment {
    // =========================================================================
    // Configuration
    // =========================================================================

    pub fn autoescape(&self) -> bool {
        self.autoescape
    }

    pub fn throw_on_undefined(&self) -> bool {
        self.throw_on_undefined
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    pub fn syntax(&self) -> &Syntax {
        &self.syntax
    }

    pub fn lex_options(&self) -> LexOptions {
        self.lex_options
    }

    // =========================================================================
    // Registration
    // =========================================================================

    /// Append a loader after the existing ones.
    pub fn add_loader(&self, loader: impl Loader + 'static) {
        self.loaders.write().push(Arc::new(loader));
    }

    /// Register a synchronous filter.
    pub fn add_filter<F>(&self, name: &str, filter: F)
    where
        F: Fn(&Value, &[Value]) -> Result<Value, FilterError> + Send + Sync + 'static,
    {
        self.register_filter(name, Filter::sync(filter));
    }

    /// Register an asynchronous filter. Templates using it must be rendered
    /// with `render_async`.
    pub fn add_async_filter<F>(&self, name: &str, filter: F)
    where
        F: Fn(Value, Vec<Value>) -> BoxFuture<'static, Result<Value, FilterError>>
            + Send
            + Sync
            + 'static,
    {
        self.register_filter(name, Filter::from_async(filter));
    }

    /// Register a filter, replacing any filter of the same name.
    pub fn register_filter(&self, name: &str, filter: Filter) {
        let is_async = filter.is_async();
        let was_async = {
            let mut filters = self.filters.write();
            let was_async = filters.get(name).is_some_and(Filter::is_async);
            filters.insert(name, filter);
            was_async
        };
        // Compiled programs record which filters are async.
        if is_async != was_async {
            self.clear_cache();
        }
    }

    /// Register a custom tag. Cached templates are dropped since they were
    /// parsed without it.
    pub fn add_extension(&self, extension: impl Extension + 'static) {
        debug!(extension = extension.name(), "Adding extension");
        self.extensions.write().push(Arc::new(extension));
        self.clear_cache();
    }

    /// Make `name` visible to every template, behind caller data.
    pub fn add_global(&self, name: &str, value: impl Into<Value>) {
        let mut globals = self.globals.write();
        let mut next = Map::clone(&globals);
        next.insert(name.to_string(), value.into());
        *globals = Arc::new(next);
    }

    pub fn globals(&self) -> Arc<Map> {
        Arc::clone(&self.globals.read())
    }

    pub fn filter(&self, name: &str) -> Option<Filter> {
        self.filters.read().get(name).cloned()
    }

    pub fn filter_names(&self) -> Vec<String> {
        self.filters.read().names()
    }

    /// The extension whose compiled call sites are named `name`.
    pub fn extension(&self, name: &str) -> Option<Arc<dyn Extension>> {
        self.extensions
            .read()
            .iter()
            .find(|ext| ext.name() == name)
            .cloned()
    }

    /// What the compiler needs to know about the registries.
    pub fn compile_options(&self) -> CompileOptions {
        CompileOptions {
            async_filters: self
                .filters
                .read()
                .async_names()
                .map(ToString::to_string)
                .collect(),
            async_extensions: self
                .extensions
                .read()
                .iter()
                .filter(|ext| ext.is_async())
                .map(|ext| ext.name().to_string())
                .collect(),
        }
    }

    // =========================================================================
    // Compilation and the cache
    // =========================================================================

    /// Lex, parse and compile `source` as the template `name`.
    pub fn compile(&self, source: &str, name: &str) -> Result<Program, Error> {
        let extensions = self.extensions.read().clone();
        let ast = parse_source(source, &self.syntax, self.lex_options, &extensions).map_err(
            |source| Error::Parse {
                name: name.to_string(),
                source,
            },
        )?;
        let mut program =
            compiler::compile(name, &ast, &self.compile_options()).map_err(|source| {
                Error::Compile {
                    name: name.to_string(),
                    source,
                }
            })?;
        program.source_hash = fnv1a_hash_str_64(source);
        Ok(program)
    }

    /// Compile a template from a string without caching it.
    pub fn from_string(&self, source: &str, name: Option<&str>) -> Result<Template, Error> {
        let name = name.unwrap_or(STRING_TEMPLATE_NAME);
        let program = self.compile(source, name)?;
        Ok(Template::new(name, None, Arc::new(program), Arc::new(|| true)))
    }

    /// Get a compiled template, loading and compiling it on first use and
    /// again whenever its source has gone stale.
    pub fn get_template(&self, name: &str) -> Result<Arc<Template>, Error> {
        let cached = self.cache.read().get(name).cloned();
        match cached {
            Some(template) if template.is_up_to_date() => {
                debug!(template = name, "Template cache hit");
                return Ok(template);
            }
            Some(_) => debug!(template = name, "Template stale, recompiling"),
            None => debug!(template = name, "Template cache miss"),
        }

        match self.load(name) {
            Ok(template) => {
                let template = Arc::new(template);
                self.cache
                    .write()
                    .insert(name.to_string(), Arc::clone(&template));
                Ok(template)
            }
            Err(err) => {
                // Never keep a stale entry for a template that no longer
                // compiles.
                self.cache.write().remove(name);
                Err(err)
            }
        }
    }

    fn load(&self, name: &str) -> Result<Template, Error> {
        let loaders = self.loaders.read().clone();
        let mut failure = None;
        for loader in &loaders {
            match loader.get_source(name) {
                Ok(Some(source)) => return self.build_template(name, source),
                Ok(None) => {}
                Err(err) => {
                    warn!(template = name, error = %err, "Loader failed, trying next loader");
                    failure = Some(err);
                }
            }
        }
        Err(match failure {
            Some(source) => Error::Loader {
                name: name.to_string(),
                source,
            },
            None => Error::TemplateNotFound {
                name: name.to_string(),
            },
        })
    }

    fn build_template(&self, name: &str, source: Source) -> Result<Template, Error> {
        let program = match source.content {
            SourceContent::Text(text) => Arc::new(self.compile(&text, name)?),
            SourceContent::Precompiled(program) => {
                debug!(template = name, "Using precompiled program");
                program
            }
        };
        Ok(Template::new(name, source.path, program, source.up_to_date))
    }

    /// Drop every cached template.
    pub fn clear_cache(&self) {
        self.cache.write().clear();
    }

    /// Names currently in the cache, sorted.
    pub fn cached_templates(&self) -> Vec<String> {
        let mut names: Vec<String> = self.cache.read().keys().cloned().collect();
        names.sort();
        names
    }

    // =========================================================================
    // Rendering
    // =========================================================================

    /// Render the template `name` synchronously.
    pub fn render(&self, name: &str, data: impl Into<Value>) -> Result<String, Error> {
        self.get_template(name)?.render(self, data)
    }

    /// Render the template `name`, awaiting async filters and extensions.
    pub async fn render_async(&self, name: &str, data: impl Into<Value>) -> Result<String, Error> {
        let data = data.into();
        let template = self.get_template(name)?;
        template.render_async(self, data).await
    }

    /// Compile and render a template source string.
    pub fn render_str(&self, source: &str, data: impl Into<Value>) -> Result<String, Error> {
        self.from_string(source, None)?.render(self, data)
    }

    pub async fn render_str_async(
        &self,
        source: &str,
        data: impl Into<Value>,
    ) -> Result<String, Error> {
        let data = data.into();
        let template = self.from_string(source, None)?;
        template.render_async(self, data).await
    }
}

impl Debug for Environment {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("Environment")
            .field("autoescape", &self.autoescape)
            .field("throw_on_undefined", &self.throw_on_undefined)
            .field("lex_options", &self.lex_options)
            .field("syntax", &self.syntax)
            .field("max_depth", &self.max_depth)
            .field("loaders", &self.loaders.read().len())
            .field("filters", &self.filter_names())
            .field("cached", &self.cached_templates())
            .finish()
    }
}
