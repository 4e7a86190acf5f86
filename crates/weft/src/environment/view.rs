//! Adapter for web frameworks that render views by name.

use std::path::Path;
use std::sync::Arc;

use super::Environment;
use crate::Error;
use crate::types::Value;

/// Renders views through an environment, appending a default file
/// extension to names that have none.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
///
/// use weft::Environment;
/// use weft::environment::{MemoryLoader, View};
///
/// let loader = MemoryLoader::new();
/// loader.insert("index.html", "Welcome, {{ user }}");
/// let env = Environment::builder().build();
/// env.add_loader(loader);
///
/// let view = View::new(Arc::new(env), "html");
/// view.render("index", weft::data! { "user" => "kim" }, |result| {
///     assert_eq!(result.unwrap(), "Welcome, kim");
/// });
/// ```
#[derive(Debug, Clone)]
pub struct View {
    env: Arc<Environment>,
    default_extension: String,
}

impl View {
    pub fn new(env: Arc<Environment>, default_extension: &str) -> Self {
        Self {
            env,
            default_extension: default_extension.trim_start_matches('.').to_string(),
        }
    }

    pub fn environment(&self) -> &Arc<Environment> {
        &self.env
    }

    pub fn resolve_name(&self, name: &str) -> String {
        if self.default_extension.is_empty() || Path::new(name).extension().is_some() {
            name.to_string()
        } else {
            format!("{name}.{}", self.default_extension)
        }
    }

    /// Render `name` and hand the result to `callback`.
    pub fn render<F>(&self, name: &str, data: impl Into<Value>, callback: F)
    where
        F: FnOnce(Result<String, Error>),
    {
        callback(self.env.render(&self.resolve_name(name), data));
    }

    pub async fn render_async(&self, name: &str, data: impl Into<Value>) -> Result<String, Error> {
        self.env.render_async(&self.resolve_name(name), data).await
    }
}
