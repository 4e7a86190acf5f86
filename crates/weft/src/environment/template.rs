use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::executor::block_on;
use tracing::debug;

use super::Environment;
use super::loader::UpToDate;
use crate::Error;
use crate::compiler::Program;
use crate::runtime::{RenderError, RenderMode, render_root};
use crate::types::{Map, Value};

/// A compiled template.
///
/// Immutable once built. When its source goes stale the environment
/// compiles a new `Template` and swaps it into the cache; renders already
/// holding this one are unaffected.
pub struct Template {
    name: String,
    path: Option<PathBuf>,
    program: Arc<Program>,
    up_to_date: UpToDate,
}

impl Template {
    pub(crate) fn new(
        name: &str,
        path: Option<PathBuf>,
        program: Arc<Program>,
        up_to_date: UpToDate,
    ) -> Self {
        Self {
            name: name.to_string(),
            path,
            program,
            up_to_date,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// File the template was loaded from, if any.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn program(&self) -> &Arc<Program> {
        &self.program
    }

    /// Whether the source this template was compiled from is unchanged.
    pub fn is_up_to_date(&self) -> bool {
        (self.up_to_date)()
    }

    /// Whether rendering needs [`render_async`](Template::render_async).
    pub fn is_async(&self) -> bool {
        self.program.is_async
    }

    /// Render synchronously.
    ///
    /// `data` must convert to a map, or be undefined or none for no data.
    /// Fails with [`RenderError::AsyncInSyncRender`] if the template reaches
    /// an async filter, extension or macro.
    pub fn render(&self, env: &Environment, data: impl Into<Value>) -> Result<String, Error> {
        let data = render_data(data.into())?;
        debug!(template = %self.name, "Rendering template");
        let out = block_on(render_root(
            env,
            Arc::clone(&self.program),
            data,
            RenderMode::Sync,
        ))?;
        Ok(out)
    }

    /// Render, awaiting async filters and extensions.
    pub async fn render_async(&self, env: &Environment, data: Value) -> Result<String, Error> {
        let data = render_data(data)?;
        debug!(template = %self.name, "Rendering template asynchronously");
        let out = render_root(env, Arc::clone(&self.program), data, RenderMode::Async).await?;
        Ok(out)
    }
}

impl Debug for Template {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("Template")
            .field("name", &self.name)
            .field("path", &self.path)
            .field("is_async", &self.program.is_async)
            .finish()
    }
}

fn render_data(data: Value) -> Result<Arc<Map>, RenderError> {
    match data {
        Value::Map(map) => Ok(map),
        Value::Undefined | Value::None => Ok(Arc::new(Map::new())),
        other => Err(RenderError::type_error(format!(
            "render data must be a map, not '{}'",
            other.kind()
        ))),
    }
}
