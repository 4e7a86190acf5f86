//! Template source loaders.

use std::collections::HashMap;
use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use const_fnv1a_hash::fnv1a_hash_str_64;
use parking_lot::RwLock;
use thiserror::Error;
use tracing::debug;

use super::precompile::PrecompiledBundle;
use crate::compiler::Program;

/// Errors raised by a loader. The environment logs them and tries the next
/// loader.
#[derive(Debug, Error)]
pub enum LoaderError {
    #[error("failed to read '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to load precompiled bundle '{path}': {message}")]
    Deserialize { path: PathBuf, message: String },

    /// Absolute names and names escaping the search path.
    #[error("invalid template name '{name}'")]
    InvalidName { name: String },
}

/// Staleness check attached to a loaded source.
pub type UpToDate = Arc<dyn Fn() -> bool + Send + Sync>;

pub enum SourceContent {
    Text(String),
    Precompiled(Arc<Program>),
}

/// A template resolved by a loader.
pub struct Source {
    pub content: SourceContent,
    pub path: Option<PathBuf>,
    /// Returns false once the template should be reloaded.
    pub up_to_date: UpToDate,
}

impl Source {
    /// Template text that never goes stale.
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: SourceContent::Text(content.into()),
            path: None,
            up_to_date: Arc::new(|| true),
        }
    }
}

impl Debug for Source {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        let content = match &self.content {
            SourceContent::Text(_) => "text",
            SourceContent::Precompiled(_) => "precompiled",
        };
        f.debug_struct("Source")
            .field("content", &content)
            .field("path", &self.path)
            .finish()
    }
}

/// A source of templates.
///
/// `Ok(None)` means the loader does not know `name`, and the next loader
/// is consulted.
pub trait Loader: Send + Sync {
    fn get_source(&self, name: &str) -> Result<Option<Source>, LoaderError>;
}

/// Loads templates from files under one or more search directories.
///
/// A loaded template is stale once its file's modification time changes.
#[derive(Debug, Clone)]
pub struct FileSystemLoader {
    search_paths: Vec<PathBuf>,
}

impl FileSystemLoader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            search_paths: vec![path.into()],
        }
    }

    pub fn with_paths<I, P>(paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self {
            search_paths: paths.into_iter().map(Into::into).collect(),
        }
    }

    pub fn search_paths(&self) -> &[PathBuf] {
        &self.search_paths
    }
}

impl Loader for FileSystemLoader {
    fn get_source(&self, name: &str) -> Result<Option<Source>, LoaderError> {
        let relative = Path::new(name);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if escapes {
            return Err(LoaderError::InvalidName {
                name: name.to_string(),
            });
        }

        for root in &self.search_paths {
            let path = root.join(relative);
            if !path.is_file() {
                continue;
            }
            let content = fs::read_to_string(&path).map_err(|e| LoaderError::Io {
                path: path.clone(),
                source: e,
            })?;
            let loaded_at = modified(&path);
            let watched = path.clone();
            debug!(template = name, path = %path.display(), "Loaded template from file");
            return Ok(Some(Source {
                content: SourceContent::Text(content),
                path: Some(path),
                up_to_date: Arc::new(move || modified(&watched) == loaded_at),
            }));
        }
        Ok(None)
    }
}

fn modified(path: &Path) -> Option<SystemTime> {
    fs::metadata(path).and_then(|m| m.modified()).ok()
}

/// Templates held in memory.
///
/// Clones share the same map, so a handle kept by the caller can update
/// templates after the loader is given to an environment. A loaded template
/// is stale once its text changes.
///
/// # Example
///
/// ```
/// use weft::Environment;
/// use weft::environment::MemoryLoader;
///
/// let loader = MemoryLoader::new();
/// loader.insert("hello.html", "Hello {{ name }}!");
///
/// let env = Environment::builder().build();
/// env.add_loader(loader.clone());
/// assert_eq!(env.render("hello.html", weft::data! { "name" => "Ada" }).unwrap(), "Hello Ada!");
///
/// loader.insert("hello.html", "Bye {{ name }}!");
/// assert_eq!(env.render("hello.html", weft::data! { "name" => "Ada" }).unwrap(), "Bye Ada!");
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryLoader {
    templates: Arc<RwLock<HashMap<String, String>>>,
}

impl MemoryLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a template.
    pub fn insert(&self, name: impl Into<String>, source: impl Into<String>) {
        self.templates.write().insert(name.into(), source.into());
    }

    pub fn remove(&self, name: &str) -> Option<String> {
        self.templates.write().remove(name)
    }
}

impl<K, V> FromIterator<(K, V)> for MemoryLoader
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let templates = iter
            .into_iter()
            .map(|(name, source)| (name.into(), source.into()))
            .collect();
        Self {
            templates: Arc::new(RwLock::new(templates)),
        }
    }
}

impl Loader for MemoryLoader {
    fn get_source(&self, name: &str) -> Result<Option<Source>, LoaderError> {
        let Some(content) = self.templates.read().get(name).cloned() else {
            return Ok(None);
        };
        let hash = fnv1a_hash_str_64(&content);
        let templates = Arc::clone(&self.templates);
        let name = name.to_string();
        Ok(Some(Source {
            content: SourceContent::Text(content),
            path: None,
            up_to_date: Arc::new(move || {
                templates
                    .read()
                    .get(&name)
                    .is_some_and(|current| fnv1a_hash_str_64(current) == hash)
            }),
        }))
    }
}

/// Serves compiled programs from a [`PrecompiledBundle`] without lexing,
/// parsing or compiling. Its templates never go stale.
#[derive(Debug, Clone, Default)]
pub struct PrecompiledLoader {
    programs: HashMap<String, Arc<Program>>,
}

impl PrecompiledLoader {
    pub fn new(bundle: PrecompiledBundle) -> Self {
        Self {
            programs: bundle
                .into_programs()
                .map(|(name, program)| (name, Arc::new(program)))
                .collect(),
        }
    }

    /// Read a bundle written by [`PrecompiledBundle::to_json`].
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, LoaderError> {
        let path = path.as_ref();
        let json = fs::read_to_string(path).map_err(|e| LoaderError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        let bundle = PrecompiledBundle::from_json(&json).map_err(|e| LoaderError::Deserialize {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        Ok(Self::new(bundle))
    }

    pub fn len(&self) -> usize {
        self.programs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.programs.is_empty()
    }
}

impl Loader for PrecompiledLoader {
    fn get_source(&self, name: &str) -> Result<Option<Source>, LoaderError> {
        Ok(self.programs.get(name).map(|program| Source {
            content: SourceContent::Precompiled(Arc::clone(program)),
            path: None,
            up_to_date: Arc::new(|| true),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_loader_detects_changes() {
        let loader: MemoryLoader = [("a.html", "one")].into_iter().collect();
        let source = loader.get_source("a.html").unwrap().unwrap();
        assert!((source.up_to_date)());

        loader.insert("a.html", "one");
        assert!((source.up_to_date)());

        loader.insert("a.html", "two");
        assert!(!(source.up_to_date)());

        loader.remove("a.html");
        assert!(!(source.up_to_date)());
        assert!(loader.get_source("a.html").unwrap().is_none());
    }

    #[test]
    fn filesystem_loader_rejects_traversal() {
        let loader = FileSystemLoader::new("templates");
        for name in ["../secret.html", "/etc/passwd", "a/../../b.html"] {
            let err = loader.get_source(name).unwrap_err();
            assert!(matches!(err, LoaderError::InvalidName { .. }), "{name}");
        }
    }

    #[test]
    fn filesystem_loader_misses_unknown_files() {
        let dir = tempfile::tempdir().unwrap();
        let loader = FileSystemLoader::new(dir.path());
        assert!(loader.get_source("missing.html").unwrap().is_none());
    }
}
