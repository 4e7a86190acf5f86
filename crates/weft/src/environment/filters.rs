//! Filter registry.
//!
//! Filters are functions applied with `value | name(args)` or with a
//! `{% filter %}` block. Keyword arguments reach a filter as one trailing
//! map argument.

use std::collections::HashMap;
use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::sync::Arc;

use futures::future::BoxFuture;
use thiserror::Error;

use crate::runtime::escape_html;
use crate::types::Value;

/// Error returned by a filter implementation.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{message}")]
pub struct FilterError {
    pub message: String,
}

impl FilterError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Synchronous filter signature: `(value, args) -> value`.
pub type SyncFilterFn = Arc<dyn Fn(&Value, &[Value]) -> Result<Value, FilterError> + Send + Sync>;

/// Asynchronous filter signature. The returned future owns its inputs.
pub type AsyncFilterFn =
    Arc<dyn Fn(Value, Vec<Value>) -> BoxFuture<'static, Result<Value, FilterError>> + Send + Sync>;

#[derive(Clone)]
pub enum FilterKind {
    Sync(SyncFilterFn),
    Async(AsyncFilterFn),
}

/// A registered filter.
#[derive(Clone)]
pub struct Filter {
    kind: FilterKind,
    returns_safe: bool,
}

impl Filter {
    pub fn sync<F>(f: F) -> Self
    where
        F: Fn(&Value, &[Value]) -> Result<Value, FilterError> + Send + Sync + 'static,
    {
        Self {
            kind: FilterKind::Sync(Arc::new(f)),
            returns_safe: false,
        }
    }

    pub fn from_async<F>(f: F) -> Self
    where
        F: Fn(Value, Vec<Value>) -> BoxFuture<'static, Result<Value, FilterError>>
            + Send
            + Sync
            + 'static,
    {
        Self {
            kind: FilterKind::Async(Arc::new(f)),
            returns_safe: false,
        }
    }

    /// Mark the filter's output as safe content, exempt from autoescaping.
    pub fn safe(mut self) -> Self {
        self.returns_safe = true;
        self
    }

    pub fn kind(&self) -> &FilterKind {
        &self.kind
    }

    pub fn is_async(&self) -> bool {
        matches!(self.kind, FilterKind::Async(_))
    }

    pub fn returns_safe(&self) -> bool {
        self.returns_safe
    }
}

impl Debug for Filter {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("Filter")
            .field("async", &self.is_async())
            .field("returns_safe", &self.returns_safe)
            .finish()
    }
}

/// Registry of filters by name.
///
/// A new registry holds the core filters autoescaping depends on: `safe`,
/// `escape` and its alias `e`.
#[derive(Debug, Clone)]
pub struct FilterRegistry {
    filters: HashMap<String, Filter>,
}

impl FilterRegistry {
    pub fn new() -> Self {
        let mut registry = Self {
            filters: HashMap::new(),
        };
        registry.insert("safe", Filter::sync(|value, _| Ok(value.clone())).safe());
        registry.insert("escape", Filter::sync(escape));
        registry.insert("e", Filter::sync(escape));
        registry
    }

    /// Register `filter`, replacing any filter of the same name.
    pub fn insert(&mut self, name: impl Into<String>, filter: Filter) {
        self.filters.insert(name.into(), filter);
    }

    pub fn get(&self, name: &str) -> Option<&Filter> {
        self.filters.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.filters.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.filters.keys().cloned().collect();
        names.sort();
        names
    }

    /// Names of the async filters, for compile-time async analysis.
    pub fn async_names(&self) -> impl Iterator<Item = &str> {
        self.filters
            .iter()
            .filter(|(_, filter)| filter.is_async())
            .map(|(name, _)| name.as_str())
    }
}

impl Default for FilterRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Escape a value now, leaving safe content alone.
fn escape(value: &Value, _args: &[Value]) -> Result<Value, FilterError> {
    Ok(match value {
        Value::Safe(_) => value.clone(),
        other => Value::safe(escape_html(&other.to_string())),
    })
}

#[cfg(test)]
mod tests {
    use futures::FutureExt;

    use super::*;

    #[test]
    fn core_filters_are_registered() {
        let registry = FilterRegistry::new();
        assert_eq!(registry.names(), vec!["e", "escape", "safe"]);
        assert!(registry.get("safe").is_some_and(Filter::returns_safe));
    }

    #[test]
    fn escape_does_not_double_escape() {
        let escaped = escape(&Value::from("<b>"), &[]).unwrap();
        assert_eq!(escaped, Value::safe("&lt;b&gt;"));
        assert_eq!(escape(&escaped, &[]).unwrap(), escaped);
    }

    #[test]
    fn async_names_lists_only_async_filters() {
        let mut registry = FilterRegistry::new();
        registry.insert(
            "fetch",
            Filter::from_async(|value, _| async move { Ok(value) }.boxed()),
        );
        assert_eq!(registry.async_names().collect::<Vec<_>>(), vec!["fetch"]);
    }
}
