//! Crate-level error type and typo suggestions.

use strsim::levenshtein;
use thiserror::Error;

use crate::compiler::CompileError;
use crate::environment::LoaderError;
use crate::lexer::Pos;
use crate::parser::ParseError;
use crate::runtime::RenderError;

/// Any error produced while loading, compiling or rendering a template.
#[derive(Debug, Error)]
pub enum Error {
    #[error("{name}: {source}")]
    Parse {
        name: String,
        #[source]
        source: ParseError,
    },

    #[error("{name}: {source}")]
    Compile {
        name: String,
        #[source]
        source: CompileError,
    },

    /// A loader failed and no later loader resolved the name.
    #[error("{name}: {source}")]
    Loader {
        name: String,
        #[source]
        source: LoaderError,
    },

    #[error("template not found: '{name}'")]
    TemplateNotFound { name: String },

    #[error(transparent)]
    Render(#[from] RenderError),
}

impl Error {
    /// Name of the template the error belongs to, when known.
    pub fn template_name(&self) -> Option<&str> {
        match self {
            Error::Parse { name, .. }
            | Error::Compile { name, .. }
            | Error::Loader { name, .. }
            | Error::TemplateNotFound { name } => Some(name),
            Error::Render(err) => err.template_name(),
        }
    }

    /// Source position of the error, when known.
    pub fn pos(&self) -> Option<Pos> {
        match self {
            Error::Parse { source, .. } => Some(source.pos()),
            Error::Compile { source, .. } => Some(source.pos()),
            Error::Loader { .. } | Error::TemplateNotFound { .. } => None,
            Error::Render(err) => err.pos(),
        }
    }
}

/// Compute typo suggestions for an unknown name.
///
/// Returns up to three candidates within a Levenshtein distance of 1 (for
/// names of three characters or fewer) or 2, closest first.
///
/// # Example
///
/// ```
/// use weft::compute_suggestions;
///
/// let filters = ["upper", "lower", "title"];
/// assert_eq!(compute_suggestions("uper", &filters), vec!["upper"]);
/// ```
pub fn compute_suggestions<I, S>(name: &str, available: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let max_distance = if name.len() <= 3 { 1 } else { 2 };
    let mut suggestions: Vec<(usize, String)> = available
        .into_iter()
        .filter_map(|candidate| {
            let candidate = candidate.as_ref();
            let dist = levenshtein(name, candidate);
            if dist <= max_distance && dist > 0 {
                Some((dist, candidate.to_string()))
            } else {
                None
            }
        })
        .collect();

    suggestions.sort_by_key(|(dist, _)| *dist);
    suggestions.into_iter().take(3).map(|(_, s)| s).collect()
}
