//! Miette diagnostic wrapper for weft errors.
//!
//! Note: This module has an exception for `unused_assignments` because miette
//! derive macros read struct fields in generated code that rustc cannot track.
#![expect(unused_assignments)]

use std::fs::read_to_string;
use std::path::Path;

use miette::{miette, Diagnostic, NamedSource, Report, SourceSpan};
use thiserror::Error;
use weft::{Error, Pos, RenderError};

/// A miette-compatible diagnostic for template errors.
///
/// Note: Fields are read by miette derive macros, not directly by code.
#[derive(Debug, Error, Diagnostic)]
#[error("{message}")]
#[diagnostic(code(weft::template))]
pub struct TemplateDiagnostic {
    #[source_code]
    src: NamedSource<String>,

    #[label("error here")]
    span: Option<SourceSpan>,

    message: String,

    #[help]
    help: Option<String>,
}

impl TemplateDiagnostic {
    /// Create a diagnostic from an error raised while processing `content`.
    pub fn from_error(name: &str, content: &str, err: &Error) -> Self {
        TemplateDiagnostic {
            src: NamedSource::new(name, content.to_string()),
            span: err.pos().map(|pos| (byte_offset(content, pos), 1).into()),
            message: err.to_string(),
            help: help_for(err),
        }
    }
}

/// Build a report for an error from a template loaded from `dir`, with a
/// source snippet when the failing template can be read back.
pub fn report_error(dir: &Path, err: &Error) -> Report {
    let source = err
        .pos()
        .and(err.template_name())
        .and_then(|name| read_to_string(dir.join(name)).ok().map(|content| (name, content)));
    match source {
        Some((name, content)) => Report::new(TemplateDiagnostic::from_error(name, &content, err)),
        None => miette!("{}", err),
    }
}

/// Convert a 1-based line and column to a byte offset into `content`.
///
/// Columns count characters; the offset is in bytes, clamped to the
/// content length.
pub fn byte_offset(content: &str, pos: Pos) -> usize {
    let line_start: usize = content
        .split_inclusive('\n')
        .take(pos.line.saturating_sub(1))
        .map(str::len)
        .sum();
    let column = content[line_start.min(content.len())..]
        .char_indices()
        .nth(pos.column.saturating_sub(1))
        .map_or(content.len() - line_start.min(content.len()), |(i, _)| i);
    (line_start + column).min(content.len())
}

fn help_for(err: &Error) -> Option<String> {
    match err {
        Error::Render(render)
            if matches!(render.root_cause(), RenderError::UnknownFilter { .. }) =>
        {
            Some("the CLI only provides the built-in `safe` and `escape` filters".to_string())
        }
        Error::TemplateNotFound { .. } => {
            Some("template names are resolved relative to --dir".to_string())
        }
        _ => None,
    }
}
