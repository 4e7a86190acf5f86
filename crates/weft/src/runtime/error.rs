//! Render error types.

use thiserror::Error;

use crate::Error;
use crate::lexer::Pos;
use crate::parser::format_suggestions;

/// An error that occurred while rendering a compiled template.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("template not found: '{name}'")]
    TemplateNotFound { name: String },

    /// A referenced template failed to load or compile.
    #[error("failed to load template '{name}': {source}")]
    Template {
        name: String,
        #[source]
        source: Box<Error>,
    },

    #[error("unknown block '{name}'")]
    UnknownBlock { name: String },

    #[error("no super block available for '{block}'")]
    NoSuperBlock { block: String },

    #[error("unknown filter '{name}'{}", format_suggestions(suggestions))]
    UnknownFilter {
        name: String,
        suggestions: Vec<String>,
    },

    #[error("filter '{name}' failed: {message}")]
    Filter { name: String, message: String },

    #[error("unknown extension '{name}'")]
    UnknownExtension { name: String },

    #[error("extension '{name}' failed: {message}")]
    Extension { name: String, message: String },

    #[error("cannot import '{name}' from '{template}'")]
    UnknownExport { name: String, template: String },

    #[error("{message}")]
    Type { message: String },

    /// Only raised when `throw_on_undefined` is enabled.
    #[error("'{name}' is undefined")]
    Undefined { name: String },

    #[error("'{name}' is not callable")]
    NotCallable { name: String },

    #[error("'{name}' is async and cannot run in a synchronous render; use render_async")]
    AsyncInSyncRender { name: String },

    #[error("maximum render depth exceeded")]
    MaxDepthExceeded,

    #[error("cyclic template inheritance: {}", chain.join(" -> "))]
    CyclicInheritance { chain: Vec<String> },

    #[error("{template}:{pos}: {source}")]
    Located {
        template: String,
        pos: Pos,
        #[source]
        source: Box<RenderError>,
    },
}

impl RenderError {
    pub(crate) fn type_error(message: impl Into<String>) -> Self {
        RenderError::Type {
            message: message.into(),
        }
    }

    /// Attach a template position, unless one is already attached.
    pub(crate) fn located(self, template: &str, pos: Pos) -> Self {
        match self {
            RenderError::Located { .. } => self,
            other => RenderError::Located {
                template: template.to_string(),
                pos,
                source: Box::new(other),
            },
        }
    }

    /// The error with any location wrapper removed.
    pub fn root_cause(&self) -> &RenderError {
        match self {
            RenderError::Located { source, .. } => source.root_cause(),
            other => other,
        }
    }

    pub fn template_name(&self) -> Option<&str> {
        match self {
            RenderError::Located { template, .. } => Some(template),
            _ => None,
        }
    }

    pub fn pos(&self) -> Option<Pos> {
        match self {
            RenderError::Located { pos, .. } => Some(*pos),
            _ => None,
        }
    }
}
