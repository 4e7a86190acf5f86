//! Custom tags.
//!
//! An extension claims one or more tag keywords. When the parser meets one
//! of them it hands the token stream to [`Extension::parse`], which returns
//! a [`CallExtension`] node. At render time the node's arguments are
//! evaluated, its bodies rendered, and the result passed to
//! [`Extension::run`] (or [`Extension::run_async`] for async extensions).

use async_trait::async_trait;
use thiserror::Error;

use crate::lexer::Token;
use crate::parser::{CallExtension, ParseError, Parser};
use crate::types::{Kwargs, Value};

/// Error returned by an extension at render time.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{message}")]
pub struct ExtensionError {
    pub message: String,
}

impl ExtensionError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// The evaluated inputs of one extension call site.
#[derive(Debug, Clone, Default)]
pub struct ExtensionCall {
    pub args: Vec<Value>,
    pub kwargs: Kwargs,
    /// Rendered bodies, in the order the parse hook captured them.
    pub bodies: Vec<Value>,
}

/// A custom tag handler.
///
/// # Example
///
/// ```
/// use weft::environment::{Extension, ExtensionCall, ExtensionError};
/// use weft::lexer::Token;
/// use weft::parser::{CallExtension, ParseError, Parser};
/// use weft::{Environment, Value};
///
/// /// `{% shout %}text{% endshout %}` renders its body in upper case.
/// struct Shout;
///
/// impl Extension for Shout {
///     fn name(&self) -> &str {
///         "shout"
///     }
///
///     fn tags(&self) -> &[&'static str] {
///         &["shout"]
///     }
///
///     fn parse(&self, parser: &mut Parser<'_>, _tag: &Token) -> Result<CallExtension, ParseError> {
///         parser.expect_block_end()?;
///         let (body, _) = parser.parse_until(&["endshout"])?;
///         parser.expect_block_end()?;
///         let mut node = CallExtension::new("shout");
///         node.bodies.push(body);
///         Ok(node)
///     }
///
///     fn run(&self, call: ExtensionCall) -> Result<Value, ExtensionError> {
///         let body = call.bodies.first().map(ToString::to_string).unwrap_or_default();
///         Ok(Value::safe(body.to_uppercase()))
///     }
/// }
///
/// let env = Environment::builder().build();
/// env.add_extension(Shout);
/// let out = env.render_str("{% shout %}hi {{ name }}{% endshout %}", weft::data! { "name" => "bo" });
/// assert_eq!(out.unwrap(), "HI BO");
/// ```
#[async_trait]
pub trait Extension: Send + Sync {
    /// Name the compiled call sites refer to.
    fn name(&self) -> &str;

    /// Tag keywords this extension parses.
    fn tags(&self) -> &[&'static str];

    /// Parse the rest of a tag after its keyword.
    fn parse(&self, parser: &mut Parser<'_>, tag: &Token) -> Result<CallExtension, ParseError>;

    /// Whether [`run_async`](Extension::run_async) must be used.
    fn is_async(&self) -> bool {
        false
    }

    fn run(&self, call: ExtensionCall) -> Result<Value, ExtensionError>;

    async fn run_async(&self, call: ExtensionCall) -> Result<Value, ExtensionError> {
        self.run(call)
    }
}
