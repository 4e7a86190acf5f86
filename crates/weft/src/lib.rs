pub mod compiler;
pub mod environment;
mod error;
pub mod lexer;
pub mod parser;
pub mod runtime;
pub mod types;

pub use compiler::{CompileError, CompileOptions, Program};
pub use environment::{
    Environment, FileSystemLoader, Filter, FilterError, Loader, LoaderError, MemoryLoader,
    PrecompiledBundle, PrecompiledLoader, Template, View,
};
pub use error::{Error, compute_suggestions};
pub use lexer::{LexError, Pos};
pub use parser::ParseError;
pub use runtime::{RenderError, escape_html};
pub use types::{Kwargs, Map, Value};

/// Creates a map [`Value`] from key-value pairs, for use as render data.
///
/// Values are converted with `Into<Value>`, so integers, floats, strings,
/// vectors and nested `data!` maps can be passed directly.
///
/// # Example
///
/// ```
/// use weft::{data, Value};
///
/// let d = data! { "count" => 3, "name" => "Alice", "tags" => vec!["a", "b"] };
/// assert_eq!(d.len(), Some(3));
/// assert_eq!(d.get_attr("count").as_int(), Some(3));
/// assert_eq!(d.get_attr("name").as_str(), Some("Alice"));
/// ```
#[macro_export]
macro_rules! data {
    {} => {
        $crate::Value::from($crate::Map::new())
    };
    { $($key:expr => $value:expr),+ $(,)? } => {
        {
            let mut map = $crate::Map::new();
            $(
                map.insert($key.to_string(), ::std::convert::Into::<$crate::Value>::into($value));
            )+
            $crate::Value::from(map)
        }
    };
}
