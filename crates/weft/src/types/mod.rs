mod value;

use indexmap::IndexMap;

pub use value::Value;

/// Ordered string-keyed mapping used for render data, dict literals and
/// module namespaces.
pub type Map = IndexMap<String, Value>;

/// Keyword arguments passed to a macro, filter or extension call.
pub type Kwargs = IndexMap<String, Value>;
