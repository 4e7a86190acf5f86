//! Render-time services used by compiled programs.
//!
//! [`Frame`] chains hold locals, a [`Context`] holds per-render state and
//! the block registry for inheritance, and the renderer walks a program's
//! instructions against both.

mod context;
mod error;
mod escape;
mod frame;
mod join;
mod macros;
mod ops;
mod render;

pub use context::{BlockRef, Context};
pub use error::RenderError;
pub use escape::{escape_html, suppress_value};
pub use frame::Frame;
pub use join::join_ordered;
pub use macros::MacroValue;
pub(crate) use render::{RenderMode, render_root};
