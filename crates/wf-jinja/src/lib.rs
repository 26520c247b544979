//! wf-jinja - Templating layer for Wrenflow
//!
//! Renders resource SQL with minijinja, capturing everything the change
//! detector and graph builder need to know about a render: which
//! `ref()`/`source()` targets it named, which environment variables it
//! consumed, and which config() values it set. Rendering is deterministic
//! for identical inputs and an identical env snapshot; the snapshot is an
//! explicit map, never ambient process state.

pub mod environment;
pub mod error;
pub(crate) mod functions;
pub mod macros;

pub use environment::{JinjaRenderer, Rendered, RendererOptions};
pub use error::{JinjaError, JinjaResult};
pub use macros::MacroRegistry;
