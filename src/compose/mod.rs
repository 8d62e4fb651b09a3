pub mod compositor;

pub use compositor::{inset_origin, Compositor};
pub use crate::config::{CompositorConfig, InsetConfig, InsetPosition};
