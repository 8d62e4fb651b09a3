pub mod decoder;
pub mod frame;
pub mod source;
pub mod synthetic;
#[cfg(feature = "v4l2")]
pub mod v4l2;

pub use frame::{Frame, FrameMetadata, Origin, PixelFormat};
pub use source::FrameSource;
pub use synthetic::{InjectedFault, TestPatternSource};
#[cfg(feature = "v4l2")]
pub use v4l2::V4l2Source;
