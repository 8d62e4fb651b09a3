pub mod null;
#[cfg(feature = "sdl2-display")]
pub mod sdl;
pub mod sink;

pub use null::NullSink;
#[cfg(feature = "sdl2-display")]
pub use sdl::Sdl2Sink;
pub use sink::FrameSink;
