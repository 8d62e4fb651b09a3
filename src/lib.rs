//! Real-time ad-break detection and picture-in-picture replacement for live video

pub mod capture;
pub mod compose;
pub mod config;
pub mod content;
pub mod control;
pub mod detect;
pub mod display;
pub mod error;
pub mod pipeline;

pub use capture::{Frame, FrameMetadata, FrameSource, Origin, PixelFormat};
pub use config::{Config, PipelineConfig, VideoMode};
pub use display::FrameSink;
pub use error::{PipelineError, Stage};
pub use pipeline::{
    BasePipeline, DetectionPipeline, IntegratedPipeline, Pipeline, PipPipeline, StopHandle,
    VideoStats,
};
