//! Error types for every stage of the pipeline

use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::capture::PixelFormat;

pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("buffer holds {actual} bytes but {width}x{height} {format:?} needs {expected}")]
    DimensionMismatch {
        width: u32,
        height: u32,
        format: PixelFormat,
        expected: usize,
        actual: usize,
    },
    #[error("frame dimensions must be non-zero")]
    Empty,
    #[error("failed to decode {format:?} frame: {reason}")]
    Decode { format: PixelFormat, reason: String },
}

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("capture timed out after {0:?}")]
    Timeout(Duration),
    #[error("capture hardware failure: {0}")]
    Hardware(String),
    #[error("frame source used before initialize()")]
    NotInitialized,
    #[error("frame source is closed")]
    Closed,
    #[error(transparent)]
    Frame(#[from] FrameError),
}

#[derive(Debug, Error)]
pub enum DisplayError {
    #[error("frame is {actual:?} but the sink expects {expected:?}")]
    DimensionMismatch {
        expected: (u32, u32),
        actual: (u32, u32),
    },
    #[error("display hardware failure: {0}")]
    Hardware(String),
    #[error("frame sink used before initialize()")]
    NotInitialized,
}

#[derive(Debug, Error)]
pub enum DetectError {
    #[error("detector used before initialize()")]
    NotInitialized,
    #[error("failed to load model: {0}")]
    ModelLoad(String),
    #[error("preprocessing failed: {0}")]
    Preprocess(String),
    #[error("inference failed: {0}")]
    Inference(String),
    #[error("worker task failed: {0}")]
    Worker(#[from] tokio::task::JoinError),
}

#[derive(Debug, Error)]
pub enum ComposeError {
    #[error("cannot composite {0:?} frames, expected packed RGB/BGR")]
    UnsupportedFormat(PixelFormat),
    #[error("invalid pixel buffer for {width}x{height}")]
    InvalidBuffer { width: u32, height: u32 },
    #[error("worker task failed: {0}")]
    Worker(#[from] tokio::task::JoinError),
}

#[derive(Debug, Error)]
pub enum ContentError {
    #[error("alternate content used before initialize()")]
    NotInitialized,
    #[error("no alternate content available in {0}")]
    Empty(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Image(#[from] image::ImageError),
    #[error(transparent)]
    Frame(#[from] FrameError),
}

#[derive(Debug, Error)]
pub enum ControlError {
    #[error("display controller is not available")]
    Unavailable,
    #[error("display controller used before initialize()")]
    NotInitialized,
    #[error("command transport failed: {0}")]
    Transport(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Invalid(String),
    #[error(transparent)]
    Load(#[from] config::ConfigError),
}

impl ConfigError {
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        Self::Invalid(msg.into())
    }
}

/// Pipeline step a frame failed in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Capture,
    Detect,
    Content,
    Compose,
    Display,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Capture => "capture",
            Stage::Detect => "detect",
            Stage::Content => "content",
            Stage::Compose => "compose",
            Stage::Display => "display",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("pipeline used before initialize()")]
    NotInitialized,
    #[error("frame {frame} failed at {stage}: {source}")]
    Stage {
        frame: u64,
        stage: Stage,
        #[source]
        source: BoxError,
    },
    #[error("failed to initialize {component}: {source}")]
    Init {
        component: &'static str,
        #[source]
        source: BoxError,
    },
    #[error("shutdown finished with {} failure(s): {}", .failures.len(), .failures.join("; "))]
    Shutdown { failures: Vec<String> },
}

impl PipelineError {
    pub(crate) fn stage(frame: u64, stage: Stage, source: impl Into<BoxError>) -> Self {
        Self::Stage {
            frame,
            stage,
            source: source.into(),
        }
    }

    /// Fatal errors end `run()`; frame-local ones only cost the frame.
    pub fn is_fatal(&self) -> bool {
        match self {
            PipelineError::Stage { stage, .. } => {
                matches!(stage, Stage::Capture | Stage::Display)
            }
            _ => true,
        }
    }

    pub fn frame(&self) -> Option<u64> {
        match self {
            PipelineError::Stage { frame, .. } => Some(*frame),
            _ => None,
        }
    }

    pub fn failed_stage(&self) -> Option<Stage> {
        match self {
            PipelineError::Stage { stage, .. } => Some(*stage),
            _ => None,
        }
    }
}
