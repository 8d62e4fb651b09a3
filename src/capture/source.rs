use async_trait::async_trait;

use super::Frame;
use crate::error::CaptureError;

/// Anything that yields sequentially numbered, timestamped frames
#[async_trait]
pub trait FrameSource: Send {
    async fn initialize(&mut self) -> Result<(), CaptureError>;

    /// Block until the next frame is available.
    async fn capture_frame(&mut self) -> Result<Frame, CaptureError>;

    fn is_available(&self) -> bool;

    async fn close(&mut self) -> Result<(), CaptureError>;
}
