use async_trait::async_trait;

use crate::capture::Frame;
use crate::error::DisplayError;

/// Anything that can put a frame on screen
#[async_trait]
pub trait FrameSink: Send {
    async fn initialize(&mut self) -> Result<(), DisplayError>;

    /// Show one frame. Fails if the frame does not match the output mode.
    async fn display_frame(&mut self, frame: Frame) -> Result<(), DisplayError>;

    fn is_available(&self) -> bool;

    async fn close(&mut self) -> Result<(), DisplayError>;
}

pub(crate) fn check_dimensions(frame: &Frame, width: u32, height: u32) -> Result<(), DisplayError> {
    let actual = frame.dimensions();
    if actual != (width, height) {
        return Err(DisplayError::DimensionMismatch {
            expected: (width, height),
            actual,
        });
    }
    Ok(())
}
