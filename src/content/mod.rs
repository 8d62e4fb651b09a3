//! Alternate content shown while an ad break is on screen

pub mod pattern;
pub mod slideshow;

use async_trait::async_trait;

use crate::capture::Frame;
use crate::error::ContentError;

pub use pattern::{Pattern, PatternContent};
pub use slideshow::SlideshowContent;

#[async_trait]
pub trait AlternateContentSource: Send {
    async fn initialize(&mut self) -> Result<(), ContentError>;

    async fn get_frame(&mut self) -> Result<Frame, ContentError>;

    /// Rewind to the start; called on every ad-break entry.
    async fn reset(&mut self) -> Result<(), ContentError>;

    async fn close(&mut self) -> Result<(), ContentError>;
}
