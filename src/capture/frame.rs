use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::FrameError;

/// Immutable frame with zero-copy semantics
#[derive(Clone)]
pub struct Frame {
    /// Pixel data - shared across tasks without copying
    pub data: Bytes,

    /// Frame metadata
    pub meta: Arc<FrameMetadata>,

    /// Capture timestamp for latency tracking
    pub timestamp: Instant,
}

/// Frame metadata
#[derive(Debug, Clone, PartialEq)]
pub struct FrameMetadata {
    pub sequence: u64,
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub origin: Origin,
    pub device_timestamp: Option<Duration>, // Hardware timestamp if available
}

/// Pixel formats we support
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PixelFormat {
    Rgb24,
    Bgr24,
    Yuyv4,
    Mjpeg,
    Nv12,
}

impl PixelFormat {
    /// Exact buffer size for raw formats, `None` for compressed ones.
    pub fn frame_size(self, width: u32, height: u32) -> Option<usize> {
        let pixels = width as usize * height as usize;
        match self {
            PixelFormat::Rgb24 | PixelFormat::Bgr24 => Some(pixels * 3),
            PixelFormat::Yuyv4 => Some(pixels * 2),
            PixelFormat::Nv12 => Some(pixels * 3 / 2),
            PixelFormat::Mjpeg => None,
        }
    }

    pub fn is_packed_rgb(self) -> bool {
        matches!(self, PixelFormat::Rgb24 | PixelFormat::Bgr24)
    }
}

/// Where a frame came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Origin {
    Capture,
    Synthetic,
    AlternateContent,
    Composite,
}

impl Frame {
    /// Build a frame, rejecting buffers that disagree with the metadata.
    pub fn new(data: Bytes, meta: FrameMetadata, timestamp: Instant) -> Result<Self, FrameError> {
        if meta.width == 0 || meta.height == 0 {
            return Err(FrameError::Empty);
        }
        if let Some(expected) = meta.format.frame_size(meta.width, meta.height) {
            if data.len() != expected {
                return Err(FrameError::DimensionMismatch {
                    width: meta.width,
                    height: meta.height,
                    format: meta.format,
                    expected,
                    actual: data.len(),
                });
            }
        }

        Ok(Self {
            data,
            meta: Arc::new(meta),
            timestamp,
        })
    }

    /// Packed RGB24 frame stamped now
    pub fn rgb(
        data: impl Into<Bytes>,
        width: u32,
        height: u32,
        sequence: u64,
        origin: Origin,
    ) -> Result<Self, FrameError> {
        Self::new(
            data.into(),
            FrameMetadata {
                sequence,
                width,
                height,
                format: PixelFormat::Rgb24,
                origin,
                device_timestamp: None,
            },
            Instant::now(),
        )
    }

    pub fn sequence(&self) -> u64 {
        self.meta.sequence
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.meta.width, self.meta.height)
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("meta", &self.meta)
            .field("bytes", &self.data.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_buffer_that_does_not_match_dimensions() {
        let err = Frame::rgb(vec![0u8; 10], 4, 4, 1, Origin::Synthetic).unwrap_err();
        assert!(matches!(
            err,
            FrameError::DimensionMismatch {
                expected: 48,
                actual: 10,
                ..
            }
        ));
    }

    #[test]
    fn rejects_zero_sized_frames() {
        assert!(matches!(
            Frame::rgb(Vec::<u8>::new(), 0, 4, 1, Origin::Synthetic),
            Err(FrameError::Empty)
        ));
    }

    #[test]
    fn compressed_frames_skip_size_check() {
        let meta = FrameMetadata {
            sequence: 7,
            width: 640,
            height: 480,
            format: PixelFormat::Mjpeg,
            origin: Origin::Capture,
            device_timestamp: None,
        };
        let frame = Frame::new(Bytes::from_static(&[0xff, 0xd8]), meta, Instant::now()).unwrap();
        assert_eq!(frame.sequence(), 7);
        assert_eq!(frame.dimensions(), (640, 480));
    }

    #[test]
    fn raw_frame_sizes() {
        assert_eq!(PixelFormat::Rgb24.frame_size(4, 2), Some(24));
        assert_eq!(PixelFormat::Yuyv4.frame_size(4, 2), Some(16));
        assert_eq!(PixelFormat::Nv12.frame_size(4, 2), Some(12));
        assert_eq!(PixelFormat::Mjpeg.frame_size(4, 2), None);
    }
}
