//! Generated test-pattern source, used in place of a capture card

use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::time::{interval, Interval, MissedTickBehavior};
use tracing::info;

use super::frame::{Frame, FrameMetadata, Origin, PixelFormat};
use super::source::FrameSource;
use crate::error::CaptureError;

/// Failure injected after a number of good frames
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InjectedFault {
    Timeout,
    Hardware,
}

pub struct TestPatternSource {
    width: u32,
    height: u32,
    fps: Option<u32>,
    fill: Option<[u8; 3]>,
    fault: Option<(u64, InjectedFault)>,
    sequence: u64,
    pacer: Option<Interval>,
    initialized: bool,
    closed: bool,
}

impl TestPatternSource {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            fps: None,
            fill: None,
            fault: None,
            sequence: 0,
            pacer: None,
            initialized: false,
            closed: false,
        }
    }

    /// Pace frames to a capture rate instead of producing them as fast as possible.
    pub fn with_fps(mut self, fps: u32) -> Self {
        self.fps = Some(fps).filter(|&f| f > 0);
        self
    }

    /// Solid colour instead of the moving bar pattern.
    pub fn with_fill(mut self, rgb: [u8; 3]) -> Self {
        self.fill = Some(rgb);
        self
    }

    /// Fail every capture after `frames` successful ones.
    pub fn fail_after(mut self, frames: u64, fault: InjectedFault) -> Self {
        self.fault = Some((frames, fault));
        self
    }

    fn render(&self) -> Vec<u8> {
        let (w, h) = (self.width as usize, self.height as usize);
        if let Some(rgb) = self.fill {
            return rgb.iter().copied().cycle().take(w * h * 3).collect();
        }

        let bar_width = (w / 16).max(1);
        let bar_x = (self.sequence as usize * 4) % w;
        let mut data = Vec::with_capacity(w * h * 3);
        for y in 0..h {
            let shade = (y * 255 / h.max(1)) as u8;
            for x in 0..w {
                if x >= bar_x && x < bar_x + bar_width {
                    data.extend_from_slice(&[255, 255, 255]);
                } else {
                    data.extend_from_slice(&[(x * 255 / w.max(1)) as u8, shade, 96]);
                }
            }
        }
        data
    }
}

#[async_trait]
impl FrameSource for TestPatternSource {
    async fn initialize(&mut self) -> Result<(), CaptureError> {
        info!(
            "Test pattern source {}x{} @ {:?} fps",
            self.width, self.height, self.fps
        );
        self.pacer = self.fps.map(|fps| {
            let mut pacer = interval(Duration::from_secs_f64(1.0 / fps as f64));
            pacer.set_missed_tick_behavior(MissedTickBehavior::Skip);
            pacer
        });
        self.initialized = true;
        self.closed = false;
        Ok(())
    }

    async fn capture_frame(&mut self) -> Result<Frame, CaptureError> {
        if self.closed {
            return Err(CaptureError::Closed);
        }
        if !self.initialized {
            return Err(CaptureError::NotInitialized);
        }

        if let Some((limit, fault)) = self.fault {
            if self.sequence >= limit {
                return Err(match fault {
                    InjectedFault::Timeout => CaptureError::Timeout(Duration::from_millis(100)),
                    InjectedFault::Hardware => {
                        CaptureError::Hardware("test pattern generator stopped".into())
                    }
                });
            }
        }

        if let Some(pacer) = self.pacer.as_mut() {
            pacer.tick().await;
        }

        let data = self.render();
        self.sequence += 1;

        let meta = FrameMetadata {
            sequence: self.sequence,
            width: self.width,
            height: self.height,
            format: PixelFormat::Rgb24,
            origin: Origin::Synthetic,
            device_timestamp: None,
        };
        Ok(Frame::new(Bytes::from(data), meta, Instant::now())?)
    }

    fn is_available(&self) -> bool {
        !self.closed
    }

    async fn close(&mut self) -> Result<(), CaptureError> {
        self.closed = true;
        self.pacer = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn frames_are_numbered_from_one() {
        let mut source = TestPatternSource::new(32, 16);
        source.initialize().await.unwrap();

        let first = source.capture_frame().await.unwrap();
        let second = source.capture_frame().await.unwrap();

        assert_eq!(first.sequence(), 1);
        assert_eq!(second.sequence(), 2);
        assert_eq!(first.data.len(), 32 * 16 * 3);
        assert_eq!(first.meta.origin, Origin::Synthetic);
        assert!(second.timestamp >= first.timestamp);
    }

    #[tokio::test]
    async fn capture_before_initialize_fails() {
        let mut source = TestPatternSource::new(8, 8);
        assert!(matches!(
            source.capture_frame().await,
            Err(CaptureError::NotInitialized)
        ));
    }

    #[tokio::test]
    async fn injected_fault_fires_after_limit() {
        let mut source = TestPatternSource::new(8, 8).fail_after(2, InjectedFault::Timeout);
        source.initialize().await.unwrap();

        source.capture_frame().await.unwrap();
        source.capture_frame().await.unwrap();
        assert!(matches!(
            source.capture_frame().await,
            Err(CaptureError::Timeout(_))
        ));
    }

    #[tokio::test]
    async fn closed_source_is_unavailable() {
        let mut source = TestPatternSource::new(8, 8).with_fill([1, 2, 3]);
        source.initialize().await.unwrap();
        let frame = source.capture_frame().await.unwrap();
        assert_eq!(&frame.data[..3], &[1, 2, 3]);

        source.close().await.unwrap();
        assert!(!source.is_available());
        assert!(matches!(source.capture_frame().await, Err(CaptureError::Closed)));
    }
}
