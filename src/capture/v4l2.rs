//! V4L2 capture card source

use std::io;
use std::path::Path;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use tracing::{info, instrument, warn};
use v4l::buffer::Type;
use v4l::capability::Flags as CapFlags;
use v4l::io::traits::CaptureStream;
use v4l::prelude::MmapStream;
use v4l::video::Capture;
use v4l::{Device, FourCC};

use super::decoder;
use super::frame::{Frame, FrameMetadata, Origin, PixelFormat};
use super::source::FrameSource;
use crate::config::CaptureConfig;
use crate::error::CaptureError;

/// Memory-mapped V4L2 capture, decoded to RGB24 on the way out
pub struct V4l2Source {
    config: CaptureConfig,
    device: Option<Device>,
    stream: Option<MmapStream<'static>>,
    sequence: u64,
}

impl V4l2Source {
    pub fn new(config: CaptureConfig) -> Self {
        Self {
            config,
            device: None,
            stream: None,
            sequence: 0,
        }
    }

    fn open(&self, path: &str) -> io::Result<Device> {
        let device = Device::with_path(path)?;

        let caps = device.query_caps()?;
        info!("Device: {} ({})", caps.card, caps.driver);
        if !caps.capabilities.contains(CapFlags::VIDEO_CAPTURE) {
            return Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "device doesn't support video capture",
            ));
        }

        let mut fmt = device.format()?;
        fmt.width = self.config.width;
        fmt.height = self.config.height;
        fmt.fourcc = match self.config.format {
            PixelFormat::Mjpeg => FourCC::new(b"MJPG"),
            PixelFormat::Yuyv4 => FourCC::new(b"YUYV"),
            PixelFormat::Rgb24 => FourCC::new(b"RGB3"),
            other => {
                return Err(io::Error::new(
                    io::ErrorKind::Unsupported,
                    format!("unsupported capture format {:?}", other),
                ))
            }
        };
        device.set_format(&fmt)?;
        Ok(device)
    }
}

/// Find the first capture-capable device offering MJPEG or YUYV.
pub fn auto_detect_device() -> Option<(String, PixelFormat)> {
    info!("Auto-detecting capture devices...");

    for i in 0..10 {
        let path = format!("/dev/video{}", i);
        if !Path::new(&path).exists() {
            continue;
        }
        let Ok(dev) = Device::with_path(&path) else {
            continue;
        };
        let Ok(caps) = dev.query_caps() else {
            continue;
        };
        if !caps.capabilities.contains(CapFlags::VIDEO_CAPTURE) {
            continue;
        }
        for fmt in dev.enum_formats().unwrap_or_default() {
            if fmt.fourcc == FourCC::new(b"MJPG") {
                info!("Found MJPEG device: {} - {}", path, caps.card);
                return Some((path, PixelFormat::Mjpeg));
            } else if fmt.fourcc == FourCC::new(b"YUYV") {
                info!("Found YUYV device: {} - {}", path, caps.card);
                return Some((path, PixelFormat::Yuyv4));
            }
        }
    }
    None
}

fn hardware(e: io::Error) -> CaptureError {
    match e.kind() {
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => {
            CaptureError::Timeout(Duration::from_secs(1))
        }
        _ => CaptureError::Hardware(e.to_string()),
    }
}

#[async_trait]
impl FrameSource for V4l2Source {
    async fn initialize(&mut self) -> Result<(), CaptureError> {
        if self.config.device.is_empty() {
            let (path, format) = auto_detect_device()
                .ok_or_else(|| CaptureError::Hardware("no suitable capture device found".into()))?;
            self.config.device = path;
            self.config.format = format;
        }
        info!("Initializing V4L2 capture: {}", self.config.device);

        let device = self.open(&self.config.device).map_err(hardware)?;
        let stream = MmapStream::with_buffers(&device, Type::VideoCapture, self.config.buffer_count)
            .map_err(hardware)?;

        info!(
            "Capture stream started with {} buffers",
            self.config.buffer_count
        );
        self.device = Some(device);
        self.stream = Some(stream);
        Ok(())
    }

    #[instrument(skip(self))]
    async fn capture_frame(&mut self) -> Result<Frame, CaptureError> {
        let timestamp = Instant::now();
        let stream = self.stream.as_mut().ok_or(CaptureError::NotInitialized)?;

        // Dequeue blocks until the driver hands over a buffer
        let (buf, meta) = stream.next().map_err(hardware)?;
        let data = Bytes::copy_from_slice(buf);
        let device_timestamp = Duration::from_secs(meta.timestamp.sec as u64)
            + Duration::from_micros(meta.timestamp.usec as u64);

        self.sequence += 1;
        let raw = Frame::new(
            data,
            FrameMetadata {
                sequence: self.sequence,
                width: self.config.width,
                height: self.config.height,
                format: self.config.format,
                origin: Origin::Capture,
                device_timestamp: Some(device_timestamp),
            },
            timestamp,
        )?;

        Ok(decoder::to_rgb(&raw)?)
    }

    fn is_available(&self) -> bool {
        self.stream.is_some()
    }

    async fn close(&mut self) -> Result<(), CaptureError> {
        if self.stream.take().is_none() {
            warn!("V4L2 source closed before it was started");
        }
        self.device = None;
        Ok(())
    }
}
