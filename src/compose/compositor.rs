//! Picture-in-picture compositing

use std::borrow::Cow;
use std::sync::Arc;

use bytes::Bytes;
use image::imageops::{self, FilterType};
use image::{ImageBuffer, Rgb};
use tracing::instrument;

use crate::capture::{Frame, FrameMetadata, Origin, PixelFormat};
use crate::config::{CompositorConfig, InsetPosition};
use crate::error::{ComposeError, ConfigError};

/// Top-left corner of the inset for a canvas of `canvas` and an inset of `inset`.
pub fn inset_origin(
    position: InsetPosition,
    canvas: (u32, u32),
    inset: (u32, u32),
    margin: u32,
) -> (u32, u32) {
    let (cw, ch) = canvas;
    let (w, h) = inset;
    let right = cw.saturating_sub(w + margin);
    let bottom = ch.saturating_sub(h + margin);
    match position {
        InsetPosition::TopLeft => (margin, margin),
        InsetPosition::TopRight => (right, margin),
        InsetPosition::BottomLeft => (margin, bottom),
        InsetPosition::BottomRight => (right, bottom),
        InsetPosition::Center => (cw.saturating_sub(w) / 2, ch.saturating_sub(h) / 2),
        InsetPosition::Custom { x, y } => (x, y),
    }
}

/// Cheap to clone; the config is shared so compositing can move onto a worker.
#[derive(Debug, Clone)]
pub struct Compositor {
    config: Arc<CompositorConfig>,
}

impl Compositor {
    pub fn new(config: CompositorConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config: Arc::new(config),
        })
    }

    pub fn config(&self) -> &CompositorConfig {
        &self.config
    }

    pub fn canvas_size(&self) -> (u32, u32) {
        (self.config.canvas_width, self.config.canvas_height)
    }

    pub fn inset_origin(&self) -> (u32, u32) {
        let inset = &self.config.inset;
        inset_origin(
            inset.position,
            self.canvas_size(),
            (inset.width, inset.height),
            inset.margin,
        )
    }

    /// Combine `primary` with an optional `secondary` frame.
    ///
    /// Without a secondary frame (or with compositing disabled) the primary
    /// comes back untouched. In swap mode the secondary fills the canvas and
    /// the primary shrinks into the inset. The output always carries the
    /// primary's sequence number and capture timestamp.
    #[instrument(skip_all, fields(frame = primary.sequence(), swap))]
    pub fn compose(
        &self,
        primary: &Frame,
        secondary: Option<&Frame>,
        swap: bool,
    ) -> Result<Frame, ComposeError> {
        let secondary = match secondary {
            Some(s) if self.config.enabled => s,
            _ => return Ok(primary.clone()),
        };
        for frame in [primary, secondary] {
            if !frame.meta.format.is_packed_rgb() {
                return Err(ComposeError::UnsupportedFormat(frame.meta.format));
            }
        }
        if primary.meta.format != secondary.meta.format {
            return Err(ComposeError::UnsupportedFormat(secondary.meta.format));
        }

        let (background, foreground) = if swap {
            (secondary, primary)
        } else {
            (primary, secondary)
        };

        let (cw, ch) = self.canvas_size();
        let inset = &self.config.inset;
        let mut canvas = resize(background, cw, ch)?.into_owned();
        let small = resize(foreground, inset.width, inset.height)?;
        let (x, y) = self.inset_origin();

        self.draw_border(&mut canvas, x, y, primary.meta.format);
        blend(
            &mut canvas,
            cw,
            &small,
            (inset.width, inset.height),
            (x, y),
            inset.opacity,
        );

        let meta = FrameMetadata {
            sequence: primary.meta.sequence,
            width: cw,
            height: ch,
            format: primary.meta.format,
            origin: Origin::Composite,
            device_timestamp: primary.meta.device_timestamp,
        };
        Frame::new(Bytes::from(canvas), meta, primary.timestamp).map_err(|_| {
            ComposeError::InvalidBuffer {
                width: cw,
                height: ch,
            }
        })
    }

    /// `compose` on the blocking pool.
    pub async fn compose_async(
        &self,
        primary: Frame,
        secondary: Option<Frame>,
        swap: bool,
    ) -> Result<Frame, ComposeError> {
        if secondary.is_none() || !self.config.enabled {
            return Ok(primary);
        }
        let compositor = self.clone();
        tokio::task::spawn_blocking(move || compositor.compose(&primary, secondary.as_ref(), swap))
            .await?
    }

    /// `border_color` is RGB; it is written in the canvas's channel order.
    fn draw_border(&self, canvas: &mut [u8], x: u32, y: u32, format: PixelFormat) {
        let inset = &self.config.inset;
        let bw = inset.border_width;
        if bw == 0 {
            return;
        }
        let [r, g, b] = inset.border_color;
        let color = match format {
            PixelFormat::Bgr24 => [b, g, r],
            _ => [r, g, b],
        };
        let (cw, ch) = self.canvas_size();
        let left = x.saturating_sub(bw);
        let top = y.saturating_sub(bw);
        let right = (x + inset.width + bw).min(cw);
        let bottom = (y + inset.height + bw).min(ch);

        for row in top..bottom {
            for col in left..right {
                let inside = col >= x && col < x + inset.width && row >= y && row < y + inset.height;
                if !inside {
                    let i = ((row * cw + col) * 3) as usize;
                    canvas[i..i + 3].copy_from_slice(&color);
                }
            }
        }
    }
}

fn resize(frame: &Frame, width: u32, height: u32) -> Result<Cow<'_, [u8]>, ComposeError> {
    let (w, h) = frame.dimensions();
    if (w, h) == (width, height) {
        return Ok(Cow::Borrowed(&frame.data[..]));
    }
    let img: ImageBuffer<Rgb<u8>, &[u8]> = ImageBuffer::from_raw(w, h, &frame.data[..])
        .ok_or(ComposeError::InvalidBuffer {
            width: w,
            height: h,
        })?;
    Ok(Cow::Owned(
        imageops::resize(&img, width, height, FilterType::Triangle).into_raw(),
    ))
}

/// `out = src * opacity + dst * (1 - opacity)` over the inset rectangle.
fn blend(
    canvas: &mut [u8],
    canvas_width: u32,
    src: &[u8],
    (w, h): (u32, u32),
    (x, y): (u32, u32),
    opacity: f32,
) {
    let row_len = (w * 3) as usize;
    for row in 0..h {
        let dst_start = (((y + row) * canvas_width + x) * 3) as usize;
        let src_start = row as usize * row_len;
        let dst = &mut canvas[dst_start..dst_start + row_len];
        let src = &src[src_start..src_start + row_len];

        if opacity >= 1.0 {
            dst.copy_from_slice(src);
        } else {
            for (d, &s) in dst.iter_mut().zip(src) {
                *d = (s as f32 * opacity + *d as f32 * (1.0 - opacity)).round() as u8;
            }
        }
    }
}
