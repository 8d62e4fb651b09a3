//! Raw capture formats to packed RGB24

use bytes::Bytes;
use jpeg_decoder::{Decoder, PixelFormat as JpegPixelFormat};

use super::frame::{Frame, FrameMetadata, PixelFormat};
use crate::error::FrameError;

pub fn decode_frame(
    data: &[u8],
    format: PixelFormat,
    width: u32,
    height: u32,
) -> Result<Vec<u8>, FrameError> {
    match format {
        PixelFormat::Mjpeg => decode_mjpeg(data, width, height),
        PixelFormat::Rgb24 => Ok(data.to_vec()),
        PixelFormat::Bgr24 => Ok(data
            .chunks_exact(3)
            .flat_map(|px| [px[2], px[1], px[0]])
            .collect()),
        PixelFormat::Yuyv4 => Ok(yuyv_to_rgb(data)),
        PixelFormat::Nv12 => Ok(nv12_to_rgb(data, width as usize, height as usize)),
    }
}

/// Decode any captured frame into an RGB24 frame with the same metadata.
pub fn to_rgb(frame: &Frame) -> Result<Frame, FrameError> {
    if frame.meta.format == PixelFormat::Rgb24 {
        return Ok(frame.clone());
    }
    let rgb = decode_frame(&frame.data, frame.meta.format, frame.meta.width, frame.meta.height)?;
    Frame::new(
        Bytes::from(rgb),
        FrameMetadata {
            format: PixelFormat::Rgb24,
            ..(*frame.meta).clone()
        },
        frame.timestamp,
    )
}

fn decode_mjpeg(data: &[u8], width: u32, height: u32) -> Result<Vec<u8>, FrameError> {
    let decode_err = |reason: String| FrameError::Decode {
        format: PixelFormat::Mjpeg,
        reason,
    };

    let mut decoder = Decoder::new(data);
    let pixels = decoder.decode().map_err(|e| decode_err(e.to_string()))?;
    let info = decoder
        .info()
        .ok_or_else(|| decode_err("missing image header".into()))?;

    if u32::from(info.width) != width || u32::from(info.height) != height {
        return Err(decode_err(format!(
            "decoded {}x{}, expected {}x{}",
            info.width, info.height, width, height
        )));
    }

    match info.pixel_format {
        JpegPixelFormat::RGB24 => Ok(pixels),
        JpegPixelFormat::L8 => Ok(pixels.iter().flat_map(|&l| [l, l, l]).collect()),
        other => Err(decode_err(format!("unsupported jpeg layout {:?}", other))),
    }
}

// BT.601 limited range
fn yuv_to_rgb(y: u8, u: u8, v: u8) -> [u8; 3] {
    let c = (y as i32 - 16).max(0);
    let d = u as i32 - 128;
    let e = v as i32 - 128;
    let r = (298 * c + 409 * e + 128) >> 8;
    let g = (298 * c - 100 * d - 208 * e + 128) >> 8;
    let b = (298 * c + 516 * d + 128) >> 8;
    [clamp(r), clamp(g), clamp(b)]
}

fn clamp(v: i32) -> u8 {
    v.clamp(0, 255) as u8
}

fn yuyv_to_rgb(data: &[u8]) -> Vec<u8> {
    let mut rgb = Vec::with_capacity(data.len() / 2 * 3);
    for chunk in data.chunks_exact(4) {
        let (y0, u, y1, v) = (chunk[0], chunk[1], chunk[2], chunk[3]);
        rgb.extend_from_slice(&yuv_to_rgb(y0, u, v));
        rgb.extend_from_slice(&yuv_to_rgb(y1, u, v));
    }
    rgb
}

fn nv12_to_rgb(data: &[u8], width: usize, height: usize) -> Vec<u8> {
    let (luma, chroma) = data.split_at(width * height);
    let mut rgb = Vec::with_capacity(width * height * 3);
    for row in 0..height {
        for col in 0..width {
            let y = luma[row * width + col];
            let uv = (row / 2) * width + (col & !1);
            rgb.extend_from_slice(&yuv_to_rgb(y, chroma[uv], chroma[uv + 1]));
        }
    }
    rgb
}
