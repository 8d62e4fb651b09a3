use async_trait::async_trait;
use bytes::Bytes;

use super::AlternateContentSource;
use crate::capture::{Frame, Origin};
use crate::error::ContentError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pattern {
    ColorBars,
    Solid([u8; 3]),
}

// 75% SMPTE bars, left to right
const BARS: [[u8; 3]; 7] = [
    [191, 191, 191],
    [191, 191, 0],
    [0, 191, 191],
    [0, 191, 0],
    [191, 0, 191],
    [191, 0, 0],
    [0, 0, 191],
];

/// Generated stills: colour bars or a flat colour
pub struct PatternContent {
    width: u32,
    height: u32,
    pattern: Pattern,
    image: Option<Bytes>,
    sequence: u64,
}

impl PatternContent {
    pub fn new(width: u32, height: u32, pattern: Pattern) -> Self {
        Self {
            width,
            height,
            pattern,
            image: None,
            sequence: 0,
        }
    }

    fn render(&self) -> Vec<u8> {
        let (w, h) = (self.width as usize, self.height as usize);
        let mut data = Vec::with_capacity(w * h * 3);
        for _ in 0..h {
            for x in 0..w {
                let rgb = match self.pattern {
                    Pattern::Solid(rgb) => rgb,
                    Pattern::ColorBars => BARS[x * BARS.len() / w],
                };
                data.extend_from_slice(&rgb);
            }
        }
        data
    }
}

#[async_trait]
impl AlternateContentSource for PatternContent {
    async fn initialize(&mut self) -> Result<(), ContentError> {
        self.image = Some(Bytes::from(self.render()));
        self.sequence = 0;
        Ok(())
    }

    async fn get_frame(&mut self) -> Result<Frame, ContentError> {
        let image = self.image.clone().ok_or(ContentError::NotInitialized)?;
        self.sequence += 1;
        Ok(Frame::rgb(
            image,
            self.width,
            self.height,
            self.sequence,
            Origin::AlternateContent,
        )?)
    }

    async fn reset(&mut self) -> Result<(), ContentError> {
        self.sequence = 0;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), ContentError> {
        self.image = None;
        Ok(())
    }
}
