//! Frame to model input tensor

use image::imageops::{self, FilterType};
use image::{ImageBuffer, Rgb};

use crate::capture::{Frame, PixelFormat};
use crate::error::DetectError;

/// NCHW input shape a classifier declares
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TensorShape {
    pub batch: usize,
    pub channels: usize,
    pub height: usize,
    pub width: usize,
}

impl TensorShape {
    pub const fn image(width: usize, height: usize) -> Self {
        Self {
            batch: 1,
            channels: 3,
            height,
            width,
        }
    }

    pub fn len(&self) -> usize {
        self.batch * self.channels * self.height * self.width
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone)]
pub struct Tensor {
    pub shape: TensorShape,
    pub data: Vec<f32>,
}

/// Resizes to the classifier's input size and normalises into CHW f32
#[derive(Debug, Clone)]
pub struct Preprocessor {
    shape: TensorShape,
    mean: [f32; 3],
    std: [f32; 3],
}

impl Preprocessor {
    pub fn new(shape: TensorShape) -> Self {
        // ImageNet statistics
        Self {
            shape,
            mean: [0.485, 0.456, 0.406],
            std: [0.229, 0.224, 0.225],
        }
    }

    pub fn with_normalization(mut self, mean: [f32; 3], std: [f32; 3]) -> Self {
        self.mean = mean;
        self.std = std;
        self
    }

    pub fn shape(&self) -> TensorShape {
        self.shape
    }

    pub fn process(&self, frame: &Frame) -> Result<Tensor, DetectError> {
        if self.shape.channels != 3 || self.shape.batch != 1 {
            return Err(DetectError::Preprocess(format!(
                "unsupported input shape {:?}",
                self.shape
            )));
        }
        let bgr = match frame.meta.format {
            PixelFormat::Rgb24 => false,
            PixelFormat::Bgr24 => true,
            other => {
                return Err(DetectError::Preprocess(format!(
                    "expected packed RGB/BGR, got {:?}",
                    other
                )))
            }
        };

        let (w, h) = frame.dimensions();
        let img: ImageBuffer<Rgb<u8>, &[u8]> = ImageBuffer::from_raw(w, h, &frame.data[..])
            .ok_or_else(|| DetectError::Preprocess("invalid image dimensions".into()))?;

        let (tw, th) = (self.shape.width as u32, self.shape.height as u32);
        let resized = imageops::resize(&img, tw, th, FilterType::Triangle);

        let plane = self.shape.width * self.shape.height;
        let mut data = vec![0f32; plane * 3];
        for (i, pixel) in resized.pixels().enumerate() {
            let [r, g, b] = if bgr {
                [pixel[2], pixel[1], pixel[0]]
            } else {
                pixel.0
            };
            for (c, value) in [r, g, b].into_iter().enumerate() {
                data[c * plane + i] = (value as f32 / 255.0 - self.mean[c]) / self.std[c];
            }
        }

        Ok(Tensor {
            shape: self.shape,
            data,
        })
    }
}
