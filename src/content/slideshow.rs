//! Still images from a directory, each held for a number of frames

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use image::imageops::FilterType;
use tracing::{info, warn};

use super::AlternateContentSource;
use crate::capture::{Frame, Origin};
use crate::error::ContentError;

const EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

pub struct SlideshowContent {
    dir: PathBuf,
    width: u32,
    height: u32,
    frames_per_slide: u32,
    slides: Vec<Bytes>,
    shown: u64,
}

impl SlideshowContent {
    pub fn new(dir: impl Into<PathBuf>, width: u32, height: u32, frames_per_slide: u32) -> Self {
        Self {
            dir: dir.into(),
            width,
            height,
            frames_per_slide: frames_per_slide.max(1),
            slides: Vec::new(),
            shown: 0,
        }
    }

    pub fn slide_count(&self) -> usize {
        self.slides.len()
    }

    fn load(&self, path: &Path) -> Result<Bytes, ContentError> {
        let img = image::open(path)?.to_rgb8();
        let img = if img.dimensions() == (self.width, self.height) {
            img
        } else {
            image::imageops::resize(&img, self.width, self.height, FilterType::Triangle)
        };
        Ok(Bytes::from(img.into_raw()))
    }
}

#[async_trait]
impl AlternateContentSource for SlideshowContent {
    async fn initialize(&mut self) -> Result<(), ContentError> {
        let mut paths: Vec<PathBuf> = std::fs::read_dir(&self.dir)?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| {
                p.extension()
                    .and_then(|e| e.to_str())
                    .is_some_and(|e| EXTENSIONS.contains(&e.to_lowercase().as_str()))
            })
            .collect();
        paths.sort();

        let mut slides = Vec::with_capacity(paths.len());
        for path in &paths {
            match self.load(path) {
                Ok(slide) => slides.push(slide),
                Err(e) => warn!("Skipping slide {:?}: {}", path, e),
            }
        }
        if slides.is_empty() {
            return Err(ContentError::Empty(self.dir.display().to_string()));
        }

        info!("Loaded {} slides from {:?}", slides.len(), self.dir);
        self.slides = slides;
        self.shown = 0;
        Ok(())
    }

    async fn get_frame(&mut self) -> Result<Frame, ContentError> {
        if self.slides.is_empty() {
            return Err(ContentError::NotInitialized);
        }
        let index = (self.shown / self.frames_per_slide as u64) as usize % self.slides.len();
        self.shown += 1;
        Ok(Frame::rgb(
            self.slides[index].clone(),
            self.width,
            self.height,
            self.shown,
            Origin::AlternateContent,
        )?)
    }

    async fn reset(&mut self) -> Result<(), ContentError> {
        self.shown = 0;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), ContentError> {
        self.slides.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn write_slide(dir: &Path, name: &str, value: u8) {
        RgbImage::from_pixel(8, 6, Rgb([value, value, value]))
            .save(dir.join(name))
            .unwrap();
    }

    #[tokio::test]
    async fn cycles_slides_and_rewinds_on_reset() {
        let dir = tempfile::tempdir().unwrap();
        write_slide(dir.path(), "a.png", 10);
        write_slide(dir.path(), "b.png", 200);
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let mut show = SlideshowContent::new(dir.path(), 16, 12, 2);
        show.initialize().await.unwrap();
        assert_eq!(show.slide_count(), 2);

        let values: Vec<u8> = {
            let mut v = Vec::new();
            for _ in 0..5 {
                v.push(show.get_frame().await.unwrap().data[0]);
            }
            v
        };
        assert_eq!(values, vec![10, 10, 200, 200, 10]);

        show.reset().await.unwrap();
        let frame = show.get_frame().await.unwrap();
        assert_eq!(frame.data[0], 10);
        assert_eq!(frame.dimensions(), (16, 12));
    }

    #[tokio::test]
    async fn empty_directory_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut show = SlideshowContent::new(dir.path(), 16, 12, 2);
        assert!(matches!(show.initialize().await, Err(ContentError::Empty(_))));
    }
}
