//! Capture → detect → composite alternate content → display

use std::time::Instant;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use super::detection::{Analysis, DetectionPipeline};
use super::state::Transition;
use super::stats::VideoStats;
use super::{Pipeline, StopHandle};
use crate::capture::Frame;
use crate::compose::Compositor;
use crate::content::AlternateContentSource;
use crate::detect::DetectionResult;
use crate::error::{BoxError, ContentError, PipelineError, Stage};

/// While an ad break is on, alternate content fills the screen and the
/// programme shrinks into the inset.
pub struct PipPipeline {
    detection: DetectionPipeline,
    compositor: Compositor,
    content: Box<dyn AlternateContentSource>,
    show_pip: bool,
}

impl PipPipeline {
    pub fn new(
        detection: DetectionPipeline,
        compositor: Compositor,
        content: Box<dyn AlternateContentSource>,
    ) -> Self {
        Self {
            detection,
            compositor,
            content,
            show_pip: true,
        }
    }

    /// Turn the picture-in-picture view on or off; detection keeps running.
    pub fn set_show_pip(&mut self, show: bool) {
        self.show_pip = show;
    }

    pub fn shows_pip(&self) -> bool {
        self.show_pip
    }

    pub fn detection(&self) -> &DetectionPipeline {
        &self.detection
    }

    pub fn compositor(&self) -> &Compositor {
        &self.compositor
    }

    pub fn in_ad_break(&self) -> bool {
        self.detection.in_ad_break()
    }

    pub fn current_detection(&self) -> Option<&DetectionResult> {
        self.detection.current_detection()
    }

    pub fn on_ad_start<F>(&mut self, f: F)
    where
        F: Fn(&DetectionResult) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        self.detection.on_ad_start(f);
    }

    pub fn on_ad_end<F>(&mut self, f: F)
    where
        F: Fn(&DetectionResult) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        self.detection.on_ad_end(f);
    }

    pub(crate) async fn capture(&mut self) -> Result<Frame, PipelineError> {
        self.detection.base_mut().capture().await
    }

    pub(crate) async fn analyze(&mut self, frame: &Frame) -> Result<Analysis, PipelineError> {
        self.detection.analyze(frame).await
    }

    pub(crate) async fn display(&mut self, frame: Frame, started: Instant) -> Result<(), PipelineError> {
        self.detection.base_mut().display(frame, started).await
    }

    pub(crate) fn notify(&self, transition: &Transition) {
        self.detection.notify(transition);
    }

    /// Rewind the alternate content at the start of every break.
    pub(crate) async fn prepare_content(&mut self, transition: &Transition) {
        if !transition.is_start() {
            return;
        }
        if let Err(e) = self.content.reset().await {
            warn!("Failed to rewind alternate content: {}", e);
        }
    }

    /// Composite the alternate content over the frame while in an ad break.
    pub(crate) async fn render(&mut self, frame: Frame) -> Result<Frame, PipelineError> {
        if !(self.show_pip && self.detection.in_ad_break()) {
            return Ok(frame);
        }
        let sequence = frame.sequence();

        let alternate = match self.content.get_frame().await {
            Ok(alternate) => alternate,
            Err(ContentError::NotInitialized) => {
                self.detection.base().drop_frame();
                return Err(PipelineError::NotInitialized);
            }
            Err(e) => {
                self.detection.base().drop_frame();
                return Err(PipelineError::stage(sequence, Stage::Content, e));
            }
        };
        match self.compositor.compose_async(frame, Some(alternate), true).await {
            Ok(composed) => {
                debug!(frame = sequence, "alternate content composited");
                Ok(composed)
            }
            Err(e) => {
                self.detection.base().drop_frame();
                Err(PipelineError::stage(sequence, Stage::Compose, e))
            }
        }
    }

    pub(crate) async fn close_content(&mut self, failures: &mut Vec<String>) {
        if let Err(e) = self.content.close().await {
            warn!("Failed to close alternate content: {}", e);
            failures.push(format!("content: {}", e));
        }
    }
}

#[async_trait]
impl Pipeline for PipPipeline {
    async fn initialize(&mut self) -> Result<(), PipelineError> {
        self.detection.initialize().await?;
        if let Err(e) = self.content.initialize().await {
            self.detection.base_mut().mark_uninitialized();
            return Err(PipelineError::Init {
                component: "alternate content",
                source: e.into(),
            });
        }
        let (w, h) = self.compositor.canvas_size();
        info!(
            "PiP enabled: {}x{} canvas, inset {:?}",
            w,
            h,
            self.compositor.config().inset.position
        );
        Ok(())
    }

    async fn process_single_frame(&mut self) -> Result<(), PipelineError> {
        let started = Instant::now();
        let frame = self.capture().await?;
        let analysis = self.analyze(&frame).await?;
        if let Some(transition) = &analysis.transition {
            self.prepare_content(transition).await;
            self.notify(transition);
        }
        let frame = self.render(frame).await?;
        self.display(frame, started).await
    }

    /// Capture, then detector, then content, then display. The compositor
    /// holds no external resources.
    async fn close(&mut self) -> Result<(), PipelineError> {
        let mut failures = Vec::new();
        self.detection.base_mut().close_source(&mut failures).await;
        self.detection.close_detector(&mut failures).await;
        self.close_content(&mut failures).await;
        self.detection.base_mut().close_sink(&mut failures).await;
        self.detection.base_mut().finish_close(failures)
    }

    fn stop_handle(&self) -> StopHandle {
        self.detection.stop_handle()
    }

    fn get_stats(&self) -> VideoStats {
        self.detection.get_stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{Origin, TestPatternSource};
    use crate::compose::{CompositorConfig, InsetConfig, InsetPosition};
    use crate::config::{DetectorConfig, PipelineConfig, VideoMode};
    use crate::content::{Pattern, PatternContent, SlideshowContent};
    use crate::detect::{Detector, ScriptedClassifier, TensorShape};
    use crate::display::NullSink;
    use crate::pipeline::BasePipeline;

    const W: u32 = 64;
    const H: u32 = 36;

    fn pipeline(scores: Vec<f32>) -> PipPipeline {
        let base = BasePipeline::new(
            PipelineConfig::new(VideoMode::new(W, H, 30)),
            Box::new(TestPatternSource::new(W, H).with_fill([200, 0, 0])),
            Box::new(NullSink::new(W, H)),
        )
        .unwrap();
        let classifier =
            ScriptedClassifier::new(scores).with_input_shape(TensorShape::image(8, 8));
        let detector = Detector::new(
            DetectorConfig {
                temporal_window: 1,
                temporal_threshold: 1.0,
                ..Default::default()
            },
            Box::new(classifier),
        )
        .unwrap();
        let compositor = Compositor::new(CompositorConfig {
            enabled: true,
            canvas_width: W,
            canvas_height: H,
            inset: InsetConfig {
                position: InsetPosition::TopLeft,
                width: 16,
                height: 9,
                margin: 2,
                border_width: 0,
                ..Default::default()
            },
        })
        .unwrap();
        let content = PatternContent::new(W, H, Pattern::Solid([0, 0, 200]));
        PipPipeline::new(
            DetectionPipeline::new(base, detector),
            compositor,
            Box::new(content),
        )
    }

    fn pixel(frame: &Frame, x: u32, y: u32) -> [u8; 3] {
        let i = ((y * W + x) * 3) as usize;
        [frame.data[i], frame.data[i + 1], frame.data[i + 2]]
    }

    #[tokio::test]
    async fn content_frames_pass_through() {
        let mut pip = pipeline(vec![0.1]);
        pip.initialize().await.unwrap();
        let frame = pip.capture().await.unwrap();
        pip.analyze(&frame).await.unwrap();
        let out = pip.render(frame.clone()).await.unwrap();
        assert_eq!(out.data, frame.data);
        assert_eq!(out.meta.origin, Origin::Synthetic);
    }

    #[tokio::test]
    async fn ad_break_swaps_in_alternate_content() {
        let mut pip = pipeline(vec![0.9]);
        pip.initialize().await.unwrap();
        let frame = pip.capture().await.unwrap();
        let analysis = pip.analyze(&frame).await.unwrap();
        assert!(analysis.transition.unwrap().is_start());

        let out = pip.render(frame).await.unwrap();
        assert_eq!(out.meta.origin, Origin::Composite);
        assert_eq!(out.sequence(), 1);
        // alternate fills the canvas, programme sits in the top-left inset
        assert_eq!(pixel(&out, W - 1, H - 1), [0, 0, 200]);
        let inset = pixel(&out, 5, 5);
        assert!(inset[0] > 190 && inset[2] < 10, "inset pixel {:?}", inset);
    }

    #[tokio::test]
    async fn disabled_pip_keeps_programme_on_screen() {
        let mut pip = pipeline(vec![0.9]);
        pip.set_show_pip(false);
        pip.initialize().await.unwrap();
        pip.process_single_frame().await.unwrap();
        assert!(pip.in_ad_break());
        assert_eq!(pip.get_stats().frames_displayed, 1);
    }

    #[tokio::test]
    async fn content_used_before_initialize_is_fatal() {
        let mut pip = pipeline(vec![0.9, 0.9]);
        pip.initialize().await.unwrap();
        pip.content.close().await.unwrap();

        let err = pip.process_single_frame().await.unwrap_err();
        assert!(matches!(err, PipelineError::NotInitialized));
        assert!(err.is_fatal());
        assert_eq!(pip.get_stats().frames_dropped, 1);
    }

    #[tokio::test]
    async fn content_load_failure_rolls_back_initialize() {
        let mut pip = pipeline(vec![0.9]);
        let dir = tempfile::tempdir().unwrap();
        pip.content = Box::new(SlideshowContent::new(dir.path().to_path_buf(), W, H, 1));

        let err = pip.initialize().await.unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Init {
                component: "alternate content",
                ..
            }
        ));
        assert!(!pip.detection().base().is_initialized());
        assert!(matches!(
            pip.process_single_frame().await,
            Err(PipelineError::NotInitialized)
        ));
    }

    #[tokio::test]
    async fn close_releases_everything() {
        let mut pip = pipeline(vec![0.1, 0.9]);
        pip.initialize().await.unwrap();
        pip.process_single_frame().await.unwrap();
        pip.process_single_frame().await.unwrap();
        pip.close().await.unwrap();
        let err = pip.process_single_frame().await.unwrap_err();
        assert!(matches!(err, PipelineError::NotInitialized));
    }
}
