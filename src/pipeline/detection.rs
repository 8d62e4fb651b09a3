//! Capture → detect → display

use std::time::Instant;

use async_trait::async_trait;
use tracing::{info, warn};

use super::base::BasePipeline;
use super::observer::AdBreakObservers;
use super::state::{AdBreakState, AdBreakTracker, Transition};
use super::stats::VideoStats;
use super::{Pipeline, StopHandle};
use crate::capture::Frame;
use crate::detect::{DetectionResult, DetectionStatsHandle, Detector};
use crate::error::{BoxError, DetectError, PipelineError, Stage};

/// What one call to `analyze` produced
#[derive(Debug, Default)]
pub(crate) struct Analysis {
    /// The classifier ran on this frame (as opposed to reusing the last result)
    pub fresh: bool,
    pub transition: Option<Transition>,
}

pub struct DetectionPipeline {
    base: BasePipeline,
    detector: Detector,
    tracker: AdBreakTracker,
    observers: AdBreakObservers,
    current: Option<DetectionResult>,
    frames_seen: u64,
}

impl DetectionPipeline {
    pub fn new(base: BasePipeline, detector: Detector) -> Self {
        Self {
            base,
            detector,
            tracker: AdBreakTracker::new(),
            observers: AdBreakObservers::new(),
            current: None,
            frames_seen: 0,
        }
    }

    pub fn on_ad_start<F>(&mut self, f: F)
    where
        F: Fn(&DetectionResult) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        self.observers.on_ad_start(f);
    }

    pub fn on_ad_end<F>(&mut self, f: F)
    where
        F: Fn(&DetectionResult) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        self.observers.on_ad_end(f);
    }

    pub fn base(&self) -> &BasePipeline {
        &self.base
    }

    pub(crate) fn base_mut(&mut self) -> &mut BasePipeline {
        &mut self.base
    }

    pub fn detector(&self) -> &Detector {
        &self.detector
    }

    pub fn detection_stats(&self) -> DetectionStatsHandle {
        self.detector.stats_handle()
    }

    /// Latest detection, possibly from an earlier frame when sampling.
    pub fn current_detection(&self) -> Option<&DetectionResult> {
        self.current.as_ref()
    }

    pub fn state(&self) -> AdBreakState {
        self.tracker.state()
    }

    pub fn in_ad_break(&self) -> bool {
        self.tracker.in_ad_break()
    }

    pub fn ad_break_start(&self) -> Option<u64> {
        self.tracker.ad_break_start()
    }

    pub fn breaks_seen(&self) -> u64 {
        self.tracker.breaks_seen()
    }

    fn should_sample(&self) -> bool {
        let every = u64::from(self.base.config().detect_every_n.max(1));
        self.current.is_none() || (self.frames_seen - 1) % every == 0
    }

    /// Classify the frame (or reuse the last result) and run the state machine.
    pub(crate) async fn analyze(&mut self, frame: &Frame) -> Result<Analysis, PipelineError> {
        self.frames_seen += 1;
        if !self.should_sample() {
            return Ok(Analysis::default());
        }

        let detection = match self.detector.detect(frame).await {
            Ok(detection) => detection,
            Err(DetectError::NotInitialized) => {
                self.base.drop_frame();
                return Err(PipelineError::NotInitialized);
            }
            Err(e) => {
                self.base.drop_frame();
                return Err(PipelineError::stage(frame.sequence(), Stage::Detect, e));
            }
        };
        let transition = self.tracker.observe(&detection);
        self.current = Some(detection);
        Ok(Analysis {
            fresh: true,
            transition,
        })
    }

    pub(crate) fn notify(&self, transition: &Transition) {
        let failed = self.observers.notify(transition);
        if failed > 0 {
            warn!(
                frame = transition.detection().frame_number,
                failed, "Some ad-break observers failed"
            );
        }
    }

    /// Release the detector, recording a failure instead of stopping.
    pub(crate) async fn close_detector(&mut self, failures: &mut Vec<String>) {
        if let Err(e) = self.detector.close().await {
            warn!("Failed to close detector: {}", e);
            failures.push(format!("detector: {}", e));
        }
    }
}

#[async_trait]
impl Pipeline for DetectionPipeline {
    async fn initialize(&mut self) -> Result<(), PipelineError> {
        self.base.initialize().await?;
        if let Err(e) = self.detector.initialize().await {
            self.base.mark_uninitialized();
            return Err(PipelineError::Init {
                component: "detector",
                source: e.into(),
            });
        }
        self.detector.reset_history();
        self.tracker = AdBreakTracker::new();
        self.current = None;
        self.frames_seen = 0;
        info!(
            "Detection enabled (every {} frame(s))",
            self.base.config().detect_every_n.max(1)
        );
        Ok(())
    }

    async fn process_single_frame(&mut self) -> Result<(), PipelineError> {
        let started = Instant::now();
        let frame = self.base.capture().await?;
        let analysis = self.analyze(&frame).await?;
        if let Some(transition) = &analysis.transition {
            self.notify(transition);
        }
        self.base.display(frame, started).await
    }

    async fn close(&mut self) -> Result<(), PipelineError> {
        let mut failures = Vec::new();
        self.base.close_source(&mut failures).await;
        self.close_detector(&mut failures).await;
        self.base.close_sink(&mut failures).await;
        self.base.finish_close(failures)
    }

    fn stop_handle(&self) -> StopHandle {
        self.base.stop_handle()
    }

    fn get_stats(&self) -> VideoStats {
        self.base.get_stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;

    use crate::capture::TestPatternSource;
    use crate::config::{DetectorConfig, PipelineConfig, VideoMode};
    use crate::detect::{ScriptedClassifier, TensorShape};
    use crate::display::NullSink;

    fn pipeline(scores: Vec<f32>, every: u32) -> (DetectionPipeline, Arc<ScriptedCalls>) {
        pipeline_with(ScriptedClassifier::new(scores), every)
    }

    fn pipeline_with(
        classifier: ScriptedClassifier,
        every: u32,
    ) -> (DetectionPipeline, Arc<ScriptedCalls>) {
        let mut config = PipelineConfig::new(VideoMode::new(32, 24, 30));
        config.detect_every_n = every;
        let base = BasePipeline::new(
            config,
            Box::new(TestPatternSource::new(32, 24)),
            Box::new(NullSink::new(32, 24)),
        )
        .unwrap();

        let detector_config = DetectorConfig {
            temporal_window: 3,
            temporal_threshold: 0.67,
            ..Default::default()
        };
        let classifier = classifier.with_input_shape(TensorShape::image(16, 16));
        let detector = Detector::new(detector_config, Box::new(classifier)).unwrap();

        let calls = Arc::new(ScriptedCalls::default());
        let mut pipeline = DetectionPipeline::new(base, detector);
        let starts = calls.clone();
        pipeline.on_ad_start(move |_| {
            starts.starts.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        let ends = calls.clone();
        pipeline.on_ad_end(move |_| {
            ends.ends.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        (pipeline, calls)
    }

    #[derive(Default)]
    struct ScriptedCalls {
        starts: AtomicU64,
        ends: AtomicU64,
    }

    #[tokio::test]
    async fn smoothed_sequence_drives_transitions() {
        let (mut pipeline, calls) = pipeline(vec![0.9, 0.2, 0.9, 0.9, 0.1, 0.1, 0.1], 1);
        pipeline.initialize().await.unwrap();

        let mut smoothed = Vec::new();
        for _ in 0..7 {
            pipeline.process_single_frame().await.unwrap();
            smoothed.push(pipeline.current_detection().unwrap().is_ad);
        }

        assert_eq!(smoothed, vec![true, false, true, true, true, false, false]);
        assert_eq!(calls.starts.load(Ordering::SeqCst), 2);
        assert_eq!(calls.ends.load(Ordering::SeqCst), 2);
        assert!(!pipeline.in_ad_break());
    }

    #[tokio::test]
    async fn sampling_reuses_last_detection() {
        let (mut pipeline, _) = pipeline(vec![0.9, 0.9], 3);
        pipeline.initialize().await.unwrap();

        for _ in 0..4 {
            pipeline.process_single_frame().await.unwrap();
        }
        // frames 1 and 4 classified
        assert_eq!(pipeline.detector().get_stats().total_frames, 2);
        assert_eq!(pipeline.current_detection().unwrap().frame_number, 4);
        assert_eq!(pipeline.get_stats().frames_displayed, 4);
    }

    #[tokio::test]
    async fn model_load_failure_leaves_pipeline_unusable() {
        let (mut pipeline, _) =
            pipeline_with(ScriptedClassifier::new([0.9]).failing_load(), 1);

        let err = pipeline.initialize().await.unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Init {
                component: "detector",
                ..
            }
        ));
        assert!(!pipeline.base().is_initialized());

        let err = pipeline.process_single_frame().await.unwrap_err();
        assert!(matches!(err, PipelineError::NotInitialized));
        assert!(err.is_fatal());

        let run = tokio::time::timeout(std::time::Duration::from_secs(5), pipeline.run())
            .await
            .expect("run must return");
        assert!(matches!(run, Err(PipelineError::NotInitialized)));
        assert_eq!(pipeline.get_stats().frames_displayed, 0);
    }

    #[tokio::test]
    async fn detector_used_after_close_ends_the_run() {
        let (mut pipeline, _) = pipeline(vec![0.1; 4], 1);
        pipeline.initialize().await.unwrap();
        pipeline.process_single_frame().await.unwrap();

        pipeline.detector.close().await.unwrap();
        let err = pipeline.run().await.unwrap_err();
        assert!(matches!(err, PipelineError::NotInitialized));

        let stats = pipeline.get_stats();
        assert_eq!(stats.frames_captured, 2);
        assert_eq!(stats.frames_dropped, 1);
        assert_eq!(stats.frames_displayed, 1);
    }

    #[tokio::test]
    async fn detection_failure_is_frame_local() {
        let (mut pipeline, _) = pipeline(vec![0.1, f32::NAN, 0.1], 1);
        pipeline.initialize().await.unwrap();

        pipeline.process_single_frame().await.unwrap();
        let err = pipeline.process_single_frame().await.unwrap_err();
        assert_eq!(err.failed_stage(), Some(Stage::Detect));
        assert_eq!(err.frame(), Some(2));
        assert!(!err.is_fatal());
        pipeline.process_single_frame().await.unwrap();

        let stats = pipeline.get_stats();
        assert_eq!(stats.frames_dropped, 1);
        assert_eq!(stats.frames_displayed, 2);
    }
}
