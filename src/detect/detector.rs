//! Ad detector: preprocessing, scoring and temporal smoothing

use std::sync::Arc;
use std::time::Instant;

use arc_swap::ArcSwap;
use tracing::{debug, info, instrument};

use super::classifier::Classifier;
use super::preprocess::Preprocessor;
use super::result::{DetectionResult, DetectionStats};
use super::smoothing::TemporalSmoother;
use crate::capture::Frame;
use crate::config::DetectorConfig;
use crate::error::{ConfigError, DetectError};

/// Read-only view of a detector's counters, usable from any task
#[derive(Clone)]
pub struct DetectionStatsHandle(Arc<ArcSwap<DetectionStats>>);

impl DetectionStatsHandle {
    pub fn get(&self) -> DetectionStats {
        (**self.0.load()).clone()
    }
}

pub struct Detector {
    config: DetectorConfig,
    preprocessor: Preprocessor,
    classifier: Box<dyn Classifier>,
    smoother: TemporalSmoother,
    stats: DetectionStats,
    published: Arc<ArcSwap<DetectionStats>>,
    initialized: bool,
}

impl Detector {
    pub fn new(config: DetectorConfig, classifier: Box<dyn Classifier>) -> Result<Self, ConfigError> {
        config.validate()?;
        let preprocessor = Preprocessor::new(classifier.input_shape());
        let smoother = TemporalSmoother::new(config.temporal_window, config.temporal_threshold);

        Ok(Self {
            config,
            preprocessor,
            classifier,
            smoother,
            stats: DetectionStats::default(),
            published: Arc::new(ArcSwap::from_pointee(DetectionStats::default())),
            initialized: false,
        })
    }

    /// Swap the default ImageNet normalisation for the model's own.
    pub fn with_preprocessor(mut self, preprocessor: Preprocessor) -> Self {
        self.preprocessor = preprocessor;
        self
    }

    pub async fn initialize(&mut self) -> Result<(), DetectError> {
        info!(
            "Loading classifier {} (model: {:?})",
            self.classifier.model_version(),
            self.config.model_path
        );
        self.classifier.initialize().await?;

        if self.preprocessor.shape() != self.classifier.input_shape() {
            return Err(DetectError::ModelLoad(format!(
                "preprocessor produces {:?} but the model expects {:?}",
                self.preprocessor.shape(),
                self.classifier.input_shape()
            )));
        }

        self.initialized = true;
        info!(
            window = self.config.temporal_window,
            threshold = self.config.temporal_threshold,
            "Detector ready"
        );
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized && self.classifier.is_ready()
    }

    /// Score one frame and fold it into the smoothing window.
    #[instrument(skip(self, frame), fields(frame = frame.sequence()))]
    pub async fn detect(&mut self, frame: &Frame) -> Result<DetectionResult, DetectError> {
        if !self.initialized {
            return Err(DetectError::NotInitialized);
        }
        let started = Instant::now();

        let preprocessor = self.preprocessor.clone();
        let input = frame.clone();
        let tensor = tokio::task::spawn_blocking(move || preprocessor.process(&input)).await??;

        let score = self.classifier.predict(&tensor).await?;
        if !score.is_finite() {
            return Err(DetectError::Inference(format!("model returned {}", score)));
        }
        let score = score.clamp(0.0, 1.0);
        let inference_duration = started.elapsed();

        let raw = score >= self.config.confidence_threshold;
        let is_ad = self.smoother.push(raw);

        let result = DetectionResult {
            is_ad,
            raw_confidence: score,
            frame_number: frame.sequence(),
            inference_duration,
            model_version: self.classifier.model_version().to_string(),
            positive_ratio: self.smoother.positive_ratio(),
        };
        debug!(
            score,
            raw,
            is_ad,
            ratio = result.positive_ratio,
            "frame classified"
        );
        metrics::histogram!("inference_time_ms").record(inference_duration.as_secs_f64() * 1000.0);

        self.stats.record(&result);
        self.published.store(Arc::new(self.stats.clone()));
        Ok(result)
    }

    pub fn get_stats(&self) -> DetectionStats {
        self.stats.clone()
    }

    pub fn stats_handle(&self) -> DetectionStatsHandle {
        DetectionStatsHandle(self.published.clone())
    }

    pub fn reset_stats(&mut self) {
        self.stats = DetectionStats::default();
        self.published.store(Arc::new(DetectionStats::default()));
    }

    /// Forget the smoothing window, e.g. after a source change.
    pub fn reset_history(&mut self) {
        self.smoother.clear();
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    pub async fn close(&mut self) -> Result<(), DetectError> {
        self.initialized = false;
        self.classifier.close().await
    }
}
