//! Capture straight to display

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tracing::{debug, info, instrument, warn};

use super::stats::{StatsCollector, VideoStats};
use super::{Pipeline, StopHandle};
use crate::capture::{Frame, FrameSource};
use crate::config::PipelineConfig;
use crate::display::FrameSink;
use crate::error::{ConfigError, PipelineError, Stage};

pub struct BasePipeline {
    config: PipelineConfig,
    source: Box<dyn FrameSource>,
    sink: Box<dyn FrameSink>,
    stats: Arc<StatsCollector>,
    stop: StopHandle,
    initialized: bool,
    last_sequence: u64,
    last_report: Instant,
}

impl BasePipeline {
    pub fn new(
        config: PipelineConfig,
        source: Box<dyn FrameSource>,
        sink: Box<dyn FrameSink>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            source,
            sink,
            stats: Arc::new(StatsCollector::new()),
            stop: StopHandle::new(),
            initialized: false,
            last_sequence: 0,
            last_report: Instant::now(),
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Counters shared with the loop, for reading from another task.
    pub fn stats_handle(&self) -> Arc<StatsCollector> {
        self.stats.clone()
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub(crate) fn ensure_initialized(&self) -> Result<(), PipelineError> {
        if self.initialized {
            Ok(())
        } else {
            Err(PipelineError::NotInitialized)
        }
    }

    /// Undo a successful `initialize` when an outer layer fails to come up.
    pub(crate) fn mark_uninitialized(&mut self) {
        self.initialized = false;
    }

    /// Count a frame that was captured but will never reach the display.
    pub(crate) fn drop_frame(&self) {
        self.stats.record_dropped();
    }

    pub(crate) async fn capture(&mut self) -> Result<Frame, PipelineError> {
        self.ensure_initialized()?;
        match self.source.capture_frame().await {
            Ok(frame) => {
                self.stats.record_captured();
                self.last_sequence = frame.sequence();
                Ok(frame)
            }
            Err(e) => {
                self.stats.record_dropped();
                Err(PipelineError::stage(self.last_sequence + 1, Stage::Capture, e))
            }
        }
    }

    /// Show a frame and account for its capture-to-display latency.
    #[instrument(skip_all, fields(frame = frame.sequence()))]
    pub(crate) async fn display(&mut self, frame: Frame, started: Instant) -> Result<(), PipelineError> {
        let sequence = frame.sequence();
        if let Err(e) = self.sink.display_frame(frame).await {
            self.stats.record_dropped();
            return Err(PipelineError::stage(sequence, Stage::Display, e));
        }

        let latency = started.elapsed();
        self.stats.record_displayed(latency);
        if latency > self.config.max_latency() {
            self.stats.record_latency_warning();
            warn!(
                frame = sequence,
                latency_ms = latency.as_secs_f64() * 1000.0,
                budget_ms = self.config.max_latency_ms,
                "Frame over latency budget"
            );
        }

        self.maybe_report();
        Ok(())
    }

    fn maybe_report(&mut self) {
        if !self.config.stats_enabled || self.last_report.elapsed() < self.config.stats_interval() {
            return;
        }
        self.last_report = Instant::now();
        let s = self.stats.snapshot();
        info!(
            "{:.1} fps | captured {} displayed {} dropped {} ({:.2}%) | latency {:.1}/{:.1}/{:.1} ms | {} over budget",
            s.fps,
            s.frames_captured,
            s.frames_displayed,
            s.frames_dropped,
            s.drop_rate * 100.0,
            s.latency_min_ms,
            s.latency_avg_ms,
            s.latency_max_ms,
            s.latency_warnings
        );
    }

    pub(crate) async fn close_source(&mut self, failures: &mut Vec<String>) {
        if let Err(e) = self.source.close().await {
            warn!("Failed to close capture: {}", e);
            failures.push(format!("capture: {}", e));
        }
    }

    pub(crate) async fn close_sink(&mut self, failures: &mut Vec<String>) {
        if let Err(e) = self.sink.close().await {
            warn!("Failed to close display: {}", e);
            failures.push(format!("display: {}", e));
        }
    }

    pub(crate) fn finish_close(&mut self, failures: Vec<String>) -> Result<(), PipelineError> {
        self.initialized = false;
        if failures.is_empty() {
            info!("Pipeline closed");
            Ok(())
        } else {
            Err(PipelineError::Shutdown { failures })
        }
    }
}

#[async_trait]
impl Pipeline for BasePipeline {
    async fn initialize(&mut self) -> Result<(), PipelineError> {
        info!("Initializing pipeline at {}", self.config.mode);
        self.source
            .initialize()
            .await
            .map_err(|e| PipelineError::Init {
                component: "capture",
                source: e.into(),
            })?;
        self.sink
            .initialize()
            .await
            .map_err(|e| PipelineError::Init {
                component: "display",
                source: e.into(),
            })?;

        self.stats.reset();
        self.last_report = Instant::now();
        self.initialized = true;
        debug!("Capture and display ready");
        Ok(())
    }

    async fn process_single_frame(&mut self) -> Result<(), PipelineError> {
        let started = Instant::now();
        let frame = self.capture().await?;
        self.display(frame, started).await
    }

    async fn close(&mut self) -> Result<(), PipelineError> {
        let mut failures = Vec::new();
        self.close_source(&mut failures).await;
        self.close_sink(&mut failures).await;
        self.finish_close(failures)
    }

    fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    fn get_stats(&self) -> VideoStats {
        self.stats.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{InjectedFault, TestPatternSource};
    use crate::config::VideoMode;
    use crate::display::NullSink;

    fn pipeline(source: TestPatternSource) -> (BasePipeline, std::sync::Arc<std::sync::atomic::AtomicU64>) {
        let sink = NullSink::new(64, 48);
        let shown = sink.counter();
        let base = BasePipeline::new(
            PipelineConfig::new(VideoMode::new(64, 48, 30)),
            Box::new(source),
            Box::new(sink),
        )
        .unwrap();
        (base, shown)
    }

    #[tokio::test]
    async fn frames_pass_through() {
        let (mut base, shown) = pipeline(TestPatternSource::new(64, 48));
        base.initialize().await.unwrap();
        for _ in 0..5 {
            base.process_single_frame().await.unwrap();
        }
        let stats = base.get_stats();
        assert_eq!(stats.frames_captured, 5);
        assert_eq!(stats.frames_displayed, 5);
        assert_eq!(shown.load(std::sync::atomic::Ordering::Relaxed), 5);
        base.close().await.unwrap();
    }

    #[tokio::test]
    async fn processing_before_initialize_is_fatal() {
        let (mut base, _) = pipeline(TestPatternSource::new(64, 48));
        let err = base.process_single_frame().await.unwrap_err();
        assert!(matches!(err, PipelineError::NotInitialized));
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn capture_failure_counts_a_drop() {
        let (mut base, _) =
            pipeline(TestPatternSource::new(64, 48).fail_after(2, InjectedFault::Hardware));
        base.initialize().await.unwrap();
        base.process_single_frame().await.unwrap();
        base.process_single_frame().await.unwrap();

        let err = base.process_single_frame().await.unwrap_err();
        assert_eq!(err.failed_stage(), Some(Stage::Capture));
        assert_eq!(err.frame(), Some(3));
        let stats = base.get_stats();
        assert_eq!(stats.frames_dropped, 1);
        assert!(stats.frames_displayed <= stats.frames_captured);
    }

    #[tokio::test]
    async fn run_returns_on_fatal_error() {
        let (mut base, shown) =
            pipeline(TestPatternSource::new(64, 48).fail_after(4, InjectedFault::Timeout));
        base.initialize().await.unwrap();
        let err = base.run().await.unwrap_err();
        assert_eq!(err.failed_stage(), Some(Stage::Capture));
        assert_eq!(shown.load(std::sync::atomic::Ordering::Relaxed), 4);
    }

    #[tokio::test]
    async fn run_exits_when_already_stopped() {
        let (mut base, shown) = pipeline(TestPatternSource::new(64, 48));
        base.initialize().await.unwrap();
        base.stop();
        base.run().await.unwrap();
        assert_eq!(shown.load(std::sync::atomic::Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn slow_display_counts_a_latency_warning() {
        // first tick is immediate, the second holds the frame for ~20ms
        let sink = NullSink::new(64, 48).paced(50);
        let mut config = PipelineConfig::new(VideoMode::new(64, 48, 30));
        config.max_latency_ms = 1;
        let mut base = BasePipeline::new(
            config,
            Box::new(TestPatternSource::new(64, 48)),
            Box::new(sink),
        )
        .unwrap();
        base.initialize().await.unwrap();

        base.process_single_frame().await.unwrap();
        base.process_single_frame().await.unwrap();

        let stats = base.get_stats();
        assert!(stats.latency_warnings >= 1);
        assert_eq!(stats.frames_displayed, 2);
        assert_eq!(stats.frames_dropped, 0);
    }

    #[tokio::test]
    async fn mismatched_output_mode_fails_display() {
        let sink = NullSink::new(32, 32);
        let mut base = BasePipeline::new(
            PipelineConfig::new(VideoMode::new(64, 48, 30)),
            Box::new(TestPatternSource::new(64, 48)),
            Box::new(sink),
        )
        .unwrap();
        base.initialize().await.unwrap();
        let err = base.process_single_frame().await.unwrap_err();
        assert_eq!(err.failed_stage(), Some(Stage::Display));
        assert!(err.is_fatal());
    }
}
