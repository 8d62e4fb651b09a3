//! Frame loop orchestration
//!
//! Four layers, each wrapping the previous one:
//! [`BasePipeline`] (capture → display), [`DetectionPipeline`] (+ ad
//! detection), [`PipPipeline`] (+ alternate content composited while an ad
//! break is on) and [`IntegratedPipeline`] (+ display-control strategy and
//! telemetry). Every layer processes exactly one frame at a time.

pub mod base;
pub mod detection;
pub mod integrated;
pub mod observer;
pub mod pip;
pub mod state;
pub mod stats;
pub mod strategy;
pub mod telemetry;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{error, info, warn};

use crate::error::PipelineError;

pub use base::BasePipeline;
pub use detection::DetectionPipeline;
pub use integrated::IntegratedPipeline;
pub use observer::AdBreakObservers;
pub use pip::PipPipeline;
pub use state::{AdBreakState, AdBreakTracker, Transition};
pub use stats::{StatsCollector, VideoStats};
pub use strategy::{ActionOutcome, AdResponseStrategy, StrategyExecutor};
pub use telemetry::{ChannelTelemetry, MetricsTelemetry, Telemetry, TelemetryEvent};

/// Cooperative stop flag, checked once per loop iteration
#[derive(Debug, Clone, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

#[async_trait]
pub trait Pipeline: Send {
    async fn initialize(&mut self) -> Result<(), PipelineError>;

    /// Capture, process and display exactly one frame.
    async fn process_single_frame(&mut self) -> Result<(), PipelineError>;

    /// Release everything, attempting every resource even if one fails.
    async fn close(&mut self) -> Result<(), PipelineError>;

    fn stop_handle(&self) -> StopHandle;

    fn get_stats(&self) -> VideoStats;

    fn stop(&self) {
        self.stop_handle().stop();
    }

    /// Loop until stopped. Fatal errors end the loop and are returned;
    /// frame-local ones are logged and the next frame is attempted.
    async fn run(&mut self) -> Result<(), PipelineError> {
        let stop = self.stop_handle();
        info!("Pipeline running");

        while !stop.is_stopped() {
            match self.process_single_frame().await {
                Ok(()) => {}
                Err(e) if e.is_fatal() => {
                    error!("Pipeline aborted: {}", e);
                    return Err(e);
                }
                Err(e) => warn!("Frame dropped: {}", e),
            }
            // Let a stop request from another task land even if no stage awaited.
            tokio::task::yield_now().await;
        }

        let stats = self.get_stats();
        info!(
            captured = stats.frames_captured,
            displayed = stats.frames_displayed,
            dropped = stats.frames_dropped,
            "Pipeline stopped"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stop_handle_is_shared() {
        let handle = StopHandle::new();
        let clone = handle.clone();
        assert!(!clone.is_stopped());
        handle.stop();
        assert!(clone.is_stopped());
    }
}
