//! Full pipeline: PiP plus display-control strategy and telemetry

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tracing::{info, warn};

use super::pip::PipPipeline;
use super::state::Transition;
use super::stats::VideoStats;
use super::strategy::{ActionOutcome, StrategyExecutor};
use super::telemetry::{Telemetry, TelemetryEvent};
use super::{Pipeline, StopHandle};
use crate::control::DisplayController;
use crate::detect::DetectionResult;
use crate::error::{BoxError, PipelineError};

pub struct IntegratedPipeline {
    pip: PipPipeline,
    controller: Box<dyn DisplayController>,
    strategy: StrategyExecutor,
    telemetry: Option<Arc<dyn Telemetry>>,
}

impl IntegratedPipeline {
    /// The PiP view is shown only for strategies that call for it.
    pub fn new(
        mut pip: PipPipeline,
        controller: Box<dyn DisplayController>,
        strategy: StrategyExecutor,
    ) -> Self {
        pip.set_show_pip(strategy.strategy().shows_pip());
        Self {
            pip,
            controller,
            strategy,
            telemetry: None,
        }
    }

    pub fn with_telemetry(mut self, telemetry: Arc<dyn Telemetry>) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    pub fn pip(&self) -> &PipPipeline {
        &self.pip
    }

    pub fn strategy(&self) -> &StrategyExecutor {
        &self.strategy
    }

    pub fn in_ad_break(&self) -> bool {
        self.pip.in_ad_break()
    }

    pub fn on_ad_start<F>(&mut self, f: F)
    where
        F: Fn(&DetectionResult) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        self.pip.on_ad_start(f);
    }

    pub fn on_ad_end<F>(&mut self, f: F)
    where
        F: Fn(&DetectionResult) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        self.pip.on_ad_end(f);
    }

    fn emit(&self, event: TelemetryEvent) {
        if let Some(telemetry) = &self.telemetry {
            telemetry.record(&event);
        }
    }

    /// Content reset, strategy action, telemetry, then observers.
    async fn handle_transition(&mut self, transition: &Transition) {
        self.pip.prepare_content(transition).await;

        let outcome = match transition {
            Transition::AdStarted { detection } => {
                self.emit(TelemetryEvent::AdBreakStarted {
                    frame: detection.frame_number,
                    confidence: detection.raw_confidence,
                });
                self.strategy.on_ad_start(self.controller.as_mut()).await
            }
            Transition::AdEnded {
                detection, frames, ..
            } => {
                self.emit(TelemetryEvent::AdBreakEnded {
                    frame: detection.frame_number,
                    frames: *frames,
                });
                self.strategy.on_ad_end(self.controller.as_mut()).await
            }
        };
        self.emit_outcome(outcome);

        self.pip.notify(transition);
    }

    fn emit_outcome(&self, outcome: ActionOutcome) {
        let event = match outcome {
            ActionOutcome::Applied(command) => TelemetryEvent::StrategyAction {
                command,
                success: true,
            },
            ActionOutcome::Failed(command) => TelemetryEvent::StrategyAction {
                command,
                success: false,
            },
            ActionOutcome::NoAction | ActionOutcome::NotNeeded => return,
        };
        self.emit(event);
    }
}

#[async_trait]
impl Pipeline for IntegratedPipeline {
    async fn initialize(&mut self) -> Result<(), PipelineError> {
        self.pip.initialize().await?;
        // Without a controller the pipeline still runs; strategy actions
        // just report that they did not take effect.
        if let Err(e) = self.controller.initialize().await {
            warn!("Display controller unavailable: {}", e);
        }
        info!(strategy = ?self.strategy.strategy(), "Integrated pipeline ready");
        Ok(())
    }

    async fn process_single_frame(&mut self) -> Result<(), PipelineError> {
        let started = Instant::now();
        let frame = self.pip.capture().await?;
        let analysis = self.pip.analyze(&frame).await?;

        if analysis.fresh {
            if let Some(detection) = self.pip.current_detection() {
                self.emit(TelemetryEvent::Detection(detection.clone()));
            }
        }
        if let Some(transition) = &analysis.transition {
            self.handle_transition(transition).await;
        }

        let frame = self.pip.render(frame).await?;
        self.pip.display(frame, started).await
    }

    /// Undo any display change still in effect before the controller goes away.
    async fn close(&mut self) -> Result<(), PipelineError> {
        let mut failures = Vec::new();

        if self.strategy.has_pending_restore() {
            info!("Restoring display state before shutdown");
            for outcome in self.strategy.restore(self.controller.as_mut()).await {
                if let ActionOutcome::Failed(command) = &outcome {
                    failures.push(format!("restore {}", command));
                }
                self.emit_outcome(outcome);
            }
        }

        match self.pip.close().await {
            Ok(()) => {}
            Err(PipelineError::Shutdown { failures: inner }) => failures.extend(inner),
            Err(e) => failures.push(e.to_string()),
        }

        if let Err(e) = self.controller.close().await {
            warn!("Failed to close display controller: {}", e);
            failures.push(format!("controller: {}", e));
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(PipelineError::Shutdown { failures })
        }
    }

    fn stop_handle(&self) -> StopHandle {
        self.pip.stop_handle()
    }

    fn get_stats(&self) -> VideoStats {
        self.pip.get_stats()
    }
}
