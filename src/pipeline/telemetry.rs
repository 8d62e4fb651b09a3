//! Events forwarded out of the frame loop

use std::sync::atomic::{AtomicU64, Ordering};

use flume::{Receiver, Sender, TrySendError};
use tracing::{debug, info};

use crate::control::DisplayCommand;
use crate::detect::DetectionResult;

#[derive(Debug, Clone, PartialEq)]
pub enum TelemetryEvent {
    Detection(DetectionResult),
    AdBreakStarted {
        frame: u64,
        confidence: f32,
    },
    AdBreakEnded {
        frame: u64,
        frames: u64,
    },
    StrategyAction {
        command: DisplayCommand,
        success: bool,
    },
}

/// Receives events from the frame loop; must not block.
pub trait Telemetry: Send + Sync {
    fn record(&self, event: &TelemetryEvent);
}

/// Folds events into the `metrics` facade and the log
#[derive(Debug, Default)]
pub struct MetricsTelemetry;

impl Telemetry for MetricsTelemetry {
    fn record(&self, event: &TelemetryEvent) {
        match event {
            TelemetryEvent::Detection(d) => {
                metrics::gauge!("detection_confidence").set(d.raw_confidence as f64);
                metrics::gauge!("detection_positive_ratio").set(d.positive_ratio as f64);
            }
            TelemetryEvent::AdBreakStarted { frame, confidence } => {
                info!(frame, confidence, "telemetry: ad break started");
            }
            TelemetryEvent::AdBreakEnded { frame, frames } => {
                metrics::histogram!("ad_break_frames").record(*frames as f64);
                info!(frame, frames, "telemetry: ad break ended");
            }
            TelemetryEvent::StrategyAction { command, success } => {
                debug!(%command, success, "telemetry: strategy action");
            }
        }
    }
}

/// Hands events to another task over a bounded channel.
///
/// When the consumer falls behind, new events are dropped and counted
/// instead of stalling the loop.
#[derive(Debug)]
pub struct ChannelTelemetry {
    tx: Sender<TelemetryEvent>,
    dropped: AtomicU64,
}

impl ChannelTelemetry {
    pub fn bounded(capacity: usize) -> (Self, Receiver<TelemetryEvent>) {
        let (tx, rx) = flume::bounded(capacity);
        (
            Self {
                tx,
                dropped: AtomicU64::new(0),
            },
            rx,
        )
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl Telemetry for ChannelTelemetry {
    fn record(&self, event: &TelemetryEvent) {
        match self.tx.try_send(event.clone()) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}
