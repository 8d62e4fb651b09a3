//! CONTENT / AD_BREAK state machine

use tracing::info;

use crate::detect::DetectionResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AdBreakState {
    #[default]
    Content,
    AdBreak,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    AdStarted {
        detection: DetectionResult,
    },
    AdEnded {
        detection: DetectionResult,
        started_at: u64,
        /// Frames between the triggering detections
        frames: u64,
    },
}

impl Transition {
    pub fn detection(&self) -> &DetectionResult {
        match self {
            Transition::AdStarted { detection } | Transition::AdEnded { detection, .. } => {
                detection
            }
        }
    }

    pub fn is_start(&self) -> bool {
        matches!(self, Transition::AdStarted { .. })
    }
}

/// Emits a transition only on the frame where the smoothed decision flips
#[derive(Debug, Default)]
pub struct AdBreakTracker {
    state: AdBreakState,
    break_started_at: Option<u64>,
    breaks: u64,
}

impl AdBreakTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&mut self, detection: &DetectionResult) -> Option<Transition> {
        match (self.state, detection.is_ad) {
            (AdBreakState::Content, true) => {
                self.state = AdBreakState::AdBreak;
                self.break_started_at = Some(detection.frame_number);
                self.breaks += 1;
                metrics::counter!("ad_breaks_total").increment(1);
                info!(
                    frame = detection.frame_number,
                    confidence = detection.raw_confidence,
                    "Ad break started"
                );
                Some(Transition::AdStarted {
                    detection: detection.clone(),
                })
            }
            (AdBreakState::AdBreak, false) => {
                self.state = AdBreakState::Content;
                let started_at = self.break_started_at.take().unwrap_or(detection.frame_number);
                let frames = detection.frame_number.saturating_sub(started_at);
                info!(
                    frame = detection.frame_number,
                    frames, "Ad break ended"
                );
                Some(Transition::AdEnded {
                    detection: detection.clone(),
                    started_at,
                    frames,
                })
            }
            _ => None,
        }
    }

    pub fn state(&self) -> AdBreakState {
        self.state
    }

    pub fn in_ad_break(&self) -> bool {
        self.state == AdBreakState::AdBreak
    }

    /// Frame that opened the current break
    pub fn ad_break_start(&self) -> Option<u64> {
        self.break_started_at
    }

    pub fn breaks_seen(&self) -> u64 {
        self.breaks
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn detection(frame: u64, is_ad: bool) -> DetectionResult {
        DetectionResult {
            is_ad,
            raw_confidence: if is_ad { 0.95 } else { 0.05 },
            frame_number: frame,
            inference_duration: Duration::from_millis(3),
            model_version: "t".into(),
            positive_ratio: if is_ad { 1.0 } else { 0.0 },
        }
    }

    #[test]
    fn starts_in_content() {
        let tracker = AdBreakTracker::new();
        assert_eq!(tracker.state(), AdBreakState::Content);
        assert!(tracker.ad_break_start().is_none());
    }

    #[test]
    fn repeated_detections_do_not_retrigger() {
        let mut tracker = AdBreakTracker::new();
        assert!(tracker.observe(&detection(1, false)).is_none());

        let start = tracker.observe(&detection(2, true)).unwrap();
        assert!(start.is_start());
        assert_eq!(tracker.ad_break_start(), Some(2));

        for frame in 3..20 {
            assert!(tracker.observe(&detection(frame, true)).is_none());
        }
        assert_eq!(tracker.breaks_seen(), 1);

        match tracker.observe(&detection(20, false)) {
            Some(Transition::AdEnded {
                started_at, frames, ..
            }) => {
                assert_eq!(started_at, 2);
                assert_eq!(frames, 18);
            }
            other => panic!("expected ad end, got {other:?}"),
        }
        assert!(tracker.observe(&detection(21, false)).is_none());
        assert!(!tracker.in_ad_break());
    }
}
