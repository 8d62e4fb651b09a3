use std::time::Duration;

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfidenceBucket {
    High,
    Medium,
    Low,
    Uncertain,
}

impl ConfidenceBucket {
    pub fn from_score(score: f32) -> Self {
        if score >= 0.9 {
            ConfidenceBucket::High
        } else if score >= 0.7 {
            ConfidenceBucket::Medium
        } else if score >= 0.5 {
            ConfidenceBucket::Low
        } else {
            ConfidenceBucket::Uncertain
        }
    }
}

/// Outcome of analysing one frame
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectionResult {
    /// Smoothed decision
    pub is_ad: bool,
    /// Raw model score in [0, 1]
    pub raw_confidence: f32,
    pub frame_number: u64,
    pub inference_duration: Duration,
    pub model_version: String,
    /// Share of positive raw decisions in the smoothing window
    pub positive_ratio: f32,
}

impl DetectionResult {
    pub fn confidence_bucket(&self) -> ConfidenceBucket {
        ConfidenceBucket::from_score(self.raw_confidence)
    }
}

/// Cumulative detector counters
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DetectionStats {
    pub total_frames: u64,
    pub ad_frames: u64,
    pub content_frames: u64,
    pub avg_confidence: f64,
    pub avg_inference_ms: f64,
}

impl DetectionStats {
    pub(crate) fn record(&mut self, result: &DetectionResult) {
        self.total_frames += 1;
        if result.is_ad {
            self.ad_frames += 1;
        } else {
            self.content_frames += 1;
        }

        // Running means
        let n = self.total_frames as f64;
        self.avg_confidence += (result.raw_confidence as f64 - self.avg_confidence) / n;
        let ms = result.inference_duration.as_secs_f64() * 1000.0;
        self.avg_inference_ms += (ms - self.avg_inference_ms) / n;
    }

    pub fn ad_ratio(&self) -> f64 {
        if self.total_frames == 0 {
            0.0
        } else {
            self.ad_frames as f64 / self.total_frames as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(is_ad: bool, score: f32, ms: u64) -> DetectionResult {
        DetectionResult {
            is_ad,
            raw_confidence: score,
            frame_number: 1,
            inference_duration: Duration::from_millis(ms),
            model_version: "test".into(),
            positive_ratio: 0.0,
        }
    }

    #[test]
    fn buckets_follow_score_bands() {
        assert_eq!(ConfidenceBucket::from_score(0.95), ConfidenceBucket::High);
        assert_eq!(ConfidenceBucket::from_score(0.9), ConfidenceBucket::High);
        assert_eq!(ConfidenceBucket::from_score(0.75), ConfidenceBucket::Medium);
        assert_eq!(ConfidenceBucket::from_score(0.5), ConfidenceBucket::Low);
        assert_eq!(ConfidenceBucket::from_score(0.49), ConfidenceBucket::Uncertain);
        assert_eq!(result(true, 0.7, 1).confidence_bucket(), ConfidenceBucket::Medium);
    }

    #[test]
    fn running_averages() {
        let mut stats = DetectionStats::default();
        stats.record(&result(true, 0.8, 10));
        stats.record(&result(false, 0.2, 20));

        assert_eq!(stats.total_frames, 2);
        assert_eq!(stats.ad_frames, 1);
        assert_eq!(stats.content_frames, 1);
        assert!((stats.avg_confidence - 0.5).abs() < 1e-6);
        assert!((stats.avg_inference_ms - 15.0).abs() < 1e-6);
        assert!((stats.ad_ratio() - 0.5).abs() < 1e-9);
    }
}
