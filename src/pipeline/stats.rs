//! Lock-free frame counters

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use crossbeam::utils::CachePadded;
use serde::Serialize;

/// Snapshot of pipeline throughput, computed on demand
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct VideoStats {
    pub frames_captured: u64,
    pub frames_dropped: u64,
    pub frames_displayed: u64,
    pub latency_min_ms: f64,
    pub latency_avg_ms: f64,
    pub latency_max_ms: f64,
    pub latency_warnings: u64,
    pub fps: f64,
    pub drop_rate: f64,
    pub elapsed: Duration,
}

struct Counters {
    captured: AtomicU64,
    dropped: AtomicU64,
    displayed: AtomicU64,
    latency_total_us: AtomicU64,
    latency_min_us: AtomicU64,
    latency_max_us: AtomicU64,
    latency_warnings: AtomicU64,
    started_us: AtomicU64,
}

impl Default for Counters {
    fn default() -> Self {
        Self {
            captured: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            displayed: AtomicU64::new(0),
            latency_total_us: AtomicU64::new(0),
            latency_min_us: AtomicU64::new(u64::MAX),
            latency_max_us: AtomicU64::new(0),
            latency_warnings: AtomicU64::new(0),
            started_us: AtomicU64::new(0),
        }
    }
}

/// Written by the frame loop, readable from anywhere without blocking it
pub struct StatsCollector {
    epoch: Instant,
    counters: CachePadded<Counters>,
}

impl Default for StatsCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl StatsCollector {
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
            counters: CachePadded::new(Counters::default()),
        }
    }

    fn now_us(&self) -> u64 {
        self.epoch.elapsed().as_micros() as u64
    }

    pub fn record_captured(&self) {
        self.counters.captured.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dropped(&self) {
        self.counters.dropped.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("frames_dropped").increment(1);
    }

    pub fn record_displayed(&self, latency: Duration) {
        let us = latency.as_micros() as u64;
        let c = &self.counters;
        c.displayed.fetch_add(1, Ordering::Relaxed);
        c.latency_total_us.fetch_add(us, Ordering::Relaxed);
        c.latency_min_us.fetch_min(us, Ordering::Relaxed);
        c.latency_max_us.fetch_max(us, Ordering::Relaxed);
        metrics::histogram!("frame_latency_ms").record(latency.as_secs_f64() * 1000.0);
    }

    pub fn record_latency_warning(&self) {
        self.counters.latency_warnings.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("latency_budget_exceeded").increment(1);
    }

    /// Zero everything and restart the fps clock.
    pub fn reset(&self) {
        let c = &self.counters;
        c.captured.store(0, Ordering::Relaxed);
        c.dropped.store(0, Ordering::Relaxed);
        c.displayed.store(0, Ordering::Relaxed);
        c.latency_total_us.store(0, Ordering::Relaxed);
        c.latency_min_us.store(u64::MAX, Ordering::Relaxed);
        c.latency_max_us.store(0, Ordering::Relaxed);
        c.latency_warnings.store(0, Ordering::Relaxed);
        c.started_us.store(self.now_us(), Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> VideoStats {
        let c = &self.counters;
        let captured = c.captured.load(Ordering::Relaxed);
        let dropped = c.dropped.load(Ordering::Relaxed);
        let displayed = c.displayed.load(Ordering::Relaxed);
        let total_us = c.latency_total_us.load(Ordering::Relaxed);
        let min_us = c.latency_min_us.load(Ordering::Relaxed);
        let max_us = c.latency_max_us.load(Ordering::Relaxed);

        let elapsed = Duration::from_micros(
            self.now_us()
                .saturating_sub(c.started_us.load(Ordering::Relaxed)),
        );
        let secs = elapsed.as_secs_f64();
        let attempted = captured + dropped;

        VideoStats {
            frames_captured: captured,
            frames_dropped: dropped,
            frames_displayed: displayed,
            latency_min_ms: if displayed == 0 {
                0.0
            } else {
                min_us as f64 / 1000.0
            },
            latency_avg_ms: if displayed == 0 {
                0.0
            } else {
                total_us as f64 / displayed as f64 / 1000.0
            },
            latency_max_ms: max_us as f64 / 1000.0,
            latency_warnings: c.latency_warnings.load(Ordering::Relaxed),
            fps: if secs > 0.0 {
                displayed as f64 / secs
            } else {
                0.0
            },
            drop_rate: if attempted == 0 {
                0.0
            } else {
                dropped as f64 / attempted as f64
            },
            elapsed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_stats_are_zero() {
        let stats = StatsCollector::new().snapshot();
        assert_eq!(stats.frames_captured, 0);
        assert_eq!(stats.drop_rate, 0.0);
        assert_eq!(stats.latency_min_ms, 0.0);
        assert_eq!(stats.latency_avg_ms, 0.0);
    }

    #[test]
    fn latency_min_avg_max() {
        let stats = StatsCollector::new();
        for ms in [10, 30, 20] {
            stats.record_captured();
            stats.record_displayed(Duration::from_millis(ms));
        }
        let snap = stats.snapshot();
        assert_eq!(snap.latency_min_ms, 10.0);
        assert_eq!(snap.latency_max_ms, 30.0);
        assert_eq!(snap.latency_avg_ms, 20.0);
        assert_eq!(snap.frames_displayed, 3);
    }

    #[test]
    fn drop_rate_counts_failed_captures() {
        let stats = StatsCollector::new();
        for _ in 0..3 {
            stats.record_captured();
        }
        stats.record_dropped();

        let snap = stats.snapshot();
        assert_eq!(
            snap.drop_rate,
            snap.frames_dropped as f64 / (snap.frames_captured + snap.frames_dropped) as f64
        );
        assert_eq!(snap.drop_rate, 0.25);
    }

    #[test]
    fn reset_clears_counters() {
        let stats = StatsCollector::new();
        stats.record_captured();
        stats.record_displayed(Duration::from_millis(5));
        stats.record_latency_warning();
        stats.reset();

        let snap = stats.snapshot();
        assert_eq!(snap.frames_captured, 0);
        assert_eq!(snap.frames_displayed, 0);
        assert_eq!(snap.latency_warnings, 0);
        assert_eq!(snap.latency_max_ms, 0.0);
    }
}
