//! Sliding-window vote over raw per-frame decisions

use ringbuf::traits::{Consumer, Observer, RingBuffer};
use ringbuf::HeapRb;

/// Slack on the required count, so a threshold written as 0.67 accepts 2 of 3.
/// Well under one sample, so `ceil(T * N)` positives are needed at any window size.
const COUNT_TOLERANCE: f32 = 0.02;

/// Fixed-size history of raw decisions; the oldest is evicted on overflow
pub struct TemporalSmoother {
    history: HeapRb<bool>,
    threshold: f32,
}

impl TemporalSmoother {
    pub fn new(window: usize, threshold: f32) -> Self {
        Self {
            history: HeapRb::new(window.max(1)),
            threshold,
        }
    }

    /// Record one raw decision and return the smoothed one.
    pub fn push(&mut self, raw: bool) -> bool {
        self.history.push_overwrite(raw);
        self.is_positive()
    }

    /// Share of positives among the decisions seen so far, at most one window.
    pub fn positive_ratio(&self) -> f32 {
        let len = self.history.occupied_len();
        if len == 0 {
            return 0.0;
        }
        self.positives() as f32 / len as f32
    }

    pub fn positives(&self) -> usize {
        self.history.iter().filter(|&&d| d).count()
    }

    /// Positives needed for a smoothed positive with the current fill.
    pub fn required(&self) -> usize {
        let len = self.history.occupied_len() as f32;
        (self.threshold * len - COUNT_TOLERANCE).ceil().max(1.0) as usize
    }

    pub fn is_positive(&self) -> bool {
        if self.history.is_empty() {
            return false;
        }
        self.positives() >= self.required()
    }

    pub fn len(&self) -> usize {
        self.history.occupied_len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    pub fn window(&self) -> usize {
        self.history.capacity().get()
    }

    pub fn clear(&mut self) {
        while self.history.try_pop().is_some() {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_window_is_not_positive() {
        let smoother = TemporalSmoother::new(5, 0.5);
        assert!(!smoother.is_positive());
        assert_eq!(smoother.positive_ratio(), 0.0);
    }

    #[test]
    fn two_of_three_passes_a_two_thirds_threshold() {
        let mut smoother = TemporalSmoother::new(3, 0.67);
        let smoothed: Vec<bool> = [true, false, true, true]
            .into_iter()
            .map(|raw| smoother.push(raw))
            .collect();
        assert_eq!(smoothed, vec![true, false, true, true]);
        assert!((smoother.positive_ratio() - 2.0 / 3.0).abs() < 1e-6);
    }

    #[test]
    fn single_spurious_frame_does_not_flip_state() {
        let mut smoother = TemporalSmoother::new(5, 0.6);
        for _ in 0..5 {
            smoother.push(false);
        }
        assert!(!smoother.push(true));
        assert!(!smoother.push(false));
    }

    #[test]
    fn oldest_decision_is_evicted() {
        let mut smoother = TemporalSmoother::new(2, 1.0);
        smoother.push(false);
        smoother.push(true);
        assert!(!smoother.is_positive());
        assert!(smoother.push(true));
        assert_eq!(smoother.len(), 2);
        assert_eq!(smoother.window(), 2);
    }

    #[test]
    fn matches_count_rule_for_every_window_content() {
        // is_ad iff positives >= ceil(T * N) for thresholds that sit on a clean fraction
        for window in 1..=6usize {
            for &threshold in &[0.25f32, 0.5, 0.75, 1.0] {
                let needed = (threshold * window as f32).ceil() as usize;
                for bits in 0u32..(1 << window) {
                    let mut smoother = TemporalSmoother::new(window, threshold);
                    let mut last = false;
                    for i in 0..window {
                        last = smoother.push(bits & (1 << i) != 0);
                    }
                    let positives = bits.count_ones() as usize;
                    assert_eq!(last, positives >= needed, "window {window} threshold {threshold} bits {bits:b}");
                }
            }
        }
    }

    #[test]
    fn large_windows_need_the_full_count() {
        for &window in &[100usize, 300, 500] {
            for &threshold in &[0.5f32, 0.75] {
                let needed = (threshold * window as f32).ceil() as usize;
                for positives in [needed - 1, needed] {
                    let mut smoother = TemporalSmoother::new(window, threshold);
                    let mut last = false;
                    for i in 0..window {
                        last = smoother.push(i < positives);
                    }
                    assert_eq!(
                        last,
                        positives >= needed,
                        "window {window} threshold {threshold} positives {positives}"
                    );
                }
            }
        }
    }

    #[test]
    fn one_short_of_half_is_not_positive() {
        let mut smoother = TemporalSmoother::new(300, 0.5);
        for i in 0..300 {
            smoother.push(i >= 151);
        }
        assert_eq!(smoother.required(), 150);
        assert!(!smoother.is_positive());
        assert!(smoother.push(true));
    }

    #[test]
    fn tiny_threshold_still_needs_one_positive() {
        let mut smoother = TemporalSmoother::new(4, 0.01);
        assert!(!smoother.push(false));
        assert!(smoother.push(true));
    }

    #[test]
    fn clear_forgets_history() {
        let mut smoother = TemporalSmoother::new(3, 0.5);
        smoother.push(true);
        smoother.clear();
        assert!(smoother.is_empty());
        assert!(!smoother.is_positive());
    }
}
