//! Ad-start / ad-end callbacks

use std::panic::{catch_unwind, AssertUnwindSafe};

use tracing::warn;

use super::state::Transition;
use crate::detect::DetectionResult;
use crate::error::BoxError;

pub type Observer = Box<dyn Fn(&DetectionResult) -> Result<(), BoxError> + Send + Sync>;

/// Each callback runs in isolation: an error or panic is logged and the rest still run.
#[derive(Default)]
pub struct AdBreakObservers {
    on_start: Vec<Observer>,
    on_end: Vec<Observer>,
}

impl AdBreakObservers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_ad_start<F>(&mut self, f: F)
    where
        F: Fn(&DetectionResult) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        self.on_start.push(Box::new(f));
    }

    pub fn on_ad_end<F>(&mut self, f: F)
    where
        F: Fn(&DetectionResult) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        self.on_end.push(Box::new(f));
    }

    /// Returns how many observers failed.
    pub fn notify(&self, transition: &Transition) -> usize {
        let (observers, event) = if transition.is_start() {
            (&self.on_start, "ad_start")
        } else {
            (&self.on_end, "ad_end")
        };
        let detection = transition.detection();

        let mut failed = 0;
        for (index, observer) in observers.iter().enumerate() {
            match catch_unwind(AssertUnwindSafe(|| observer(detection))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    failed += 1;
                    warn!(event, index, "observer failed: {}", e);
                }
                Err(_) => {
                    failed += 1;
                    warn!(event, index, "observer panicked");
                }
            }
        }
        failed
    }

    pub fn len(&self) -> usize {
        self.on_start.len() + self.on_end.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    fn start() -> Transition {
        Transition::AdStarted {
            detection: DetectionResult {
                is_ad: true,
                raw_confidence: 0.9,
                frame_number: 12,
                inference_duration: Duration::ZERO,
                model_version: "t".into(),
                positive_ratio: 1.0,
            },
        }
    }

    #[test]
    fn failing_observers_do_not_suppress_others() {
        let seen = Arc::new(AtomicU64::new(0));
        let mut observers = AdBreakObservers::new();

        observers.on_ad_start(|_| Err("boom".into()));
        observers.on_ad_start(|_| panic!("observer bug"));
        let counter = seen.clone();
        observers.on_ad_start(move |d| {
            counter.store(d.frame_number, Ordering::SeqCst);
            Ok(())
        });

        assert_eq!(observers.notify(&start()), 2);
        assert_eq!(seen.load(Ordering::SeqCst), 12);
    }

    #[test]
    fn end_observers_ignore_start_events() {
        let seen = Arc::new(AtomicU64::new(0));
        let mut observers = AdBreakObservers::new();
        let counter = seen.clone();
        observers.on_ad_end(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        observers.notify(&start());
        assert_eq!(seen.load(Ordering::SeqCst), 0);
    }
}
