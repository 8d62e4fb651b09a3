//! Headless sink: counts frames, keeps the most recent ones, optionally paced

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::{interval, Interval, MissedTickBehavior};
use tracing::{debug, info};

use super::sink::{check_dimensions, FrameSink};
use crate::capture::Frame;
use crate::error::DisplayError;

pub struct NullSink {
    width: u32,
    height: u32,
    fps: Option<u32>,
    pacer: Option<Interval>,
    retain: usize,
    recent: VecDeque<Frame>,
    shown: Arc<AtomicU64>,
    fail_next: bool,
    initialized: bool,
}

impl NullSink {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            fps: None,
            pacer: None,
            retain: 1,
            recent: VecDeque::new(),
            shown: Arc::new(AtomicU64::new(0)),
            fail_next: false,
            initialized: false,
        }
    }

    /// Hold each frame until the next tick of a `fps` clock.
    pub fn paced(mut self, fps: u32) -> Self {
        self.fps = Some(fps).filter(|&f| f > 0);
        self
    }

    /// Keep the last `count` displayed frames for inspection.
    pub fn retain(mut self, count: usize) -> Self {
        self.retain = count.max(1);
        self
    }

    /// Shared counter of displayed frames, readable after the sink moves into a pipeline.
    pub fn counter(&self) -> Arc<AtomicU64> {
        self.shown.clone()
    }

    /// Make the next display call fail like a lost output.
    pub fn fail_next(&mut self) {
        self.fail_next = true;
    }

    pub fn last_frame(&self) -> Option<&Frame> {
        self.recent.back()
    }

    pub fn recent_frames(&self) -> impl Iterator<Item = &Frame> {
        self.recent.iter()
    }
}

#[async_trait]
impl FrameSink for NullSink {
    async fn initialize(&mut self) -> Result<(), DisplayError> {
        info!(
            "Null sink {}x{} (pacing: {:?} fps)",
            self.width, self.height, self.fps
        );
        self.pacer = self.fps.map(|fps| {
            let mut pacer = interval(Duration::from_secs_f64(1.0 / fps as f64));
            pacer.set_missed_tick_behavior(MissedTickBehavior::Delay);
            pacer
        });
        self.initialized = true;
        Ok(())
    }

    async fn display_frame(&mut self, frame: Frame) -> Result<(), DisplayError> {
        if !self.initialized {
            return Err(DisplayError::NotInitialized);
        }
        if std::mem::take(&mut self.fail_next) {
            return Err(DisplayError::Hardware("output lost".into()));
        }
        check_dimensions(&frame, self.width, self.height)?;

        if let Some(pacer) = self.pacer.as_mut() {
            pacer.tick().await;
        }

        debug!(sequence = frame.sequence(), "frame shown");
        if self.recent.len() == self.retain {
            self.recent.pop_front();
        }
        self.recent.push_back(frame);
        self.shown.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn is_available(&self) -> bool {
        self.initialized
    }

    async fn close(&mut self) -> Result<(), DisplayError> {
        self.initialized = false;
        self.pacer = None;
        self.recent.clear();
        Ok(())
    }
}
