//! Controller double that records what it was asked to do

use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use super::{DisplayCommand, DisplayController};
use crate::error::ControlError;

/// Shared log of attempted commands and whether each took effect
#[derive(Debug, Clone, Default)]
pub struct CommandLog(Arc<Mutex<Vec<(DisplayCommand, bool)>>>);

impl CommandLog {
    fn entries(&self) -> MutexGuard<'_, Vec<(DisplayCommand, bool)>> {
        self.0.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Every command sent, in order, including failed ones.
    pub fn commands(&self) -> Vec<DisplayCommand> {
        self.entries().iter().map(|(c, _)| c.clone()).collect()
    }

    pub fn attempts(&self) -> Vec<(DisplayCommand, bool)> {
        self.entries().clone()
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }
}

#[derive(Debug, Default)]
pub struct RecordingController {
    log: CommandLog,
    failing: Vec<DisplayCommand>,
    rejected: Vec<DisplayCommand>,
    fail_init: bool,
    ready: bool,
}

impl RecordingController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn log(&self) -> CommandLog {
        self.log.clone()
    }

    /// Transport error whenever `command` is sent.
    pub fn fail_on(mut self, command: DisplayCommand) -> Self {
        self.failing.push(command);
        self
    }

    /// Display ignores `command` (sent, but not acknowledged).
    pub fn reject(mut self, command: DisplayCommand) -> Self {
        self.rejected.push(command);
        self
    }

    pub fn failing_init(mut self) -> Self {
        self.fail_init = true;
        self
    }
}

#[async_trait]
impl DisplayController for RecordingController {
    async fn initialize(&mut self) -> Result<(), ControlError> {
        if self.fail_init {
            return Err(ControlError::Unavailable);
        }
        self.ready = true;
        Ok(())
    }

    async fn send_command(&mut self, command: DisplayCommand) -> Result<bool, ControlError> {
        if !self.ready {
            return Err(ControlError::NotInitialized);
        }
        if self.failing.contains(&command) {
            self.log.entries().push((command.clone(), false));
            return Err(ControlError::Transport(format!("no acknowledgement for {}", command)));
        }
        let accepted = !self.rejected.contains(&command);
        self.log.entries().push((command, accepted));
        Ok(accepted)
    }

    fn is_available(&self) -> bool {
        self.ready
    }

    async fn close(&mut self) -> Result<(), ControlError> {
        self.ready = false;
        Ok(())
    }
}
