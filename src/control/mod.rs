//! Remote control of the downstream display
//!
//! Only the command contract lives here. Picking a transport (IR, CEC,
//! network) and falling back between them happens behind an implementation.

pub mod recording;

use std::fmt;

use async_trait::async_trait;
use tracing::info;

use crate::error::ControlError;

pub use recording::{CommandLog, RecordingController};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisplayCommand {
    PowerOn,
    PowerOff,
    VolumeUp,
    VolumeDown,
    Mute,
    Unmute,
    SetChannel(String),
    SetInput(String),
}

impl fmt::Display for DisplayCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DisplayCommand::PowerOn => f.write_str("power_on"),
            DisplayCommand::PowerOff => f.write_str("power_off"),
            DisplayCommand::VolumeUp => f.write_str("volume_up"),
            DisplayCommand::VolumeDown => f.write_str("volume_down"),
            DisplayCommand::Mute => f.write_str("mute"),
            DisplayCommand::Unmute => f.write_str("unmute"),
            DisplayCommand::SetChannel(ch) => write!(f, "set_channel({})", ch),
            DisplayCommand::SetInput(input) => write!(f, "set_input({})", input),
        }
    }
}

#[async_trait]
pub trait DisplayController: Send {
    async fn initialize(&mut self) -> Result<(), ControlError>;

    /// `Ok(false)` means the transport answered but the display did not acknowledge.
    async fn send_command(&mut self, command: DisplayCommand) -> Result<bool, ControlError>;

    fn is_available(&self) -> bool;

    async fn close(&mut self) -> Result<(), ControlError> {
        Ok(())
    }

    async fn power(&mut self, on: bool) -> Result<bool, ControlError> {
        let command = if on {
            DisplayCommand::PowerOn
        } else {
            DisplayCommand::PowerOff
        };
        self.send_command(command).await
    }

    async fn set_channel(&mut self, channel: &str) -> Result<bool, ControlError> {
        self.send_command(DisplayCommand::SetChannel(channel.to_string()))
            .await
    }

    async fn set_input(&mut self, input: &str) -> Result<bool, ControlError> {
        self.send_command(DisplayCommand::SetInput(input.to_string()))
            .await
    }

    async fn mute(&mut self, muted: bool) -> Result<bool, ControlError> {
        let command = if muted {
            DisplayCommand::Mute
        } else {
            DisplayCommand::Unmute
        };
        self.send_command(command).await
    }

    async fn volume(&mut self, up: bool) -> Result<bool, ControlError> {
        let command = if up {
            DisplayCommand::VolumeUp
        } else {
            DisplayCommand::VolumeDown
        };
        self.send_command(command).await
    }
}

/// Accepts every command and only logs it; for setups with no controllable display
#[derive(Debug, Default)]
pub struct LoggingController {
    ready: bool,
}

impl LoggingController {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DisplayController for LoggingController {
    async fn initialize(&mut self) -> Result<(), ControlError> {
        self.ready = true;
        Ok(())
    }

    async fn send_command(&mut self, command: DisplayCommand) -> Result<bool, ControlError> {
        if !self.ready {
            return Err(ControlError::NotInitialized);
        }
        info!(%command, "display command");
        Ok(true)
    }

    fn is_available(&self) -> bool {
        self.ready
    }

    async fn close(&mut self) -> Result<(), ControlError> {
        self.ready = false;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn wrappers_map_to_commands() {
        let mut ctl = RecordingController::new();
        let log = ctl.log();
        ctl.initialize().await.unwrap();

        ctl.power(true).await.unwrap();
        ctl.set_channel("5-2").await.unwrap();
        ctl.mute(true).await.unwrap();
        ctl.mute(false).await.unwrap();
        ctl.set_input("hdmi2").await.unwrap();
        ctl.volume(false).await.unwrap();

        assert_eq!(
            log.commands(),
            vec![
                DisplayCommand::PowerOn,
                DisplayCommand::SetChannel("5-2".into()),
                DisplayCommand::Mute,
                DisplayCommand::Unmute,
                DisplayCommand::SetInput("hdmi2".into()),
                DisplayCommand::VolumeDown,
            ]
        );
    }

    #[tokio::test]
    async fn logging_controller_needs_initialize() {
        let mut ctl = LoggingController::new();
        assert!(ctl.send_command(DisplayCommand::Mute).await.is_err());
        ctl.initialize().await.unwrap();
        assert!(ctl.send_command(DisplayCommand::Mute).await.unwrap());
        assert_eq!(DisplayCommand::SetChannel("7".into()).to_string(), "set_channel(7)");
    }
}
