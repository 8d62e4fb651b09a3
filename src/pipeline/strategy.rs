//! What to do with the display when an ad break starts or ends

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::StrategyConfig;
use crate::control::{DisplayCommand, DisplayController};
use crate::error::ConfigError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdResponseStrategy {
    /// Alternate content full screen, programme in the inset
    PipOnly,
    /// Tune the display away and back
    ChannelChange,
    /// Switch the display's input away and back
    InputSwitch,
    /// Picture-in-picture plus muted audio
    PipWithMute,
}

impl AdResponseStrategy {
    /// Whether the composited picture-in-picture view is shown during a break.
    pub fn shows_pip(self) -> bool {
        matches!(self, AdResponseStrategy::PipOnly | AdResponseStrategy::PipWithMute)
    }
}

/// Result of one strategy action
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionOutcome {
    /// Strategy has nothing to send
    NoAction,
    Applied(DisplayCommand),
    Failed(DisplayCommand),
    /// Restoration skipped because the matching change never took effect
    NotNeeded,
}

impl ActionOutcome {
    fn label(&self) -> &'static str {
        match self {
            ActionOutcome::NoAction => "none",
            ActionOutcome::Applied(_) => "applied",
            ActionOutcome::Failed(_) => "failed",
            ActionOutcome::NotNeeded => "not_needed",
        }
    }
}

/// Runs the configured strategy and remembers which changes actually took effect
#[derive(Debug)]
pub struct StrategyExecutor {
    config: StrategyConfig,
    channel_changed: bool,
    input_switched: bool,
    muted: bool,
}

impl StrategyExecutor {
    pub fn new(config: StrategyConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            channel_changed: false,
            input_switched: false,
            muted: false,
        })
    }

    pub fn strategy(&self) -> AdResponseStrategy {
        self.config.strategy
    }

    /// True while some change to the display still needs undoing.
    pub fn has_pending_restore(&self) -> bool {
        self.channel_changed || self.input_switched || self.muted
    }

    pub async fn on_ad_start(&mut self, controller: &mut dyn DisplayController) -> ActionOutcome {
        let outcome = match self.config.strategy {
            AdResponseStrategy::PipOnly => ActionOutcome::NoAction,
            AdResponseStrategy::ChannelChange => {
                let cmd = DisplayCommand::SetChannel(target(&self.config.alternate_channel));
                let outcome = send(controller, cmd).await;
                self.channel_changed = matches!(outcome, ActionOutcome::Applied(_));
                outcome
            }
            AdResponseStrategy::InputSwitch => {
                let cmd = DisplayCommand::SetInput(target(&self.config.alternate_input));
                let outcome = send(controller, cmd).await;
                self.input_switched = matches!(outcome, ActionOutcome::Applied(_));
                outcome
            }
            AdResponseStrategy::PipWithMute => {
                let outcome = send(controller, DisplayCommand::Mute).await;
                self.muted = matches!(outcome, ActionOutcome::Applied(_));
                outcome
            }
        };
        record("ad_start", &outcome);
        outcome
    }

    pub async fn on_ad_end(&mut self, controller: &mut dyn DisplayController) -> ActionOutcome {
        let outcome = match self.config.strategy {
            AdResponseStrategy::PipOnly => ActionOutcome::NoAction,
            AdResponseStrategy::ChannelChange => self.restore_channel(controller).await,
            AdResponseStrategy::InputSwitch => self.restore_input(controller).await,
            AdResponseStrategy::PipWithMute => self.restore_audio(controller).await,
        };
        record("ad_end", &outcome);
        outcome
    }

    /// Undo whatever is still active; used on shutdown.
    pub async fn restore(&mut self, controller: &mut dyn DisplayController) -> Vec<ActionOutcome> {
        let mut outcomes = Vec::new();
        if self.channel_changed {
            outcomes.push(self.restore_channel(controller).await);
        }
        if self.input_switched {
            outcomes.push(self.restore_input(controller).await);
        }
        if self.muted {
            outcomes.push(self.restore_audio(controller).await);
        }
        for outcome in &outcomes {
            record("shutdown", outcome);
        }
        outcomes
    }

    async fn restore_channel(&mut self, controller: &mut dyn DisplayController) -> ActionOutcome {
        if !self.channel_changed {
            return ActionOutcome::NotNeeded;
        }
        let cmd = DisplayCommand::SetChannel(target(&self.config.original_channel));
        let outcome = send(controller, cmd).await;
        // Only a confirmed restore clears the flag so shutdown can retry
        if matches!(outcome, ActionOutcome::Applied(_)) {
            self.channel_changed = false;
        }
        outcome
    }

    async fn restore_input(&mut self, controller: &mut dyn DisplayController) -> ActionOutcome {
        if !self.input_switched {
            return ActionOutcome::NotNeeded;
        }
        let cmd = DisplayCommand::SetInput(target(&self.config.original_input));
        let outcome = send(controller, cmd).await;
        if matches!(outcome, ActionOutcome::Applied(_)) {
            self.input_switched = false;
        }
        outcome
    }

    async fn restore_audio(&mut self, controller: &mut dyn DisplayController) -> ActionOutcome {
        if !self.muted {
            return ActionOutcome::NotNeeded;
        }
        let outcome = send(controller, DisplayCommand::Unmute).await;
        if matches!(outcome, ActionOutcome::Applied(_)) {
            self.muted = false;
        }
        outcome
    }
}

fn target(value: &Option<String>) -> String {
    value.clone().unwrap_or_default()
}

async fn send(controller: &mut dyn DisplayController, command: DisplayCommand) -> ActionOutcome {
    if !controller.is_available() {
        warn!(%command, "display controller unavailable, command not sent");
        return ActionOutcome::Failed(command);
    }
    match controller.send_command(command.clone()).await {
        Ok(true) => {
            info!(%command, "display command applied");
            ActionOutcome::Applied(command)
        }
        Ok(false) => {
            warn!(%command, "display did not acknowledge command");
            ActionOutcome::Failed(command)
        }
        Err(e) => {
            warn!(%command, "display command failed: {}", e);
            ActionOutcome::Failed(command)
        }
    }
}

fn record(phase: &'static str, outcome: &ActionOutcome) {
    metrics::counter!("strategy_actions", "phase" => phase, "outcome" => outcome.label())
        .increment(1);
}
