//! Aura LED feedback

use std::time::Duration;

use fpsense_core::constants::led;
use fpsense_core::Command;
use tracing::debug;

use crate::engine::{ensure_success, ProtocolEngine};

/// Light pattern for one driver situation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedCue {
    Ready,
    FingerSeen,
    Matched,
    Enrolling,
    AwaitingLift,
    Off,
}

impl LedCue {
    pub fn command(self) -> Command {
        match self {
            Self::Ready => Command::aura_led_config(led::BREATHING, 250, led::BLUE, 0),
            Self::FingerSeen => Command::aura_led_config(led::FLASHING, 25, led::RED, 0),
            Self::Matched => Command::aura_led_config(led::ON, 0, led::PURPLE, 0),
            Self::Enrolling => Command::aura_led_config(led::FLASHING, 25, led::PURPLE, 0),
            Self::AwaitingLift => Command::aura_led_config(led::BREATHING, 100, led::PURPLE, 0),
            Self::Off => Command::aura_led_config(led::OFF, 0, led::BLUE, 0),
        }
    }
}

/// Best-effort LED control; modules without a ring LED just reject the command
#[derive(Debug, Clone, Copy)]
pub struct Led {
    pub enabled: bool,
    pub timeout: Duration,
}

impl Led {
    pub async fn show(self, engine: &mut ProtocolEngine, cue: LedCue) {
        if !self.enabled {
            return;
        }

        let command = cue.command();
        let result = engine
            .execute(&command, self.timeout)
            .await
            .and_then(|response| ensure_success(&command, response));

        if let Err(e) = result {
            debug!("LED cue {:?} not applied: {}", cue, e);
        }
    }
}
