//! High-level error types

use std::time::Duration;

use fpsense_core::{CorruptFrame, Instruction, Outcome};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Core protocol error: {0}")]
    Core(#[from] fpsense_core::Error),

    #[error("Transport error: {0}")]
    Transport(#[from] fpsense_transport::Error),

    #[error("Type error: {0}")]
    Types(#[from] fpsense_types::Error),

    #[error("Corrupt frame: {0}")]
    Corrupt(CorruptFrame),

    #[error("No reply to {instruction} within {timeout:?}")]
    TimedOut {
        instruction: Instruction,
        timeout: Duration,
    },

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Link unavailable: {0}")]
    LinkUnavailable(String),

    #[error("{instruction} rejected: {outcome}")]
    Rejected {
        instruction: Instruction,
        outcome: Outcome,
    },

    #[error("Invalid template id {id} (library holds {capacity})")]
    InvalidTemplateId { id: u16, capacity: u16 },

    #[error("Enrollment already in progress")]
    EnrollmentInProgress,

    #[error("Sensor not ready")]
    NotReady,

    #[error("Driver task stopped")]
    Stopped,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Name registry error: {0}")]
    Registry(String),

    #[error("Pairing error: {0}")]
    Pairing(String),
}

impl Error {
    /// Errors worth retrying: the exchange failed but the link is fine
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Corrupt(_) | Self::TimedOut { .. })
    }

    /// Classify a transport failure
    pub(crate) fn link(err: fpsense_transport::Error) -> Self {
        if err.is_link_down() {
            Self::LinkUnavailable(err.to_string())
        } else {
            Self::Transport(err)
        }
    }
}
