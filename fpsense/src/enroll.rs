//! Enrollment state machine
//!
//! An enrollment collects several samples of one finger into the module's
//! char buffers, merges them into a template and stores it. Phases change
//! only through [`EnrollPhase::next`]. [`EnrollmentSession::step`] performs
//! one I/O step per driver tick and feeds the observed outcome back in, so a
//! cancellation lands between exchanges.

use std::fmt;
use std::time::Duration;

use tracing::{debug, info, warn};

use fpsense_core::constants::{INDEX_TABLE_PAGES, INDEX_TABLE_PAGE_SLOTS};
use fpsense_core::{Command, Outcome};

use crate::engine::{ensure_success, ProtocolEngine};
use crate::error::Error;
use crate::led::{Led, LedCue};
use crate::retry::{execute_with_retry, RetryPolicy};

/// Char buffer the merged template is stored from
const MODEL_BUFFER: u8 = 1;

/// Why an enrollment ended without a template
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    Cancelled,

    /// The module answered with a failing outcome
    Rejected(Outcome),

    /// No free slot left in the library
    LibraryFull,

    TimedOut,
    Corrupt,
    LinkUnavailable,
    Protocol(String),
}

impl FailureReason {
    pub fn from_error(err: &Error) -> Self {
        match err {
            Error::Rejected { outcome, .. } => Self::Rejected(*outcome),
            Error::TimedOut { .. } => Self::TimedOut,
            Error::Corrupt(_) => Self::Corrupt,
            Error::LinkUnavailable(_) => Self::LinkUnavailable,
            other => Self::Protocol(other.to_string()),
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cancelled => write!(f, "cancelled"),
            Self::Rejected(outcome) => write!(f, "{}", outcome),
            Self::LibraryFull => write!(f, "fingerprint library full"),
            Self::TimedOut => write!(f, "sensor did not respond"),
            Self::Corrupt => write!(f, "corrupt reply from sensor"),
            Self::LinkUnavailable => write!(f, "sensor link unavailable"),
            Self::Protocol(detail) => write!(f, "{}", detail),
        }
    }
}

/// How a finished enrollment ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnrollmentOutcome {
    /// Template stored in this slot
    Stored(u16),
    Failed(FailureReason),
}

impl EnrollmentOutcome {
    pub fn template_id(&self) -> Option<u16> {
        match self {
            Self::Stored(id) => Some(*id),
            Self::Failed(_) => None,
        }
    }
}

impl fmt::Display for EnrollmentOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stored(id) => write!(f, "stored as template {}", id),
            Self::Failed(reason) => write!(f, "failed: {}", reason),
        }
    }
}

/// Enrollment progress
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnrollPhase {
    AwaitingFinger,

    /// `collected` samples stored in char buffers `1..=collected`
    Capturing { collected: u8, awaiting_lift: bool },

    Merging,
    Storing,
    Complete { template_id: u16 },
    Failed { reason: FailureReason },
}

/// What one step observed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    NoFinger,

    /// An image was captured but not used
    FingerPresent,

    /// An image was captured and extracted into the next char buffer
    SampleExtracted,

    Merged,
    Stored(u16),
    Failed(FailureReason),
    Cancel,
}

impl EnrollPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete { .. } | Self::Failed { .. })
    }

    /// Transition for `input` when `samples` placements are required
    pub fn next(self, input: Input, samples: u8) -> Self {
        if self.is_terminal() {
            return self;
        }

        match (self, input) {
            (_, Input::Cancel) => Self::Failed {
                reason: FailureReason::Cancelled,
            },
            (_, Input::Failed(reason)) => Self::Failed { reason },

            (Self::AwaitingFinger, Input::SampleExtracted) => Self::after_sample(1, samples),
            (Self::AwaitingFinger, _) => Self::AwaitingFinger,

            // Still the same placement: never counted
            (Self::Capturing { collected, awaiting_lift: true }, Input::NoFinger) => Self::Capturing {
                collected,
                awaiting_lift: false,
            },
            (phase @ Self::Capturing { awaiting_lift: true, .. }, _) => phase,

            (Self::Capturing { collected, awaiting_lift: false }, Input::SampleExtracted) => {
                Self::after_sample(collected + 1, samples)
            }
            (phase @ Self::Capturing { .. }, _) => phase,

            (Self::Merging, Input::Merged) => Self::Storing,
            (Self::Storing, Input::Stored(template_id)) => Self::Complete { template_id },
            (phase, _) => phase,
        }
    }

    fn after_sample(collected: u8, samples: u8) -> Self {
        if collected >= samples {
            Self::Merging
        } else {
            Self::Capturing {
                collected,
                awaiting_lift: true,
            }
        }
    }
}

impl fmt::Display for EnrollPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AwaitingFinger => write!(f, "awaiting finger"),
            Self::Capturing { collected, awaiting_lift } => write!(
                f,
                "capturing ({} collected{})",
                collected,
                if *awaiting_lift { ", awaiting lift" } else { "" }
            ),
            Self::Merging => write!(f, "merging"),
            Self::Storing => write!(f, "storing"),
            Self::Complete { template_id } => write!(f, "complete (id {})", template_id),
            Self::Failed { reason } => write!(f, "failed ({})", reason),
        }
    }
}

/// Settings one step needs from the driver
#[derive(Debug, Clone, Copy)]
pub struct StepContext {
    pub timeout: Duration,
    pub retry: RetryPolicy,
    pub capacity: u16,
    pub led: Led,
}

/// One enrollment request
#[derive(Debug)]
pub struct EnrollmentSession {
    target: Option<u16>,
    name: Option<String>,
    samples: u8,
    phase: EnrollPhase,
    cancel_requested: bool,
    finger_on_sensor: bool,
}

impl EnrollmentSession {
    /// Start a session; `target` of `None` stores into the first free slot
    pub fn new(target: Option<u16>, name: Option<String>, samples: u8) -> Self {
        Self {
            target,
            name,
            samples: samples.max(1),
            phase: EnrollPhase::AwaitingFinger,
            cancel_requested: false,
            finger_on_sensor: false,
        }
    }

    pub fn phase(&self) -> &EnrollPhase {
        &self.phase
    }

    pub fn target(&self) -> Option<u16> {
        self.target
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn samples(&self) -> u8 {
        self.samples
    }

    pub fn is_finished(&self) -> bool {
        self.phase.is_terminal()
    }

    /// Whether the latest capture saw a finger
    pub fn finger_on_sensor(&self) -> bool {
        self.finger_on_sensor
    }

    /// Final result, `None` while the session is running
    pub fn outcome(&self) -> Option<EnrollmentOutcome> {
        match &self.phase {
            EnrollPhase::Complete { template_id } => Some(EnrollmentOutcome::Stored(*template_id)),
            EnrollPhase::Failed { reason } => Some(EnrollmentOutcome::Failed(reason.clone())),
            _ => None,
        }
    }

    /// Fail the session at the next step
    pub fn cancel(&mut self) {
        self.cancel_requested = true;
    }

    /// Feed one observation; returns the status text for a phase change
    pub fn apply(&mut self, input: Input) -> Option<String> {
        let previous = self.phase.clone();
        self.phase = self.phase.clone().next(input, self.samples);

        if self.phase == previous {
            return None;
        }

        debug!("Enrollment: {} -> {}", previous, self.phase);
        self.status_text()
    }

    /// Prompt for the current phase
    pub fn status_text(&self) -> Option<String> {
        match &self.phase {
            EnrollPhase::AwaitingFinger => Some(format!("Enrollment pass 1/{}: Place finger", self.samples)),
            EnrollPhase::Capturing { collected, awaiting_lift: true } => Some(format!(
                "Sample {}/{} captured. Lift finger",
                collected, self.samples
            )),
            EnrollPhase::Capturing { collected, awaiting_lift: false } => Some(format!(
                "Enrollment pass {}/{}: Place finger",
                collected + 1,
                self.samples
            )),
            EnrollPhase::Merging => Some("Creating fingerprint model...".into()),
            EnrollPhase::Storing => Some("Storing fingerprint...".into()),
            EnrollPhase::Complete { .. } | EnrollPhase::Failed { .. } => None,
        }
    }

    /// Perform the I/O for the current phase and apply the result
    pub async fn step(&mut self, engine: &mut ProtocolEngine, ctx: &StepContext) -> Option<String> {
        if self.is_finished() {
            return None;
        }
        if self.cancel_requested {
            info!("Enrollment cancelled");
            return self.apply(Input::Cancel);
        }

        let input = match self.observe(engine, ctx).await {
            Ok(input) => input,
            Err(e) => {
                warn!("Enrollment step failed in phase {}: {}", self.phase, e);
                Input::Failed(FailureReason::from_error(&e))
            }
        };

        match input {
            Input::NoFinger => self.finger_on_sensor = false,
            Input::FingerPresent | Input::SampleExtracted => self.finger_on_sensor = true,
            _ => {}
        }
        let status = self.apply(input);

        match &self.phase {
            EnrollPhase::Capturing { awaiting_lift: true, .. } if status.is_some() => {
                ctx.led.show(engine, LedCue::AwaitingLift).await;
            }
            EnrollPhase::Capturing { awaiting_lift: false, .. } if status.is_some() => {
                ctx.led.show(engine, LedCue::Enrolling).await;
            }
            _ => {}
        }

        status
    }

    async fn observe(&mut self, engine: &mut ProtocolEngine, ctx: &StepContext) -> crate::Result<Input> {
        match self.phase.clone() {
            EnrollPhase::AwaitingFinger => self.capture(engine, ctx, 1).await,
            EnrollPhase::Capturing { collected, awaiting_lift: false } => {
                self.capture(engine, ctx, collected + 1).await
            }
            EnrollPhase::Capturing { awaiting_lift: true, .. } => {
                let response = execute_with_retry(engine, &Command::gen_img(), ctx.timeout, &ctx.retry).await?;
                match response.outcome {
                    Outcome::NoFinger => Ok(Input::NoFinger),
                    _ => Ok(Input::FingerPresent),
                }
            }
            EnrollPhase::Merging => {
                let command = Command::reg_model();
                let response = execute_with_retry(engine, &command, ctx.timeout, &ctx.retry).await?;
                ensure_success(&command, response)?;
                Ok(Input::Merged)
            }
            EnrollPhase::Storing => {
                let template_id = match self.target {
                    Some(id) => id,
                    None => match first_free_slot(engine, ctx).await? {
                        Some(id) => id,
                        None => return Ok(Input::Failed(FailureReason::LibraryFull)),
                    },
                };

                let command = Command::store(MODEL_BUFFER, template_id);
                let response = execute_with_retry(engine, &command, ctx.timeout, &ctx.retry).await?;
                ensure_success(&command, response)?;

                info!("Stored template {}", template_id);
                Ok(Input::Stored(template_id))
            }
            EnrollPhase::Complete { .. } | EnrollPhase::Failed { .. } => Ok(Input::NoFinger),
        }
    }

    /// GenImg, then Img2Tz into `buffer` when a finger is on the sensor
    async fn capture(&self, engine: &mut ProtocolEngine, ctx: &StepContext, buffer: u8) -> crate::Result<Input> {
        let command = Command::gen_img();
        let response = execute_with_retry(engine, &command, ctx.timeout, &ctx.retry).await?;
        if response.outcome == Outcome::NoFinger {
            return Ok(Input::NoFinger);
        }
        ensure_success(&command, response)?;

        let command = Command::img2tz(buffer);
        let response = execute_with_retry(engine, &command, ctx.timeout, &ctx.retry).await?;
        ensure_success(&command, response)?;

        info!("Enrollment sample {}/{} extracted", buffer, self.samples);
        Ok(Input::SampleExtracted)
    }
}

/// Scan the index table for the lowest unused slot below `capacity`
async fn first_free_slot(engine: &mut ProtocolEngine, ctx: &StepContext) -> crate::Result<Option<u16>> {
    for page in 0..INDEX_TABLE_PAGES {
        if u32::from(page) * u32::from(INDEX_TABLE_PAGE_SLOTS) >= u32::from(ctx.capacity) {
            break;
        }

        let command = Command::read_index_table(page)?;
        let response = execute_with_retry(engine, &command, ctx.timeout, &ctx.retry).await?;
        let response = ensure_success(&command, response)?;

        if let Some(slot) = response.first_free_slot(page, ctx.capacity) {
            debug!("First free template slot: {}", slot);
            return Ok(Some(slot));
        }
    }

    Ok(None)
}
