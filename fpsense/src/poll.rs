//! Finger polling
//!
//! Each tick sends the cheap GenImg probe. Only a new placement escalates to
//! Img2Tz + Search. A placement is latched until the finger is lifted, so one
//! touch produces one ring and one search.

use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use fpsense_core::{Command, Instruction, Outcome};
use fpsense_types::{DriverState, MatchResult};

use crate::engine::{ensure_success, ProtocolEngine};
use crate::error::{Error, Result};
use crate::led::{Led, LedCue};
use crate::names::{self, NameRegistry};
use crate::observer::{publish_status, Event};
use crate::retry::{execute_with_retry, RetryPolicy};

pub const STATUS_READY: &str = "Ready";
pub const STATUS_RING: &str = "Doorbell ring!";
pub const STATUS_UNRESPONSIVE: &str = "Sensor unresponsive";
pub const STATUS_MATCH_BLOCKED: &str = "Match blocked: sensor pairing invalid";

#[derive(Debug, Clone, Copy)]
pub struct PollSettings {
    pub timeout: Duration,
    pub retry: RetryPolicy,
    pub match_hold_off: Duration,
    pub ring_hold_off: Duration,
    pub unresponsive_threshold: u32,
    pub led: Led,
}

/// Per-tick inputs owned by the driver
pub struct PollContext<'a> {
    pub names: Option<&'a dyn NameRegistry>,
    pub matches_blocked: bool,
}

#[derive(Debug)]
pub struct PollController {
    settings: PollSettings,
    placement_latched: bool,
    failures: u32,
    degraded: bool,
    hold_until: Option<Instant>,
}

impl PollController {
    pub fn new(settings: PollSettings) -> Self {
        Self {
            settings,
            placement_latched: false,
            failures: 0,
            degraded: false,
            hold_until: None,
        }
    }

    /// Consecutive failed ticks
    pub fn failures(&self) -> u32 {
        self.failures
    }

    /// Forget the current placement and hold-off
    pub fn reset(&mut self) {
        self.placement_latched = false;
        self.hold_until = None;
    }

    /// Treat a finger already on the sensor as seen, e.g. after enrollment
    pub fn latch_placement(&mut self) {
        self.placement_latched = true;
        self.hold_until = None;
    }

    /// Run one poll step
    pub async fn tick(
        &mut self,
        engine: &mut ProtocolEngine,
        state: &mut DriverState,
        ctx: &PollContext<'_>,
    ) -> Vec<Event> {
        let mut events = Vec::new();

        if let Some(until) = self.hold_until {
            if Instant::now() < until {
                return events;
            }
            self.hold_until = None;
        }

        if let Err(e) = self.probe(engine, state, ctx, &mut events).await {
            self.on_failure(e, state, &mut events);
        }

        events
    }

    async fn probe(
        &mut self,
        engine: &mut ProtocolEngine,
        state: &mut DriverState,
        ctx: &PollContext<'_>,
        events: &mut Vec<Event>,
    ) -> Result<()> {
        // The next tick is the retry for the probe itself
        let response = engine.execute(&Command::gen_img(), self.settings.timeout).await?;

        match response.outcome {
            Outcome::NoFinger => {
                self.on_success(state, events);
                state.finger_present = false;

                if self.placement_latched {
                    self.placement_latched = false;
                    debug!("Finger lifted");
                    events.push(Event::Cleared);
                    self.settings.led.show(engine, LedCue::Ready).await;
                }
                Ok(())
            }
            Outcome::Success => {
                self.on_success(state, events);
                state.finger_present = true;

                if self.placement_latched {
                    return Ok(());
                }
                self.placement_latched = true;

                info!("Finger detected");
                events.push(Event::Ring);
                self.settings.led.show(engine, LedCue::FingerSeen).await;

                self.identify(engine, state, ctx, events).await
            }
            outcome if outcome.is_image_problem() => {
                self.on_success(state, events);
                state.finger_present = true;

                // One report per placement; a resting smudged finger stays quiet
                if self.placement_latched {
                    return Ok(());
                }
                self.placement_latched = true;

                warn!("Image capture failed: {}", outcome);
                publish_status(state, events, format!("Image capture failed: {}", outcome.description()));
                Ok(())
            }
            outcome => Err(Error::Rejected {
                instruction: Instruction::GenImg,
                outcome,
            }),
        }
    }

    /// Extract features from the captured image and search the library
    async fn identify(
        &mut self,
        engine: &mut ProtocolEngine,
        state: &mut DriverState,
        ctx: &PollContext<'_>,
        events: &mut Vec<Event>,
    ) -> Result<()> {
        let timeout = self.settings.timeout;
        let retry = self.settings.retry;

        let command = Command::img2tz(1);
        let response = execute_with_retry(engine, &command, timeout, &retry).await?;
        if response.outcome.is_image_problem() {
            warn!("Could not read fingerprint: {}", response.outcome);
            publish_status(
                state,
                events,
                format!("Could not read fingerprint: {}", response.outcome.description()),
            );
            return Ok(());
        }
        ensure_success(&command, response)?;

        let command = Command::search(1, 0, state.capacity);
        let response = execute_with_retry(engine, &command, timeout, &retry).await?;

        match response.outcome {
            Outcome::Success => {
                let (id, score) = response
                    .search_hit()
                    .ok_or_else(|| Error::Protocol("search reply without hit".into()))?;

                if ctx.matches_blocked {
                    warn!("Template {} matched but pairing is invalid; blocking", id);
                    self.report_miss(state, events, STATUS_MATCH_BLOCKED);
                    return Ok(());
                }

                let result = MatchResult::hit(id, score);
                let name = names::resolve(ctx.names, id);
                info!("Match found: id {} ({}), confidence {}", id, name, result.confidence);

                state.last_match = Some(result.clone());
                events.push(Event::MatchChanged(result));
                publish_status(state, events, format!("Match: {}", name));
                self.settings.led.show(engine, LedCue::Matched).await;
                self.hold_until = Some(Instant::now() + self.settings.match_hold_off);
                Ok(())
            }
            Outcome::NotFound | Outcome::NoMatch => {
                info!("No match found - ring doorbell");
                self.report_miss(state, events, STATUS_RING);
                Ok(())
            }
            outcome => Err(Error::Rejected {
                instruction: command.instruction(),
                outcome,
            }),
        }
    }

    fn report_miss(&mut self, state: &mut DriverState, events: &mut Vec<Event>, status: &str) {
        let result = MatchResult::miss();
        state.last_match = Some(result.clone());
        events.push(Event::MatchChanged(result));
        publish_status(state, events, status);
        self.hold_until = Some(Instant::now() + self.settings.ring_hold_off);
    }

    fn on_success(&mut self, state: &mut DriverState, events: &mut Vec<Event>) {
        self.failures = 0;
        if self.degraded {
            self.degraded = false;
            info!("Sensor responding again");
            publish_status(state, events, STATUS_READY);
        }
    }

    fn on_failure(&mut self, err: Error, state: &mut DriverState, events: &mut Vec<Event>) {
        self.failures = self.failures.saturating_add(1);
        self.degraded = true;

        let text = format!("Communication error: {}", err);
        warn!("Poll failed ({} in a row): {}", self.failures, err);

        // Status always reflects the latest failure; observers hear about a streak once
        state.status = text.clone();
        if self.failures == 1 {
            events.push(Event::Status(text));
        }
        if self.failures == self.settings.unresponsive_threshold {
            error!("Sensor unresponsive after {} failed polls", self.failures);
            publish_status(state, events, STATUS_UNRESPONSIVE);
        } else if self.failures > self.settings.unresponsive_threshold {
            state.status = STATUS_UNRESPONSIVE.to_string();
        }
    }
}
